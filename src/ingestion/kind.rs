use std::fmt;

/// Upload types on the allow-list. Anything else is rejected before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Png,
    Jpg,
    Jpeg,
    Gif,
    Pdf,
    Txt,
    Docx,
    /// Legacy Word binary: accepted and stored, but no content handler exists.
    Doc,
}

impl FileKind {
    pub const ALL: [FileKind; 8] = [
        FileKind::Png,
        FileKind::Jpg,
        FileKind::Jpeg,
        FileKind::Gif,
        FileKind::Pdf,
        FileKind::Txt,
        FileKind::Docx,
        FileKind::Doc,
    ];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(FileKind::Png),
            "jpg" => Some(FileKind::Jpg),
            "jpeg" => Some(FileKind::Jpeg),
            "gif" => Some(FileKind::Gif),
            "pdf" => Some(FileKind::Pdf),
            "txt" => Some(FileKind::Txt),
            "docx" => Some(FileKind::Docx),
            "doc" => Some(FileKind::Doc),
            _ => None,
        }
    }

    /// Detect the kind from the suffix after the last `.` of a filename.
    /// A name without a dot has no extension and is never allowed.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileKind::Png => "png",
            FileKind::Jpg => "jpg",
            FileKind::Jpeg => "jpeg",
            FileKind::Gif => "gif",
            FileKind::Pdf => "pdf",
            FileKind::Txt => "txt",
            FileKind::Docx => "docx",
            FileKind::Doc => "doc",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            FileKind::Png => "image/png",
            FileKind::Jpg | FileKind::Jpeg => "image/jpeg",
            FileKind::Gif => "image/gif",
            FileKind::Pdf => "application/pdf",
            FileKind::Txt => "text/plain",
            FileKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            FileKind::Doc => "application/msword",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, FileKind::Png | FileKind::Jpg | FileKind::Jpeg | FileKind::Gif)
    }

    /// Heading of the reply block produced for this kind, if it has a handler.
    pub fn heading(&self) -> Option<&'static str> {
        match self {
            FileKind::Png | FileKind::Jpg | FileKind::Jpeg | FileKind::Gif => Some("Image Analysis:"),
            FileKind::Pdf => Some("PDF Analysis:"),
            FileKind::Docx => Some("DOCX Analysis:"),
            FileKind::Txt => Some("TXT Analysis:"),
            FileKind::Doc => None,
        }
    }

    /// Label used in prompts and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Png | FileKind::Jpg | FileKind::Jpeg | FileKind::Gif => "image",
            FileKind::Pdf => "PDF",
            FileKind::Txt => "TXT",
            FileKind::Docx => "DOCX",
            FileKind::Doc => "DOC",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
