// Local text extraction for DOCX and TXT uploads.
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::io::{Cursor, Read};
use thiserror::Error;
use zip::ZipArchive;

/// Longest document excerpt forwarded to the gateway, in characters.
pub const MAX_DOCUMENT_CHARS: usize = 8000;
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated...]";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("not a valid DOCX archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to read document body: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document XML: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Text encodings tried in order when decoding a TXT upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf8Sig,
    Latin1,
    Windows1252,
    Iso8859_1,
}

impl TextEncoding {
    pub const FALLBACK_ORDER: [TextEncoding; 5] = [
        TextEncoding::Utf8,
        TextEncoding::Utf8Sig,
        TextEncoding::Latin1,
        TextEncoding::Windows1252,
        TextEncoding::Iso8859_1,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf8Sig => "utf-8-sig",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Windows1252 => "windows-1252",
            TextEncoding::Iso8859_1 => "iso-8859-1",
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            TextEncoding::Utf8Sig => {
                let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(body).ok().map(str::to_owned)
            }
            // Every byte maps to the code point of the same value.
            TextEncoding::Latin1 | TextEncoding::Iso8859_1 => {
                Some(bytes.iter().map(|&b| b as char).collect())
            }
            TextEncoding::Windows1252 => bytes.iter().map(|&b| windows_1252_char(b)).collect(),
        }
    }
}

/// Decode with the first encoding in [`TextEncoding::FALLBACK_ORDER`] that accepts the bytes.
pub fn decode_text(bytes: &[u8]) -> Option<(String, TextEncoding)> {
    TextEncoding::FALLBACK_ORDER
        .iter()
        .find_map(|enc| enc.decode(bytes).map(|text| (text, *enc)))
}

// 0x80..=0x9F differ from latin-1; five of them are unassigned.
const WINDOWS_1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

fn windows_1252_char(b: u8) -> Option<char> {
    match b {
        0x80..=0x9F => WINDOWS_1252_HIGH[(b - 0x80) as usize],
        _ => Some(b as char),
    }
}

/// Extract the plain text of a DOCX file: body paragraphs first, then the
/// text of every table cell in row-major order, all joined with newlines.
pub fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive.by_name("word/document.xml")?.read_to_string(&mut xml)?;
    parse_document_xml(&xml)
}

fn parse_document_xml(xml: &str) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut paragraphs: Vec<String> = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut cell_paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut table_depth = 0usize;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"tbl" => table_depth += 1,
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                // A self-closing paragraph is still a (blank) paragraph.
                b"p" => finish_paragraph(&mut current, table_depth, &mut paragraphs, &mut cell_paragraphs),
                _ => {}
            },
            Event::Text(e) if in_text => current.push_str(&String::from_utf8_lossy(&e)),
            Event::GeneralRef(e) if in_text => {
                if let Some(ch) = resolve_entity(&String::from_utf8_lossy(&e)) {
                    current.push(ch);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => finish_paragraph(&mut current, table_depth, &mut paragraphs, &mut cell_paragraphs),
                b"tc" if table_depth > 0 => cells.push(cell_paragraphs.drain(..).collect::<Vec<_>>().join("\n")),
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    paragraphs.extend(cells);
    Ok(paragraphs.join("\n"))
}

fn finish_paragraph(
    current: &mut String,
    table_depth: usize,
    paragraphs: &mut Vec<String>,
    cell_paragraphs: &mut Vec<String>,
) {
    let text = std::mem::take(current);
    if table_depth > 0 {
        cell_paragraphs.push(text);
    } else {
        paragraphs.push(text);
    }
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Cap `text` at [`MAX_DOCUMENT_CHARS`] characters, appending
/// [`TRUNCATION_MARKER`] when anything was cut.
pub fn truncate_content(text: &str) -> String {
    match text.char_indices().nth(MAX_DOCUMENT_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Prompt sent for DOCX and TXT uploads.
pub fn document_prompt(kind_label: &str, filename: &str, content: &str, question: &str) -> String {
    format!(
        "The following is the content of a {} document named \"{}\":\n\n{}\n\nUser question: {}\n\nPlease answer based on the document content.",
        kind_label, filename, content, question
    )
}
