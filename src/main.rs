use chat_backend::config::AppConfig;
use chat_backend::gemini_client::GeminiClient;
use chat_backend::services::{PgChatHistoryStore, PgUserStore};
use chat_backend::{create_app, db, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run().await {
        tracing::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    std::fs::create_dir_all(&config.upload_dir)?;
    tracing::info!("Uploads directory ready at {}", config.upload_dir.display());

    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database connection pool ready");

    tracing::info!("Initializing Gemini client ({})...", config.gemini_model);
    let gateway = GeminiClient::with_base_url(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.gemini_base_url.clone(),
    );

    let bind_addr = config.bind_addr;
    let shared_state = Arc::new(AppState::new(
        config,
        Arc::new(PgUserStore::new(db_pool.clone())),
        Arc::new(PgChatHistoryStore::new(db_pool)),
        Arc::new(gateway),
    ));

    let app = create_app(shared_state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;

    Ok(())
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,chat_backend=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,chat_backend=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Logging initialized"
    );

    Ok(())
}
