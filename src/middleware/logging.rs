use axum::{
    extract::{ConnectInfo, MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Logs every request under a `request` span with a fresh id, then its
/// outcome at a level matching the status class. Bodies and headers other
/// than the user agent are never logged.
pub async fn request_logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4();

    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_owned();

    let span = tracing::info_span!("request", %request_id, %method, %path);

    async move {
        tracing::info!(%remote_addr, %user_agent, "incoming request");

        let response = next.run(req).await;
        let status = response.status().as_u16();
        let duration_ms = start.elapsed().as_millis() as u64;

        match status {
            500..=599 => tracing::error!(status, duration_ms, "request failed"),
            400..=499 => tracing::warn!(status, duration_ms, "request rejected"),
            _ => tracing::info!(status, duration_ms, "request completed"),
        }

        response
    }
    .instrument(span)
    .await
}
