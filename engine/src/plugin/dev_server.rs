use super::Plugin;
use crate::config::BuildConfig;
use async_trait::async_trait;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;
use tessera_shared::{TesseraError, TesseraResult, canonicalize_with_strip};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// Serves the static directory on the public path's port while watching, so
/// resources rewritten to the public path resolve during development.
#[derive(Debug, Default)]
pub struct DevServerPlugin;

impl DevServerPlugin {
    pub fn new() -> Self {
        Self
    }

    pub fn router(static_dir: PathBuf) -> Router {
        Router::new()
            .route("/{*file}", get(serve_static_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(static_dir))
    }
}

#[async_trait]
impl Plugin for DevServerPlugin {
    fn name(&self) -> &str {
        "dev-server"
    }

    async fn apply_async(&self, config: &BuildConfig) -> TesseraResult {
        if !config.is_watching() {
            return Ok(());
        }

        let port = public_port(config.public_path())
            .or(config.port())
            .ok_or_else(|| TesseraError::Config("dev server has no port to listen on".into()))?;
        fs_err::tokio::create_dir_all(config.static_dir()).await?;

        let tcp = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(target: "tessera::dev-server", "serving {} on {}", config.static_dir().display(), config.public_path());

        let app = Self::router(config.static_dir().to_path_buf());
        axum::serve(tcp, app).await.map_err(Into::into)
    }
}

fn public_port(public_path: &str) -> Option<u16> {
    let rest = public_path.split_once("://").map(|(_, rest)| rest)?;
    let authority = rest.split('/').next()?;
    authority.rsplit_once(':')?.1.parse().ok()
}

async fn serve_static_handler(
    State(root): State<Arc<PathBuf>>,
    Path(file): Path<String>,
) -> Response {
    match serve_static(&root, &file).await {
        Ok(response) => response,
        Err(err) => err.response().into_response(),
    }
}

async fn serve_static(root: &std::path::Path, file: &str) -> TesseraResult<Response> {
    let not_found = || TesseraError::FileNotFound(file.to_string());
    let root = canonicalize_with_strip(root).map_err(|_| not_found())?;
    let full_path = canonicalize_with_strip(root.join(file)).map_err(|_| not_found())?;
    if !full_path.starts_with(&root) || !full_path.is_file() {
        return Err(not_found());
    }
    debug!(target: "tessera::dev-server", "serving {}", full_path.display());

    let content = fs_err::tokio::read(&full_path).await?;
    let extension = full_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    Ok(([(header::CONTENT_TYPE, content_type(&extension))], content).into_response())
}

fn content_type(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "json" => "application/json",
        "js" => "application/javascript",
        "css" | "wxss" => "text/css",
        _ => "application/octet-stream",
    }
}
