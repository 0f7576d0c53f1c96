//! Development server with live reload
//!
//! Provides:
//! - Static file serving from the configured base directory
//! - A live reload client injected into HTML pages
//! - A WebSocket endpoint that pushes change notifications

mod livereload;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use colored::Colorize;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{error, info};

use crate::config::Config;
use crate::utils::is_contained;

pub use livereload::{ChangeNotifier, NotifyHandler, ReloadMessage};

/// Shared server state
struct ServerState {
    base_dir: PathBuf,
    notifier: ChangeNotifier,
}

/// Development server
pub struct DevServer {
    config: Arc<Config>,
    notifier: ChangeNotifier,
}

impl DevServer {
    pub fn new(config: Arc<Config>, notifier: ChangeNotifier) -> Self {
        Self { config, notifier }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let state = Arc::new(ServerState {
            base_dir: self.config.resolve(&self.config.server.base_dir),
            notifier: self.notifier.clone(),
        });

        Router::new()
            .route("/", get(serve_index))
            .route("/__livereload", get(livereload::livereload_socket))
            .fallback(serve_file)
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the listener and serve in the background
    pub async fn spawn(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        let local = listener.local_addr()?;
        let app = self.router();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Dev server stopped: {}", e);
            }
        });

        info!("Server listening on http://{}", local);
        eprintln!(
            "{} Serving at {}",
            "→".blue(),
            format!("http://{}", addr).cyan().underline()
        );

        Ok((local, handle))
    }
}

async fn serve_index(State(state): State<Arc<ServerState>>) -> Response {
    serve_html(&state, "index.html").await
}

/// HTML pages get the live reload client; everything else comes from
/// `ServeDir`
async fn serve_file(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    let path = request.uri().path().trim_start_matches('/').to_string();

    if path.ends_with(".html") || path.ends_with(".htm") {
        return serve_html(&state, &path).await;
    }

    match ServeDir::new(&state.base_dir).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(e) => {
            error!("Failed to serve {}: {}", path, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
        }
    }
}

async fn serve_html(state: &ServerState, path: &str) -> Response {
    let relative = PathBuf::from(path);
    if !is_contained(&relative) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let full = state.base_dir.join(&relative);
    match tokio::fs::read_to_string(&full).await {
        Ok(content) => Html(inject_client(&content)).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, format!("File not found: {}", path)).into_response()
        }
        Err(e) => {
            error!("Failed to read {}: {}", full.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
        }
    }
}

/// Insert the client script before `</body>`, or append it
fn inject_client(html: &str) -> String {
    if let Some(pos) = html.rfind("</body>") {
        let mut result = html.to_string();
        result.insert_str(pos, livereload::CLIENT_SCRIPT);
        result
    } else {
        format!("{}{}", html, livereload::CLIENT_SCRIPT)
    }
}
