//! Development server implementation.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    body::{self, Body},
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::websocket::{ReloadHub, ReloadMessage, RELOAD_CLIENT_SCRIPT};

const RELOAD_SCRIPT_TAG: &str = r#"<script src="/__reload.js"></script>"#;

/// Configuration for the development server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevServerConfig {
    /// Directory served as the site root
    pub root: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("dist"),
            port: 3000,
            host: "127.0.0.1".to_string(),
            open: true,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(String, String),

    #[error("Server error on {0}: {1}")]
    ServeError(SocketAddr, String),

    #[error("File watch error: {0}")]
    WatchError(String),
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    hub: ReloadHub,
}

impl DevServer {
    /// Create a new development server broadcasting from `hub`.
    pub fn new(config: DevServerConfig, hub: ReloadHub) -> Self {
        Self { config, hub }
    }

    pub fn config(&self) -> &DevServerConfig {
        &self.config
    }

    /// Routes for the reload endpoints plus static files from the root.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/__reload", get(ws_handler))
            .route("/__reload.js", get(reload_script_handler))
            .fallback_service(ServeDir::new(&self.config.root))
            .layer(middleware::map_response(inject_reload_script))
            .with_state(self.hub.clone())
    }

    /// Bind the listening socket.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))
    }

    /// Serve on an already bound listener until the server stops.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(self.config.host.clone(), e.to_string()))?;
        let url = format!("http://{}", addr);

        tracing::info!("Serving {} at {}", self.config.root.display(), url);

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Could not open browser: {}", e);
            }
        }

        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::ServeError(addr, e.to_string()))
    }
}

/// Insert the reload script tag into an HTML document.
///
/// Goes before the last `</body>`, or at the end when there is none.
pub fn inject_script(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(idx) => {
            let mut out = String::with_capacity(html.len() + RELOAD_SCRIPT_TAG.len());
            out.push_str(&html[..idx]);
            out.push_str(RELOAD_SCRIPT_TAG);
            out.push_str(&html[idx..]);
            out
        }
        None => format!("{}{}", html, RELOAD_SCRIPT_TAG),
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

async fn inject_reload_script(response: Response) -> Response {
    if !response.status().is_success() || !is_html(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read response body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let body = match std::str::from_utf8(&bytes) {
        Ok(html) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Body::from(inject_script(html))
        }
        Err(_) => {
            tracing::debug!("Not injecting into non UTF-8 page");
            Body::from(bytes)
        }
    };
    Response::from_parts(parts, body)
}

/// Handler for the reload WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<ReloadHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

/// Forward hub messages to one client until either side goes away.
async fn handle_ws(mut socket: WebSocket, hub: ReloadHub) {
    let mut rx = hub.subscribe();

    if send_json(&mut socket, &ReloadMessage::Connected).await.is_err() {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(msg) => {
                if send_json(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!("Client lagged by {} messages", n);
                if send_json(&mut socket, &ReloadMessage::Reload).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_json(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

/// Handler for the reload client script.
async fn reload_script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        RELOAD_CLIENT_SCRIPT,
    )
}
