//! HTTP side of the relay: static client assets plus `GET /ws`.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use recognition_core::pipeline::recognise_frame_use_case::RecogniseFrameUseCase;

use crate::session::SessionLimits;
use crate::ws;

/// Shared by every connection.
pub struct AppState {
    pub use_case: Arc<RecogniseFrameUseCase>,
    pub limits: SessionLimits,
    next_id: AtomicU64,
}

impl AppState {
    pub fn new(use_case: RecogniseFrameUseCase, limits: SessionLimits) -> Self {
        Self {
            use_case: Arc::new(use_case),
            limits,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_session_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Builds the app. Static files are served only when `public_dir` exists.
pub fn router(state: Arc<AppState>, public_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state);

    if let Some(path) = public_dir {
        if path.is_dir() {
            log::info!("Serving client from {}", path.display());
            app = app.fallback_service(ServeDir::new(path).append_index_html_on_directories(true));
        } else {
            log::warn!(
                "Public directory {} does not exist, skipping static file serving",
                path.display()
            );
        }
    }

    app
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Leave headroom above the blob limit so oversize frames reach the
    // session and get a `frame-too-large` reply instead of a dropped socket.
    let max_message = state.limits.max_frame_bytes.saturating_mul(2).max(1024);
    ws.max_message_size(max_message)
        .max_frame_size(max_message)
        .on_upgrade(move |socket| ws::handle_ws(socket, state))
}

/// Serves until the listener fails or Ctrl-C is pressed.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Listening on http://{addr}");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutting down"),
        Err(e) => {
            log::warn!("Cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
