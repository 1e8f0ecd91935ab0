//! Development server with live reload for assetline.
//!
//! Serves the build output, watches sources and re-runs only the affected
//! task, then tells connected browsers to reload or refresh stylesheets.

pub mod server;
pub mod stage;
pub mod watcher;
pub mod websocket;

pub use server::{inject_script, DevServer, DevServerConfig, ServerError};
pub use stage::watch_and_serve;
pub use watcher::{BindingAction, ChangeWatcher, FileWatcher, WatchBinding, WatchEvent, WatchState};
pub use websocket::{ReloadHub, ReloadMessage, RELOAD_CLIENT_SCRIPT};
