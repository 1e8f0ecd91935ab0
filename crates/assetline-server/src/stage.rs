//! The dev composition's terminal stage: serve the output and rebuild on change.

use std::path::PathBuf;

use assetline_pipeline::TaskSet;

use crate::server::{DevServer, DevServerConfig, ServerError};
use crate::watcher::{ChangeWatcher, FileWatcher};
use crate::websocket::ReloadHub;

/// Serve `config.root` and re-run tasks as their sources change.
///
/// Returns when the server fails, or with `Ok` on Ctrl-C.
pub async fn watch_and_serve(
    root: PathBuf,
    tasks: TaskSet,
    hub: ReloadHub,
    config: DevServerConfig,
) -> Result<(), ServerError> {
    let server = DevServer::new(config, hub.clone());
    let listener = server.bind().await?;

    let watcher = ChangeWatcher::for_tasks(&root, &tasks, hub)?;
    let (fs_watcher, events) =
        FileWatcher::new(&watcher.watch_roots()).map_err(|e| ServerError::WatchError(e.to_string()))?;

    let mut serving = tokio::spawn(server.serve(listener));

    let result = tokio::select! {
        joined = &mut serving => match joined {
            Ok(result) => result,
            Err(e) => Err(ServerError::WatchError(format!("server task stopped: {}", e))),
        },
        _ = watcher.run(events) => Ok(()),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    };

    serving.abort();
    drop(fs_watcher);
    result
}
