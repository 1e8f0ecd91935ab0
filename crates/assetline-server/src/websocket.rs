//! WebSocket-based live reload.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use assetline_pipeline::{StreamUpdate, UpdateSink};

/// Messages sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Re-fetch matching stylesheets without reloading the page
    Css {
        /// File names of the changed stylesheets
        files: Vec<String>,
    },

    /// Connection established
    Connected,
}

/// Hub for broadcasting reload messages to all connected clients.
///
/// Clients only see messages sent after they subscribed.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    /// Create a new reload hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers is fine
        let _ = self.sender.send(msg);
    }

    /// Tell clients that `paths` changed.
    pub fn notify(&self, paths: &[PathBuf]) {
        let msg = message_for(paths);
        tracing::debug!("Broadcasting {:?} to {} clients", msg, self.subscriber_count());
        self.send(msg);
    }

    /// Subscribe to reload messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateSink for ReloadHub {
    fn stream_update(&self, update: &StreamUpdate) {
        self.notify(&update.paths);
    }
}

fn is_stylesheet(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("css") | Some("map")
    )
}

/// Stylesheet-only changes can be injected; anything else reloads.
fn message_for(paths: &[PathBuf]) -> ReloadMessage {
    if paths.is_empty() || !paths.iter().all(|p| is_stylesheet(p)) {
        return ReloadMessage::Reload;
    }

    let files = paths
        .iter()
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("css"))
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .map(str::to_string)
        .collect();

    ReloadMessage::Css { files }
}

/// Client-side reload script, served at `/__reload.js`.
pub const RELOAD_CLIENT_SCRIPT: &str = r#"
(function() {
  'use strict';

  var ws = new WebSocket('ws://' + location.host + '/__reload');
  var reconnectAttempts = 0;
  var maxReconnectAttempts = 10;

  function refreshStylesheets(files) {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    var matched = 0;
    links.forEach(function(link) {
      var url = new URL(link.href);
      var name = url.pathname.split('/').pop();
      if (files.indexOf(name) !== -1) {
        url.searchParams.set('v', Date.now());
        link.href = url.toString();
        matched++;
      }
    });
    if (matched === 0) {
      location.reload();
    }
  }

  ws.onopen = function() {
    console.log('[reload] Connected');
    reconnectAttempts = 0;
  };

  ws.onmessage = function(event) {
    var msg = JSON.parse(event.data);

    switch (msg.type) {
      case 'reload':
        location.reload();
        break;

      case 'css':
        refreshStylesheets(msg.files);
        break;

      case 'connected':
        console.log('[reload] Server acknowledged connection');
        break;
    }
  };

  ws.onclose = function() {
    console.log('[reload] Disconnected');
    if (reconnectAttempts < maxReconnectAttempts) {
      reconnectAttempts++;
      setTimeout(function() {
        location.reload();
      }, 1000 * reconnectAttempts);
    }
  };
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use assetline_pipeline::Category;

    #[test]
    fn hub_broadcasts_messages() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();

        hub.send(ReloadMessage::Reload);

        match rx.try_recv() {
            Ok(ReloadMessage::Reload) => {}
            _ => panic!("Expected Reload message"),
        }
    }

    #[test]
    fn late_subscribers_miss_earlier_messages() {
        let hub = ReloadHub::new();
        let _early = hub.subscribe();

        hub.send(ReloadMessage::Reload);
        let mut late = hub.subscribe();

        assert!(late.try_recv().is_err());
    }

    #[test]
    fn stylesheet_updates_are_injected() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();

        hub.stream_update(&StreamUpdate {
            task: "styles".to_string(),
            category: Category::Styles,
            paths: vec![PathBuf::from("dist/css/main.css")],
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            ReloadMessage::Css {
                files: vec!["main.css".to_string()]
            }
        );
    }

    #[test]
    fn mixed_updates_reload() {
        let paths = vec![
            PathBuf::from("dist/css/main.css"),
            PathBuf::from("dist/index.html"),
        ];

        assert_eq!(message_for(&paths), ReloadMessage::Reload);
    }

    #[test]
    fn serializes_messages() {
        let msg = ReloadMessage::Css {
            files: vec!["main.css".to_string()],
        };

        let json = serde_json::to_string(&msg).unwrap();

        assert_eq!(json, r#"{"type":"css","files":["main.css"]}"#);
        assert_eq!(
            serde_json::to_string(&ReloadMessage::Connected).unwrap(),
            r#"{"type":"connected"}"#
        );
    }
}
