//! Live reload channel between the watch loop and connected browsers

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use super::ServerState;
use crate::utils::path_to_slash;
use crate::watch::RebuildHandler;

/// Messages pushed to browsers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReloadMessage {
    /// Connection established
    Connected,

    /// A stylesheet changed; clients re-fetch stylesheets in place
    CssUpdate { path: String },

    /// Anything else changed
    FullReload { reason: String },
}

/// Broadcasts change notifications to every connected client
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ReloadMessage>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.tx.subscribe()
    }

    /// Tell clients that `path` changed. Returns the number of clients
    /// reached.
    pub fn notify_changed(&self, path: &Path) -> usize {
        let message = message_for(path);
        debug!("live reload: {:?}", message);
        self.tx.send(message).unwrap_or(0)
    }
}

fn message_for(path: &Path) -> ReloadMessage {
    let is_css = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("css"));

    if is_css {
        ReloadMessage::CssUpdate {
            path: path_to_slash(path),
        }
    } else {
        ReloadMessage::FullReload {
            reason: format!("File changed: {}", path_to_slash(path)),
        }
    }
}

/// Watch handler that forwards changed paths to the notifier.
/// A batch with any non-stylesheet change becomes one full reload.
pub struct NotifyHandler {
    notifier: ChangeNotifier,
}

impl NotifyHandler {
    pub fn new(notifier: ChangeNotifier) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl RebuildHandler for NotifyHandler {
    async fn rebuild(&mut self, changed: &[std::path::PathBuf]) -> anyhow::Result<()> {
        match changed.iter().find(|p| !matches!(message_for(p), ReloadMessage::CssUpdate { .. })) {
            Some(path) => {
                self.notifier.notify_changed(path);
            }
            None => {
                for path in changed {
                    self.notifier.notify_changed(path);
                }
            }
        }
        Ok(())
    }
}

/// Handle WebSocket upgrade for live reload
pub(super) async fn livereload_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = state.notifier.subscribe();

    if let Ok(json) = serde_json::to_string(&ReloadMessage::Connected) {
        let _ = sender.send(Message::Text(json)).await;
    }

    debug!("live reload client connected");

    let send_task = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(message) => {
                    let Ok(json) = serde_json::to_string(&message) else {
                        continue;
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("live reload client lagged by {} message(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    debug!("live reload client disconnected");
}

/// Client script injected into served HTML pages
pub(super) const CLIENT_SCRIPT: &str = r#"
<script>
(function () {
  var protocol = location.protocol === 'https:' ? 'wss://' : 'ws://';
  var ws = new WebSocket(protocol + location.host + '/__livereload');

  ws.onmessage = function (event) {
    var message = JSON.parse(event.data);

    switch (message.type) {
      case 'full-reload':
        console.log('[assetflow] reload:', message.reason);
        location.reload();
        break;

      case 'css-update':
        console.log('[assetflow] stylesheet updated:', message.path);
        document.querySelectorAll('link[rel="stylesheet"]').forEach(function (link) {
          var url = new URL(link.href);
          url.searchParams.set('t', Date.now());
          link.href = url.toString();
        });
        break;

      case 'connected':
        console.log('[assetflow] live reload connected');
        break;
    }
  };

  ws.onclose = function () {
    console.log('[assetflow] live reload disconnected, retrying...');
    setTimeout(function () { location.reload(); }, 1000);
  };
})();
</script>
"#;
