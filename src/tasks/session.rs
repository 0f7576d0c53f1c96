//! Background loops started by long-running tasks

use std::net::SocketAddr;

use anyhow::{Context, Result};
use colored::Colorize;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::watch::WatchHandle;

/// Owns every watch loop and server started during a run
#[derive(Default)]
pub struct Session {
    watchers: Mutex<Vec<WatchHandle>>,
    servers: Mutex<Vec<(SocketAddr, JoinHandle<()>)>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_watch(&self, handle: WatchHandle) {
        self.watchers.lock().push(handle);
    }

    pub fn add_server(&self, addr: SocketAddr, handle: JoinHandle<()>) {
        self.servers.lock().push((addr, handle));
    }

    /// Tasks of the running watch loops
    pub fn watched_tasks(&self) -> Vec<String> {
        self.watchers.lock().iter().map(|w| w.task().to_string()).collect()
    }

    pub fn server_addrs(&self) -> Vec<SocketAddr> {
        self.servers.lock().iter().map(|(addr, _)| *addr).collect()
    }

    /// Whether anything keeps running after the task bodies returned
    pub fn is_long_running(&self) -> bool {
        !self.watchers.lock().is_empty() || !self.servers.lock().is_empty()
    }

    /// Stop every watch loop and server
    pub fn stop(&self) {
        for mut watcher in self.watchers.lock().drain(..) {
            watcher.stop();
        }
        for (addr, server) in self.servers.lock().drain(..) {
            server.abort();
            info!("Stopped server on {}", addr);
        }
    }

    /// Block until Ctrl+C, then stop everything
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        eprintln!("  {} Press {} to stop\n", "•".dimmed(), "Ctrl+C".yellow());

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;

        eprintln!();
        self.stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::watch::{RebuildHandler, WatchBinding, WatchController};

    struct Noop;

    #[async_trait]
    impl RebuildHandler for Noop {
        async fn rebuild(&mut self, _changed: &[PathBuf]) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stop_clears_everything() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new();
        assert!(!session.is_long_running());

        let handle = WatchController::new(dir.path(), Duration::from_millis(20))
            .watch(WatchBinding::new("styles:watch", ["*.scss"]), Noop)
            .unwrap();
        session.add_watch(handle);
        session.add_server("127.0.0.1:0".parse().unwrap(), tokio::spawn(std::future::pending()));

        assert!(session.is_long_running());
        assert_eq!(session.watched_tasks(), vec!["styles:watch".to_string()]);

        session.stop();
        assert!(!session.is_long_running());
    }
}
