use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use idlewatch_core::{ArchivalSink, Component, Message};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Component that feeds live messages into an [`ArchivalSink`].
///
/// Failures are logged and dropped; nothing flows back to the watchdog.
pub struct Archiver {
    sink: Arc<dyn ArchivalSink>,
}

impl Archiver {
    pub fn new(sink: Arc<dyn ArchivalSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Component for Archiver {
    fn name(&self) -> &str {
        "archiver"
    }

    async fn start(&self, mut rx: mpsc::Receiver<Message>) -> Result<()> {
        info!("Archiver started");
        while let Some(msg) = rx.recv().await {
            let Message::Live(event) = msg else {
                continue;
            };
            if let Err(e) = self.sink.archive(&event).await {
                warn!(channel_id = %event.channel_id, ts = %event.ts, error = %e, "Failed to archive message");
            }
        }
        info!("Archiver stopped");
        Ok(())
    }
}
