use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::event::MessageEvent;
use crate::message::Message;
use crate::types::SelfIdentity;

/// Default channel buffer size for inter-component messaging.
const DEFAULT_BUFFER_SIZE: usize = 256;

/// The message bus connecting the live feed, the watchdog, and the archiver.
///
/// Feed adapters push raw events into `feed_tx`; [`route_feed`] fans them out
/// to the watchdog inbox and, when archival is enabled, to the archiver.
pub struct WatchBus {
    pub feed_tx: mpsc::Sender<MessageEvent>,
    pub feed_rx: Option<mpsc::Receiver<MessageEvent>>,

    pub watchdog_tx: mpsc::Sender<Message>,
    pub watchdog_rx: Option<mpsc::Receiver<Message>>,

    pub archive_tx: mpsc::Sender<Message>,
    pub archive_rx: Option<mpsc::Receiver<Message>>,
}

impl WatchBus {
    /// Create a new bus with default buffer sizes.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new bus with a custom buffer size.
    pub fn with_buffer_size(buffer: usize) -> Self {
        let (feed_tx, feed_rx) = mpsc::channel(buffer);
        let (watchdog_tx, watchdog_rx) = mpsc::channel(buffer);
        let (archive_tx, archive_rx) = mpsc::channel(buffer);

        info!(buffer_size = buffer, "WatchBus initialized");

        Self {
            feed_tx,
            feed_rx: Some(feed_rx),
            watchdog_tx,
            watchdog_rx: Some(watchdog_rx),
            archive_tx,
            archive_rx: Some(archive_rx),
        }
    }

    /// Take the feed receiver (can only be called once).
    pub fn take_feed_rx(&mut self) -> Option<mpsc::Receiver<MessageEvent>> {
        debug!("Feed receiver taken");
        self.feed_rx.take()
    }

    /// Take the watchdog receiver (can only be called once).
    pub fn take_watchdog_rx(&mut self) -> Option<mpsc::Receiver<Message>> {
        debug!("Watchdog receiver taken");
        self.watchdog_rx.take()
    }

    /// Take the archive receiver (can only be called once).
    pub fn take_archive_rx(&mut self) -> Option<mpsc::Receiver<Message>> {
        debug!("Archive receiver taken");
        self.archive_rx.take()
    }
}

impl Default for WatchBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward every feed event to the watchdog, and to the archiver if given.
///
/// Messages authored by `own` are dropped. The watchdog is always served
/// first; the archiver only gets what fits in its buffer, so a slow archive
/// never delays the watchdog. Returns when the feed closes or the watchdog
/// inbox is gone. A closed archive channel only disables archival.
pub async fn route_feed(
    mut feed_rx: mpsc::Receiver<MessageEvent>,
    watchdog_tx: mpsc::Sender<Message>,
    mut archive_tx: Option<mpsc::Sender<Message>>,
    own: SelfIdentity,
) {
    while let Some(event) = feed_rx.recv().await {
        if own.authored(&event) {
            debug!(channel_id = %event.channel_id, ts = %event.ts, "Ignoring own message");
            continue;
        }
        let archived = archive_tx.as_ref().map(|_| event.clone());
        if watchdog_tx.send(Message::Live(event)).await.is_err() {
            warn!("Watchdog inbox closed, stopping feed router");
            return;
        }
        if let Some(event) = archived {
            let outcome = match &archive_tx {
                Some(tx) => tx.try_send(Message::Live(event)),
                None => Ok(()),
            };
            match outcome {
                Ok(()) => {}
                Err(TrySendError::Full(Message::Live(event))) => {
                    warn!(
                        channel_id = %event.channel_id,
                        ts = %event.ts,
                        "Archive backlog full, message not archived"
                    );
                }
                Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Closed(_)) => {
                    warn!("Archive channel closed, archival disabled");
                    archive_tx = None;
                }
            }
        }
    }
    info!("Live feed closed, feed router exiting");
}
