//! File-backed thread archive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use idlewatch_core::{ArchivalSink, ChannelDirectory, MessageEvent, MetadataSource, WatchError};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::record::{merge_into_thread, ArchivedFile, ArchivedMessage};

/// Writes each message into its thread's JSON file.
pub struct ThreadArchive {
    root: PathBuf,
    directory: Arc<dyn ChannelDirectory>,
    metadata: Option<Arc<dyn MetadataSource>>,
    /// Channel id → name. Guards file writes too, so read-merge-write is serial.
    names: Mutex<HashMap<String, String>>,
}

impl ThreadArchive {
    pub fn new(root: impl Into<PathBuf>, directory: Arc<dyn ChannelDirectory>) -> Self {
        Self {
            root: root.into(),
            directory,
            metadata: None,
            names: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve file and bot references before writing.
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataSource>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Channel name for `channel_id`, refreshing the cache on a miss and
    /// falling back to the id itself.
    ///
    /// An id still unknown after a successful refresh (a private channel or
    /// DM) is cached as its own name, so it costs one directory listing only.
    async fn channel_name(&self, names: &mut HashMap<String, String>, channel_id: &str) -> String {
        if let Some(name) = names.get(channel_id) {
            return name.clone();
        }
        match self.directory.list_public_channels().await {
            Ok(channels) => {
                names.extend(channels.into_iter().map(|c| (c.id, c.name)));
                names
                    .entry(channel_id.to_string())
                    .or_insert_with(|| channel_id.to_string())
                    .clone()
            }
            Err(e) => {
                warn!(channel_id, error = %e, "Could not refresh channel names");
                channel_id.to_string()
            }
        }
    }

    async fn enrich(&self, event: &MessageEvent) -> ArchivedMessage {
        let mut record = ArchivedMessage::from_event(event);
        let Some(metadata) = &self.metadata else {
            return record;
        };

        let mut files = Vec::with_capacity(event.files.len());
        for file in &event.files {
            match metadata.file_info(&file.id).await {
                Ok(meta) => files.push(ArchivedFile::from(meta)),
                Err(e) => {
                    warn!(file_id = %file.id, error = %e, "Archiving file reference unresolved");
                    files.push(ArchivedFile::from(file));
                }
            }
        }
        record.files = files;

        if let Some(bot_id) = &event.bot_id {
            match metadata.bot_info(bot_id).await {
                Ok(bot) => record.bot_name = bot.name,
                Err(e) => warn!(bot_id = %bot_id, error = %e, "Archiving bot message unresolved"),
            }
        }
        record
    }

    async fn write_thread(&self, path: &Path, message: ArchivedMessage) -> Result<()> {
        let mut thread = load_thread(path).await?;
        merge_into_thread(&mut thread, message);
        save_thread(path, &thread).await
    }
}

/// Path of the thread file for `thread_root` under the channel's directory.
pub fn thread_path(root: &Path, channel_name: &str, thread_root: &str) -> PathBuf {
    root.join(sanitize_component(channel_name))
        .join(format!("{}.json", sanitize_component(thread_root)))
}

/// Keep a name usable as a single path component.
fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}

async fn load_thread(path: &Path) -> Result<Vec<ArchivedMessage>> {
    match fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt thread archive: {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Write the thread atomically (write to temp file, rename).
async fn save_thread(path: &Path, thread: &[ArchivedMessage]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(thread)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to rename {} into place", tmp.display()))?;
    Ok(())
}

#[async_trait]
impl ArchivalSink for ThreadArchive {
    async fn archive(&self, event: &MessageEvent) -> Result<(), WatchError> {
        let record = self.enrich(event).await;

        let mut names = self.names.lock().await;
        let channel_name = self.channel_name(&mut names, &event.channel_id).await;
        let path = thread_path(&self.root, &channel_name, event.thread_root());

        self.write_thread(&path, record)
            .await
            .map_err(|e| WatchError::Archive(format!("{e:#}")))?;
        debug!(path = %path.display(), ts = %event.ts, "Archived message");
        Ok(())
    }
}
