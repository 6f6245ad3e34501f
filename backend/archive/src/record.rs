use idlewatch_core::{parse_slack_ts, FileMetadata, FileRef, MessageEvent};
use serde::{Deserialize, Serialize};

/// One message as written to a thread file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedMessage {
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ArchivedFile>,
}

/// A file attachment, resolved when possible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedFile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ArchivedMessage {
    /// The unenriched record for `event`.
    pub fn from_event(event: &MessageEvent) -> Self {
        Self {
            ts: event.ts.clone(),
            thread_ts: event.thread_parent.clone(),
            subtype: event.subtype.as_wire().map(String::from),
            user: event.user.clone(),
            bot_id: event.bot_id.clone(),
            bot_name: None,
            text: event.text.clone(),
            files: event.files.iter().map(ArchivedFile::from).collect(),
        }
    }

    /// Sort key: chronological, with unparseable ts values last in lexical order.
    pub(crate) fn sort_key(&self) -> (bool, i64, u32, &str) {
        match parse_slack_ts(&self.ts) {
            Some(at) => (false, at.timestamp(), at.timestamp_subsec_micros(), ""),
            None => (true, 0, 0, self.ts.as_str()),
        }
    }
}

impl From<&FileRef> for ArchivedFile {
    fn from(file: &FileRef) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            mimetype: None,
            permalink: None,
            size: None,
        }
    }
}

impl From<FileMetadata> for ArchivedFile {
    fn from(meta: FileMetadata) -> Self {
        Self {
            id: meta.id,
            name: meta.name,
            mimetype: meta.mimetype,
            permalink: meta.permalink,
            size: meta.size,
        }
    }
}

/// Merge `message` into a thread, replacing any record with the same ts, and
/// keep the thread in chronological order.
pub fn merge_into_thread(thread: &mut Vec<ArchivedMessage>, message: ArchivedMessage) {
    match thread.iter_mut().find(|m| m.ts == message.ts) {
        Some(existing) => *existing = message,
        None => thread.push(message),
    }
    thread.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}
