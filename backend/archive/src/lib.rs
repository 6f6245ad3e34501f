//! Optional archival of live messages.
//!
//! Every message is stored in `<root>/<channel-name>/<thread-root-ts>.json`.
//! The archiver only observes the live feed; the watchdog never reads from it.

pub mod archiver;
pub mod record;
pub mod store;

pub use archiver::Archiver;
pub use record::{ArchivedFile, ArchivedMessage};
pub use store::ThreadArchive;
