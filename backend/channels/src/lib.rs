use async_trait::async_trait;

pub mod slack;
pub mod slack_events;
pub mod slack_socket;
pub mod slack_types;

pub use slack::{SlackApiError, SlackClient, SlackConfig};
pub use slack_events::{SlackEventsConfig, SlackEventsFeed};
pub use slack_socket::SlackSocketFeed;

/// Live event feeds implement this trait.
///
/// A feed pushes every message it observes into the `MessageEvent` sender it
/// was built with.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    /// Human-readable feed name for logging.
    fn name(&self) -> &str;

    /// Build an optional Axum sub-router for inbound webhook endpoints.
    /// Feeds that hold a long-lived connection return an empty router.
    fn build_router(&self) -> axum::Router {
        axum::Router::new()
    }

    /// Run the feed's background work (WS connection, etc.).
    async fn start(&self) -> anyhow::Result<()>;
}
