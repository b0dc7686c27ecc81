//! The listener-facing delivery boundary (spec §6, "outboundChannel").
//!
//! Actual transport (websocket, SSE, whatever the control plane uses) lives
//! outside this crate; a `ListenerSink` is the one method the broadcaster
//! needs from it.

use async_trait::async_trait;
use captionrelay_events::CaptionEvent;

use crate::Result;

#[async_trait]
pub trait ListenerSink: Send + Sync {
    /// Deliver one event to the listener's transport. An `Err` is treated as
    /// transient; finals are retried against it up to the broadcaster's
    /// configured budget.
    async fn deliver(&self, event: CaptionEvent) -> Result<()>;
}
