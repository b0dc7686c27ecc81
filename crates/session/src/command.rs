//! Inbound operations a session accepts from the excluded surrounding glue
//! (spec §6, "Inbound to the core").

use std::sync::Arc;

use captionrelay_broadcast::ListenerSink;
use captionrelay_events::LanguageTag;

pub type ListenerId = String;

/// One command posted to a session's serial loop. The loop is the sole
/// consumer; nothing here is handled concurrently with pipeline mutation.
pub enum SessionCommand {
    /// `audio(sessionId, bytes)`: one chunk of PCM audio for the STT pool.
    Audio(Arc<[u8]>),
    /// `listener_join(sessionId, targetLang, listenerHandle)`.
    ListenerJoin {
        listener_id: ListenerId,
        target_lang: LanguageTag,
        sink: Arc<dyn ListenerSink>,
    },
    /// `listener_leave(sessionId, listenerHandle)`.
    ListenerLeave { listener_id: ListenerId },
    /// `pause(sessionId)`: force-commit the STT pool's current turn.
    Pause,
    /// `end(sessionId)`: begin shutdown.
    End,
}
