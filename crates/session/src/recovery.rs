//! The recovery source contract (spec §9 Open Questions: "recovery source ...
//! left abstract"). Origin could be a secondary STT session, a higher-
//! quality re-run, or a post-forced-commit extension from the same
//! provider; the session only needs a promise that may yield a candidate
//! text before the capture window closes.

use async_trait::async_trait;

/// Attempts to recover additional tail content for a forced final.
#[async_trait]
pub trait RecoverySource: Send + Sync {
    /// `epoch` is the value `Pipeline::begin_recovery` returned; implementors
    /// don't need to interpret it, only echo it back through
    /// `Pipeline::on_recovery` via the caller.
    async fn recover(&self, epoch: u32) -> Option<String>;
}

/// A recovery source that never has anything to offer. The default for a
/// session wired without a secondary transcription path.
pub struct NoRecovery;

#[async_trait]
impl RecoverySource for NoRecovery {
    async fn recover(&self, _epoch: u32) -> Option<String> {
        None
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Always resolves to the same fixed text, after an optional delay;
    /// used to exercise both "recovery arrives in time" and "recovery is
    /// discarded as stale" scenarios.
    pub struct FixedRecovery {
        pub text: Option<String>,
        pub delay: tokio::time::Duration,
    }

    #[async_trait]
    impl RecoverySource for FixedRecovery {
        async fn recover(&self, _epoch: u32) -> Option<String> {
            tokio::time::sleep(self.delay).await;
            self.text.clone()
        }
    }
}
