//! Background and periodic sync hooks.
//!
//! Both are placeholders: the host fires them, the agent records that it
//! happened. Queued-action replay and freshness checks hang off these later.

use tracing::{debug, info};

/// Fired by the host when connectivity resumes.
pub const SYNC_TUTORIAL_PROGRESS: &str = "sync-tutorial-progress";

/// Fired by the host on its own schedule.
pub const CHECK_UPDATES: &str = "check-updates";

/// A sync tag the agent knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTag {
    TutorialProgress,
    CheckUpdates,
    Other(String),
}

impl From<&str> for SyncTag {
    fn from(tag: &str) -> Self {
        match tag {
            SYNC_TUTORIAL_PROGRESS => SyncTag::TutorialProgress,
            CHECK_UPDATES => SyncTag::CheckUpdates,
            other => SyncTag::Other(other.to_string()),
        }
    }
}

/// Handle a one-off background sync. Returns whether the tag was recognised.
pub async fn background_sync(tag: &str) -> bool {
    match SyncTag::from(tag) {
        SyncTag::TutorialProgress => {
            info!(tag, "Background sync: tutorial progress");
            true
        }
        _ => {
            debug!(tag, "Ignoring unknown background sync tag");
            false
        }
    }
}

/// Handle a periodic sync. Returns whether the tag was recognised.
pub async fn periodic_sync(tag: &str) -> bool {
    match SyncTag::from(tag) {
        SyncTag::CheckUpdates => {
            info!(tag, "Periodic sync: checking for updates");
            true
        }
        _ => {
            debug!(tag, "Ignoring unknown periodic sync tag");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_parsing() {
        assert_eq!(SyncTag::from("sync-tutorial-progress"), SyncTag::TutorialProgress);
        assert_eq!(SyncTag::from("check-updates"), SyncTag::CheckUpdates);
        assert_eq!(SyncTag::from("other"), SyncTag::Other("other".to_string()));
    }

    #[tokio::test]
    async fn test_handlers_only_claim_their_tag() {
        assert!(background_sync(SYNC_TUTORIAL_PROGRESS).await);
        assert!(!background_sync(CHECK_UPDATES).await);
        assert!(periodic_sync(CHECK_UPDATES).await);
        assert!(!periodic_sync(SYNC_TUTORIAL_PROGRESS).await);
    }
}
