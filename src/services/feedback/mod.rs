use crate::error::StoreError;
use crate::models::{SwipeEvent, UserId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::info;

/// Durable per-user log of swipe events. A user's sequence only grows or is
/// atomically cleared; it is never rewritten in place.
///
/// Concurrency contract: operations for different users must not block each
/// other, while operations for the same user are serialized. Alternative
/// backends (e.g. a key-value store) plug in behind this trait.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Append one event to the end of the user's sequence. Fails only on
    /// underlying I/O, never on business-logic grounds.
    async fn append(&self, user_id: UserId, event: SwipeEvent) -> Result<(), StoreError>;

    /// The user's events in insertion order; empty if the user never swiped.
    async fn list_for(&self, user_id: UserId) -> Result<Vec<SwipeEvent>, StoreError>;

    /// Replace the user's sequence with an empty one. Idempotent.
    async fn reset(&self, user_id: UserId) -> Result<(), StoreError>;
}

/// File-backed store: one human-readable JSON document mapping user id (as a
/// string key) to the ordered event array. The in-memory map is the
/// authoritative copy; every mutation flushes the whole document through a
/// temp-file rename, so a failed write never leaves a partial document.
pub struct FileFeedbackStore {
    path: PathBuf,
    // DashMap entry access gives per-key mutual exclusion, which is exactly
    // the per-user serialization the contract asks for.
    sequences: DashMap<String, Vec<SwipeEvent>>,
    flush_lock: Mutex<()>,
}

impl FileFeedbackStore {
    /// Open the store, loading any existing document at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let document: BTreeMap<String, Vec<SwipeEvent>> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        let sequences = DashMap::new();
        let mut loaded = 0;
        for (user, events) in document {
            loaded += events.len();
            sequences.insert(user, events);
        }
        info!(
            "Opened feedback store at {} with {} stored events",
            path.display(),
            loaded
        );

        Ok(Self {
            path,
            sequences,
            flush_lock: Mutex::new(()),
        })
    }

    fn key(user_id: UserId) -> String {
        user_id.to_string()
    }

    /// Persist a snapshot of the whole document. The lock orders writers so
    /// a newer snapshot is never overwritten by an older one; the rename
    /// makes each write all-or-nothing.
    async fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.flush_lock.lock().await;
        let snapshot: BTreeMap<String, Vec<SwipeEvent>> = self
            .sequences
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl FeedbackStore for FileFeedbackStore {
    async fn append(&self, user_id: UserId, event: SwipeEvent) -> Result<(), StoreError> {
        self.sequences
            .entry(Self::key(user_id))
            .or_default()
            .push(event.clone());

        // A failed flush must not leave the event in memory, or a later
        // successful flush would persist an append that reported failure.
        if let Err(e) = self.flush().await {
            if let Some(mut entry) = self.sequences.get_mut(&Self::key(user_id)) {
                if let Some(pos) = entry.value().iter().rposition(|stored| *stored == event) {
                    entry.value_mut().remove(pos);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn list_for(&self, user_id: UserId) -> Result<Vec<SwipeEvent>, StoreError> {
        Ok(self
            .sequences
            .get(&Self::key(user_id))
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn reset(&self, user_id: UserId) -> Result<(), StoreError> {
        self.sequences.insert(Self::key(user_id), Vec::new());
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SwipeAction;
    use tempfile::tempdir;

    fn like(title: &str) -> SwipeEvent {
        SwipeEvent::new(title, SwipeAction::Like)
    }

    #[tokio::test]
    async fn test_append_preserves_insertion_order() {
        let dir = tempdir().unwrap();
        let store = FileFeedbackStore::open(dir.path().join("swipes.json"))
            .await
            .unwrap();

        store.append(1, like("Heat (1995)")).await.unwrap();
        store
            .append(1, SwipeEvent::new("Casino (1995)", SwipeAction::Dislike))
            .await
            .unwrap();
        store.append(1, like("Ronin (1998)")).await.unwrap();

        let events = store.list_for(1).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].movie_title, "Heat (1995)");
        assert_eq!(events[1].action, SwipeAction::Dislike);
        assert_eq!(events[2].movie_title, "Ronin (1998)");
    }

    #[tokio::test]
    async fn test_unknown_user_has_empty_history() {
        let dir = tempdir().unwrap();
        let store = FileFeedbackStore::open(dir.path().join("swipes.json"))
            .await
            .unwrap();
        assert!(store.list_for(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileFeedbackStore::open(dir.path().join("swipes.json"))
            .await
            .unwrap();

        store.append(7, like("Alien (1979)")).await.unwrap();
        store.reset(7).await.unwrap();
        assert!(store.list_for(7).await.unwrap().is_empty());

        store.reset(7).await.unwrap();
        assert!(store.list_for(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_document_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("swipes.json");

        {
            let store = FileFeedbackStore::open(&path).await.unwrap();
            store.append(3, like("Fargo (1996)")).await.unwrap();
        }

        let reopened = FileFeedbackStore::open(&path).await.unwrap();
        let events = reopened.list_for(3).await.unwrap();
        assert_eq!(events, vec![like("Fargo (1996)")]);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("swipes.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        assert!(matches!(
            FileFeedbackStore::open(&path).await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_append_leaves_no_trace() {
        let dir = tempdir().unwrap();
        // The parent directory does not exist, so opening finds no document
        // but every flush fails.
        let path = dir.path().join("missing").join("swipes.json");
        let store = FileFeedbackStore::open(&path).await.unwrap();

        assert!(store.append(5, like("Brazil (1985)")).await.is_err());
        assert!(store.list_for(5).await.unwrap().is_empty());

        // Once flushes can succeed again, only the acknowledged event exists.
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        store.append(5, like("Gattaca (1997)")).await.unwrap();
        let events = store.list_for(5).await.unwrap();
        assert_eq!(events, vec![like("Gattaca (1997)")]);

        let reopened = FileFeedbackStore::open(&path).await.unwrap();
        assert_eq!(reopened.list_for(5).await.unwrap(), events);
    }

    #[tokio::test]
    async fn test_concurrent_appends_for_different_users() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(
            FileFeedbackStore::open(dir.path().join("swipes.json"))
                .await
                .unwrap(),
        );

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.append(1, like("Speed (1994)")).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.append(2, like("Twister (1996)")).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(store.list_for(1).await.unwrap().len(), 1);
        assert_eq!(store.list_for(2).await.unwrap().len(), 1);
    }
}
