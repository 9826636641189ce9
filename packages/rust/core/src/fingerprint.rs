//! Content-hash index deciding whether raw bytes are new.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use docket_shared::Result;
use docket_storage::Storage;

/// Result of trying to claim a content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// This caller now owns the hash.
    Registered,
    /// Another identifier already owns the hash.
    AlreadyExists,
}

/// The sole authority for duplicate detection.
///
/// `register` must be atomic for concurrent callers presenting the same hash:
/// exactly one gets [`Registration::Registered`].
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Identifier owning `hash`, if any.
    async fn lookup(&self, hash: &str) -> Result<Option<String>>;

    /// Claim `hash` for `identifier`.
    async fn register(&self, hash: &str, identifier: &str) -> Result<Registration>;

    /// Drop the claim on `hash`, only if `identifier` still holds it.
    async fn release(&self, hash: &str, identifier: &str) -> Result<()>;
}

#[async_trait]
impl FingerprintStore for Storage {
    async fn lookup(&self, hash: &str) -> Result<Option<String>> {
        self.lookup_fingerprint(hash).await
    }

    async fn register(&self, hash: &str, identifier: &str) -> Result<Registration> {
        Ok(if self.register_fingerprint(hash, identifier).await? {
            Registration::Registered
        } else {
            Registration::AlreadyExists
        })
    }

    async fn release(&self, hash: &str, identifier: &str) -> Result<()> {
        self.release_fingerprint(hash, identifier).await
    }
}

/// Process-local fingerprint index. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryFingerprints {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryFingerprints {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl FingerprintStore for MemoryFingerprints {
    async fn lookup(&self, hash: &str) -> Result<Option<String>> {
        Ok(self.entries().get(hash).cloned())
    }

    async fn register(&self, hash: &str, identifier: &str) -> Result<Registration> {
        let mut entries = self.entries();
        if entries.contains_key(hash) {
            return Ok(Registration::AlreadyExists);
        }
        entries.insert(hash.to_string(), identifier.to_string());
        Ok(Registration::Registered)
    }

    async fn release(&self, hash: &str, identifier: &str) -> Result<()> {
        let mut entries = self.entries();
        if entries.get(hash).is_some_and(|owner| owner == identifier) {
            entries.remove(hash);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn memory_register_has_one_winner() {
        let store = Arc::new(MemoryFingerprints::new());
        let mut set = tokio::task::JoinSet::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            set.spawn(async move { store.register("h", &format!("DOC-{i}")).await });
        }

        let mut winners = 0;
        while let Some(res) = set.join_next().await {
            if res.expect("join").expect("register") == Registration::Registered {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(store.lookup("h").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn release_only_by_owner() {
        let store = MemoryFingerprints::new();
        store.register("h", "A").await.unwrap();
        store.release("h", "B").await.unwrap();
        assert_eq!(store.lookup("h").await.unwrap().as_deref(), Some("A"));
        store.release("h", "A").await.unwrap();
        assert_eq!(store.lookup("h").await.unwrap(), None);
    }

    #[tokio::test]
    async fn storage_backed_store() {
        let tmp = std::env::temp_dir().join(format!("docket_fp_{}.db", uuid::Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.expect("open");
        let store: &dyn FingerprintStore = &storage;

        assert_eq!(store.register("h", "A").await.unwrap(), Registration::Registered);
        assert_eq!(store.register("h", "B").await.unwrap(), Registration::AlreadyExists);
        assert_eq!(store.lookup("h").await.unwrap().as_deref(), Some("A"));
    }
}
