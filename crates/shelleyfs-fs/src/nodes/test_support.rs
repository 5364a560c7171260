//! Shared harness for node unit tests: an in-memory [`BackendClient`] plus a
//! [`FsContext`] backed by a temporary [`LocalStore`].
#![cfg(test)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use shelleyfs_cache::ParsedCache;
use shelleyfs_client::{BackendClient, BackendError, NewConversation};
use shelleyfs_store::LocalStore;
use tempfile::TempDir;

use crate::fscontext::FsContext;
use crate::inode::InodeTable;

/// Canned responses for every [`BackendClient`] method, swapped in per test.
#[derive(Default)]
pub struct MockBackendClient {
    pub conversations: Mutex<Vec<u8>>,
    pub models: Mutex<Vec<u8>>,
    pub conversation_bodies: DashMap<String, Vec<u8>>,
    pub working_ids: Mutex<Vec<String>>,
    pub next_continue_id: AtomicU64,
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_conversations: std::sync::atomic::AtomicBool,
}

impl MockBackendClient {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(b"{\"conversations\": []}".to_vec()),
            models: Mutex::new(b"{\"models\": []}".to_vec()),
            ..Default::default()
        }
    }

    pub fn set_conversation(&self, shelley_id: &str, body: impl Into<Vec<u8>>) {
        self.conversation_bodies.insert(shelley_id.to_string(), body.into());
    }
}

#[async_trait::async_trait]
impl BackendClient for MockBackendClient {
    async fn list_conversations(&self) -> Result<Arc<Vec<u8>>, BackendError> {
        if self.fail_conversations.load(Ordering::SeqCst) {
            return Err(BackendError::Timeout);
        }
        Ok(Arc::new(self.conversations.lock().unwrap().clone()))
    }

    async fn get_conversation(&self, shelley_id: &str) -> Result<Arc<Vec<u8>>, BackendError> {
        self.conversation_bodies
            .get(shelley_id)
            .map(|e| Arc::new(e.value().clone()))
            .ok_or(BackendError::NotFound)
    }

    async fn list_models(&self) -> Result<Arc<Vec<u8>>, BackendError> {
        Ok(Arc::new(self.models.lock().unwrap().clone()))
    }

    async fn start_conversation(
        &self,
        first_message: &str,
        model_id: &str,
        _cwd: &str,
    ) -> Result<NewConversation, BackendError> {
        self.sent.lock().unwrap().push((model_id.to_string(), first_message.to_string()));
        Ok(NewConversation { shelley_id: "new-shelley-id".to_string(), slug: None })
    }

    async fn send_message(&self, shelley_id: &str, text: &str, _cwd: &str) -> Result<(), BackendError> {
        self.sent.lock().unwrap().push((shelley_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn cancel(&self, _shelley_id: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn continue_conversation(&self, _shelley_id: &str) -> Result<String, BackendError> {
        let n = self.next_continue_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("continued-{n}"))
    }

    async fn delete_conversation(&self, _shelley_id: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn working(&self, shelley_id: &str) -> Result<bool, BackendError> {
        Ok(self.working_ids.lock().unwrap().iter().any(|id| id == shelley_id))
    }
}

/// Builds an [`FsContext`] over a fresh temp-dir store and the given mock
/// client. The `TempDir` must outlive the context; callers keep it bound.
pub fn test_ctx(client: MockBackendClient) -> (FsContext, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let store = LocalStore::open(dir.path()).expect("open store");
    let ctx = FsContext {
        store: Arc::new(store),
        client: Arc::new(client),
        parsed_cache: Arc::new(ParsedCache::new()),
        inodes: Arc::new(InodeTable::new()),
        registry: Arc::new(DashMap::new()),
        parents: Arc::new(DashMap::new()),
        runtime: tokio::runtime::Handle::current(),
        start_time: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        clone_timeout: Duration::from_secs(600),
        call_timeout: Duration::from_secs(30),
    };
    (ctx, dir)
}
