use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::{KvResult, KvStore};

/// Process-local store, selected with a `memory://` binding URL. Nothing survives a restart, so this
/// is only meant for local development and tests.
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> KvResult<()> {
        self.inner.write().await.insert(key.to_owned(), value);
        Ok(())
    }
}
