use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::db::models::decode_or_default;
use crate::db::{KvResult, KvStore};
use crate::util::telemetry::Metrics;

pub mod likes;
pub mod visits;

/// Shared read/write plumbing for records keyed by resource path.
///
/// Reads never fail: a backend error or a malformed record both degrade to `T::default()`. Writes
/// surface their error so the caller can decide whether it matters.
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    type Record: Serialize + DeserializeOwned + Default + Send + Sync;

    fn store(&self) -> &Arc<dyn KvStore>;
    fn metrics(&self) -> &Metrics;

    async fn fetch(&self, path: &str) -> Self::Record {
        match self.store().get(path).await {
            Ok(raw) => decode_or_default(path, raw.as_deref()),
            Err(e) => {
                tracing::error!(path, error = ?e, "store read failed, using default");
                self.metrics().store_failure("read");
                Self::Record::default()
            }
        }
    }

    async fn save(&self, path: &str, record: &Self::Record) -> KvResult<()> {
        let encoded = serde_json::to_string(record)?;
        self.store().put(path, encoded).await
    }

    /// [`Repository::save`] whose failure is logged and counted but otherwise swallowed
    async fn save_best_effort(&self, path: &str, record: &Self::Record) {
        if let Err(e) = self.save(path, record).await {
            tracing::warn!(path, error = ?e, "store write failed, returning unpersisted value");
            self.metrics().store_failure("write");
        }
    }
}
