use std::sync::Arc;

use tracing::instrument;

use crate::db::KvStore;
use crate::db::models::visit::VisitCount;
use crate::db::repositories::Repository;
use crate::util::telemetry::Metrics;

#[derive(Debug)]
pub struct VisitRepository {
    store: Arc<dyn KvStore>,
    metrics: Metrics,
}

impl VisitRepository {
    pub fn new(store: Arc<dyn KvStore>, metrics: Metrics) -> Self {
        Self { store, metrics }
    }

    #[instrument(skip(self))]
    pub async fn read(&self, path: &str) -> VisitCount {
        self.fetch(path).await
    }

    /// Increments the count for `path` and returns the new value, whether or not it was persisted.
    ///
    /// The read and the write are separate round trips, so two concurrent calls can both observe the
    /// same base value and one increment is lost.
    #[instrument(skip(self))]
    pub async fn record(&self, path: &str) -> VisitCount {
        let count = self.fetch(path).await.incremented();
        self.save_best_effort(path, &count).await;

        self.metrics.visit_recorded();
        tracing::debug!(path, total = count.total, "recorded visit");

        count
    }
}

#[async_trait::async_trait]
impl Repository for VisitRepository {
    type Record = VisitCount;

    fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
