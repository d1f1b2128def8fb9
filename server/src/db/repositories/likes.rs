use std::sync::Arc;

use tracing::instrument;

use crate::db::KvStore;
use crate::db::models::like::{LikeAggregate, LikedBy};
use crate::db::repositories::Repository;
use crate::util::telemetry::Metrics;

#[derive(Debug)]
pub struct LikeRepository {
    store: Arc<dyn KvStore>,
    metrics: Metrics,
}

impl LikeRepository {
    pub fn new(store: Arc<dyn KvStore>, metrics: Metrics) -> Self {
        Self { store, metrics }
    }

    #[instrument(skip(self))]
    pub async fn read(&self, path: &str) -> LikeAggregate {
        self.fetch(path).await
    }

    /// Flips `user`'s like on `path` and returns the resulting aggregate, whether or not it was
    /// persisted. Concurrent toggles on the same path race in the same way as visit counts.
    #[instrument(skip(self, user), fields(login = %user.login))]
    pub async fn toggle(&self, path: &str, user: LikedBy) -> LikeAggregate {
        let mut likes = self.fetch(path).await;
        let toggled = likes.toggle(user);
        self.save_best_effort(path, &likes).await;

        self.metrics.like_toggled(toggled);
        tracing::debug!(path, ?toggled, count = likes.count, "toggled like");

        likes
    }
}

#[async_trait::async_trait]
impl Repository for LikeRepository {
    type Record = LikeAggregate;

    fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
