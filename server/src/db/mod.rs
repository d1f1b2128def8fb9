use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::instrument;

use crate::db::kv::memory::MemoryKv;
use crate::db::kv::redis::RedisKv;

pub mod kv;
pub mod models;
pub mod repositories;

pub mod prelude {
    pub use crate::db::models::like::LikeAggregate;
    pub use crate::db::models::visit::VisitCount;
    pub use crate::db::repositories::likes::LikeRepository;
    pub use crate::db::repositories::visits::VisitRepository;
    pub use crate::db::{Binding, KvStore};
}

/// Raw key-value access for a single binding.
///
/// Values are opaque JSON strings; no compare-and-swap or transaction primitive is offered, so any
/// read-modify-write built on top of this trait is racy across concurrent requests.
#[async_trait]
pub trait KvStore: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;
    async fn put(&self, key: &str, value: String) -> KvResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    VisitCounts,
    Likes,
}

impl Binding {
    /// Key prefix used when several bindings share one backing server
    pub fn namespace(&self) -> &'static str {
        match self {
            Binding::VisitCounts => "visits",
            Binding::Likes => "likes",
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::VisitCounts => write!(f, "VISIT_COUNTS"),
            Binding::Likes => write!(f, "LIKES"),
        }
    }
}

/// The set of store bindings the service was started with. Either may be absent, in which case the
/// endpoints relying on it answer `503`.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub visit_counts: Option<Arc<dyn KvStore>>,
    pub likes: Option<Arc<dyn KvStore>>,
}

impl Bindings {
    #[instrument]
    pub async fn connect(visit_counts_url: Option<&str>, likes_url: Option<&str>) -> Self {
        Self {
            visit_counts: open_binding(Binding::VisitCounts, visit_counts_url).await,
            likes: open_binding(Binding::Likes, likes_url).await,
        }
    }

    pub fn get(&self, binding: Binding) -> Option<&Arc<dyn KvStore>> {
        match binding {
            Binding::VisitCounts => self.visit_counts.as_ref(),
            Binding::Likes => self.likes.as_ref(),
        }
    }

    pub fn all_bound(&self) -> bool {
        self.visit_counts.is_some() && self.likes.is_some()
    }
}

pub const MEMORY_SCHEME: &str = "memory://";

/// Opens a single binding, logging and leaving it unbound if the backing store can't be reached.
async fn open_binding(binding: Binding, url: Option<&str>) -> Option<Arc<dyn KvStore>> {
    let Some(url) = url.map(str::trim).filter(|url| !url.is_empty()) else {
        tracing::warn!(%binding, "store binding not configured");
        return None;
    };

    if url.starts_with(MEMORY_SCHEME) {
        tracing::warn!(%binding, "using non-durable in-memory store");
        return Some(Arc::new(MemoryKv::default()));
    }

    match RedisKv::connect(url, binding.namespace()).await {
        Ok(store) => {
            tracing::info!(%binding, "store binding connected");
            Some(Arc::new(store))
        }
        Err(e) => {
            tracing::error!(%binding, error = ?e, "unable to open store binding, leaving unbound");
            None
        }
    }
}

pub type KvResult<T> = core::result::Result<T, KvErr>;

#[derive(Debug, Error)]
pub enum KvErr {
    #[error(transparent)]
    RedisClientError(#[from] redis::RedisError),

    #[error("unable to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}
