use core::fmt;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::instrument;

use crate::db::{KvResult, KvStore};

/// Key under which a record for `name` lives in a namespaced binding, e.g. `likes:/blog/my-post`
pub fn namespaced_key(namespace: &str, name: &str) -> String {
    format!("{namespace}:{name}")
}

/// A binding backed by a redis server. Every binding gets its own key namespace so the visit counts
/// and likes can live on the same server.
#[derive(Clone)]
pub struct RedisKv {
    manager: ConnectionManager,
    namespace: &'static str,
}

impl RedisKv {
    #[instrument(skip(redis_url))]
    pub async fn connect(redis_url: &str, namespace: &'static str) -> KvResult<Self> {
        tracing::debug!("connecting to redis server");

        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self { manager, namespace })
    }
}

impl fmt::Debug for RedisKv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisKv")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KvStore for RedisKv {
    #[instrument(skip(self), fields(namespace = self.namespace))]
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        // the manager is a cheap handle onto a shared multiplexed connection
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(namespaced_key(self.namespace, key)).await?;

        Ok(value)
    }

    #[instrument(skip(self, value), fields(namespace = self.namespace))]
    async fn put(&self, key: &str, value: String) -> KvResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.set(namespaced_key(self.namespace, key), value).await?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_namespaced_key() {
        assert_eq!(namespaced_key("visits", "/"), "visits:/");
        assert_eq!(
            namespaced_key("likes", "/blog/my-post"),
            "likes:/blog/my-post"
        );
    }
}
