#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use http::StatusCode;
use tokio::sync::Barrier;

use crate::db::kv::memory::MemoryKv;
use crate::db::models::like::LikedBy;
use crate::db::{KvErr, KvResult, KvStore};
use crate::util::github::{IdentityErr, IdentityResult, IdentityVerifier};

pub fn memory_store() -> Arc<dyn KvStore> {
    Arc::new(MemoryKv::default())
}

pub fn liked_by(login: &str) -> LikedBy {
    LikedBy {
        login: login.to_owned(),
        avatar_url: format!("https://avatars.example/{login}"),
    }
}

/// Store whose reads or writes always fail.
///
/// With failing writes, reads keep answering with the value it was seeded with, so callers can
/// check that nothing durable changed.
#[derive(Debug)]
pub struct FailingKv {
    seeded: Option<String>,
    fail_reads: bool,
}

impl FailingKv {
    pub fn writes_fail(seeded: Option<&str>) -> Self {
        Self {
            seeded: seeded.map(str::to_owned),
            fail_reads: false,
        }
    }

    pub fn reads_fail() -> Self {
        Self {
            seeded: None,
            fail_reads: true,
        }
    }
}

#[async_trait]
impl KvStore for FailingKv {
    async fn get(&self, _key: &str) -> KvResult<Option<String>> {
        if self.fail_reads {
            return Err(KvErr::Unavailable(String::from("read refused")));
        }

        Ok(self.seeded.clone())
    }

    async fn put(&self, _key: &str, _value: String) -> KvResult<()> {
        if self.fail_reads {
            return Ok(());
        }

        Err(KvErr::Unavailable(String::from("write refused")))
    }
}

/// In-memory store that holds its first `parties` reads until all of them have arrived, forcing
/// concurrent read-modify-write callers to observe the same value. Later reads pass straight
/// through.
#[derive(Debug)]
pub struct InterleavedKv {
    inner: MemoryKv,
    barrier: Barrier,
    pending: AtomicUsize,
}

impl InterleavedKv {
    pub fn new(parties: usize) -> Self {
        Self {
            inner: MemoryKv::default(),
            barrier: Barrier::new(parties),
            pending: AtomicUsize::new(parties),
        }
    }
}

#[async_trait]
impl KvStore for InterleavedKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let value = self.inner.get(key).await?;

        let held = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if held {
            self.barrier.wait().await;
        }

        Ok(value)
    }

    async fn put(&self, key: &str, value: String) -> KvResult<()> {
        self.inner.put(key, value).await
    }
}

/// Verifier that knows exactly one credential, `alice-token`
#[derive(Debug)]
pub struct FixedIdentity {
    token: String,
    user: LikedBy,
}

impl FixedIdentity {
    pub fn alice() -> Self {
        Self {
            token: String::from("alice-token"),
            user: liked_by("alice"),
        }
    }
}

#[async_trait]
impl IdentityVerifier for FixedIdentity {
    async fn verify(&self, token: &str) -> IdentityResult<LikedBy> {
        if token == self.token {
            Ok(self.user.clone())
        } else {
            Err(IdentityErr::Rejected(StatusCode::UNAUTHORIZED))
        }
    }
}
