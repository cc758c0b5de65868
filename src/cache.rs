//! Two-level response cache. L1 is an in-process map of serialized
//! responses; L2 is an optional remote key-value store shared between nodes,
//! with a pub/sub channel carrying invalidations. Entries are keyed by
//! `(lowercased name, qtype)` and hold wire bytes, so hits only need their
//! transaction ID rewritten before going out.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::enums::RecordType;
use crate::error::AuthNsError;

/// Key prefix in the remote store so the DNS cache shares a database with
/// other tenants without collisions.
const L2_PREFIX: &str = "dns:";
/// Invalidation messages land here.
pub const INVALIDATION_CHANNEL: &str = "dns:invalidation";

struct L1Entry {
    bytes: Vec<u8>,
    expires: Instant,
}

pub struct RrCache {
    l1: DashMap<String, L1Entry>,
    l1_default_ttl: Duration,
    l2: Option<ConnectionManager>,
}

/// The uniform cache key.
pub fn cache_key(name: &str, qtype: RecordType) -> String {
    format!("{}:{}", name.to_ascii_lowercase(), qtype as u16)
}

impl RrCache {
    pub fn new(l1_default_ttl: Duration, l2: Option<ConnectionManager>) -> Self {
        RrCache {
            l1: DashMap::new(),
            l1_default_ttl,
            l2,
        }
    }

    pub fn l1_default_ttl(&self) -> Duration {
        self.l1_default_ttl
    }

    /// L1 lookup; expired entries count as a miss and drop out lazily.
    pub fn l1_get(&self, key: &str) -> Option<Vec<u8>> {
        // the read guard must be gone before remove touches the same shard
        let expired = match self.l1.get(key) {
            Some(entry) if entry.expires > Instant::now() => return Some(entry.bytes.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.l1.remove(key);
        }
        None
    }

    pub fn l1_set(&self, key: &str, bytes: Vec<u8>, ttl: Duration) {
        self.l1.insert(
            key.to_string(),
            L1Entry {
                bytes,
                expires: Instant::now() + ttl,
            },
        );
    }

    /// L2 lookup against the remote store, a no-op without one configured.
    pub async fn l2_get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthNsError> {
        let Some(conn) = &self.l2 else {
            return Ok(None);
        };
        let mut conn = conn.clone();
        let value: Option<Vec<u8>> = conn.get(format!("{L2_PREFIX}{key}")).await?;
        Ok(value)
    }

    pub async fn l2_set(&self, key: &str, bytes: &[u8], ttl: Duration) -> Result<(), AuthNsError> {
        let Some(conn) = &self.l2 else {
            return Ok(());
        };
        let mut conn = conn.clone();
        conn.set_ex::<_, _, ()>(format!("{L2_PREFIX}{key}"), bytes, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    /// Store a response at both levels. L2 failures log and keep serving;
    /// the remote cache being down must not fail queries.
    pub async fn set(&self, key: &str, bytes: Vec<u8>, ttl: Duration) {
        if let Err(error) = self.l2_set(key, &bytes, ttl).await {
            warn!("L2 cache write for {key} failed: {error}");
        }
        self.l1_set(key, bytes, ttl);
    }

    /// Drop one L1 entry, the reaction to an invalidation message.
    pub fn invalidate_l1(&self, name: &str, qtype: RecordType) {
        let key = cache_key(name, qtype);
        if self.l1.remove(&key).is_some() {
            trace!("invalidated L1 entry {key}");
        }
    }

    /// Drop everything in L1; dynamic updates call this after committing.
    pub fn flush_l1(&self) {
        self.l1.clear();
    }

    /// Tell every subscribed node (including ourselves) that a name changed.
    pub async fn publish_invalidation(
        &self,
        name: &str,
        qtype: RecordType,
    ) -> Result<(), AuthNsError> {
        let Some(conn) = &self.l2 else {
            return Ok(());
        };
        let mut conn = conn.clone();
        conn.publish::<_, _, ()>(
            INVALIDATION_CHANNEL,
            format!("{}|{}", name.to_ascii_lowercase(), qtype as u16),
        )
        .await?;
        Ok(())
    }
}

/// Subscribe to the invalidation channel and drop matching L1 entries as
/// messages arrive. Runs for the life of the process; a lost connection ends
/// the task with a warning and the cache falls back to TTL-bounded staleness.
pub fn spawn_invalidation_subscriber(
    cache: std::sync::Arc<RrCache>,
    client: redis::Client,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pubsub = match client.get_async_pubsub().await {
            Ok(value) => value,
            Err(error) => {
                warn!("failed to open invalidation subscription: {error}");
                return;
            }
        };
        if let Err(error) = pubsub.subscribe(INVALIDATION_CHANNEL).await {
            warn!("failed to subscribe to {INVALIDATION_CHANNEL}: {error}");
            return;
        }
        debug!("subscribed to {INVALIDATION_CHANNEL}");
        let mut stream = pubsub.on_message();
        while let Some(message) = stream.next().await {
            let payload: String = match message.get_payload() {
                Ok(value) => value,
                Err(error) => {
                    warn!("unreadable invalidation payload: {error}");
                    continue;
                }
            };
            if let Some((name, qtype)) = payload.split_once('|') {
                let qtype = qtype.parse::<u16>().unwrap_or_default();
                cache.invalidate_l1(name, RecordType::from(qtype));
            }
        }
        warn!("invalidation subscription closed");
    })
}
