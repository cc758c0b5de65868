//! Shared fixtures: a populated in-memory store and a fully wired query
//! engine pointing at it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::RrCache;
use crate::dnssec::DnssecEngine;
use crate::enums::RecordType;
use crate::query::QueryEngine;
use crate::ratelimit::RateLimiter;
use crate::store::{MemoryZoneStore, Record, Zone, ZoneStore};
use crate::transfer::TransferEngine;
use crate::tsig::TsigKeyring;
use crate::update::UpdateEngine;
use crate::wire::BufferPool;

pub const TEST_ZONE: &str = "example.test.";
pub const TEST_SOA_RDATA: &str =
    "ns1.example.test. admin.example.test. 100 3600 900 604800 300";

pub fn client_addr() -> SocketAddr {
    "127.0.0.1:40000".parse().expect("static addr")
}

/// The S1 zone: SOA, one NS with glue, and a www A record.
pub async fn seed_example_zone(store: &MemoryZoneStore) -> Zone {
    let zone = Zone::new(TEST_ZONE, "tenant-1");
    store.create_zone(zone.clone()).await.expect("create zone");
    for (name, rrtype, rdata) in [
        (TEST_ZONE, RecordType::SOA, TEST_SOA_RDATA),
        (TEST_ZONE, RecordType::NS, "ns1.example.test."),
        ("ns1.example.test.", RecordType::A, "10.0.0.1"),
        ("www.example.test.", RecordType::A, "10.0.0.2"),
    ] {
        store
            .create_record(Record::new(zone.id, name, rrtype, 300, rdata))
            .await
            .expect("create record");
    }
    zone
}

pub struct Harness {
    pub store: Arc<MemoryZoneStore>,
    pub engine: Arc<QueryEngine>,
    pub cache: Arc<RrCache>,
    pub dnssec: Arc<DnssecEngine>,
}

/// Wire the whole engine stack against one in-memory store, no remote cache.
pub fn build_harness(keyring: TsigKeyring) -> Harness {
    let store = Arc::new(MemoryZoneStore::new());
    let dyn_store: Arc<dyn ZoneStore> = store.clone();
    let cache = Arc::new(RrCache::new(Duration::from_secs(60), None));
    let limiter = Arc::new(RateLimiter::new(100_000, 100_000));
    let dnssec = Arc::new(DnssecEngine::new(dyn_store.clone()));
    let transfer = TransferEngine::new(dyn_store.clone(), "ns1.example.test.".to_string(), None);
    let update = UpdateEngine::new(
        dyn_store.clone(),
        cache.clone(),
        Arc::new(keyring),
        transfer.clone(),
    );
    let engine = Arc::new(QueryEngine::new(
        dyn_store,
        cache.clone(),
        limiter,
        BufferPool::new(4),
        dnssec.clone(),
        update,
        transfer,
    ));
    Harness {
        store,
        engine,
        cache,
        dnssec,
    }
}
