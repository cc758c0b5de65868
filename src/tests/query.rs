use crate::cache::cache_key;
use crate::enums::{OpCode, PacketType, Rcode, RecordClass, RecordType, Transport};
use crate::message::{Message, Question, ResourceRecord};
use crate::query::QueryResponse;
use crate::rdata::RData;
use crate::store::{Record, Zone, ZoneStore};
use crate::tests::test_harness::{build_harness, client_addr, seed_example_zone};
use crate::Header;

fn build_query(qname: &str, qtype: RecordType) -> Message {
    Message {
        header: Header {
            id: 0x2222,
            qr: PacketType::Query,
            opcode: OpCode::Query,
            recursion_desired: true,
            qdcount: 1,
            ..Header::default()
        },
        questions: vec![Question {
            qname: qname.to_string(),
            qtype,
            qclass: RecordClass::Internet,
        }],
        ..Default::default()
    }
}

fn with_edns(mut message: Message, udp_size: u16, do_bit: bool) -> Message {
    message.additionals.push(ResourceRecord {
        name: ".".to_string(),
        rrtype: RecordType::OPT,
        class: RecordClass::Internet,
        ttl: 0,
        rdata: RData::OPT {
            udp_size,
            ext_rcode: 0,
            version: 0,
            flags: if do_bit { 0x8000 } else { 0 },
            options: vec![],
        },
    });
    message
}

async fn run(harness: &crate::tests::test_harness::Harness, message: &Message) -> Message {
    let raw = message.to_bytes(true).expect("serialize query");
    let response = harness
        .engine
        .handle_packet(&raw, client_addr(), Transport::Udp)
        .await
        .expect("a response");
    let QueryResponse::Single(bytes) = response else {
        panic!("expected a single response");
    };
    Message::parse(&bytes).expect("parse response")
}

#[tokio::test]
async fn test_s1_authoritative_a_query() {
    let harness = build_harness(Default::default());
    seed_example_zone(&harness.store).await;

    let response = run(&harness, &build_query("www.example.test.", RecordType::A)).await;
    assert_eq!(response.header.rcode, Rcode::NoError);
    assert!(response.header.authoritative);
    assert_eq!(response.header.id, 0x2222);

    // question echoed verbatim
    assert_eq!(response.questions[0].qname, "www.example.test.");

    assert_eq!(response.answers.len(), 1);
    let answer = &response.answers[0];
    assert_eq!(answer.name, "www.example.test.");
    assert_eq!(answer.ttl, 300);
    assert_eq!(
        answer.rdata,
        RData::A {
            address: [10, 0, 0, 2].into()
        }
    );

    // apex NS in authority, glue in additional
    assert!(response
        .authorities
        .iter()
        .any(|r| r.rrtype == RecordType::NS));
    assert!(response.additionals.iter().any(|r| r.rdata
        == RData::A {
            address: [10, 0, 0, 1].into()
        }));
}

#[tokio::test]
async fn test_case_insensitive_lookup() {
    let harness = build_harness(Default::default());
    seed_example_zone(&harness.store).await;
    let response = run(&harness, &build_query("WWW.EXAMPLE.TEST.", RecordType::A)).await;
    assert_eq!(response.header.rcode, Rcode::NoError);
    assert_eq!(response.answers.len(), 1);
}

#[tokio::test]
async fn test_nxdomain_carries_soa() {
    let harness = build_harness(Default::default());
    seed_example_zone(&harness.store).await;

    let response = run(&harness, &build_query("absent.example.test.", RecordType::A)).await;
    assert_eq!(response.header.rcode, Rcode::NxDomain);
    assert!(response.header.authoritative);
    assert!(response.answers.is_empty());
    assert!(response
        .authorities
        .iter()
        .any(|r| r.rrtype == RecordType::SOA));
    // no DO bit, no proof
    assert!(!response
        .authorities
        .iter()
        .any(|r| r.rrtype == RecordType::NSEC || r.rrtype == RecordType::NSEC3));
}

#[tokio::test]
async fn test_s2_nxdomain_with_dnssec_nsec3() {
    let harness = build_harness(Default::default());
    let zone = seed_example_zone(&harness.store).await;
    harness
        .store
        .create_record(Record::new(
            zone.id,
            "example.test.",
            RecordType::NSEC3PARAM,
            0,
            "1 0 10 ABCD",
        ))
        .await
        .expect("nsec3param");
    harness
        .dnssec
        .ensure_zone_keys(zone.id)
        .await
        .expect("keys");

    let query = with_edns(
        build_query("absent.example.test.", RecordType::A),
        4096,
        true,
    );
    let response = run(&harness, &query).await;
    assert_eq!(response.header.rcode, Rcode::NxDomain);

    let soa_count = response
        .authorities
        .iter()
        .filter(|r| r.rrtype == RecordType::SOA)
        .count();
    let nsec3_count = response
        .authorities
        .iter()
        .filter(|r| r.rrtype == RecordType::NSEC3)
        .count();
    let rrsig_count = response
        .authorities
        .iter()
        .filter(|r| r.rrtype == RecordType::RRSIG)
        .count();
    assert_eq!(soa_count, 1);
    assert_eq!(nsec3_count, 1);
    // one RRSIG per RRset in the authority section
    assert_eq!(rrsig_count, 2);

    // the response OPT advertises our payload size with DO copied
    let (size, do_bit) = response.edns().expect("response OPT");
    assert!(size >= 4096);
    assert!(do_bit);
}

#[tokio::test]
async fn test_do_zero_leaves_rrsigs_out() {
    let harness = build_harness(Default::default());
    let zone = seed_example_zone(&harness.store).await;
    harness
        .dnssec
        .ensure_zone_keys(zone.id)
        .await
        .expect("keys");

    let query = with_edns(build_query("www.example.test.", RecordType::A), 4096, false);
    let response = run(&harness, &query).await;
    assert!(!response
        .answers
        .iter()
        .any(|r| r.rrtype == RecordType::RRSIG));

    let query = with_edns(build_query("www.example.test.", RecordType::A), 4096, true);
    let response = run(&harness, &query).await;
    assert!(response
        .answers
        .iter()
        .any(|r| r.rrtype == RecordType::RRSIG));
}

#[tokio::test]
async fn test_s6_wildcard_rewrite() {
    let harness = build_harness(Default::default());
    let zone = Zone::new("wild.test.", "tenant-1");
    harness.store.create_zone(zone.clone()).await.expect("zone");
    for (name, rrtype, rdata) in [
        (
            "wild.test.",
            RecordType::SOA,
            "ns1.wild.test. admin.wild.test. 1 3600 900 604800 300",
        ),
        ("wild.test.", RecordType::NS, "ns1.wild.test."),
        ("*.wild.test.", RecordType::A, "9.9.9.9"),
    ] {
        harness
            .store
            .create_record(Record::new(zone.id, name, rrtype, 300, rdata))
            .await
            .expect("record");
    }

    let response = run(&harness, &build_query("sub.wild.test.", RecordType::A)).await;
    assert_eq!(response.header.rcode, Rcode::NoError);
    assert_eq!(response.answers.len(), 1);
    // the owner is the queried name, not the wildcard
    assert_eq!(response.answers[0].name, "sub.wild.test.");
    assert_eq!(
        response.answers[0].rdata,
        RData::A {
            address: [9, 9, 9, 9].into()
        }
    );
}

#[tokio::test]
async fn test_wildcard_never_shadows_exact_match() {
    let harness = build_harness(Default::default());
    let zone = Zone::new("wild.test.", "tenant-1");
    harness.store.create_zone(zone.clone()).await.expect("zone");
    for (name, rdata) in [("*.wild.test.", "9.9.9.9"), ("real.wild.test.", "1.1.1.1")] {
        harness
            .store
            .create_record(Record::new(zone.id, name, RecordType::A, 300, rdata))
            .await
            .expect("record");
    }

    let response = run(&harness, &build_query("real.wild.test.", RecordType::A)).await;
    assert_eq!(
        response.answers[0].rdata,
        RData::A {
            address: [1, 1, 1, 1].into()
        }
    );
}

#[tokio::test]
async fn test_unserved_zone_is_refused() {
    let harness = build_harness(Default::default());
    seed_example_zone(&harness.store).await;
    let response = run(&harness, &build_query("www.elsewhere.test.", RecordType::A)).await;
    assert_eq!(response.header.rcode, Rcode::Refused);
    assert!(!response.header.authoritative);
}

#[tokio::test]
async fn test_chaos_class_refused() {
    let harness = build_harness(Default::default());
    seed_example_zone(&harness.store).await;
    let mut query = build_query("version.bind.", RecordType::TXT);
    query.questions[0].qclass = RecordClass::Chaos;
    let response = run(&harness, &query).await;
    assert_eq!(response.header.rcode, Rcode::Refused);
}

#[tokio::test]
async fn test_cache_hit_rewrites_transaction_id() {
    let harness = build_harness(Default::default());
    seed_example_zone(&harness.store).await;

    let first = run(&harness, &build_query("www.example.test.", RecordType::A)).await;
    assert_eq!(first.header.id, 0x2222);

    // the response is now cached under the question key
    let key = cache_key("www.example.test.", RecordType::A);
    assert!(harness.cache.l1_get(&key).is_some());

    let mut second_query = build_query("www.example.test.", RecordType::A);
    second_query.header.id = 0x7777;
    let second = run(&harness, &second_query).await;
    assert_eq!(second.header.id, 0x7777);
    assert_eq!(second.answers, first.answers);
}

#[tokio::test]
async fn test_udp_truncation_sets_tc_and_clears_sections() {
    let harness = build_harness(Default::default());
    let zone = seed_example_zone(&harness.store).await;
    // enough TXT data at one name to blow past 512 bytes
    for i in 0..8 {
        harness
            .store
            .create_record(Record::new(
                zone.id,
                "big.example.test.",
                RecordType::TXT,
                300,
                &format!("{i}-{}", "x".repeat(120)),
            ))
            .await
            .expect("record");
    }

    let response = run(&harness, &build_query("big.example.test.", RecordType::TXT)).await;
    assert!(response.header.truncated);
    assert!(response.answers.is_empty());
    assert!(response.authorities.is_empty());
    // the question is still echoed
    assert_eq!(response.questions.len(), 1);

    // the same query over TCP comes back whole
    let raw = build_query("big.example.test.", RecordType::TXT)
        .to_bytes(true)
        .expect("serialize");
    let tcp_response = harness
        .engine
        .handle_packet(&raw, client_addr(), Transport::Tcp)
        .await
        .expect("response");
    let QueryResponse::Single(bytes) = tcp_response else {
        panic!("single expected");
    };
    let parsed = Message::parse(&bytes).expect("parse");
    assert!(!parsed.header.truncated);
    assert_eq!(parsed.answers.len(), 8);
}

/// A zone holding nothing but two TXT records at one name, with rdata sized
/// so the serialized response lands on an exact byte count. The layout is
/// header (12) + question for `big.t.test.` (16) + per answer a compression
/// pointer, fixed RR fields and a length-prefixed string (13 + n), so the
/// total is 54 + n1 + n2.
async fn sized_txt_harness(n1: usize, n2: usize) -> crate::tests::test_harness::Harness {
    let harness = build_harness(Default::default());
    let zone = Zone::new("t.test.", "tenant-1");
    harness.store.create_zone(zone.clone()).await.expect("zone");
    for (fill, len) in [("x", n1), ("y", n2)] {
        harness
            .store
            .create_record(Record::new(
                zone.id,
                "big.t.test.",
                RecordType::TXT,
                300,
                &fill.repeat(len),
            ))
            .await
            .expect("record");
    }
    harness
}

#[tokio::test]
async fn test_exactly_512_bytes_sends_untruncated() {
    // 54 + 229 + 229 = 512, right on the EDNS-less UDP limit
    let harness = sized_txt_harness(229, 229).await;
    let raw = build_query("big.t.test.", RecordType::TXT)
        .to_bytes(true)
        .expect("serialize");
    let response = harness
        .engine
        .handle_packet(&raw, client_addr(), Transport::Udp)
        .await
        .expect("response");
    let QueryResponse::Single(bytes) = response else {
        panic!("single expected");
    };
    assert_eq!(bytes.len(), 512);
    let parsed = Message::parse(&bytes).expect("parse");
    assert!(!parsed.header.truncated);
    assert_eq!(parsed.answers.len(), 2);
}

#[tokio::test]
async fn test_exactly_513_bytes_truncates() {
    // one byte more and the whole answer section goes
    let harness = sized_txt_harness(229, 230).await;
    let raw = build_query("big.t.test.", RecordType::TXT)
        .to_bytes(true)
        .expect("serialize");
    let response = harness
        .engine
        .handle_packet(&raw, client_addr(), Transport::Udp)
        .await
        .expect("response");
    let QueryResponse::Single(bytes) = response else {
        panic!("single expected");
    };
    let parsed = Message::parse(&bytes).expect("parse");
    assert!(parsed.header.truncated);
    assert!(parsed.answers.is_empty());
    assert!(parsed.authorities.is_empty());
    assert_eq!(parsed.questions.len(), 1);
    assert!(bytes.len() <= 512);
}

#[tokio::test]
async fn test_edns_payload_avoids_truncation() {
    let harness = build_harness(Default::default());
    let zone = seed_example_zone(&harness.store).await;
    for i in 0..8 {
        harness
            .store
            .create_record(Record::new(
                zone.id,
                "big.example.test.",
                RecordType::TXT,
                300,
                &format!("{i}-{}", "x".repeat(120)),
            ))
            .await
            .expect("record");
    }

    let query = with_edns(build_query("big.example.test.", RecordType::TXT), 4096, false);
    let response = run(&harness, &query).await;
    assert!(!response.header.truncated);
    assert_eq!(response.answers.len(), 8);
}

#[tokio::test]
async fn test_notify_acknowledged() {
    let harness = build_harness(Default::default());
    seed_example_zone(&harness.store).await;

    let mut notify = build_query("example.test.", RecordType::SOA);
    notify.header.opcode = OpCode::Notify;
    let response = run(&harness, &notify).await;
    assert_eq!(response.header.opcode, OpCode::Notify);
    assert_eq!(response.header.qr, PacketType::Answer);
    assert!(response.header.authoritative);
    assert_eq!(response.header.rcode, Rcode::NoError);
    assert_eq!(response.questions[0].qname, "example.test.");
}

#[tokio::test]
async fn test_qdcount_zero_is_formerr() {
    let harness = build_harness(Default::default());
    let message = Message {
        header: Header {
            id: 0x3333,
            ..Header::default()
        },
        ..Default::default()
    };
    let raw = message.to_bytes(false).expect("serialize");
    let response = harness
        .engine
        .handle_packet(&raw, client_addr(), Transport::Udp)
        .await
        .expect("response");
    let QueryResponse::Single(bytes) = response else {
        panic!("single expected");
    };
    let parsed = Message::parse(&bytes).expect("parse");
    assert_eq!(parsed.header.rcode, Rcode::FormatError);
    assert_eq!(parsed.header.id, 0x3333);
}

#[tokio::test]
async fn test_garbage_with_recoverable_id_gets_formerr() {
    let harness = build_harness(Default::default());
    let raw = vec![0xAB, 0xCD, 0xFF, 0xFF, 0xFF];
    let response = harness
        .engine
        .handle_packet(&raw, client_addr(), Transport::Udp)
        .await
        .expect("response");
    let QueryResponse::Single(bytes) = response else {
        panic!("single expected");
    };
    let parsed = Message::parse(&bytes).expect("parse");
    assert_eq!(parsed.header.id, 0xABCD);
    assert_eq!(parsed.header.rcode, Rcode::FormatError);
}

#[tokio::test]
async fn test_rate_limited_packets_drop_silently() {
    let harness = {
        // a limiter with a single-token burst
        use crate::ratelimit::RateLimiter;
        use crate::wire::BufferPool;
        use std::sync::Arc;
        use std::time::Duration;

        let store = Arc::new(crate::store::MemoryZoneStore::new());
        let dyn_store: Arc<dyn ZoneStore> = store.clone();
        let cache = Arc::new(crate::cache::RrCache::new(Duration::from_secs(60), None));
        let limiter = Arc::new(RateLimiter::new(1, 1));
        let dnssec = Arc::new(crate::dnssec::DnssecEngine::new(dyn_store.clone()));
        let transfer = crate::transfer::TransferEngine::new(
            dyn_store.clone(),
            "ns1.example.test.".to_string(),
            None,
        );
        let update = crate::update::UpdateEngine::new(
            dyn_store.clone(),
            cache.clone(),
            Arc::new(Default::default()),
            transfer.clone(),
        );
        Arc::new(crate::query::QueryEngine::new(
            dyn_store,
            cache,
            limiter,
            BufferPool::new(2),
            dnssec,
            update,
            transfer,
        ))
    };

    let raw = build_query("www.example.test.", RecordType::A)
        .to_bytes(true)
        .expect("serialize");
    assert!(harness
        .handle_packet(&raw, client_addr(), Transport::Udp)
        .await
        .is_some());
    // the second packet burns into an empty bucket
    assert!(harness
        .handle_packet(&raw, client_addr(), Transport::Udp)
        .await
        .is_none());
}

#[tokio::test]
async fn test_apex_dnskey_served_from_key_table() {
    let harness = build_harness(Default::default());
    let zone = seed_example_zone(&harness.store).await;
    harness
        .dnssec
        .ensure_zone_keys(zone.id)
        .await
        .expect("keys");

    let response = run(&harness, &build_query("example.test.", RecordType::DNSKEY)).await;
    assert_eq!(response.header.rcode, Rcode::NoError);
    // the active KSK and ZSK both surface
    let dnskeys = response
        .answers
        .iter()
        .filter(|r| r.rrtype == RecordType::DNSKEY)
        .count();
    assert_eq!(dnskeys, 2);

    // an unsigned zone answers NXDOMAIN instead
    let other = build_harness(Default::default());
    seed_example_zone(&other.store).await;
    let response = run(&other, &build_query("example.test.", RecordType::DNSKEY)).await;
    assert_eq!(response.header.rcode, Rcode::NxDomain);
}

#[tokio::test]
async fn test_axfr_refused_over_udp() {
    let harness = build_harness(Default::default());
    seed_example_zone(&harness.store).await;
    let response = run(&harness, &build_query("example.test.", RecordType::AXFR)).await;
    assert_eq!(response.header.rcode, Rcode::Refused);
}
