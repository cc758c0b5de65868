use std::cmp::Ordering;

use crate::dnssec::{key_tag, Nsec3Params};
use crate::enums::{RecordClass, RecordType};
use crate::message::ResourceRecord;
use crate::name::canonical_cmp;
use crate::nsec3::nsec3_hash;
use crate::rdata::RData;
use crate::store::{KeyType, Record, ZoneStore};
use crate::tests::test_harness::{build_harness, seed_example_zone};

#[tokio::test]
async fn test_generate_key_shape() {
    let harness = build_harness(Default::default());
    let zone = seed_example_zone(&harness.store).await;
    let key = harness
        .dnssec
        .generate_key(zone.id, KeyType::Zsk)
        .expect("generate");
    assert_eq!(key.algorithm, 13);
    // P-256 point, both coordinates
    assert_eq!(key.public_key.len(), 64);
    assert!(key.active);
}

#[tokio::test]
async fn test_ensure_zone_keys_creates_one_of_each() {
    let harness = build_harness(Default::default());
    let zone = seed_example_zone(&harness.store).await;
    harness
        .dnssec
        .ensure_zone_keys(zone.id)
        .await
        .expect("ensure");
    let keys = harness.store.list_keys(zone.id).await.expect("list");
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().any(|k| k.key_type == KeyType::Ksk && k.active));
    assert!(keys.iter().any(|k| k.key_type == KeyType::Zsk && k.active));

    // a second pass is a no-op
    harness
        .dnssec
        .ensure_zone_keys(zone.id)
        .await
        .expect("ensure again");
    assert_eq!(harness.store.list_keys(zone.id).await.expect("list").len(), 2);
}

#[test]
fn test_key_tag_reference_shape() {
    // the RFC4034 appendix B accumulation over a tiny fixed rdata
    let rdata = vec![0x01, 0x01, 0x03, 0x0D, 0xAB, 0xCD];
    let tag = key_tag(&rdata);
    let expected = {
        let mut accum: u32 = (0x0101 + 0x030D + 0xABCD) as u32;
        accum += (accum >> 16) & 0xFFFF;
        (accum & 0xFFFF) as u16
    };
    assert_eq!(tag, expected);
}

#[tokio::test]
async fn test_sign_rrset_produces_p256_signature() {
    let harness = build_harness(Default::default());
    let zone = seed_example_zone(&harness.store).await;
    harness
        .dnssec
        .ensure_zone_keys(zone.id)
        .await
        .expect("ensure");
    let zsk = harness
        .dnssec
        .active_key(zone.id, KeyType::Zsk)
        .await
        .expect("query")
        .expect("present");

    let rrset = vec![ResourceRecord {
        name: "www.example.test.".to_string(),
        rrtype: RecordType::A,
        class: RecordClass::Internet,
        ttl: 300,
        rdata: RData::A {
            address: [10, 0, 0, 2].into(),
        },
    }];
    let rrsig = harness
        .dnssec
        .sign_rrset(&zone, &zsk, &rrset)
        .expect("sign");
    assert_eq!(rrsig.rrtype, RecordType::RRSIG);
    let RData::RRSIG {
        type_covered,
        algorithm,
        labels,
        original_ttl,
        signer_name,
        signature,
        expiration,
        inception,
        ..
    } = &rrsig.rdata
    else {
        panic!("not an RRSIG");
    };
    assert_eq!(*type_covered, RecordType::A as u16);
    assert_eq!(*algorithm, 13);
    assert_eq!(*labels, 3);
    assert_eq!(*original_ttl, 300);
    assert_eq!(signer_name.name, "example.test.");
    // fixed-width ECDSA P-256: r || s
    assert_eq!(signature.len(), 64);
    assert!(expiration > inception);
}

#[tokio::test]
async fn test_sign_records_groups_rrsets() {
    let harness = build_harness(Default::default());
    let zone = seed_example_zone(&harness.store).await;
    harness
        .dnssec
        .ensure_zone_keys(zone.id)
        .await
        .expect("ensure");
    let zsk = harness
        .dnssec
        .active_key(zone.id, KeyType::Zsk)
        .await
        .expect("query")
        .expect("present");

    let records = vec![
        ResourceRecord {
            name: "multi.example.test.".to_string(),
            rrtype: RecordType::A,
            class: RecordClass::Internet,
            ttl: 60,
            rdata: RData::A {
                address: [10, 0, 0, 3].into(),
            },
        },
        ResourceRecord {
            name: "multi.example.test.".to_string(),
            rrtype: RecordType::A,
            class: RecordClass::Internet,
            ttl: 60,
            rdata: RData::A {
                address: [10, 0, 0, 4].into(),
            },
        },
        ResourceRecord {
            name: "multi.example.test.".to_string(),
            rrtype: RecordType::TXT,
            class: RecordClass::Internet,
            ttl: 60,
            rdata: RData::TXT {
                txtdata: "hello".into(),
            },
        },
    ];
    let signed = harness
        .dnssec
        .sign_records(&zone, &zsk, &records)
        .expect("sign");
    // two RRsets -> three originals plus two RRSIGs
    assert_eq!(signed.len(), 5);
    let rrsig_count = signed
        .iter()
        .filter(|r| r.rrtype == RecordType::RRSIG)
        .count();
    assert_eq!(rrsig_count, 2);
}

#[tokio::test]
async fn test_ds_record_digest() {
    let harness = build_harness(Default::default());
    let zone = seed_example_zone(&harness.store).await;
    harness
        .dnssec
        .ensure_zone_keys(zone.id)
        .await
        .expect("ensure");
    let ksk = harness
        .dnssec
        .active_key(zone.id, KeyType::Ksk)
        .await
        .expect("query")
        .expect("present");
    let ds = harness.dnssec.ds_record(&zone, &ksk, 300);
    let RData::DS {
        digest_type,
        digest,
        algorithm,
        ..
    } = &ds.rdata
    else {
        panic!("not a DS");
    };
    assert_eq!(*digest_type, 2);
    assert_eq!(*algorithm, 13);
    // SHA-256
    assert_eq!(digest.len(), 32);
}

#[tokio::test]
async fn test_nsec_interval_encloses_query_name() {
    let harness = build_harness(Default::default());
    let zone = seed_example_zone(&harness.store).await;
    let rows = harness
        .store
        .list_records_for_zone(zone.id)
        .await
        .expect("rows");

    let qname = "absent.example.test.";
    let nsec = harness.dnssec.nsec_proof(&rows, qname, 300).expect("nsec");
    let RData::NSEC { next_name, types } = &nsec.rdata else {
        panic!("not an NSEC");
    };
    // canonical_cmp(owner, q) <= 0 < canonical_cmp(next, q), or the
    // interval wraps
    let owner_le = canonical_cmp(&nsec.name, qname) != Ordering::Greater;
    let next_gt = canonical_cmp(&next_name.name, qname) == Ordering::Greater;
    let wraps = canonical_cmp(&next_name.name, &nsec.name) != Ordering::Greater;
    assert!(owner_le);
    assert!(next_gt || wraps);
    assert!(types.contains(&(RecordType::NSEC as u16)));
}

#[tokio::test]
async fn test_nsec_exact_match_uses_owner() {
    let harness = build_harness(Default::default());
    let zone = seed_example_zone(&harness.store).await;
    let rows = harness
        .store
        .list_records_for_zone(zone.id)
        .await
        .expect("rows");

    let nsec = harness
        .dnssec
        .nsec_proof(&rows, "www.example.test.", 300)
        .expect("nsec");
    assert_eq!(nsec.name, "www.example.test.");
    let RData::NSEC { types, .. } = &nsec.rdata else {
        panic!("not an NSEC");
    };
    assert!(types.contains(&(RecordType::A as u16)));
}

#[tokio::test]
async fn test_nsec3_interval_encloses_query_hash() {
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
    let rows = harness
        .store
        .list_records_for_zone(zone.id)
        .await
        .expect("rows");
    let params = Nsec3Params::from_records(&rows).expect("params");
    assert_eq!(params.iterations, 10);
    assert_eq!(params.salt, vec![0xAB, 0xCD]);

    let qname = "absent.example.test.";
    let nsec3 = harness
        .dnssec
        .nsec3_proof(&zone, &params, &rows, qname, 300)
        .expect("nsec3");
    let RData::NSEC3 {
        next_hashed, types, ..
    } = &nsec3.rdata
    else {
        panic!("not an NSEC3");
    };
    assert!(types.contains(&(RecordType::NSEC3 as u16)));
    assert!(nsec3.name.ends_with(&zone.name));

    // the owner hash is in the record name; verify the interval property
    let owner_b32 = nsec3.name.trim_end_matches(&zone.name).trim_end_matches('.');
    let qhash = nsec3_hash(qname, params.iterations, &params.salt);
    let owner_hash_b32 = crate::nsec3::zone_base32_encode(&qhash);
    // either the owner precedes the query hash, or the interval wraps
    let wraps = next_hashed < &qhash;
    assert!(owner_b32 <= owner_hash_b32.as_str() || wraps);
}
