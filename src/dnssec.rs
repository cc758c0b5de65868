//! DNSSEC signing: key lifecycle, RRSIG generation over canonically ordered
//! RRsets, DS/key-tag derivation and NSEC/NSEC3 denial proofs.
//! Ref [RFC4034](https://www.rfc-editor.org/rfc/rfc4034) and
//! [RFC5155](https://www.rfc-editor.org/rfc/rfc5155).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::digest;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::enums::{RecordClass, RecordType};
use crate::error::AuthNsError;
use crate::message::ResourceRecord;
use crate::name::{canonical_cmp, name_to_wire, normalize_name, rrsig_label_count};
use crate::nsec3::{nsec3_hash, zone_base32_encode};
use crate::rdata::RData;
use crate::store::{DnssecKey, KeyType, Record, Zone, ZoneStore};
use crate::wire::WireBuffer;

/// ECDSA Curve P-256 with SHA-256, the only algorithm we mint.
pub const ALGORITHM_ECDSA_P256_SHA256: u8 = 13;
/// DNSKEY protocol field is always 3.
const DNSKEY_PROTOCOL: u8 = 3;
/// Zone-signing key flags.
const FLAGS_ZSK: u16 = 0x0100;
/// Key-signing key flags: zone key + secure entry point.
const FLAGS_KSK: u16 = 0x0101;
/// SHA-256 DS digest type.
const DS_DIGEST_SHA256: u8 = 2;

/// Signatures are valid this long.
const SIGNATURE_VALIDITY: Duration = Duration::from_secs(30 * 86400);
/// Inception is backdated to absorb clock skew between validators.
const INCEPTION_OFFSET: Duration = Duration::from_secs(3600);
/// Key automation cadence.
const AUTOMATION_INTERVAL: Duration = Duration::from_secs(3600);
/// A superseded ZSK stays active this long so cached RRSIGs keep validating.
const ZSK_ROLLOVER_OVERLAP: Duration = Duration::from_secs(2 * 86400);

/// NSEC3 parameters as carried in a zone's NSEC3PARAM record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nsec3Params {
    pub hash_algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
}

impl Nsec3Params {
    /// Pull the parameters out of a zone's NSEC3PARAM row, if one exists.
    pub fn from_records(records: &[Record]) -> Option<Self> {
        let row = records
            .iter()
            .find(|r| r.rrtype == RecordType::NSEC3PARAM)?;
        match RData::from_presentation(RecordType::NSEC3PARAM, &row.rdata, None, None, None) {
            Ok(RData::NSEC3PARAM {
                hash_algorithm,
                flags,
                iterations,
                salt,
            }) => Some(Nsec3Params {
                hash_algorithm,
                flags,
                iterations,
                salt,
            }),
            _ => None,
        }
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// DNSKEY RDATA wire bytes for a key, the input to key-tag and DS digests.
fn dnskey_rdata_bytes(key: &DnssecKey) -> Vec<u8> {
    let flags = match key.key_type {
        KeyType::Ksk => FLAGS_KSK,
        KeyType::Zsk => FLAGS_ZSK,
    };
    let mut out = flags.to_be_bytes().to_vec();
    out.push(DNSKEY_PROTOCOL);
    out.push(key.algorithm);
    out.extend(&key.public_key);
    out
}

/// RFC4034 Appendix B key tag: ones-complement-ish sum over the DNSKEY RDATA.
pub fn key_tag(dnskey_rdata: &[u8]) -> u16 {
    let mut accum: u32 = 0;
    for (idx, byte) in dnskey_rdata.iter().enumerate() {
        if idx % 2 == 0 {
            accum += (*byte as u32) << 8;
        } else {
            accum += *byte as u32;
        }
    }
    accum += (accum >> 16) & 0xFFFF;
    (accum & 0xFFFF) as u16
}

pub struct DnssecEngine {
    store: Arc<dyn ZoneStore>,
    rng: SystemRandom,
}

impl DnssecEngine {
    pub fn new(store: Arc<dyn ZoneStore>) -> Self {
        DnssecEngine {
            store,
            rng: SystemRandom::new(),
        }
    }

    /// Mint a fresh ECDSA P-256 pair for the zone.
    pub fn generate_key(&self, zone_id: Uuid, key_type: KeyType) -> Result<DnssecKey, AuthNsError> {
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &self.rng)
            .map_err(|e| AuthNsError::Signing(format!("keygen: {e}")))?;
        let pair = EcdsaKeyPair::from_pkcs8(
            &ECDSA_P256_SHA256_FIXED_SIGNING,
            pkcs8.as_ref(),
            &self.rng,
        )
        .map_err(|e| AuthNsError::Signing(format!("keygen readback: {e}")))?;
        // uncompressed SEC1 point: 0x04 || X || Y; DNSKEY wants the bare coordinates
        let point = pair.public_key().as_ref();
        let public_key = point[1..].to_vec();
        Ok(DnssecKey {
            id: Uuid::now_v7(),
            zone_id,
            key_type,
            algorithm: ALGORITHM_ECDSA_P256_SHA256,
            private_key: BASE64.encode(pkcs8.as_ref()),
            public_key,
            active: true,
            created_at: chrono::Utc::now(),
        })
    }

    /// The zone's single active key of the requested type, newest first when
    /// a rollover briefly leaves two.
    pub async fn active_key(
        &self,
        zone_id: Uuid,
        key_type: KeyType,
    ) -> Result<Option<DnssecKey>, AuthNsError> {
        let mut keys: Vec<DnssecKey> = self
            .store
            .list_keys(zone_id)
            .await?
            .into_iter()
            .filter(|k| k.active && k.key_type == key_type)
            .collect();
        keys.sort_by_key(|k| k.created_at);
        Ok(keys.pop())
    }

    /// A zone is signed when it holds any active signing key.
    pub async fn zone_is_signed(&self, zone_id: Uuid) -> Result<bool, AuthNsError> {
        Ok(self
            .store
            .list_keys(zone_id)
            .await?
            .iter()
            .any(|k| k.active))
    }

    /// Make sure the zone has exactly one active KSK and one active ZSK,
    /// generating whatever is missing and retiring superseded ZSKs once the
    /// rollover overlap has passed.
    pub async fn ensure_zone_keys(&self, zone_id: Uuid) -> Result<(), AuthNsError> {
        for key_type in [KeyType::Ksk, KeyType::Zsk] {
            if self.active_key(zone_id, key_type).await?.is_none() {
                info!("generating {key_type:?} for zone {zone_id}");
                let key = self.generate_key(zone_id, key_type)?;
                self.store.create_key(key).await?;
            }
        }

        // two active ZSKs is a rollover in flight; retire the elder once the
        // overlap window has passed
        let mut zsks: Vec<DnssecKey> = self
            .store
            .list_keys(zone_id)
            .await?
            .into_iter()
            .filter(|k| k.active && k.key_type == KeyType::Zsk)
            .collect();
        if zsks.len() > 1 {
            zsks.sort_by_key(|k| k.created_at);
            let newest = zsks.pop().map(|k| k.created_at);
            for old in zsks {
                let overlap_done = newest.is_some_and(|n| {
                    (n - old.created_at).num_seconds() as u64 > ZSK_ROLLOVER_OVERLAP.as_secs()
                });
                if overlap_done {
                    info!("retiring superseded ZSK {} for zone {zone_id}", old.id);
                    self.store.deactivate_key(old.id).await?;
                }
            }
        }
        Ok(())
    }

    /// DNSKEY record for a key at the zone apex.
    pub fn dnskey_record(&self, zone: &Zone, key: &DnssecKey, ttl: u32) -> ResourceRecord {
        let flags = match key.key_type {
            KeyType::Ksk => FLAGS_KSK,
            KeyType::Zsk => FLAGS_ZSK,
        };
        ResourceRecord {
            name: zone.name.clone(),
            rrtype: RecordType::DNSKEY,
            class: RecordClass::Internet,
            ttl,
            rdata: RData::DNSKEY {
                flags,
                protocol: DNSKEY_PROTOCOL,
                algorithm: key.algorithm,
                public_key: key.public_key.clone(),
            },
        }
    }

    /// The apex DNSKEY RRset, synthesized from the zone's active keys
    /// rather than stored rows.
    pub async fn dnskey_records(
        &self,
        zone: &Zone,
        ttl: u32,
    ) -> Result<Vec<ResourceRecord>, AuthNsError> {
        let keys = self.store.list_keys(zone.id).await?;
        Ok(keys
            .iter()
            .filter(|k| k.active)
            .map(|k| self.dnskey_record(zone, k, ttl))
            .collect())
    }

    /// DS record material for the delegation in the parent zone.
    pub fn ds_record(&self, zone: &Zone, key: &DnssecKey, ttl: u32) -> ResourceRecord {
        let rdata = dnskey_rdata_bytes(key);
        let mut input = name_to_wire(&zone.name);
        input.extend(&rdata);
        let hashed = digest::digest(&digest::SHA256, &input);
        ResourceRecord {
            name: zone.name.clone(),
            rrtype: RecordType::DS,
            class: RecordClass::Internet,
            ttl,
            rdata: RData::DS {
                key_tag: key_tag(&rdata),
                algorithm: key.algorithm,
                digest_type: DS_DIGEST_SHA256,
                digest: hashed.as_ref().to_vec(),
            },
        }
    }

    /// Sign one RRset (records sharing a lowercased name and type) with the
    /// given key, producing the adjacent RRSIG.
    pub fn sign_rrset(
        &self,
        zone: &Zone,
        key: &DnssecKey,
        rrset: &[ResourceRecord],
    ) -> Result<ResourceRecord, AuthNsError> {
        let first = rrset
            .first()
            .ok_or_else(|| AuthNsError::Signing("empty rrset".to_string()))?;
        let owner = normalize_name(&first.name);
        let type_covered = first.rrtype as u16;
        let original_ttl = first.ttl;
        let now = now_epoch();
        let expiration = (now + SIGNATURE_VALIDITY.as_secs()) as u32;
        let inception = now.saturating_sub(INCEPTION_OFFSET.as_secs()) as u32;
        let tag = key_tag(&dnskey_rdata_bytes(key));

        // RRSIG RDATA minus the signature, in canonical (uncompressed,
        // lowercase) form, followed by each RR in canonical form sorted by
        // RDATA octets. RFC4034 section 3.1.8.1.
        let mut signing_input = vec![];
        signing_input.extend(type_covered.to_be_bytes());
        signing_input.push(key.algorithm);
        signing_input.push(rrsig_label_count(&owner));
        signing_input.extend(original_ttl.to_be_bytes());
        signing_input.extend(expiration.to_be_bytes());
        signing_input.extend(inception.to_be_bytes());
        signing_input.extend(tag.to_be_bytes());
        signing_input.extend(name_to_wire(&zone.name));

        let mut canonical_rdatas: Vec<Vec<u8>> = vec![];
        for record in rrset {
            let mut buf = WireBuffer::new();
            record.rdata.encode(&mut buf)?;
            canonical_rdatas.push(buf.bytes().to_vec());
        }
        canonical_rdatas.sort();

        let owner_wire = name_to_wire(&owner);
        for rdata in &canonical_rdatas {
            signing_input.extend(&owner_wire);
            signing_input.extend(type_covered.to_be_bytes());
            signing_input.extend((RecordClass::Internet as u16).to_be_bytes());
            signing_input.extend(original_ttl.to_be_bytes());
            signing_input.extend((rdata.len() as u16).to_be_bytes());
            signing_input.extend(rdata);
        }

        let pkcs8 = BASE64
            .decode(&key.private_key)
            .map_err(|e| AuthNsError::Signing(format!("private key decode: {e}")))?;
        let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &pkcs8, &self.rng)
            .map_err(|e| AuthNsError::Signing(format!("private key parse: {e}")))?;
        let signature = pair
            .sign(&self.rng, &signing_input)
            .map_err(|e| AuthNsError::Signing(format!("sign: {e}")))?;

        Ok(ResourceRecord {
            name: owner,
            rrtype: RecordType::RRSIG,
            class: RecordClass::Internet,
            ttl: original_ttl,
            rdata: RData::RRSIG {
                type_covered,
                algorithm: key.algorithm,
                labels: rrsig_label_count(&first.name),
                original_ttl,
                expiration,
                inception,
                key_tag: tag,
                signer_name: zone.name.as_str().into(),
                signature: signature.as_ref().to_vec(),
            },
        })
    }

    /// Sign every RRset in the slice, returning the records with RRSIGs
    /// appended beside their sets. RRSIG, OPT and TSIG are never re-signed.
    pub fn sign_records(
        &self,
        zone: &Zone,
        key: &DnssecKey,
        records: &[ResourceRecord],
    ) -> Result<Vec<ResourceRecord>, AuthNsError> {
        let mut grouped: BTreeMap<(String, u16), Vec<ResourceRecord>> = BTreeMap::new();
        let mut order: Vec<(String, u16)> = vec![];
        for record in records {
            if record.rrtype.excluded_from_signing() {
                continue;
            }
            let group = (normalize_name(&record.name), record.rrtype as u16);
            if !grouped.contains_key(&group) {
                order.push(group.clone());
            }
            grouped.entry(group).or_default().push(record.clone());
        }

        let mut out = vec![];
        for group in order {
            let rrset = &grouped[&group];
            let rrsig = self.sign_rrset(zone, key, rrset)?;
            out.extend(rrset.iter().cloned());
            out.push(rrsig);
        }
        // pass through anything we skipped, OPT and friends keep their place
        for record in records {
            if record.rrtype.excluded_from_signing() {
                out.push(record.clone());
            }
        }
        Ok(out)
    }

    /// Build the NSEC record proving the query name falls in a gap.
    /// Owners are the unique names in the zone sorted canonically; the
    /// interval wraps from the last owner back to the first.
    pub fn nsec_proof(
        &self,
        zone_records: &[Record],
        qname: &str,
        ttl: u32,
    ) -> Result<ResourceRecord, AuthNsError> {
        let mut owners: Vec<String> = vec![];
        let mut types_at: BTreeMap<String, Vec<u16>> = BTreeMap::new();
        for record in zone_records {
            let name = normalize_name(&record.name);
            if !owners.contains(&name) {
                owners.push(name.clone());
            }
            types_at
                .entry(name)
                .or_default()
                .push(record.rrtype as u16);
        }
        if owners.is_empty() {
            return Err(AuthNsError::Signing("zone has no owners".to_string()));
        }
        owners.sort_by(|a, b| canonical_cmp(a, b));

        let qname = normalize_name(qname);
        // the last owner at or before the query name, wrapping when the
        // query sorts before everything
        let position = owners
            .iter()
            .rposition(|owner| canonical_cmp(owner, &qname) != std::cmp::Ordering::Greater);
        let (owner_idx, next_idx) = match position {
            Some(idx) => (idx, (idx + 1) % owners.len()),
            None => (owners.len() - 1, 0),
        };
        let owner = owners[owner_idx].clone();
        let next = owners[next_idx].clone();

        let mut types = types_at.remove(&owner).unwrap_or_default();
        types.push(RecordType::NSEC as u16);

        Ok(ResourceRecord {
            name: owner,
            rrtype: RecordType::NSEC,
            class: RecordClass::Internet,
            ttl,
            rdata: RData::NSEC {
                next_name: next.as_str().into(),
                types,
            },
        })
    }

    /// Build the NSEC3 record whose hash interval encloses the hash of the
    /// query name.
    pub fn nsec3_proof(
        &self,
        zone: &Zone,
        params: &Nsec3Params,
        zone_records: &[Record],
        qname: &str,
        ttl: u32,
    ) -> Result<ResourceRecord, AuthNsError> {
        let mut owners: Vec<String> = vec![];
        let mut types_at: BTreeMap<String, Vec<u16>> = BTreeMap::new();
        for record in zone_records {
            let name = normalize_name(&record.name);
            if !owners.contains(&name) {
                owners.push(name.clone());
            }
            types_at
                .entry(name)
                .or_default()
                .push(record.rrtype as u16);
        }
        if owners.is_empty() {
            return Err(AuthNsError::Signing("zone has no owners".to_string()));
        }

        let mut hashed: Vec<(Vec<u8>, String)> = owners
            .into_iter()
            .map(|owner| {
                (
                    nsec3_hash(&owner, params.iterations, &params.salt),
                    owner,
                )
            })
            .collect();
        hashed.sort_by(|a, b| a.0.cmp(&b.0));

        let query_hash = nsec3_hash(&normalize_name(qname), params.iterations, &params.salt);
        let position = hashed.iter().rposition(|(hash, _)| hash <= &query_hash);
        let (owner_idx, next_idx) = match position {
            Some(idx) => (idx, (idx + 1) % hashed.len()),
            None => (hashed.len() - 1, 0),
        };
        let (owner_hash, owner_name) = hashed[owner_idx].clone();
        let (next_hash, _) = hashed[next_idx].clone();

        let mut types = types_at.remove(&owner_name).unwrap_or_default();
        types.push(RecordType::NSEC3 as u16);

        Ok(ResourceRecord {
            name: format!("{}.{}", zone_base32_encode(&owner_hash), zone.name),
            rrtype: RecordType::NSEC3,
            class: RecordClass::Internet,
            ttl,
            rdata: RData::NSEC3 {
                hash_algorithm: params.hash_algorithm,
                flags: params.flags,
                iterations: params.iterations,
                salt: params.salt.clone(),
                next_hashed: next_hash,
                types,
            },
        })
    }
}

/// Hourly key automation: every zone holding keys keeps exactly one active
/// KSK and one active ZSK.
pub fn spawn_key_automation(engine: Arc<DnssecEngine>, store: Arc<dyn ZoneStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(AUTOMATION_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let zones = match store.list_zones(None).await {
                Ok(value) => value,
                Err(err) => {
                    error!("key automation could not list zones: {err}");
                    continue;
                }
            };
            for zone in zones {
                let has_keys = match store.list_keys(zone.id).await {
                    Ok(keys) => !keys.is_empty(),
                    Err(err) => {
                        error!("key automation could not list keys for {}: {err}", zone.name);
                        continue;
                    }
                };
                if !has_keys {
                    continue;
                }
                debug!("key automation pass for {}", zone.name);
                if let Err(err) = engine.ensure_zone_keys(zone.id).await {
                    error!("key automation failed for {}: {err}", zone.name);
                }
            }
        }
    })
}
