//! TSIG signing and verification, [RFC2845](https://www.rfc-editor.org/rfc/rfc2845).
//!
//! The MAC covers the serialized message followed by the canonical TSIG
//! variables; the record itself rides last in the additional section and is
//! excluded from its own MAC by construction.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use ring::hmac;
use serde::{Deserialize, Serialize};

use crate::enums::{RecordClass, RecordType};
use crate::error::{AuthNsError, TsigError};
use crate::message::{Message, ResourceRecord};
use crate::name::{name_to_wire, normalize_name};
use crate::rdata::RData;
use crate::wire::WireBuffer;

/// Seconds of clock drift we sign with and accept.
pub const TSIG_FUDGE: u16 = 300;

pub const ALGORITHM_HMAC_SHA256: &str = "hmac-sha256.";
pub const ALGORITHM_HMAC_SHA1: &str = "hmac-sha1.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TsigAlgorithm {
    HmacSha256,
    HmacSha1,
}

impl TsigAlgorithm {
    pub fn wire_name(&self) -> &'static str {
        match self {
            TsigAlgorithm::HmacSha256 => ALGORITHM_HMAC_SHA256,
            TsigAlgorithm::HmacSha1 => ALGORITHM_HMAC_SHA1,
        }
    }

    pub fn from_wire_name(name: &str) -> Result<Self, TsigError> {
        match normalize_name(name).as_str() {
            ALGORITHM_HMAC_SHA256 => Ok(TsigAlgorithm::HmacSha256),
            ALGORITHM_HMAC_SHA1 => Ok(TsigAlgorithm::HmacSha1),
            _ => Err(TsigError::BadAlgorithm),
        }
    }

    fn hmac_algorithm(&self) -> hmac::Algorithm {
        match self {
            TsigAlgorithm::HmacSha256 => hmac::HMAC_SHA256,
            TsigAlgorithm::HmacSha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
        }
    }
}

/// A shared-secret key as configured. Names are domain-shaped and matched
/// case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TsigKey {
    pub name: String,
    pub algorithm: TsigAlgorithm,
    pub secret: Vec<u8>,
}

impl TsigKey {
    pub fn new(name: &str, algorithm: TsigAlgorithm, secret: &[u8]) -> Self {
        TsigKey {
            name: normalize_name(name),
            algorithm,
            secret: secret.to_vec(),
        }
    }
}

pub type TsigKeyring = HashMap<String, TsigKey>;

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// The canonical TSIG variables: key name, class ANY, TTL 0, algorithm name,
/// time, fudge, error, other. Names go in uncompressed and lowercase.
fn canonical_variables(
    key_name: &str,
    algorithm: &str,
    time_signed: u64,
    fudge: u16,
    error: u16,
    other: &[u8],
) -> Vec<u8> {
    let mut vars = name_to_wire(key_name);
    vars.extend((RecordClass::Any as u16).to_be_bytes());
    vars.extend(0u32.to_be_bytes());
    vars.extend(name_to_wire(algorithm));
    vars.extend(((time_signed >> 32) as u16).to_be_bytes());
    vars.extend((time_signed as u32).to_be_bytes());
    vars.extend(fudge.to_be_bytes());
    vars.extend(error.to_be_bytes());
    vars.extend((other.len() as u16).to_be_bytes());
    vars.extend(other);
    vars
}

/// Sign a fully serialized packet in place: append the TSIG record and bump
/// ARCOUNT in the wire bytes. Returns the offset where the record landed.
pub fn sign_message(packet: &mut Vec<u8>, key: &TsigKey) -> Result<usize, AuthNsError> {
    if packet.len() < crate::HEADER_BYTES {
        return Err(AuthNsError::EndOfBuffer);
    }
    let time_signed = now_epoch();
    let vars = canonical_variables(
        &key.name,
        key.algorithm.wire_name(),
        time_signed,
        TSIG_FUDGE,
        0,
        &[],
    );

    let mut mac_input = packet.clone();
    mac_input.extend(&vars);
    let hmac_key = hmac::Key::new(key.algorithm.hmac_algorithm(), &key.secret);
    let mac = hmac::sign(&hmac_key, &mac_input).as_ref().to_vec();

    let original_id = u16::from_be_bytes([packet[0], packet[1]]);
    let record = ResourceRecord {
        name: key.name.clone(),
        rrtype: RecordType::TSIG,
        class: RecordClass::Any,
        ttl: 0,
        rdata: RData::TSIG {
            algorithm: key.algorithm.wire_name().into(),
            time_signed,
            fudge: TSIG_FUDGE,
            mac,
            original_id,
            error: 0,
            other: vec![],
        },
    };

    let tsig_offset = packet.len();
    let mut buf = WireBuffer::new();
    record.write(&mut buf)?;
    packet.extend(buf.bytes());

    let arcount = u16::from_be_bytes([packet[10], packet[11]]).wrapping_add(1);
    packet[10..12].copy_from_slice(&arcount.to_be_bytes());
    Ok(tsig_offset)
}

/// Verify a parsed message against the keyring. The raw bytes are required:
/// the MAC covers the packet exactly as it arrived, minus the TSIG record
/// and with ARCOUNT decremented back.
pub fn verify_message(
    raw: &[u8],
    message: &Message,
    keyring: &TsigKeyring,
) -> Result<TsigKey, TsigError> {
    let tsig_offset = message.tsig_offset.ok_or(TsigError::NotPresent)?;
    let record = message.tsig().ok_or(TsigError::NotPresent)?;
    let RData::TSIG {
        algorithm,
        time_signed,
        fudge,
        mac,
        error,
        other,
        ..
    } = &record.rdata
    else {
        return Err(TsigError::NotPresent);
    };

    let key = keyring
        .get(&normalize_name(&record.name))
        .ok_or(TsigError::UnknownKey)?;
    let algorithm = TsigAlgorithm::from_wire_name(&algorithm.name)?;
    if algorithm != key.algorithm {
        return Err(TsigError::BadAlgorithm);
    }

    let drift = now_epoch().abs_diff(*time_signed);
    if drift > *fudge as u64 {
        return Err(TsigError::TimeDriftExceeded);
    }

    if tsig_offset > raw.len() || tsig_offset < crate::HEADER_BYTES {
        return Err(TsigError::NotPresent);
    }
    let mut prefix = raw[..tsig_offset].to_vec();
    let arcount = u16::from_be_bytes([prefix[10], prefix[11]]).wrapping_sub(1);
    prefix[10..12].copy_from_slice(&arcount.to_be_bytes());
    prefix.extend(canonical_variables(
        &key.name,
        key.algorithm.wire_name(),
        *time_signed,
        *fudge,
        *error,
        other,
    ));

    let hmac_key = hmac::Key::new(key.algorithm.hmac_algorithm(), &key.secret);
    hmac::verify(&hmac_key, &prefix, mac).map_err(|_| TsigError::MacMismatch)?;
    Ok(key.clone())
}
