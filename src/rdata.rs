//! RDATA variants and their wire encodings.

use std::fmt::Display;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::enums::RecordType;
use crate::error::AuthNsError;
use crate::wire::WireBuffer;

/// A normalized domain name: lowercase, trailing dot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DomainName {
    pub name: String,
}

impl From<&str> for DomainName {
    fn from(input: &str) -> Self {
        DomainName {
            name: crate::name::normalize_name(input),
        }
    }
}

impl From<String> for DomainName {
    fn from(name: String) -> Self {
        DomainName::from(name.as_str())
    }
}

impl Display for DomainName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// <character-string> is a single length octet followed by that number of
/// characters, at most 255 of them.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DNSCharString {
    pub data: Vec<u8>,
}

impl From<&str> for DNSCharString {
    fn from(input: &str) -> Self {
        let mut data: Vec<u8> = input.into();
        data.truncate(255);
        DNSCharString { data }
    }
}

impl Display for DNSCharString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.data))
    }
}

impl DNSCharString {
    fn encode(&self, buf: &mut WireBuffer) -> Result<(), AuthNsError> {
        buf.write_u8(self.data.len().min(255) as u8)?;
        buf.write_bytes(&self.data[..self.data.len().min(255)])
    }

    fn decode(buf: &mut WireBuffer) -> Result<Self, AuthNsError> {
        let len = buf.read_u8()? as usize;
        Ok(DNSCharString {
            data: buf.read_bytes(len)?,
        })
    }
}

/// An EDNS option as carried in OPT RDATA: code, then length-prefixed data.
/// We pass these through without interpreting them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

/// The tagged RDATA for every record type the server speaks, plus a raw
/// passthrough for anything it does not.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RData {
    A {
        address: Ipv4Addr,
    },
    AAAA {
        address: Ipv6Addr,
    },
    NS {
        nsdname: DomainName,
    },
    MD {
        madname: DomainName,
    },
    MF {
        madname: DomainName,
    },
    CNAME {
        cname: DomainName,
    },
    SOA {
        mname: DomainName,
        rname: DomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    MB {
        madname: DomainName,
    },
    MG {
        mgmname: DomainName,
    },
    MR {
        newname: DomainName,
    },
    PTR {
        ptrdname: DomainName,
    },
    HINFO {
        cpu: DNSCharString,
        os: DNSCharString,
    },
    MINFO {
        rmailbx: DomainName,
        emailbx: DomainName,
    },
    MX {
        preference: u16,
        exchange: DomainName,
    },
    TXT {
        txtdata: DNSCharString,
    },
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        /// never compressed on the wire
        target: DomainName,
    },
    OPT {
        /// advertised UDP payload size (lives in the CLASS field)
        udp_size: u16,
        /// extended RCODE bits, top 8 of the TTL field
        ext_rcode: u8,
        version: u8,
        /// Z flags; the top bit is DO
        flags: u16,
        options: Vec<EdnsOption>,
    },
    TSIG {
        algorithm: DomainName,
        time_signed: u64,
        fudge: u16,
        mac: Vec<u8>,
        original_id: u16,
        error: u16,
        other: Vec<u8>,
    },
    DNSKEY {
        flags: u16,
        protocol: u8,
        algorithm: u8,
        public_key: Vec<u8>,
    },
    RRSIG {
        type_covered: u16,
        algorithm: u8,
        labels: u8,
        original_ttl: u32,
        expiration: u32,
        inception: u32,
        key_tag: u16,
        /// never compressed on the wire
        signer_name: DomainName,
        signature: Vec<u8>,
    },
    DS {
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: Vec<u8>,
    },
    NSEC {
        /// never compressed on the wire
        next_name: DomainName,
        /// type codes present at the owner
        types: Vec<u16>,
    },
    NSEC3 {
        hash_algorithm: u8,
        flags: u8,
        iterations: u16,
        salt: Vec<u8>,
        next_hashed: Vec<u8>,
        types: Vec<u16>,
    },
    NSEC3PARAM {
        hash_algorithm: u8,
        flags: u8,
        iterations: u16,
        salt: Vec<u8>,
    },
    /// RDLENGTH=0, the RFC2136 "delete RRset" form and empty-question frames
    Empty,
    Unknown {
        rrtype: u16,
        bytes: Vec<u8>,
    },
}

/// Build an RFC4034 type bit map: window number, window length, then the
/// bitmask where bit k (MSB first within each byte) marks type code k.
pub fn encode_type_bitmap(types: &[u16]) -> Vec<u8> {
    let mut sorted: Vec<u16> = types.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let mut out = vec![];
    let mut window: Option<(u8, [u8; 32], usize)> = None;
    for code in sorted {
        let win = (code >> 8) as u8;
        let low = (code & 0xFF) as usize;
        if window.map(|(w, _, _)| w) != Some(win) {
            if let Some((w, bits, maxlen)) = window.take() {
                out.push(w);
                out.push(maxlen as u8);
                out.extend(&bits[..maxlen]);
            }
            window = Some((win, [0u8; 32], 0));
        }
        if let Some((_, bits, maxlen)) = &mut window {
            bits[low / 8] |= 0x80 >> (low % 8);
            *maxlen = (*maxlen).max(low / 8 + 1);
        }
    }
    if let Some((w, bits, maxlen)) = window {
        out.push(w);
        out.push(maxlen as u8);
        out.extend(&bits[..maxlen]);
    }
    out
}

fn decode_type_bitmap(buf: &mut WireBuffer, end: usize) -> Result<Vec<u16>, AuthNsError> {
    let mut types = vec![];
    while buf.pos() < end {
        let window = buf.read_u8()? as u16;
        let len = buf.read_u8()? as usize;
        let bits = buf.read_bytes(len)?;
        for (byte_idx, byte) in bits.iter().enumerate() {
            for bit in 0..8 {
                if byte & (0x80 >> bit) != 0 {
                    types.push((window << 8) | (byte_idx as u16 * 8 + bit as u16));
                }
            }
        }
    }
    Ok(types)
}

impl RData {
    /// The wire type code this payload belongs to.
    pub fn record_type(&self) -> RecordType {
        match self {
            RData::A { .. } => RecordType::A,
            RData::AAAA { .. } => RecordType::AAAA,
            RData::NS { .. } => RecordType::NS,
            RData::MD { .. } => RecordType::MD,
            RData::MF { .. } => RecordType::MF,
            RData::CNAME { .. } => RecordType::CNAME,
            RData::SOA { .. } => RecordType::SOA,
            RData::MB { .. } => RecordType::MB,
            RData::MG { .. } => RecordType::MG,
            RData::MR { .. } => RecordType::MR,
            RData::PTR { .. } => RecordType::PTR,
            RData::HINFO { .. } => RecordType::HINFO,
            RData::MINFO { .. } => RecordType::MINFO,
            RData::MX { .. } => RecordType::MX,
            RData::TXT { .. } => RecordType::TXT,
            RData::SRV { .. } => RecordType::SRV,
            RData::OPT { .. } => RecordType::OPT,
            RData::TSIG { .. } => RecordType::TSIG,
            RData::DNSKEY { .. } => RecordType::DNSKEY,
            RData::RRSIG { .. } => RecordType::RRSIG,
            RData::DS { .. } => RecordType::DS,
            RData::NSEC { .. } => RecordType::NSEC,
            RData::NSEC3 { .. } => RecordType::NSEC3,
            RData::NSEC3PARAM { .. } => RecordType::NSEC3PARAM,
            RData::Empty => RecordType::InvalidType,
            RData::Unknown { rrtype, .. } => RecordType::from(*rrtype),
        }
    }

    /// Encode just the RDATA octets at the buffer cursor. The caller owns
    /// the RDLENGTH placeholder dance.
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<(), AuthNsError> {
        match self {
            RData::A { address } => buf.write_bytes(&address.octets()),
            RData::AAAA { address } => buf.write_bytes(&address.octets()),
            RData::NS { nsdname } => buf.write_name(&nsdname.name),
            RData::MD { madname } | RData::MF { madname } | RData::MB { madname } => {
                buf.write_name(&madname.name)
            }
            RData::MG { mgmname } => buf.write_name(&mgmname.name),
            RData::MR { newname } => buf.write_name(&newname.name),
            RData::CNAME { cname } => buf.write_name(&cname.name),
            RData::PTR { ptrdname } => buf.write_name(&ptrdname.name),
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                buf.write_name(&mname.name)?;
                buf.write_name(&rname.name)?;
                buf.write_u32(*serial)?;
                buf.write_u32(*refresh)?;
                buf.write_u32(*retry)?;
                buf.write_u32(*expire)?;
                buf.write_u32(*minimum)
            }
            RData::HINFO { cpu, os } => {
                cpu.encode(buf)?;
                os.encode(buf)
            }
            RData::MINFO { rmailbx, emailbx } => {
                buf.write_name(&rmailbx.name)?;
                buf.write_name(&emailbx.name)
            }
            RData::MX {
                preference,
                exchange,
            } => {
                buf.write_u16(*preference)?;
                buf.write_name(&exchange.name)
            }
            RData::TXT { txtdata } => txtdata.encode(buf),
            RData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                buf.write_u16(*priority)?;
                buf.write_u16(*weight)?;
                buf.write_u16(*port)?;
                buf.write_name_plain(&target.name)
            }
            RData::OPT { options, .. } => {
                for opt in options {
                    buf.write_u16(opt.code)?;
                    buf.write_u16(opt.data.len() as u16)?;
                    buf.write_bytes(&opt.data)?;
                }
                Ok(())
            }
            RData::TSIG {
                algorithm,
                time_signed,
                fudge,
                mac,
                original_id,
                error,
                other,
            } => {
                buf.write_name_plain(&algorithm.name)?;
                // 48-bit time split high u16, low u32
                buf.write_u16((time_signed >> 32) as u16)?;
                buf.write_u32(*time_signed as u32)?;
                buf.write_u16(*fudge)?;
                buf.write_u16(mac.len() as u16)?;
                buf.write_bytes(mac)?;
                buf.write_u16(*original_id)?;
                buf.write_u16(*error)?;
                buf.write_u16(other.len() as u16)?;
                buf.write_bytes(other)
            }
            RData::DNSKEY {
                flags,
                protocol,
                algorithm,
                public_key,
            } => {
                buf.write_u16(*flags)?;
                buf.write_u8(*protocol)?;
                buf.write_u8(*algorithm)?;
                buf.write_bytes(public_key)
            }
            RData::RRSIG {
                type_covered,
                algorithm,
                labels,
                original_ttl,
                expiration,
                inception,
                key_tag,
                signer_name,
                signature,
            } => {
                buf.write_u16(*type_covered)?;
                buf.write_u8(*algorithm)?;
                buf.write_u8(*labels)?;
                buf.write_u32(*original_ttl)?;
                buf.write_u32(*expiration)?;
                buf.write_u32(*inception)?;
                buf.write_u16(*key_tag)?;
                buf.write_name_plain(&signer_name.name)?;
                buf.write_bytes(signature)
            }
            RData::DS {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => {
                buf.write_u16(*key_tag)?;
                buf.write_u8(*algorithm)?;
                buf.write_u8(*digest_type)?;
                buf.write_bytes(digest)
            }
            RData::NSEC { next_name, types } => {
                buf.write_name_plain(&next_name.name)?;
                buf.write_bytes(&encode_type_bitmap(types))
            }
            RData::NSEC3 {
                hash_algorithm,
                flags,
                iterations,
                salt,
                next_hashed,
                types,
            } => {
                buf.write_u8(*hash_algorithm)?;
                buf.write_u8(*flags)?;
                buf.write_u16(*iterations)?;
                buf.write_u8(salt.len() as u8)?;
                buf.write_bytes(salt)?;
                buf.write_u8(next_hashed.len() as u8)?;
                buf.write_bytes(next_hashed)?;
                buf.write_bytes(&encode_type_bitmap(types))
            }
            RData::NSEC3PARAM {
                hash_algorithm,
                flags,
                iterations,
                salt,
            } => {
                buf.write_u8(*hash_algorithm)?;
                buf.write_u8(*flags)?;
                buf.write_u16(*iterations)?;
                buf.write_u8(salt.len() as u8)?;
                buf.write_bytes(salt)
            }
            RData::Empty => Ok(()),
            RData::Unknown { bytes, .. } => buf.write_bytes(bytes),
        }
    }

    /// Decode RDLENGTH octets at the cursor into the typed payload.
    pub fn decode(
        rrtype: RecordType,
        raw_type: u16,
        buf: &mut WireBuffer,
        rdlength: usize,
    ) -> Result<RData, AuthNsError> {
        let end = buf.pos() + rdlength;
        if rdlength == 0 {
            return Ok(RData::Empty);
        }
        let rdata = match rrtype {
            RecordType::A => {
                let raw = buf.read_bytes(4)?;
                RData::A {
                    address: Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]),
                }
            }
            RecordType::AAAA => {
                let raw = buf.read_bytes(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&raw);
                RData::AAAA {
                    address: Ipv6Addr::from(octets),
                }
            }
            RecordType::NS => RData::NS {
                nsdname: buf.read_name()?.into(),
            },
            RecordType::MD => RData::MD {
                madname: buf.read_name()?.into(),
            },
            RecordType::MF => RData::MF {
                madname: buf.read_name()?.into(),
            },
            RecordType::MB => RData::MB {
                madname: buf.read_name()?.into(),
            },
            RecordType::MG => RData::MG {
                mgmname: buf.read_name()?.into(),
            },
            RecordType::MR => RData::MR {
                newname: buf.read_name()?.into(),
            },
            RecordType::CNAME => RData::CNAME {
                cname: buf.read_name()?.into(),
            },
            RecordType::PTR => RData::PTR {
                ptrdname: buf.read_name()?.into(),
            },
            RecordType::SOA => RData::SOA {
                mname: buf.read_name()?.into(),
                rname: buf.read_name()?.into(),
                serial: buf.read_u32()?,
                refresh: buf.read_u32()?,
                retry: buf.read_u32()?,
                expire: buf.read_u32()?,
                minimum: buf.read_u32()?,
            },
            RecordType::HINFO => RData::HINFO {
                cpu: DNSCharString::decode(buf)?,
                os: DNSCharString::decode(buf)?,
            },
            RecordType::MINFO => RData::MINFO {
                rmailbx: buf.read_name()?.into(),
                emailbx: buf.read_name()?.into(),
            },
            RecordType::MX => RData::MX {
                preference: buf.read_u16()?,
                exchange: buf.read_name()?.into(),
            },
            RecordType::TXT => RData::TXT {
                txtdata: DNSCharString::decode(buf)?,
            },
            RecordType::SRV => RData::SRV {
                priority: buf.read_u16()?,
                weight: buf.read_u16()?,
                port: buf.read_u16()?,
                target: buf.read_name()?.into(),
            },
            RecordType::OPT => {
                let mut options = vec![];
                while buf.pos() + 4 <= end {
                    let code = buf.read_u16()?;
                    let len = buf.read_u16()? as usize;
                    options.push(EdnsOption {
                        code,
                        data: buf.read_bytes(len)?,
                    });
                }
                // class and TTL fields are grafted in by the record decoder
                RData::OPT {
                    udp_size: 0,
                    ext_rcode: 0,
                    version: 0,
                    flags: 0,
                    options,
                }
            }
            RecordType::TSIG => {
                let algorithm: DomainName = buf.read_name()?.into();
                let time_high = buf.read_u16()? as u64;
                let time_low = buf.read_u32()? as u64;
                let fudge = buf.read_u16()?;
                let mac_len = buf.read_u16()? as usize;
                let mac = buf.read_bytes(mac_len)?;
                let original_id = buf.read_u16()?;
                let error = buf.read_u16()?;
                let other_len = buf.read_u16()? as usize;
                let other = buf.read_bytes(other_len)?;
                RData::TSIG {
                    algorithm,
                    time_signed: (time_high << 32) | time_low,
                    fudge,
                    mac,
                    original_id,
                    error,
                    other,
                }
            }
            RecordType::DNSKEY => {
                let flags = buf.read_u16()?;
                let protocol = buf.read_u8()?;
                let algorithm = buf.read_u8()?;
                let public_key = buf.read_bytes(end - buf.pos())?;
                RData::DNSKEY {
                    flags,
                    protocol,
                    algorithm,
                    public_key,
                }
            }
            RecordType::RRSIG => {
                let type_covered = buf.read_u16()?;
                let algorithm = buf.read_u8()?;
                let labels = buf.read_u8()?;
                let original_ttl = buf.read_u32()?;
                let expiration = buf.read_u32()?;
                let inception = buf.read_u32()?;
                let key_tag = buf.read_u16()?;
                let signer_name: DomainName = buf.read_name()?.into();
                let signature = buf.read_bytes(end - buf.pos())?;
                RData::RRSIG {
                    type_covered,
                    algorithm,
                    labels,
                    original_ttl,
                    expiration,
                    inception,
                    key_tag,
                    signer_name,
                    signature,
                }
            }
            RecordType::DS => {
                let key_tag = buf.read_u16()?;
                let algorithm = buf.read_u8()?;
                let digest_type = buf.read_u8()?;
                let digest = buf.read_bytes(end - buf.pos())?;
                RData::DS {
                    key_tag,
                    algorithm,
                    digest_type,
                    digest,
                }
            }
            RecordType::NSEC => {
                let next_name: DomainName = buf.read_name()?.into();
                let types = decode_type_bitmap(buf, end)?;
                RData::NSEC { next_name, types }
            }
            RecordType::NSEC3 => {
                let hash_algorithm = buf.read_u8()?;
                let flags = buf.read_u8()?;
                let iterations = buf.read_u16()?;
                let salt_len = buf.read_u8()? as usize;
                let salt = buf.read_bytes(salt_len)?;
                let hash_len = buf.read_u8()? as usize;
                let next_hashed = buf.read_bytes(hash_len)?;
                let types = decode_type_bitmap(buf, end)?;
                RData::NSEC3 {
                    hash_algorithm,
                    flags,
                    iterations,
                    salt,
                    next_hashed,
                    types,
                }
            }
            RecordType::NSEC3PARAM => {
                let hash_algorithm = buf.read_u8()?;
                let flags = buf.read_u8()?;
                let iterations = buf.read_u16()?;
                let salt_len = buf.read_u8()? as usize;
                let salt = buf.read_bytes(salt_len)?;
                RData::NSEC3PARAM {
                    hash_algorithm,
                    flags,
                    iterations,
                    salt,
                }
            }
            _ => RData::Unknown {
                rrtype: raw_type,
                bytes: buf.read_bytes(rdlength)?,
            },
        };
        if buf.pos() > end {
            return Err(AuthNsError::MalformedPacket(
                "RDATA overran its RDLENGTH".to_string(),
            ));
        }
        // a record that under-reads its RDLENGTH is malformed padding; skip it
        if buf.pos() < end {
            buf.seek(end)?;
        }
        Ok(rdata)
    }

    /// Presentation-format text, the shape the zone store keeps. MX and SRV
    /// omit their numeric extras; those live in the record's typed columns.
    pub fn presentation(&self) -> String {
        match self {
            RData::A { address } => address.to_string(),
            RData::AAAA { address } => address.to_string(),
            RData::NS { nsdname } => nsdname.to_string(),
            RData::MD { madname } | RData::MF { madname } | RData::MB { madname } => {
                madname.to_string()
            }
            RData::MG { mgmname } => mgmname.to_string(),
            RData::MR { newname } => newname.to_string(),
            RData::CNAME { cname } => cname.to_string(),
            RData::PTR { ptrdname } => ptrdname.to_string(),
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => format!("{mname} {rname} {serial} {refresh} {retry} {expire} {minimum}"),
            RData::HINFO { cpu, os } => format!("{cpu} {os}"),
            RData::MINFO { rmailbx, emailbx } => format!("{rmailbx} {emailbx}"),
            RData::MX { exchange, .. } => exchange.to_string(),
            RData::TXT { txtdata } => txtdata.to_string(),
            RData::SRV { target, .. } => target.to_string(),
            RData::DNSKEY {
                flags,
                protocol,
                algorithm,
                public_key,
            } => format!(
                "{flags} {protocol} {algorithm} {}",
                BASE64.encode(public_key)
            ),
            RData::DS {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => format!(
                "{key_tag} {algorithm} {digest_type} {}",
                hex::encode_upper(digest)
            ),
            RData::NSEC3PARAM {
                hash_algorithm,
                flags,
                iterations,
                salt,
            } => {
                let salt = if salt.is_empty() {
                    "-".to_string()
                } else {
                    hex::encode_upper(salt)
                };
                format!("{hash_algorithm} {flags} {iterations} {salt}")
            }
            RData::Empty => String::new(),
            other => format!("{other:?}"),
        }
    }

    /// The numeric extras a store row carries beside the rdata text.
    pub fn extras(&self) -> (Option<u16>, Option<u16>, Option<u16>) {
        match self {
            RData::MX { preference, .. } => (Some(*preference), None, None),
            RData::SRV {
                priority,
                weight,
                port,
                ..
            } => (Some(*priority), Some(*weight), Some(*port)),
            _ => (None, None, None),
        }
    }

    /// Rebuild a typed payload from a store row: presentation text plus the
    /// numeric extras.
    pub fn from_presentation(
        rrtype: RecordType,
        text: &str,
        priority: Option<u16>,
        weight: Option<u16>,
        port: Option<u16>,
    ) -> Result<RData, AuthNsError> {
        let bad = |detail: &str| AuthNsError::InvalidValue(format!("{rrtype} rdata: {detail}"));
        match rrtype {
            RecordType::A => Ok(RData::A {
                address: Ipv4Addr::from_str(text.trim())
                    .map_err(|e| bad(&format!("{text:?} is not an IPv4 address: {e}")))?,
            }),
            RecordType::AAAA => Ok(RData::AAAA {
                address: Ipv6Addr::from_str(text.trim())
                    .map_err(|e| bad(&format!("{text:?} is not an IPv6 address: {e}")))?,
            }),
            RecordType::NS => Ok(RData::NS {
                nsdname: text.into(),
            }),
            RecordType::MD => Ok(RData::MD {
                madname: text.into(),
            }),
            RecordType::MF => Ok(RData::MF {
                madname: text.into(),
            }),
            RecordType::MB => Ok(RData::MB {
                madname: text.into(),
            }),
            RecordType::MG => Ok(RData::MG {
                mgmname: text.into(),
            }),
            RecordType::MR => Ok(RData::MR {
                newname: text.into(),
            }),
            RecordType::CNAME => Ok(RData::CNAME {
                cname: text.into(),
            }),
            RecordType::PTR => Ok(RData::PTR {
                ptrdname: text.into(),
            }),
            RecordType::SOA => {
                let fields: Vec<&str> = text.split_whitespace().collect();
                if fields.len() != 7 {
                    return Err(bad("expected 7 fields"));
                }
                let number = |idx: usize| -> Result<u32, AuthNsError> {
                    fields[idx]
                        .parse::<u32>()
                        .map_err(|e| bad(&format!("field {idx}: {e}")))
                };
                Ok(RData::SOA {
                    mname: fields[0].into(),
                    rname: fields[1].into(),
                    serial: number(2)?,
                    refresh: number(3)?,
                    retry: number(4)?,
                    expire: number(5)?,
                    minimum: number(6)?,
                })
            }
            RecordType::HINFO => {
                let mut parts = text.split_whitespace();
                Ok(RData::HINFO {
                    cpu: parts.next().unwrap_or_default().into(),
                    os: parts.next().unwrap_or_default().into(),
                })
            }
            RecordType::MINFO => {
                let mut parts = text.split_whitespace();
                Ok(RData::MINFO {
                    rmailbx: parts.next().unwrap_or_default().into(),
                    emailbx: parts.next().unwrap_or_default().into(),
                })
            }
            RecordType::MX => {
                // stores keep the preference in the priority column, master
                // files keep it inline
                if let Some(preference) = priority {
                    return Ok(RData::MX {
                        preference,
                        exchange: text.into(),
                    });
                }
                let (pref, exchange) = text
                    .trim()
                    .split_once(' ')
                    .ok_or_else(|| bad("expected preference and exchange"))?;
                Ok(RData::MX {
                    preference: pref.parse().map_err(|e| bad(&format!("preference: {e}")))?,
                    exchange: exchange.trim().into(),
                })
            }
            RecordType::TXT => Ok(RData::TXT {
                txtdata: text.trim_matches('"').into(),
            }),
            RecordType::SRV => {
                if let (Some(priority), Some(weight), Some(port)) = (priority, weight, port) {
                    return Ok(RData::SRV {
                        priority,
                        weight,
                        port,
                        target: text.into(),
                    });
                }
                let fields: Vec<&str> = text.split_whitespace().collect();
                if fields.len() != 4 {
                    return Err(bad("expected priority weight port target"));
                }
                Ok(RData::SRV {
                    priority: fields[0].parse().map_err(|e| bad(&format!("{e}")))?,
                    weight: fields[1].parse().map_err(|e| bad(&format!("{e}")))?,
                    port: fields[2].parse().map_err(|e| bad(&format!("{e}")))?,
                    target: fields[3].into(),
                })
            }
            RecordType::DNSKEY => {
                let fields: Vec<&str> = text.split_whitespace().collect();
                if fields.len() != 4 {
                    return Err(bad("expected flags protocol algorithm key"));
                }
                Ok(RData::DNSKEY {
                    flags: fields[0].parse().map_err(|e| bad(&format!("{e}")))?,
                    protocol: fields[1].parse().map_err(|e| bad(&format!("{e}")))?,
                    algorithm: fields[2].parse().map_err(|e| bad(&format!("{e}")))?,
                    public_key: BASE64
                        .decode(fields[3])
                        .map_err(|e| bad(&format!("key: {e}")))?,
                })
            }
            RecordType::DS => {
                let fields: Vec<&str> = text.split_whitespace().collect();
                if fields.len() != 4 {
                    return Err(bad("expected keytag algorithm digesttype digest"));
                }
                Ok(RData::DS {
                    key_tag: fields[0].parse().map_err(|e| bad(&format!("{e}")))?,
                    algorithm: fields[1].parse().map_err(|e| bad(&format!("{e}")))?,
                    digest_type: fields[2].parse().map_err(|e| bad(&format!("{e}")))?,
                    digest: hex::decode(fields[3].to_ascii_lowercase())
                        .map_err(|e| bad(&format!("digest: {e}")))?,
                })
            }
            RecordType::NSEC3PARAM => {
                let fields: Vec<&str> = text.split_whitespace().collect();
                if fields.len() != 4 {
                    return Err(bad("expected algorithm flags iterations salt"));
                }
                let salt = match fields[3] {
                    "-" => vec![],
                    value => hex::decode(value.to_ascii_lowercase())
                        .map_err(|e| bad(&format!("salt: {e}")))?,
                };
                Ok(RData::NSEC3PARAM {
                    hash_algorithm: fields[0].parse().map_err(|e| bad(&format!("{e}")))?,
                    flags: fields[1].parse().map_err(|e| bad(&format!("{e}")))?,
                    iterations: fields[2].parse().map_err(|e| bad(&format!("{e}")))?,
                    salt,
                })
            }
            other => Err(bad(&format!("type {other} has no presentation parser"))),
        }
    }
}
