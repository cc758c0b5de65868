use crate::enums::{OpCode, PacketType, Rcode};
use packed_struct::prelude::*;
use std::fmt::Display;

/// Response caching, L1 in-process and L2 remote
pub mod cache;
/// CLI argument handling
pub mod cli;
/// Configuration handling for the server
pub mod config;
/// DNSSEC key lifecycle, RRSIG generation and denial-of-existence proofs
pub mod dnssec;
pub mod enums;
pub mod error;
/// Message, question and resource-record parsing/serialization
pub mod message;
/// Canonical name ordering and name manipulation helpers
pub mod name;
/// NSEC3 hashing and the zone base32 alphabet
pub mod nsec3;
/// The per-packet query state machine
pub mod query;
/// Per-client-IP token buckets
pub mod ratelimit;
/// RDATA variants and their wire encodings
pub mod rdata;
pub mod servers;
/// The zone storage capability and the in-memory implementation
pub mod store;
#[cfg(test)]
mod tests;
/// AXFR/IXFR streaming and NOTIFY coordination
pub mod transfer;
pub mod tsig;
/// RFC 2136 dynamic update processing
pub mod update;
/// DNS-over-HTTPS endpoint
pub mod web;
/// The cursor-and-compression wire buffer
pub mod wire;
/// RFC 1035 master file parsing
pub mod zonefile;

/// The size of a DNS message header
pub const HEADER_BYTES: usize = 12;
/// Hard ceiling for any DNS message, UDP or TCP
pub const MAX_PACKET_BYTES: usize = 65535;
/// The classic pre-EDNS UDP payload limit
pub const UDP_MIN_PAYLOAD: u16 = 512;
/// The payload size we advertise in our own OPT records
pub const EDNS_SERVER_PAYLOAD: u16 = 4096;
/// Compression pointers may chain at most this many times while decoding a name
pub const MAX_NAME_JUMPS: usize = 5;

/// The header of a DNS transmission, either a Query or Reply. Ref [RFC1035](https://www.rfc-editor.org/rfc/rfc1035#section-4.1.1) section 4.1.1.
#[derive(Debug, PackedStruct, PartialEq, Eq, Clone)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "12")]
pub struct Header {
    /// The query ID
    #[packed_field(bits = "0..=15", endian = "msb")]
    pub id: u16,
    // Is it a query or response
    #[packed_field(bits = "16", ty = "enum")]
    pub qr: PacketType, // bit 16
    #[packed_field(bits = "17..=20", ty = "enum")]
    pub opcode: OpCode, // 17-20 actually 4 bits
    #[packed_field(bits = "21")]
    pub authoritative: bool, // 21
    #[packed_field(bits = "22")]
    pub truncated: bool, // 22
    // RD - this bit may be set in a query and is copied into the response.
    #[packed_field(bits = "23")]
    pub recursion_desired: bool, // 23
    #[packed_field(bits = "24")]
    pub recursion_available: bool, // 24
    /// reserved, must be 0
    #[packed_field(bits = "25")]
    pub z: bool,
    #[packed_field(bits = "26")]
    pub ad: bool,
    #[packed_field(bits = "27")]
    pub cd: bool,
    #[packed_field(bits = "28..=31", ty = "enum")]
    pub rcode: Rcode, // bits 28-31
    /// an unsigned 16 bit integer specifying the number of entries in the question section.
    #[packed_field(bits = "32..=47", endian = "msb")]
    pub qdcount: u16,
    /// an unsigned 16 bit integer specifying the number of entries in the answer section.
    #[packed_field(bits = "48..=63", endian = "msb")]
    pub ancount: u16,
    /// an unsigned 16 bit integer specifying the number of name server resource records in the authority records section.
    #[packed_field(bits = "64..=79", endian = "msb")]
    pub nscount: u16,
    /// an unsigned 16 bit integer specifying the number of resource records in the additional records section.
    #[packed_field(bits = "80..=95", endian = "msb")]
    pub arcount: u16,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            id: 0,
            qr: PacketType::Query,
            opcode: OpCode::Query,
            authoritative: false,
            truncated: false,
            recursion_desired: false,
            recursion_available: false,
            z: false,
            ad: false,
            cd: false,
            rcode: Rcode::NoError,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }
}

impl Header {
    /// Flip a request header into the matching response header, copying the
    /// fields a reply echoes and claiming authority.
    pub fn as_answer(&self) -> Header {
        Header {
            id: self.id,
            qr: PacketType::Answer,
            opcode: self.opcode,
            authoritative: true,
            recursion_desired: self.recursion_desired,
            cd: self.cd,
            ..Default::default()
        }
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "id={} qr={:?} opcode={:?} rcode={:?} qd={} an={} ns={} ar={}",
            self.id,
            self.qr,
            self.opcode,
            self.rcode,
            self.qdcount,
            self.ancount,
            self.nscount,
            self.arcount
        ))
    }
}
