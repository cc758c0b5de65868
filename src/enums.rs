use enum_iterator::Sequence;
use packed_struct::prelude::*;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::Display;

#[derive(Debug, Eq, PartialEq, PrimitiveEnum_u8, Copy, Clone)]
/// A four bit field that specifies kind of query in this message.
/// This value is set by the originator of a query and copied into the response.
pub enum OpCode {
    /// A standard query (QUERY)
    Query = 0,
    // IQuery = 1, obsolete per https://www.rfc-editor.org/rfc/rfc3425
    /// Server status request (STATUS)
    Status = 2,
    /// Zone change notification, [RFC1996](https://www.rfc-editor.org/rfc/rfc1996)
    Notify = 4,
    /// Dynamic update, [RFC2136](https://www.rfc-editor.org/rfc/rfc2136)
    Update = 5,
    /// 6-15 reserved for future use
    Reserved = 15,
}

impl From<u8> for OpCode {
    fn from(input: u8) -> Self {
        match input {
            0 => Self::Query,
            2 => Self::Status,
            4 => Self::Notify,
            5 => Self::Update,
            _ => Self::Reserved,
        }
    }
}

#[derive(PrimitiveEnum_u8, Clone, Copy, Debug, Eq, PartialEq)]
/// Response code, things like NOERROR, FORMERR, SERVFAIL etc.
pub enum Rcode {
    // No error condition
    NoError = 0,
    // Format error - The name server was unable to interpret the query.
    FormatError = 1,
    // Server failure - The name server was unable to process this query due to a problem with the name server.
    ServFail = 2,
    /// Name Error - Meaningful only for responses from an authoritative name server, this code signifies that the domain name referenced in the query does not exist.
    NxDomain = 3,
    /// Not Implemented - The name server does not support the requested kind of query.
    NotImplemented = 4,
    /// Refused - The name server refuses to perform the specified operation for policy reasons.
    Refused = 5,
    /// Some name that ought not to exist, does exist ([RFC2136](https://www.rfc-editor.org/rfc/rfc2136))
    YxDomain = 6,
    /// Some RRset that ought not to exist, does exist
    YxRrset = 7,
    /// Some RRset that ought to exist, does not exist
    NxRrset = 8,
    /// The server is not authoritative for the zone named in the Zone Section, or the request was not properly authenticated
    NotAuth = 9,
    /// A name used in the Prerequisite or Update Section is not within the zone denoted by the Zone Section
    NotZone = 10,
}

impl Display for Rcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{self:?}"))
    }
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Sequence)]
/// RRType, eg A, NS, MX, etc
pub enum RecordType {
    /// A host address
    A = 1,
    /// Authoritative name server
    NS = 2,
    MD = 3,     // 3 a mail destination (Obsolete - use MX)
    MF = 4,     // 4 a mail forwarder (Obsolete - use MX)
    CNAME = 5,  // 5 the canonical name for an alias
    SOA = 6,    // 6 marks the start of a zone of authority
    MB = 7,     // 7 a mailbox domain name (EXPERIMENTAL)
    MG = 8,     // 8 a mail group member (EXPERIMENTAL)
    MR = 9,     // 9 a mail rename domain name (EXPERIMENTAL)
    PTR = 12,   // 12 a domain name pointer
    HINFO = 13, // 13 host information
    MINFO = 14, // 14 mailbox or mail list information
    MX = 15,    // 15 mail exchange
    /// Text strings
    TXT = 16,
    /// IPv6 Records <https://www.rfc-editor.org/rfc/rfc3596#section-2.1>
    AAAA = 28,
    /// Service location, <https://www.rfc-editor.org/rfc/rfc2782>
    SRV = 33,
    /// EDNS pseudo-RR <https://www.rfc-editor.org/rfc/rfc6891>
    OPT = 41,
    /// Delegation signer
    DS = 43,
    /// DNSSEC signature
    RRSIG = 46,
    /// Next secure record, RFC4034
    NSEC = 47,
    /// DNSSEC public key
    DNSKEY = 48,
    /// Hashed next secure, RFC5155
    NSEC3 = 50,
    NSEC3PARAM = 51,
    /// Transaction signature, <https://www.rfc-editor.org/rfc/rfc2845>
    TSIG = 250,
    /// 251 A request for an incremental zone transfer
    IXFR = 251,
    /// 252 A request for a transfer of an entire zone
    AXFR = 252,
    /// 255 A request for all records (*)
    ANY = 255,
    InvalidType = 0,
}

impl From<u16> for RecordType {
    fn from(input: u16) -> Self {
        match input {
            1 => Self::A,
            2 => Self::NS,
            3 => Self::MD,
            4 => Self::MF,
            5 => Self::CNAME,
            6 => Self::SOA,
            7 => Self::MB,
            8 => Self::MG,
            9 => Self::MR,
            12 => Self::PTR,
            13 => Self::HINFO,
            14 => Self::MINFO,
            15 => Self::MX,
            16 => Self::TXT,
            28 => Self::AAAA,
            33 => Self::SRV,
            41 => Self::OPT,
            43 => Self::DS,
            46 => Self::RRSIG,
            47 => Self::NSEC,
            48 => Self::DNSKEY,
            50 => Self::NSEC3,
            51 => Self::NSEC3PARAM,
            250 => Self::TSIG,
            251 => Self::IXFR,
            252 => Self::AXFR,
            255 => Self::ANY,
            _ => Self::InvalidType,
        }
    }
}

impl From<RecordType> for u16 {
    fn from(input: RecordType) -> u16 {
        input as u16
    }
}

impl From<String> for RecordType {
    fn from(input: String) -> Self {
        let input: RecordType = input.as_str().into();
        input
    }
}

impl From<&str> for RecordType {
    fn from(input: &str) -> Self {
        match input {
            "A" => Self::A,
            "AAAA" => Self::AAAA,
            "ANY" => Self::ANY,
            "AXFR" => Self::AXFR,
            "CNAME" => Self::CNAME,
            "DNSKEY" => Self::DNSKEY,
            "DS" => Self::DS,
            "HINFO" => Self::HINFO,
            "IXFR" => Self::IXFR,
            "MB" => Self::MB,
            "MD" => Self::MD,
            "MF" => Self::MF,
            "MG" => Self::MG,
            "MINFO" => Self::MINFO,
            "MR" => Self::MR,
            "MX" => Self::MX,
            "NS" => Self::NS,
            "NSEC" => Self::NSEC,
            "NSEC3" => Self::NSEC3,
            "NSEC3PARAM" => Self::NSEC3PARAM,
            "OPT" => Self::OPT,
            "PTR" => Self::PTR,
            "RRSIG" => Self::RRSIG,
            "SOA" => Self::SOA,
            "SRV" => Self::SRV,
            "TSIG" => Self::TSIG,
            "TXT" => Self::TXT,
            _ => Self::InvalidType,
        }
    }
}

impl From<RecordType> for &'static str {
    fn from(input: RecordType) -> &'static str {
        match input {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::ANY => "ANY",
            RecordType::AXFR => "AXFR",
            RecordType::CNAME => "CNAME",
            RecordType::DNSKEY => "DNSKEY",
            RecordType::DS => "DS",
            RecordType::HINFO => "HINFO",
            RecordType::IXFR => "IXFR",
            RecordType::MB => "MB",
            RecordType::MD => "MD",
            RecordType::MF => "MF",
            RecordType::MG => "MG",
            RecordType::MINFO => "MINFO",
            RecordType::MR => "MR",
            RecordType::MX => "MX",
            RecordType::NS => "NS",
            RecordType::NSEC => "NSEC",
            RecordType::NSEC3 => "NSEC3",
            RecordType::NSEC3PARAM => "NSEC3PARAM",
            RecordType::OPT => "OPT",
            RecordType::PTR => "PTR",
            RecordType::RRSIG => "RRSIG",
            RecordType::SOA => "SOA",
            RecordType::SRV => "SRV",
            RecordType::TSIG => "TSIG",
            RecordType::TXT => "TXT",
            RecordType::InvalidType => "",
        }
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let res: &'static str = self.to_owned().into();
        f.write_fmt(format_args!("{res}"))
    }
}

impl Serialize for RecordType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl<'de> Deserialize<'de> for RecordType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(RecordType::from(value.as_str()))
    }
}

impl RecordType {
    /// Types a standard query may ask for and we can answer from a zone.
    pub fn supported(self: RecordType) -> bool {
        #[allow(clippy::match_like_matches_macro)]
        match self {
            RecordType::A
            | RecordType::AAAA
            | RecordType::ANY
            | RecordType::AXFR
            | RecordType::CNAME
            | RecordType::DNSKEY
            | RecordType::DS
            | RecordType::HINFO
            | RecordType::IXFR
            | RecordType::MINFO
            | RecordType::MX
            | RecordType::NS
            | RecordType::NSEC
            | RecordType::NSEC3PARAM
            | RecordType::PTR
            | RecordType::SOA
            | RecordType::SRV
            | RecordType::TXT => true,
            _ => false,
        }
    }

    /// Record types the signer never covers with an RRSIG of their own.
    pub fn excluded_from_signing(self: RecordType) -> bool {
        matches!(
            self,
            RecordType::RRSIG | RecordType::OPT | RecordType::TSIG
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Sequence)]
/// CLASS fields appear in resource records, most entries should be IN. ANY and
/// NONE carry the RFC2136 delete conventions. Ref RFC1035 3.2.4.
pub enum RecordClass {
    /// IN - Internet
    Internet = 1,
    /// CH - Chaos
    Chaos = 3,
    /// Hesiod [Dyer 87]
    Hesiod = 4,
    /// NONE, RFC2136 "specific RR delete"
    None = 254,
    /// ANY, RFC2136 "delete RRset" and the TSIG record class
    Any = 255,

    InvalidType = 0,
}

impl Display for RecordClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{}",
            match self {
                RecordClass::Internet => "IN",
                RecordClass::Chaos => "CHAOS",
                RecordClass::Hesiod => "HESIOD",
                RecordClass::None => "NONE",
                RecordClass::Any => "ANY",
                RecordClass::InvalidType => "Invalid",
            }
        ))
    }
}

impl From<&str> for RecordClass {
    fn from(value: &str) -> Self {
        match value {
            "IN" => RecordClass::Internet,
            "CH" | "CHAOS" => RecordClass::Chaos,
            "HS" | "HESIOD" => RecordClass::Hesiod,
            "NONE" => RecordClass::None,
            "ANY" => RecordClass::Any,
            _ => RecordClass::InvalidType,
        }
    }
}

impl Serialize for RecordClass {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(format!("{self}").as_str())
    }
}

impl From<u16> for RecordClass {
    fn from(input: u16) -> Self {
        match input {
            1 => Self::Internet,
            3 => Self::Chaos,
            4 => Self::Hesiod,
            254 => Self::None,
            255 => Self::Any,
            _ => Self::InvalidType,
        }
    }
}

#[derive(Debug, PrimitiveEnum_u8, Clone, Copy, Eq, PartialEq)]
pub enum PacketType {
    Query = 0,
    Answer = 1,
}

impl From<bool> for PacketType {
    fn from(input: bool) -> Self {
        match input {
            false => Self::Query,
            true => Self::Answer,
        }
    }
}

/// Which listener a packet arrived on. TCP-only operations (zone transfers)
/// check this before streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
    Tls,
    DoH,
}

impl Transport {
    pub fn is_stream(&self) -> bool {
        matches!(self, Transport::Tcp | Transport::Tls)
    }
}

impl Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Udp => write!(f, "UDP"),
            Transport::Tcp => write!(f, "TCP"),
            Transport::Tls => write!(f, "DoT"),
            Transport::DoH => write!(f, "DoH"),
        }
    }
}
