//! Parsed DNS messages: header, question and the three record sections.

use packed_struct::prelude::*;
use std::fmt::Display;

use crate::enums::{RecordClass, RecordType};
use crate::error::AuthNsError;
use crate::rdata::RData;
use crate::wire::WireBuffer;
use crate::{Header, HEADER_BYTES};

/// A DNS Question section entry, Ref [RFC1035](https://www.rfc-editor.org/rfc/rfc1035#section-4.1.2) section 4.1.2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    /// The name which is being queried, normalized on parse
    pub qname: String,
    /// The Record type that is being requested, eg A, NS, MX, TXT etc.
    pub qtype: RecordType,
    /// The class, (typically IN for "Internet")
    pub qclass: RecordClass,
}

impl Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "QNAME={} QTYPE={:?} QCLASS={}",
            self.qname, self.qtype, self.qclass
        ))
    }
}

impl Question {
    pub fn parse(buf: &mut WireBuffer) -> Result<Self, AuthNsError> {
        let qname = buf.read_name()?;
        let qtype = RecordType::from(buf.read_u16()?);
        let qclass = RecordClass::from(buf.read_u16()?);
        Ok(Question {
            qname,
            qtype,
            qclass,
        })
    }

    pub fn write(&self, buf: &mut WireBuffer) -> Result<(), AuthNsError> {
        buf.write_name(&self.qname)?;
        buf.write_u16(self.qtype as u16)?;
        let qclass = match self.qclass {
            // absent class defaults to IN on the wire
            RecordClass::InvalidType => RecordClass::Internet,
            other => other,
        };
        buf.write_u16(qclass as u16)
    }
}

/// The answer, authority, and additional sections all share this format.
/// Ref [RFC1035 Section 4.1.3](https://www.rfc-editor.org/rfc/rfc1035.html#section-4.1.3)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    /// A domain name to which this resource record pertains.
    pub name: String,
    pub rrtype: RecordType,
    pub class: RecordClass,
    /// Seconds the record may be cached; zero means this transaction only.
    pub ttl: u32,
    pub rdata: RData,
}

impl Display for ResourceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{} {} {} {} {}",
            self.name,
            self.ttl,
            self.class,
            self.rrtype,
            self.rdata.presentation()
        ))
    }
}

impl ResourceRecord {
    /// Parse one record at the cursor. OPT records graft their CLASS and TTL
    /// overloads into the payload so nothing downstream reinterprets them.
    pub fn parse(buf: &mut WireBuffer) -> Result<Self, AuthNsError> {
        let name = buf.read_name()?;
        let raw_type = buf.read_u16()?;
        let rrtype = RecordType::from(raw_type);
        let raw_class = buf.read_u16()?;
        let ttl = buf.read_u32()?;
        let rdlength = buf.read_u16()? as usize;
        let mut rdata = RData::decode(rrtype, raw_type, buf, rdlength)?;

        if rrtype == RecordType::OPT {
            // an empty OPT is still an OPT; rdlength zero just means no options
            let options = match rdata {
                RData::OPT { options, .. } => options,
                _ => vec![],
            };
            rdata = RData::OPT {
                udp_size: raw_class,
                ext_rcode: (ttl >> 24) as u8,
                version: (ttl >> 16) as u8,
                flags: ttl as u16,
                options,
            };
            return Ok(ResourceRecord {
                name,
                rrtype,
                class: RecordClass::Internet,
                ttl: 0,
                rdata,
            });
        }

        Ok(ResourceRecord {
            name,
            rrtype,
            class: RecordClass::from(raw_class),
            ttl,
            rdata,
        })
    }

    /// Serialize one record at the cursor, backpatching RDLENGTH after the
    /// payload lands.
    pub fn write(&self, buf: &mut WireBuffer) -> Result<(), AuthNsError> {
        buf.write_name(&self.name)?;
        // unknown types keep their original code on the way back out
        let type_code = match &self.rdata {
            RData::Unknown { rrtype, .. } => *rrtype,
            _ => self.rrtype as u16,
        };
        buf.write_u16(type_code)?;
        match &self.rdata {
            RData::OPT {
                udp_size,
                ext_rcode,
                version,
                flags,
                ..
            } => {
                buf.write_u16(*udp_size)?;
                let ttl: u32 = ((*ext_rcode as u32) << 24) | ((*version as u32) << 16)
                    | (*flags as u32);
                buf.write_u32(ttl)?;
            }
            _ => {
                buf.write_u16(self.class as u16)?;
                buf.write_u32(self.ttl)?;
            }
        }

        // CLASS=ANY deletes a whole RRset: RDLENGTH zero, no payload.
        if self.class == RecordClass::Any && self.rrtype != RecordType::TSIG {
            return buf.write_u16(0);
        }

        let length_at = buf.pos();
        buf.write_u16(0)?;
        let rdata_start = buf.pos();
        self.rdata.encode(buf)?;
        let rdlength = buf.pos() - rdata_start;
        buf.set_u16(length_at, rdlength as u16)
    }
}

/// A parsed packet: header plus the four sections, with the byte offset of
/// the TSIG record when one arrived in the additionals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
    /// Byte position where the TSIG RR starts in the raw packet
    pub tsig_offset: Option<usize>,
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{} questions={:?}",
            self.header, self.questions
        ))
    }
}

impl Message {
    /// Parse a whole packet from raw bytes.
    pub fn parse(raw: &[u8]) -> Result<Self, AuthNsError> {
        let mut buf = WireBuffer::new();
        buf.load(raw)?;
        Self::parse_buffer(&mut buf)
    }

    pub fn parse_buffer(buf: &mut WireBuffer) -> Result<Self, AuthNsError> {
        if buf.len() < HEADER_BYTES {
            return Err(AuthNsError::EndOfBuffer);
        }
        let mut raw_header = [0u8; HEADER_BYTES];
        raw_header.copy_from_slice(buf.get_range(0, HEADER_BYTES)?);
        let header = Header::unpack(&raw_header)?;
        buf.seek(HEADER_BYTES)?;

        let mut message = Message {
            header,
            ..Default::default()
        };

        for _ in 0..message.header.qdcount {
            message.questions.push(Question::parse(buf)?);
        }
        for _ in 0..message.header.ancount {
            message.answers.push(ResourceRecord::parse(buf)?);
        }
        for _ in 0..message.header.nscount {
            message.authorities.push(ResourceRecord::parse(buf)?);
        }
        for _ in 0..message.header.arcount {
            let offset = buf.pos();
            let record = ResourceRecord::parse(buf)?;
            if record.rrtype == RecordType::TSIG {
                message.tsig_offset = Some(offset);
            }
            message.additionals.push(record);
        }
        Ok(message)
    }

    /// Serialize into the buffer, refreshing the section counts from the
    /// section lengths first. Compression is the caller's choice: on for
    /// responses, off for canonical forms.
    pub fn write(&self, buf: &mut WireBuffer, compress: bool) -> Result<(), AuthNsError> {
        buf.reset();
        if compress {
            buf.enable_compression();
        }
        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.additionals.len() as u16;
        buf.write_bytes(&header.pack()?)?;

        for question in &self.questions {
            question.write(buf)?;
        }
        for record in self
            .answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.additionals.iter())
        {
            record.write(buf)?;
        }
        Ok(())
    }

    /// Serialize to a standalone byte vector.
    pub fn to_bytes(&self, compress: bool) -> Result<Vec<u8>, AuthNsError> {
        let mut buf = WireBuffer::new();
        self.write(&mut buf, compress)?;
        Ok(buf.bytes().to_vec())
    }

    /// The OPT pseudo-record, when the client sent one.
    pub fn opt(&self) -> Option<&ResourceRecord> {
        self.additionals
            .iter()
            .find(|r| r.rrtype == RecordType::OPT)
    }

    /// EDNS parameters: (client payload size floored at 512, DO bit).
    pub fn edns(&self) -> Option<(u16, bool)> {
        self.opt().map(|record| match &record.rdata {
            RData::OPT {
                udp_size, flags, ..
            } => ((*udp_size).max(crate::UDP_MIN_PAYLOAD), flags & 0x8000 != 0),
            _ => (crate::UDP_MIN_PAYLOAD, false),
        })
    }

    /// The TSIG record, which must ride last in the additionals.
    pub fn tsig(&self) -> Option<&ResourceRecord> {
        match self.additionals.last() {
            Some(record) if record.rrtype == RecordType::TSIG => Some(record),
            _ => None,
        }
    }
}
