//! The per-packet state machine: rate limit, parse, classify, resolve, sign,
//! serialize, cache, send. Updates and transfers branch off to their own
//! engines; everything else resolves against the zone store here.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, trace, warn};

use crate::cache::{cache_key, RrCache};
use crate::dnssec::{DnssecEngine, Nsec3Params};
use crate::enums::{OpCode, Rcode, RecordClass, RecordType, Transport};
use crate::error::AuthNsError;
use crate::message::{Message, Question, ResourceRecord};
use crate::name::{normalize_name, parent_name, wildcard_candidates};
use crate::rdata::RData;
use crate::ratelimit::RateLimiter;
use crate::store::{Record, Zone, ZoneStore};
use crate::transfer::TransferEngine;
use crate::update::UpdateEngine;
use crate::wire::BufferPool;
use crate::{Header, EDNS_SERVER_PAYLOAD, MAX_PACKET_BYTES, UDP_MIN_PAYLOAD};

/// Responses older than this never sit in the cache, whatever their records
/// claim.
const CACHE_TTL_CEILING: u32 = 300;

/// The OPT record we attach when the client spoke EDNS.
fn server_opt(client_do: bool) -> ResourceRecord {
    ResourceRecord {
        name: ".".to_string(),
        rrtype: RecordType::OPT,
        class: RecordClass::Internet,
        ttl: 0,
        rdata: RData::OPT {
            udp_size: EDNS_SERVER_PAYLOAD,
            ext_rcode: 0,
            version: 0,
            flags: if client_do { 0x8000 } else { 0 },
            options: vec![],
        },
    }
}

/// What goes back on the wire: one message, or a transfer's worth of them.
#[derive(Debug)]
pub enum QueryResponse {
    Single(Vec<u8>),
    Stream(Vec<Vec<u8>>),
}

pub struct QueryEngine {
    store: Arc<dyn ZoneStore>,
    cache: Arc<RrCache>,
    limiter: Arc<RateLimiter>,
    buffers: BufferPool,
    dnssec: Arc<DnssecEngine>,
    update: UpdateEngine,
    transfer: TransferEngine,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn ZoneStore>,
        cache: Arc<RrCache>,
        limiter: Arc<RateLimiter>,
        buffers: BufferPool,
        dnssec: Arc<DnssecEngine>,
        update: UpdateEngine,
        transfer: TransferEngine,
    ) -> Self {
        QueryEngine {
            store,
            cache,
            limiter,
            buffers,
            dnssec,
            update,
            transfer,
        }
    }

    /// A bare response carrying just an rcode, for when there is no
    /// parseable question to echo.
    fn rcode_only(&self, id: u16, rcode: Rcode) -> Option<QueryResponse> {
        let message = Message {
            header: Header {
                id,
                qr: crate::enums::PacketType::Answer,
                rcode,
                ..Header::default()
            },
            ..Default::default()
        };
        message.to_bytes(false).ok().map(QueryResponse::Single)
    }

    fn reply(&self, request: &Message, rcode: Rcode, authoritative: bool) -> Message {
        let mut header = request.header.as_answer();
        header.rcode = rcode;
        header.authoritative = authoritative;
        Message {
            header,
            questions: request.questions.clone(),
            ..Default::default()
        }
    }

    /// Entry point for every packet from every transport.
    #[instrument(level = "debug", skip_all, fields(src = %src, transport = %transport))]
    pub async fn handle_packet(
        &self,
        raw: &[u8],
        src: SocketAddr,
        transport: Transport,
    ) -> Option<QueryResponse> {
        // rate limiting comes before any parsing work
        if !self.limiter.allow(src.ip()) {
            return None;
        }

        let message = match Message::parse(raw) {
            Ok(message) => message,
            Err(error) => {
                debug!("unparseable packet from {src}: {error}");
                // FORMERR when the ID is recoverable, drop otherwise
                if raw.len() >= 2 {
                    let id = u16::from_be_bytes([raw[0], raw[1]]);
                    return self.rcode_only(id, Rcode::FormatError);
                }
                return None;
            }
        };

        if message.questions.is_empty() {
            return self.rcode_only(message.header.id, Rcode::FormatError);
        }

        match message.header.opcode {
            OpCode::Update => {
                let response = self.update.handle_update(raw, &message, src).await;
                return self.serialize_single(&response);
            }
            OpCode::Notify => {
                trace!("NOTIFY received from {src}");
                let response = TransferEngine::notify_ack(&message);
                return self.serialize_single(&response);
            }
            OpCode::Query => {}
            _ => {
                let response = self.reply(&message, Rcode::NotImplemented, false);
                return self.serialize_single(&response);
            }
        }

        match self.answer_query(&message, src, transport).await {
            Ok(response) => Some(response),
            Err(error) => {
                warn!("query from {src} failed: {error}");
                let response = self.reply(&message, error.rcode(), false);
                self.serialize_single(&response)
            }
        }
    }

    fn serialize_single(&self, message: &Message) -> Option<QueryResponse> {
        let mut buf = self.buffers.acquire();
        match message.write(&mut buf, true) {
            Ok(()) => Some(QueryResponse::Single(buf.bytes().to_vec())),
            Err(error) => {
                warn!("failed to serialize response: {error}");
                None
            }
        }
    }

    /// The standard-query path, steps 5 through 18.
    async fn answer_query(
        &self,
        request: &Message,
        src: SocketAddr,
        transport: Transport,
    ) -> Result<QueryResponse, AuthNsError> {
        let question = &request.questions[0];
        let qname = normalize_name(&question.qname);
        let qtype = question.qtype;

        if question.qclass == RecordClass::Chaos {
            let response = self.reply(request, Rcode::Refused, false);
            return self.finish_uncached(&response);
        }
        if !qtype.supported() {
            let response = self.reply(request, Rcode::NotImplemented, false);
            return self.finish_uncached(&response);
        }

        // zone transfers stream over TCP-shaped transports only
        if qtype == RecordType::AXFR || qtype == RecordType::IXFR {
            if !transport.is_stream() {
                let response = self.reply(request, Rcode::Refused, false);
                return self.finish_uncached(&response);
            }
            let stream = if qtype == RecordType::AXFR {
                self.transfer.handle_axfr(request, src).await?
            } else {
                self.transfer.handle_ixfr(request, src).await?
            };
            return Ok(QueryResponse::Stream(stream));
        }

        // EDNS parameters hold for the whole request
        let edns = request.edns();
        let client_payload = match transport {
            Transport::Udp => edns.map(|(size, _)| size).unwrap_or(UDP_MIN_PAYLOAD),
            _ => MAX_PACKET_BYTES as u16,
        };
        let do_bit = edns.map(|(_, do_bit)| do_bit).unwrap_or(false);

        // L1 then L2; hits only need their transaction ID put back. The key
        // carries no DO bit, so DNSSEC-requesting queries skip the cache
        // rather than ever receiving an unsigned cached answer.
        let key = cache_key(&qname, qtype);
        if !do_bit {
            if let Some(mut bytes) = self.cache.l1_get(&key) {
                trace!("L1 hit for {key}");
                bytes[0..2].copy_from_slice(&request.header.id.to_be_bytes());
                return Ok(QueryResponse::Single(bytes));
            }
            match self.cache.l2_get(&key).await {
                Ok(Some(mut bytes)) => {
                    trace!("L2 hit for {key}");
                    self.cache
                        .l1_set(&key, bytes.clone(), self.cache.l1_default_ttl());
                    bytes[0..2].copy_from_slice(&request.header.id.to_be_bytes());
                    return Ok(QueryResponse::Single(bytes));
                }
                Ok(None) => {}
                Err(error) => warn!("L2 lookup for {key} failed: {error}"),
            }
        }

        // walk labels off the front until a zone matches
        let zone = self.find_zone(&qname).await?;

        // record lookup with the client address passed through for
        // split-horizon filtering in the store
        let mut rows = self
            .store
            .get_records(&qname, Some(qtype), src.ip())
            .await?;

        // wildcard fallback: matched records answer under the queried name
        if rows.is_empty() {
            if let Some(zone) = &zone {
                for candidate in wildcard_candidates(&qname, &zone.name) {
                    let wildcard_rows = self
                        .store
                        .get_records(&candidate, Some(qtype), src.ip())
                        .await?;
                    if !wildcard_rows.is_empty() {
                        rows = wildcard_rows
                            .into_iter()
                            .map(|mut row| {
                                row.name = qname.clone();
                                row
                            })
                            .collect();
                        break;
                    }
                }
            }
        }

        let mut response = self.reply(request, Rcode::NoError, zone.is_some());

        // apex DNSKEY answers come from the key table, not zone rows
        if rows.is_empty() && qtype == RecordType::DNSKEY {
            if let Some(zone) = &zone {
                if qname == zone.name {
                    let dnskeys = self.dnssec.dnskey_records(zone, 300).await?;
                    if !dnskeys.is_empty() {
                        response.answers.extend(dnskeys);
                        if do_bit {
                            self.sign_response(&mut response, zone).await?;
                        }
                        if let Some((_, client_do)) = edns {
                            response.additionals.push(server_opt(client_do));
                        }
                        return self
                            .finish(&mut response, transport, client_payload, &key, false)
                            .await;
                    }
                }
            }
        }

        if rows.is_empty() {
            let Some(zone) = &zone else {
                // not our zone and we do not recurse
                response.header.rcode = Rcode::Refused;
                response.header.authoritative = false;
                return self.finish_uncached(&response);
            };
            self.negative_answer(&mut response, zone, &qname, src, do_bit)
                .await?;
        } else {
            self.positive_answer(&mut response, zone.as_ref(), rows, qtype, &qname, src)
                .await?;
        }

        // sign what we are about to say when the client asked for DNSSEC
        if do_bit {
            if let Some(zone) = &zone {
                self.sign_response(&mut response, zone).await?;
            }
        }

        // echo EDNS with our own payload size and the DO bit copied
        if let Some((_, client_do)) = edns {
            response.additionals.push(server_opt(client_do));
        }

        self.finish(&mut response, transport, client_payload, &key, !do_bit)
            .await
    }

    /// Strip labels until the store recognizes a zone.
    async fn find_zone(&self, qname: &str) -> Result<Option<Zone>, AuthNsError> {
        let mut candidate = qname.to_string();
        loop {
            if let Some(zone) = self.store.get_zone(&candidate).await? {
                return Ok(Some(zone));
            }
            match parent_name(&candidate) {
                Some(parent) if candidate != "." => candidate = parent,
                _ => return Ok(None),
            }
        }
    }

    /// NXDOMAIN: SOA for negative caching, and a denial proof when DO is set.
    async fn negative_answer(
        &self,
        response: &mut Message,
        zone: &Zone,
        qname: &str,
        src: SocketAddr,
        do_bit: bool,
    ) -> Result<(), AuthNsError> {
        response.header.rcode = Rcode::NxDomain;
        let soa_rows = self
            .store
            .get_records(&zone.name, Some(RecordType::SOA), src.ip())
            .await?;
        let mut soa_minimum = 300;
        for row in &soa_rows {
            let record = row.to_resource_record()?;
            if let RData::SOA { minimum, .. } = &record.rdata {
                soa_minimum = (*minimum).min(row.ttl);
            }
            response.authorities.push(record);
        }

        if do_bit {
            let zone_rows = self.store.list_records_for_zone(zone.id).await?;
            // NSEC3 when the zone carries an NSEC3PARAM, plain NSEC otherwise
            let proof = match Nsec3Params::from_records(&zone_rows) {
                Some(params) => {
                    self.dnssec
                        .nsec3_proof(zone, &params, &zone_rows, qname, soa_minimum)?
                }
                None => self.dnssec.nsec_proof(&zone_rows, qname, soa_minimum)?,
            };
            response.authorities.push(proof);
        }
        Ok(())
    }

    /// NOERROR with answers, the apex NS set in authority and glue addresses
    /// in additional.
    async fn positive_answer(
        &self,
        response: &mut Message,
        zone: Option<&Zone>,
        rows: Vec<Record>,
        qtype: RecordType,
        qname: &str,
        src: SocketAddr,
    ) -> Result<(), AuthNsError> {
        for row in rows {
            match row.to_resource_record() {
                Ok(record) => response.answers.push(record),
                Err(error) => warn!("skipping unserializable record {}: {error}", row.name),
            }
        }

        let Some(zone) = zone else {
            return Ok(());
        };

        // apex NS set in authority, except when that is already the answer
        let answering_apex_ns = qtype == RecordType::NS && qname == zone.name;
        if !answering_apex_ns {
            let ns_rows = self
                .store
                .get_records(&zone.name, Some(RecordType::NS), src.ip())
                .await?;
            let mut glue_targets = vec![];
            for row in ns_rows {
                let record = row.to_resource_record()?;
                if let RData::NS { nsdname } = &record.rdata {
                    glue_targets.push(nsdname.name.clone());
                }
                response.authorities.push(record);
            }
            for target in glue_targets {
                for addr in self.store.get_ips_for_name(&target, src.ip()).await? {
                    let rdata = match addr {
                        std::net::IpAddr::V4(address) => RData::A { address },
                        std::net::IpAddr::V6(address) => RData::AAAA { address },
                    };
                    response.additionals.push(ResourceRecord {
                        name: target.clone(),
                        rrtype: rdata.record_type(),
                        class: RecordClass::Internet,
                        ttl: 300,
                        rdata,
                    });
                }
            }
        }
        Ok(())
    }

    /// RRSIGs beside every answer and authority RRset, signed with the
    /// zone's active ZSK.
    async fn sign_response(
        &self,
        response: &mut Message,
        zone: &Zone,
    ) -> Result<(), AuthNsError> {
        if !self.dnssec.zone_is_signed(zone.id).await? {
            return Ok(());
        }
        let Some(zsk) = self
            .dnssec
            .active_key(zone.id, crate::store::KeyType::Zsk)
            .await?
        else {
            return Ok(());
        };
        response.answers = self.dnssec.sign_records(zone, &zsk, &response.answers)?;
        response.authorities = self
            .dnssec
            .sign_records(zone, &zsk, &response.authorities)?;
        Ok(())
    }

    /// Serialize without caching, for refusals and other non-answers.
    fn finish_uncached(&self, response: &Message) -> Result<QueryResponse, AuthNsError> {
        let mut buf = self.buffers.acquire();
        response.write(&mut buf, true)?;
        Ok(QueryResponse::Single(buf.bytes().to_vec()))
    }

    /// Serialize, truncate for UDP when oversized, and cache cacheable
    /// outcomes under the question key.
    async fn finish(
        &self,
        response: &mut Message,
        transport: Transport,
        client_payload: u16,
        key: &str,
        cache_allowed: bool,
    ) -> Result<QueryResponse, AuthNsError> {
        let mut buf = self.buffers.acquire();
        response.write(&mut buf, true)?;

        if transport == Transport::Udp && buf.len() > client_payload as usize {
            debug!(
                "response of {} bytes exceeds client payload {client_payload}, truncating",
                buf.len()
            );
            response.header.truncated = true;
            response.answers.clear();
            response.authorities.clear();
            response.additionals.clear();
            response.write(&mut buf, true)?;
        }

        let bytes = buf.bytes().to_vec();
        // the buffer goes back to the pool before any cache I/O suspends us
        drop(buf);

        let cacheable = cache_allowed
            && matches!(response.header.rcode, Rcode::NoError | Rcode::NxDomain)
            && !response.header.truncated;
        if cacheable {
            let first_answer = response.answers.first().map(|r| r.ttl);
            let first_authority = response.authorities.first().map(|r| r.ttl);
            let ttl = [first_answer, first_authority]
                .into_iter()
                .flatten()
                .chain(std::iter::once(CACHE_TTL_CEILING))
                .min()
                .unwrap_or(CACHE_TTL_CEILING);
            if ttl > 0 {
                self.cache
                    .set(key, bytes.clone(), Duration::from_secs(ttl as u64))
                    .await;
            }
        }
        Ok(QueryResponse::Single(bytes))
    }
}
