//! Zone transfers and NOTIFY coordination: AXFR streaming per
//! [RFC1034](https://www.rfc-editor.org/rfc/rfc1034), IXFR per
//! [RFC1995](https://www.rfc-editor.org/rfc/rfc1995) and NOTIFY per
//! [RFC1996](https://www.rfc-editor.org/rfc/rfc1996).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::enums::{OpCode, PacketType, Rcode, RecordClass, RecordType};
use crate::error::AuthNsError;
use crate::message::{Message, Question, ResourceRecord};
use crate::name::normalize_name;
use crate::rdata::RData;
use crate::store::{ChangeAction, Record, Zone, ZoneStore};
use crate::Header;

/// NOTIFY fan-out gives up after this long, slow secondaries included.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);
const DNS_PORT: u16 = 53;

/// Streams transfers out of the zone store and pushes NOTIFY messages at
/// the zone's secondaries.
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn ZoneStore>,
    /// our own SOA mname / NS name, skipped during NOTIFY fan-out
    hostname: String,
    /// test hook: aim NOTIFY datagrams somewhere other than port 53
    notify_port_override: Option<u16>,
}

impl TransferEngine {
    pub fn new(
        store: Arc<dyn ZoneStore>,
        hostname: String,
        notify_port_override: Option<u16>,
    ) -> Self {
        TransferEngine {
            store,
            hostname: normalize_name(&hostname),
            notify_port_override,
        }
    }

    fn transfer_header(&self, request: &Message, ancount: u16) -> Header {
        Header {
            id: request.header.id,
            qr: PacketType::Answer,
            opcode: request.header.opcode,
            authoritative: true,
            ancount,
            qdcount: 0,
            ..Header::default()
        }
    }

    /// One message of the stream: the question rides only in the first.
    fn stream_message(
        &self,
        request: &Message,
        include_question: bool,
        answers: Vec<ResourceRecord>,
    ) -> Result<Vec<u8>, AuthNsError> {
        let mut message = Message {
            header: self.transfer_header(request, answers.len() as u16),
            answers,
            ..Default::default()
        };
        if include_question {
            message.questions = request.questions.clone();
        }
        message.to_bytes(true)
    }

    fn error_message(&self, request: &Message, rcode: Rcode) -> Result<Vec<u8>, AuthNsError> {
        let mut header = request.header.as_answer();
        header.rcode = rcode;
        let message = Message {
            header,
            questions: request.questions.clone(),
            ..Default::default()
        };
        message.to_bytes(true)
    }

    async fn zone_and_soa(
        &self,
        qname: &str,
        client_ip: IpAddr,
    ) -> Result<Option<(Zone, ResourceRecord)>, AuthNsError> {
        let Some(zone) = self.store.get_zone(qname).await? else {
            return Ok(None);
        };
        let soa_rows = self
            .store
            .get_records(&zone.name, Some(RecordType::SOA), client_ip)
            .await?;
        let Some(soa_row) = soa_rows.first() else {
            return Err(AuthNsError::MissingSoa(zone.name.clone()));
        };
        Ok(Some((zone.clone(), soa_row.to_resource_record()?)))
    }

    /// Full transfer: SOA, every non-SOA record, SOA again. Each record goes
    /// out as its own DNS message; the TCP handler adds the length prefixes.
    pub async fn handle_axfr(
        &self,
        request: &Message,
        src: SocketAddr,
    ) -> Result<Vec<Vec<u8>>, AuthNsError> {
        let question = request
            .questions
            .first()
            .ok_or_else(|| AuthNsError::MalformedPacket("AXFR without a question".to_string()))?;
        let qname = normalize_name(&question.qname);

        let (zone, soa) = match self.zone_and_soa(&qname, src.ip()).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                debug!("AXFR for unknown zone {qname}");
                return Ok(vec![self.error_message(request, Rcode::NxDomain)?]);
            }
            Err(AuthNsError::MissingSoa(zone)) => {
                warn!("AXFR for {zone} which has no SOA");
                return Ok(vec![self.error_message(request, Rcode::ServFail)?]);
            }
            Err(other) => return Err(other),
        };

        info!("AXFR of {} to {src}", zone.name);
        let mut stream = vec![self.stream_message(request, true, vec![soa.clone()])?];
        for row in self.store.list_records_for_zone(zone.id).await? {
            if row.rrtype == RecordType::SOA {
                continue;
            }
            match row.to_resource_record() {
                Ok(record) => stream.push(self.stream_message(request, false, vec![record])?),
                Err(error) => warn!("skipping unserializable record {}: {error}", row.name),
            }
        }
        stream.push(self.stream_message(request, false, vec![soa])?);
        Ok(stream)
    }

    /// Incremental transfer. The client's current serial arrives as an SOA
    /// in the request authority; we stream the change windows above it, or
    /// fall back to AXFR when the history is gone.
    pub async fn handle_ixfr(
        &self,
        request: &Message,
        src: SocketAddr,
    ) -> Result<Vec<Vec<u8>>, AuthNsError> {
        let question = request
            .questions
            .first()
            .ok_or_else(|| AuthNsError::MalformedPacket("IXFR without a question".to_string()))?;
        let qname = normalize_name(&question.qname);

        let client_serial = match request.authorities.iter().find_map(|r| match &r.rdata {
            RData::SOA { serial, .. } => Some(*serial),
            _ => None,
        }) {
            Some(serial) => serial,
            None => {
                debug!("IXFR for {qname} without client SOA");
                return Ok(vec![self.error_message(request, Rcode::FormatError)?]);
            }
        };

        let (zone, soa) = match self.zone_and_soa(&qname, src.ip()).await {
            Ok(Some(found)) => found,
            Ok(None) => return Ok(vec![self.error_message(request, Rcode::NxDomain)?]),
            Err(AuthNsError::MissingSoa(_)) => {
                return Ok(vec![self.error_message(request, Rcode::ServFail)?])
            }
            Err(other) => return Err(other),
        };
        let current_serial = match &soa.rdata {
            RData::SOA { serial, .. } => *serial,
            _ => return Ok(vec![self.error_message(request, Rcode::ServFail)?]),
        };

        // client is already current: a single SOA says so
        if client_serial == current_serial {
            return Ok(vec![self.stream_message(request, true, vec![soa])?]);
        }

        let changes = self.store.list_zone_changes(zone.id, client_serial).await?;
        if changes.is_empty() {
            debug!(
                "IXFR for {} has no history above {client_serial}, falling back to AXFR",
                zone.name
            );
            return self.handle_axfr(request, src).await;
        }

        info!(
            "IXFR of {} to {src}: {client_serial} -> {current_serial}",
            zone.name
        );
        let soa_at = |serial: u32| -> ResourceRecord {
            let mut record = soa.clone();
            if let RData::SOA { serial: s, .. } = &mut record.rdata {
                *s = serial;
            }
            record
        };

        let mut stream = vec![self.stream_message(request, true, vec![soa.clone()])?];
        // accumulate by strictly increasing serial; only non-empty windows
        // are emitted
        let mut previous_serial = client_serial;
        let mut idx = 0usize;
        while idx < changes.len() {
            let window_serial = changes[idx].serial;
            let mut deletions = vec![];
            let mut additions = vec![];
            while idx < changes.len() && changes[idx].serial == window_serial {
                let change = &changes[idx];
                let row = Record::new(
                    zone.id,
                    &change.name,
                    change.rrtype,
                    change.ttl,
                    &change.rdata,
                );
                match row.to_resource_record() {
                    Ok(record) => match change.action {
                        ChangeAction::Delete => deletions.push(record),
                        ChangeAction::Add => additions.push(record),
                    },
                    Err(error) => warn!("skipping change row for {}: {error}", change.name),
                }
                idx += 1;
            }
            if deletions.is_empty() && additions.is_empty() {
                continue;
            }
            let mut window = vec![soa_at(previous_serial)];
            window.extend(deletions);
            window.push(soa_at(window_serial));
            window.extend(additions);
            stream.push(self.stream_message(request, false, window)?);
            previous_serial = window_serial;
        }
        stream.push(self.stream_message(request, false, vec![soa])?);
        Ok(stream)
    }

    /// Acknowledge an incoming NOTIFY: echo the question with QR and AA set.
    /// Kicking off a refresh transfer is the secondary machinery's business,
    /// not ours.
    pub fn notify_ack(request: &Message) -> Message {
        let mut header = request.header.as_answer();
        header.opcode = OpCode::Notify;
        header.rcode = Rcode::NoError;
        Message {
            header,
            questions: request.questions.clone(),
            ..Default::default()
        }
    }

    /// Send NOTIFY to every NS host of the zone except ourselves. Each
    /// target resolves through the zone store; the whole batch runs under
    /// one parent timeout at the call site.
    pub async fn send_notify(&self, zone: &Zone) -> Result<(), AuthNsError> {
        let client_ip: IpAddr = "127.0.0.1".parse().map_err(|_| {
            AuthNsError::InvalidValue("loopback literal".to_string())
        })?;
        let ns_rows = self
            .store
            .get_records(&zone.name, Some(RecordType::NS), client_ip)
            .await?;

        let message = {
            let id: u16 = rand::thread_rng().gen();
            let message = Message {
                header: Header {
                    id,
                    opcode: OpCode::Notify,
                    authoritative: true,
                    qdcount: 1,
                    ..Header::default()
                },
                questions: vec![Question {
                    qname: zone.name.clone(),
                    qtype: RecordType::SOA,
                    qclass: RecordClass::Internet,
                }],
                ..Default::default()
            };
            message.to_bytes(true)?
        };

        let port = self.notify_port_override.unwrap_or(DNS_PORT);
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        for row in ns_rows {
            let target = normalize_name(&row.rdata);
            if target == self.hostname {
                continue;
            }
            let addrs = self.store.get_ips_for_name(&target, client_ip).await?;
            if addrs.is_empty() {
                warn!("NOTIFY target {target} has no address records");
                continue;
            }
            for addr in addrs {
                debug!("NOTIFY {} -> {target} ({addr})", zone.name);
                if let Err(error) = socket.send_to(&message, SocketAddr::new(addr, port)).await {
                    warn!("NOTIFY to {addr} failed: {error}");
                }
            }
        }
        Ok(())
    }

    /// Fire-and-forget NOTIFY fan-out under the parent timeout.
    pub fn spawn_notify(&self, zone: Zone) {
        let engine = self.clone();
        tokio::spawn(async move {
            match timeout(NOTIFY_TIMEOUT, engine.send_notify(&zone)).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!("NOTIFY fan-out for {} failed: {error}", zone.name),
                Err(_) => warn!("NOTIFY fan-out for {} timed out", zone.name),
            }
        });
    }
}
