//! Dynamic updates, [RFC2136](https://www.rfc-editor.org/rfc/rfc2136).
//! The message sections are re-read as zone / prerequisite / update /
//! additional; prerequisites all pass before anything touches the store,
//! and each accepted message bumps the SOA serial exactly once.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::RrCache;
use crate::enums::{OpCode, Rcode, RecordClass, RecordType};
use crate::error::AuthNsError;
use crate::message::Message;
use crate::name::normalize_name;
use crate::store::{AuditEntry, ChangeAction, Record, Zone, ZoneChange, ZoneStore};
use crate::transfer::TransferEngine;
use crate::tsig::{verify_message, TsigKeyring};

/// One applied mutation, kept so the serial bump can write the change log
/// and the invalidation fan-out knows what moved.
struct AppliedChange {
    action: ChangeAction,
    name: String,
    rrtype: RecordType,
    rdata: String,
    ttl: u32,
}

pub struct UpdateEngine {
    store: Arc<dyn ZoneStore>,
    cache: Arc<RrCache>,
    keyring: Arc<TsigKeyring>,
    transfer: TransferEngine,
    /// serializes the SOA read-modify-write per zone
    zone_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl UpdateEngine {
    pub fn new(
        store: Arc<dyn ZoneStore>,
        cache: Arc<RrCache>,
        keyring: Arc<TsigKeyring>,
        transfer: TransferEngine,
    ) -> Self {
        UpdateEngine {
            store,
            cache,
            keyring,
            transfer,
            zone_locks: DashMap::new(),
        }
    }

    fn response(&self, request: &Message, rcode: Rcode) -> Message {
        let mut header = request.header.as_answer();
        header.opcode = OpCode::Update;
        header.rcode = rcode;
        Message {
            header,
            questions: request.questions.clone(),
            ..Default::default()
        }
    }

    fn zone_lock(&self, zone_id: Uuid) -> Arc<Mutex<()>> {
        self.zone_locks
            .entry(zone_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Process one update message. Every outcome is a response; failures
    /// map onto the RFC2136 response codes and infrastructure trouble
    /// becomes SERVFAIL.
    pub async fn handle_update(
        &self,
        raw: &[u8],
        request: &Message,
        src: SocketAddr,
    ) -> Message {
        // authenticate first when a signature is present
        let mut actor = src.ip().to_string();
        if request.tsig_offset.is_some() {
            match verify_message(raw, request, &self.keyring) {
                Ok(key) => actor = key.name,
                Err(error) => {
                    warn!("update from {src} failed TSIG verification: {error}");
                    return self.response(request, Rcode::NotAuth);
                }
            }
        }

        if request.questions.len() != 1 {
            return self.response(request, Rcode::FormatError);
        }
        let zone_name = normalize_name(&request.questions[0].qname);

        let zone = match self.store.get_zone(&zone_name).await {
            Ok(Some(zone)) => zone,
            Ok(None) => {
                debug!("update for unserved zone {zone_name}");
                return self.response(request, Rcode::NotAuth);
            }
            Err(error) => {
                warn!("update zone lookup failed: {error}");
                return self.response(request, Rcode::ServFail);
            }
        };

        let lock = self.zone_lock(zone.id);
        let _guard = lock.lock().await;

        match self.evaluate_prerequisites(&zone, request, src).await {
            Ok(Rcode::NoError) => {}
            Ok(failed) => return self.response(request, failed),
            Err(error) => {
                warn!("prerequisite check failed: {error}");
                return self.response(request, Rcode::ServFail);
            }
        }

        match self.apply_updates(&zone, request).await {
            Ok(applied) if applied.is_empty() => self.response(request, Rcode::NoError),
            Ok(applied) => match self.commit(&zone, &actor, applied).await {
                Ok(()) => {
                    self.transfer.spawn_notify(zone);
                    self.response(request, Rcode::NoError)
                }
                Err(error) => {
                    warn!("update commit failed for {}: {error}", zone.name);
                    self.response(request, Rcode::ServFail)
                }
            },
            Err(UpdateFailure::Rcode(rcode)) => self.response(request, rcode),
            Err(UpdateFailure::Infra(error)) => {
                warn!("update apply failed for {}: {error}", zone.name);
                self.response(request, Rcode::ServFail)
            }
        }
    }

    /// RFC2136 section 3.2: the answer section holds prerequisites, judged
    /// by class and type. Returns the first failing code, NoError when all
    /// hold.
    async fn evaluate_prerequisites(
        &self,
        zone: &Zone,
        request: &Message,
        src: SocketAddr,
    ) -> Result<Rcode, AuthNsError> {
        for prereq in &request.answers {
            let name = normalize_name(&prereq.name);
            if !name.ends_with(&zone.name) {
                return Ok(Rcode::NotZone);
            }
            let rrset = |rrtype: Option<RecordType>| {
                self.store.get_records(&name, rrtype, src.ip())
            };
            let failed = match (prereq.class, prereq.rrtype) {
                // name must be in use
                (RecordClass::Any, RecordType::ANY) => {
                    rrset(None).await?.is_empty().then_some(Rcode::NxDomain)
                }
                // RRset must exist (value-independent)
                (RecordClass::Any, rrtype) => rrset(Some(rrtype))
                    .await?
                    .is_empty()
                    .then_some(Rcode::NxRrset),
                // name must not be in use
                (RecordClass::None, RecordType::ANY) => {
                    (!rrset(None).await?.is_empty()).then_some(Rcode::YxDomain)
                }
                // RRset must not exist
                (RecordClass::None, rrtype) => (!rrset(Some(rrtype)).await?.is_empty())
                    .then_some(Rcode::YxRrset),
                // "value-dependent" prerequisite; judged value-independently here
                (RecordClass::Internet, rrtype) => rrset(Some(rrtype))
                    .await?
                    .is_empty()
                    .then_some(Rcode::NxRrset),
                _ => Some(Rcode::FormatError),
            };
            if let Some(rcode) = failed {
                debug!(
                    "prerequisite failed: {} {} {} -> {rcode}",
                    prereq.class, prereq.rrtype, name
                );
                return Ok(rcode);
            }
        }
        Ok(Rcode::NoError)
    }

    /// RFC2136 section 3.4: the authority section holds the mutations.
    async fn apply_updates(
        &self,
        zone: &Zone,
        request: &Message,
    ) -> Result<Vec<AppliedChange>, UpdateFailure> {
        let mut applied = vec![];
        for update in &request.authorities {
            let name = normalize_name(&update.name);
            if !name.ends_with(&zone.name) {
                return Err(UpdateFailure::Rcode(Rcode::NotZone));
            }
            match (update.class, update.rrtype) {
                // delete every record at the name
                (RecordClass::Any, RecordType::ANY) => {
                    let removed = self.store.delete_records_by_name(zone.id, &name).await?;
                    applied.extend(removed.into_iter().map(AppliedChange::delete));
                }
                // delete one RRset
                (RecordClass::Any, rrtype) => {
                    let removed = self
                        .store
                        .delete_records_by_name_and_type(zone.id, &name, rrtype)
                        .await?;
                    applied.extend(removed.into_iter().map(AppliedChange::delete));
                }
                // delete the specific record matching name, type and rdata
                (RecordClass::None, rrtype) => {
                    let rdata = update.rdata.presentation();
                    let removed = self
                        .store
                        .delete_record_specific(zone.id, &name, rrtype, &rdata)
                        .await?;
                    applied.extend(removed.into_iter().map(AppliedChange::delete));
                }
                // add a record
                (RecordClass::Internet, rrtype) => {
                    let mut record =
                        Record::new(zone.id, &name, rrtype, update.ttl, &update.rdata.presentation());
                    let (priority, weight, port) = update.rdata.extras();
                    record.priority = priority;
                    record.weight = weight;
                    record.port = port;
                    applied.push(AppliedChange::add(&record));
                    self.store.create_record(record).await?;
                }
                _ => return Err(UpdateFailure::Rcode(Rcode::FormatError)),
            }
        }
        Ok(applied)
    }

    /// Bump the SOA serial, persist the change log under the new serial,
    /// drop caches and publish invalidations.
    async fn commit(
        &self,
        zone: &Zone,
        actor: &str,
        applied: Vec<AppliedChange>,
    ) -> Result<(), AuthNsError> {
        let loopback: std::net::IpAddr = [127, 0, 0, 1].into();
        let soa_rows = self
            .store
            .get_records(&zone.name, Some(RecordType::SOA), loopback)
            .await?;
        let mut soa = soa_rows
            .into_iter()
            .next()
            .ok_or_else(|| AuthNsError::MissingSoa(zone.name.clone()))?;

        let mut fields: Vec<String> = soa.rdata.split_whitespace().map(String::from).collect();
        if fields.len() != 7 {
            return Err(AuthNsError::Store(format!(
                "SOA for {} has malformed rdata",
                zone.name
            )));
        }
        let serial: u32 = fields[2]
            .parse()
            .map_err(|e| AuthNsError::Store(format!("SOA serial: {e}")))?;
        let new_serial = serial.wrapping_add(1);
        fields[2] = new_serial.to_string();
        soa.rdata = fields.join(" ");
        soa.updated_at = chrono::Utc::now();
        self.store.update_record(soa).await?;

        for change in &applied {
            self.store
                .record_zone_change(ZoneChange {
                    id: Uuid::now_v7(),
                    zone_id: zone.id,
                    serial: new_serial,
                    action: change.action,
                    name: change.name.clone(),
                    rrtype: change.rrtype,
                    rdata: change.rdata.clone(),
                    ttl: change.ttl,
                    created_at: chrono::Utc::now(),
                })
                .await?;
        }

        self.cache.flush_l1();
        for change in &applied {
            if let Err(error) = self
                .cache
                .publish_invalidation(&change.name, change.rrtype)
                .await
            {
                warn!("invalidation publish for {} failed: {error}", change.name);
            }
        }

        info!(
            "zone {} updated by {actor}: {} changes, serial {new_serial}",
            zone.name,
            applied.len()
        );
        self.store
            .append_audit(AuditEntry::new(
                Some(zone.id),
                actor,
                "dynamic-update",
                &format!("{} changes, serial {new_serial}", applied.len()),
            ))
            .await?;
        Ok(())
    }
}

impl AppliedChange {
    fn add(record: &Record) -> Self {
        AppliedChange {
            action: ChangeAction::Add,
            name: record.name.clone(),
            rrtype: record.rrtype,
            rdata: record.rdata.clone(),
            ttl: record.ttl,
        }
    }

    fn delete(record: Record) -> Self {
        AppliedChange {
            action: ChangeAction::Delete,
            name: record.name,
            rrtype: record.rrtype,
            rdata: record.rdata,
            ttl: record.ttl,
        }
    }
}

enum UpdateFailure {
    Rcode(Rcode),
    Infra(AuthNsError),
}

impl From<AuthNsError> for UpdateFailure {
    fn from(error: AuthNsError) -> Self {
        UpdateFailure::Infra(error)
    }
}
