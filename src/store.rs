//! The zone storage capability the engines consume, plus the in-memory
//! implementation the test suite and standalone servers run on. Production
//! deployments wire a SQL-backed implementation in from outside the core.

use std::net::IpAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{RecordClass, RecordType};
use crate::error::AuthNsError;
use crate::message::ResourceRecord;
use crate::name::normalize_name;
use crate::rdata::RData;

/// A zone we are authoritative for. `name` is always lowercase with the
/// trailing dot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    pub tenant_id: String,
    pub description: Option<String>,
    pub vpc_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Zone {
    pub fn new(name: &str, tenant_id: &str) -> Self {
        let now = Utc::now();
        Zone {
            id: Uuid::now_v7(),
            name: normalize_name(name),
            tenant_id: tenant_id.to_string(),
            description: None,
            vpc_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One row of zone data. The rdata is presentation text; MX and SRV keep
/// their numeric fields in the typed columns beside it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub zone_id: Uuid,
    pub name: String,
    pub rrtype: RecordType,
    pub class: RecordClass,
    pub ttl: u32,
    pub rdata: String,
    pub priority: Option<u16>,
    pub weight: Option<u16>,
    pub port: Option<u16>,
    /// When set, the record only answers clients inside this network.
    pub network: Option<IpNet>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(zone_id: Uuid, name: &str, rrtype: RecordType, ttl: u32, rdata: &str) -> Self {
        let now = Utc::now();
        Record {
            id: Uuid::now_v7(),
            zone_id,
            name: normalize_name(name),
            rrtype,
            class: RecordClass::Internet,
            ttl,
            rdata: rdata.to_string(),
            priority: None,
            weight: None,
            port: None,
            network: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Convert the row into a wire-ready record.
    pub fn to_resource_record(&self) -> Result<ResourceRecord, AuthNsError> {
        let rdata = RData::from_presentation(
            self.rrtype,
            &self.rdata,
            self.priority,
            self.weight,
            self.port,
        )?;
        Ok(ResourceRecord {
            name: self.name.clone(),
            rrtype: self.rrtype,
            class: self.class,
            ttl: self.ttl,
            rdata,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeAction {
    Add,
    Delete,
}

/// Append-only diff row backing IXFR.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneChange {
    pub id: Uuid,
    pub zone_id: Uuid,
    /// The zone serial this change landed under, strictly increasing.
    pub serial: u32,
    pub action: ChangeAction,
    pub name: String,
    pub rrtype: RecordType,
    pub rdata: String,
    pub ttl: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Ksk,
    Zsk,
}

/// A DNSSEC signing key. Algorithm 13 (ECDSA P-256 with SHA-256) is the only
/// one we mint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnssecKey {
    pub id: Uuid,
    pub zone_id: Uuid,
    pub key_type: KeyType,
    pub algorithm: u8,
    /// base64 PKCS#8 document
    pub private_key: String,
    /// uncompressed point minus the 0x04 prefix, DNSKEY wire form
    pub public_key: Vec<u8>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub zone_id: Option<Uuid>,
    pub actor: String,
    pub action: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(zone_id: Option<Uuid>, actor: &str, action: &str, detail: &str) -> Self {
        AuditEntry {
            id: Uuid::now_v7(),
            zone_id,
            actor: actor.to_string(),
            action: action.to_string(),
            detail: detail.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// The capability surface the engines call. Every operation returns a typed
/// error; infrastructure failures surface as SERVFAIL upstream.
#[async_trait]
pub trait ZoneStore: Send + Sync {
    async fn get_zone(&self, name: &str) -> Result<Option<Zone>, AuthNsError>;
    async fn list_zones(&self, tenant_id: Option<&str>) -> Result<Vec<Zone>, AuthNsError>;
    async fn create_zone(&self, zone: Zone) -> Result<(), AuthNsError>;

    /// Records at a name, optionally filtered by type, visible to the
    /// client: rows whose network is NULL or contains `client_ip`.
    async fn get_records(
        &self,
        name: &str,
        rrtype: Option<RecordType>,
        client_ip: IpAddr,
    ) -> Result<Vec<Record>, AuthNsError>;
    /// Addresses for a name, for glue records.
    async fn get_ips_for_name(
        &self,
        name: &str,
        client_ip: IpAddr,
    ) -> Result<Vec<IpAddr>, AuthNsError>;
    async fn list_records_for_zone(&self, zone_id: Uuid) -> Result<Vec<Record>, AuthNsError>;
    async fn create_record(&self, record: Record) -> Result<(), AuthNsError>;
    async fn update_record(&self, record: Record) -> Result<(), AuthNsError>;
    async fn delete_record(&self, record_id: Uuid) -> Result<(), AuthNsError>;
    async fn delete_records_by_name(&self, zone_id: Uuid, name: &str)
        -> Result<Vec<Record>, AuthNsError>;
    async fn delete_records_by_name_and_type(
        &self,
        zone_id: Uuid,
        name: &str,
        rrtype: RecordType,
    ) -> Result<Vec<Record>, AuthNsError>;
    /// Delete the one record matching name, type and rdata text.
    async fn delete_record_specific(
        &self,
        zone_id: Uuid,
        name: &str,
        rrtype: RecordType,
        rdata: &str,
    ) -> Result<Vec<Record>, AuthNsError>;

    async fn record_zone_change(&self, change: ZoneChange) -> Result<(), AuthNsError>;
    async fn list_zone_changes(
        &self,
        zone_id: Uuid,
        from_serial: u32,
    ) -> Result<Vec<ZoneChange>, AuthNsError>;

    async fn list_keys(&self, zone_id: Uuid) -> Result<Vec<DnssecKey>, AuthNsError>;
    async fn create_key(&self, key: DnssecKey) -> Result<(), AuthNsError>;
    async fn deactivate_key(&self, key_id: Uuid) -> Result<(), AuthNsError>;

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), AuthNsError>;

    /// Liveness probe for healthchecks.
    async fn ping(&self) -> Result<(), AuthNsError>;
}

/// DashMap-backed store. Indexes records per zone; fine for tests and
/// single-node serving, not a durability layer.
#[derive(Default)]
pub struct MemoryZoneStore {
    zones: DashMap<String, Zone>,
    records: DashMap<Uuid, Vec<Record>>,
    changes: DashMap<Uuid, Vec<ZoneChange>>,
    keys: DashMap<Uuid, Vec<DnssecKey>>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl MemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn visible(record: &Record, client_ip: IpAddr) -> bool {
        match &record.network {
            Some(net) => net.contains(&client_ip),
            None => true,
        }
    }

    fn type_matches(record: &Record, rrtype: Option<RecordType>) -> bool {
        match rrtype {
            None | Some(RecordType::ANY) => true,
            Some(t) => record.rrtype == t,
        }
    }

    #[cfg(test)]
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        match self.audit.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ZoneStore for MemoryZoneStore {
    async fn get_zone(&self, name: &str) -> Result<Option<Zone>, AuthNsError> {
        Ok(self.zones.get(&normalize_name(name)).map(|z| z.clone()))
    }

    async fn list_zones(&self, tenant_id: Option<&str>) -> Result<Vec<Zone>, AuthNsError> {
        Ok(self
            .zones
            .iter()
            .filter(|z| tenant_id.is_none_or(|t| z.tenant_id == t))
            .map(|z| z.clone())
            .collect())
    }

    async fn create_zone(&self, zone: Zone) -> Result<(), AuthNsError> {
        self.records.entry(zone.id).or_default();
        self.zones.insert(zone.name.clone(), zone);
        Ok(())
    }

    async fn get_records(
        &self,
        name: &str,
        rrtype: Option<RecordType>,
        client_ip: IpAddr,
    ) -> Result<Vec<Record>, AuthNsError> {
        let name = normalize_name(name);
        let mut out = vec![];
        for entry in self.records.iter() {
            out.extend(
                entry
                    .value()
                    .iter()
                    .filter(|r| {
                        r.name == name
                            && Self::type_matches(r, rrtype)
                            && Self::visible(r, client_ip)
                    })
                    .cloned(),
            );
        }
        Ok(out)
    }

    async fn get_ips_for_name(
        &self,
        name: &str,
        client_ip: IpAddr,
    ) -> Result<Vec<IpAddr>, AuthNsError> {
        let mut out = vec![];
        for record in self
            .get_records(name, Some(RecordType::A), client_ip)
            .await?
        {
            if let Ok(addr) = record.rdata.parse::<IpAddr>() {
                out.push(addr);
            }
        }
        for record in self
            .get_records(name, Some(RecordType::AAAA), client_ip)
            .await?
        {
            if let Ok(addr) = record.rdata.parse::<IpAddr>() {
                out.push(addr);
            }
        }
        Ok(out)
    }

    async fn list_records_for_zone(&self, zone_id: Uuid) -> Result<Vec<Record>, AuthNsError> {
        Ok(self
            .records
            .get(&zone_id)
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    async fn create_record(&self, mut record: Record) -> Result<(), AuthNsError> {
        record.name = normalize_name(&record.name);
        self.records.entry(record.zone_id).or_default().push(record);
        Ok(())
    }

    async fn update_record(&self, record: Record) -> Result<(), AuthNsError> {
        let mut rows = self
            .records
            .get_mut(&record.zone_id)
            .ok_or_else(|| AuthNsError::Store(format!("no zone {}", record.zone_id)))?;
        match rows.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(AuthNsError::Store(format!("no record {}", record.id))),
        }
    }

    async fn delete_record(&self, record_id: Uuid) -> Result<(), AuthNsError> {
        for mut entry in self.records.iter_mut() {
            entry.value_mut().retain(|r| r.id != record_id);
        }
        Ok(())
    }

    async fn delete_records_by_name(
        &self,
        zone_id: Uuid,
        name: &str,
    ) -> Result<Vec<Record>, AuthNsError> {
        let name = normalize_name(name);
        let mut removed = vec![];
        if let Some(mut rows) = self.records.get_mut(&zone_id) {
            removed = rows.iter().filter(|r| r.name == name).cloned().collect();
            rows.retain(|r| r.name != name);
        }
        Ok(removed)
    }

    async fn delete_records_by_name_and_type(
        &self,
        zone_id: Uuid,
        name: &str,
        rrtype: RecordType,
    ) -> Result<Vec<Record>, AuthNsError> {
        let name = normalize_name(name);
        let mut removed = vec![];
        if let Some(mut rows) = self.records.get_mut(&zone_id) {
            removed = rows
                .iter()
                .filter(|r| r.name == name && r.rrtype == rrtype)
                .cloned()
                .collect();
            rows.retain(|r| !(r.name == name && r.rrtype == rrtype));
        }
        Ok(removed)
    }

    async fn delete_record_specific(
        &self,
        zone_id: Uuid,
        name: &str,
        rrtype: RecordType,
        rdata: &str,
    ) -> Result<Vec<Record>, AuthNsError> {
        let name = normalize_name(name);
        let mut removed = vec![];
        if let Some(mut rows) = self.records.get_mut(&zone_id) {
            removed = rows
                .iter()
                .filter(|r| r.name == name && r.rrtype == rrtype && r.rdata == rdata)
                .cloned()
                .collect();
            rows.retain(|r| !(r.name == name && r.rrtype == rrtype && r.rdata == rdata));
        }
        Ok(removed)
    }

    async fn record_zone_change(&self, change: ZoneChange) -> Result<(), AuthNsError> {
        self.changes.entry(change.zone_id).or_default().push(change);
        Ok(())
    }

    async fn list_zone_changes(
        &self,
        zone_id: Uuid,
        from_serial: u32,
    ) -> Result<Vec<ZoneChange>, AuthNsError> {
        let mut changes: Vec<ZoneChange> = self
            .changes
            .get(&zone_id)
            .map(|c| {
                c.iter()
                    .filter(|change| change.serial > from_serial)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        changes.sort_by_key(|c| c.serial);
        Ok(changes)
    }

    async fn list_keys(&self, zone_id: Uuid) -> Result<Vec<DnssecKey>, AuthNsError> {
        Ok(self
            .keys
            .get(&zone_id)
            .map(|k| k.clone())
            .unwrap_or_default())
    }

    async fn create_key(&self, key: DnssecKey) -> Result<(), AuthNsError> {
        self.keys.entry(key.zone_id).or_default().push(key);
        Ok(())
    }

    async fn deactivate_key(&self, key_id: Uuid) -> Result<(), AuthNsError> {
        for mut entry in self.keys.iter_mut() {
            for key in entry.value_mut().iter_mut() {
                if key.id == key_id {
                    key.active = false;
                }
            }
        }
        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), AuthNsError> {
        let mut log = match self.audit.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        log.push(entry);
        Ok(())
    }

    async fn ping(&self) -> Result<(), AuthNsError> {
        Ok(())
    }
}
