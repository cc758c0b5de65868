//! Zone file parsing, based on [RFC1035 Master Files](https://datatracker.ietf.org/doc/html/rfc1035#autoid-48).
//!
//! Streaming and line-oriented: comments are stripped, parenthesized
//! continuations joined, then each logical line becomes a record. `$ORIGIN`
//! and `$TTL` update parser state; `$INCLUDE` is not followed.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::enums::RecordType;
use crate::error::AuthNsError;
use crate::name::normalize_name;
use crate::store::{Record, Zone, ZoneStore};

static ORIGIN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$ORIGIN\s+(?P<domain>\S+)").expect("static regex")
});
static TTL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$TTL\s+(?P<ttl>\d+)").expect("static regex"));
static INCLUDE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$INCLUDE\s+(?P<filename>\S+)").expect("static regex"));

/// One record as it appears in the file, before type-specific parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedRecord {
    /// Fully qualified, origin applied
    pub name: String,
    pub rrtype: String,
    pub class: String,
    pub ttl: Option<u32>,
    /// rdata exactly as written, quotes intact
    pub rdata: String,
}

/// Drop a `;` comment unless it sits inside a quoted string.
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &line[..idx],
            _ => {}
        }
    }
    line
}

/// Join parenthesized continuations into single logical lines.
fn logical_lines(contents: &str) -> Vec<String> {
    let mut lines = vec![];
    let mut pending = String::new();
    let mut depth = 0usize;
    for raw in contents.lines() {
        let line = strip_comment(raw);
        for ch in line.chars() {
            match ch {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        if !pending.is_empty() {
            pending.push(' ');
        }
        pending.push_str(line);
        if depth == 0 {
            let cleaned: String = pending.replace(['(', ')'], " ");
            lines.push(cleaned);
            pending.clear();
        }
    }
    if !pending.is_empty() {
        lines.push(pending.replace(['(', ')'], " "));
    }
    lines
}

/// Resolve a master-file name against the origin: `@` is the origin itself,
/// relative names get it appended.
fn resolve_name(token: &str, origin: &str) -> String {
    if token == "@" {
        return origin.to_string();
    }
    if token.ends_with('.') {
        return normalize_name(token);
    }
    normalize_name(&format!("{token}.{origin}"))
}

/// Parse master-file text into records. `default_origin` seeds the origin
/// until a `$ORIGIN` directive replaces it.
pub fn parse_master_file(
    contents: &str,
    default_origin: Option<&str>,
) -> Result<Vec<ParsedRecord>, AuthNsError> {
    let mut origin: Option<String> = default_origin.map(normalize_name);
    let mut default_ttl: Option<u32> = None;
    let mut last_name: Option<String> = None;
    let mut records = vec![];

    for line in logical_lines(contents) {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(caps) = ORIGIN_LINE.captures(line.trim_start()) {
            origin = Some(normalize_name(&caps["domain"]));
            debug!("origin now {:?}", origin);
            continue;
        }
        if let Some(caps) = TTL_LINE.captures(line.trim_start()) {
            default_ttl = caps["ttl"].parse::<u32>().ok();
            continue;
        }
        if let Some(caps) = INCLUDE_LINE.captures(line.trim_start()) {
            warn!("$INCLUDE {} skipped, includes are not followed", &caps["filename"]);
            continue;
        }

        let starts_blank = line.starts_with(' ') || line.starts_with('\t');
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        let origin_name = origin
            .clone()
            .ok_or_else(|| AuthNsError::InvalidValue("no origin set in zone file".to_string()))?;

        let mut cursor = 0usize;
        let name = if starts_blank {
            last_name.clone().ok_or_else(|| {
                AuthNsError::InvalidValue("continuation line before any record".to_string())
            })?
        } else {
            cursor = 1;
            resolve_name(tokens[0], &origin_name)
        };
        last_name = Some(name.clone());

        // TTL and class may appear in either order before the type
        let mut ttl: Option<u32> = None;
        let mut class = "IN".to_string();
        let mut rrtype: Option<&str> = None;
        while cursor < tokens.len() {
            let token = tokens[cursor];
            if let Ok(value) = token.parse::<u32>() {
                ttl = Some(value);
            } else if matches!(token, "IN" | "CH" | "HS") {
                class = token.to_string();
            } else {
                rrtype = Some(token);
                cursor += 1;
                break;
            }
            cursor += 1;
        }
        let rrtype = rrtype.ok_or_else(|| {
            AuthNsError::InvalidValue(format!("line has no record type: {line:?}"))
        })?;
        if RecordType::from(rrtype) == RecordType::InvalidType {
            warn!("unknown record type {rrtype:?}, skipping line");
            continue;
        }

        // names inside the rdata stay relative-resolved for the name-shaped types
        let mut rdata = tokens[cursor..].join(" ");
        match RecordType::from(rrtype) {
            RecordType::NS | RecordType::CNAME | RecordType::PTR | RecordType::MX => {
                let resolved: Vec<String> = rdata
                    .split_whitespace()
                    .map(|t| {
                        if t.parse::<u32>().is_ok() {
                            t.to_string()
                        } else {
                            resolve_name(t, &origin_name)
                        }
                    })
                    .collect();
                rdata = resolved.join(" ");
            }
            RecordType::SOA => {
                let fields: Vec<&str> = rdata.split_whitespace().collect();
                if fields.len() >= 2 {
                    let mut resolved = vec![
                        resolve_name(fields[0], &origin_name),
                        resolve_name(fields[1], &origin_name),
                    ];
                    resolved.extend(fields[2..].iter().map(|f| f.to_string()));
                    rdata = resolved.join(" ");
                }
            }
            _ => {}
        }

        records.push(ParsedRecord {
            name,
            rrtype: rrtype.to_string(),
            class,
            ttl: ttl.or(default_ttl),
            rdata,
        });
    }
    Ok(records)
}

/// Import a parsed zone into the store: create the zone if it is new and
/// append every record. MX and SRV split their leading numeric fields into
/// the typed columns.
pub async fn load_into_store(
    store: &dyn ZoneStore,
    contents: &str,
    origin: Option<&str>,
    tenant_id: &str,
) -> Result<Zone, AuthNsError> {
    let parsed = parse_master_file(contents, origin)?;
    let soa = parsed
        .iter()
        .find(|r| r.rrtype == "SOA")
        .ok_or_else(|| AuthNsError::InvalidValue("zone file has no SOA".to_string()))?;
    let zone_name = soa.name.clone();

    let zone = match store.get_zone(&zone_name).await? {
        Some(existing) => existing,
        None => {
            let zone = Zone::new(&zone_name, tenant_id);
            store.create_zone(zone.clone()).await?;
            zone
        }
    };

    for parsed_record in parsed {
        let rrtype = RecordType::from(parsed_record.rrtype.as_str());
        let ttl = parsed_record.ttl.unwrap_or(300);
        let mut record = Record::new(zone.id, &parsed_record.name, rrtype, ttl, &parsed_record.rdata);
        match rrtype {
            RecordType::MX => {
                if let Some((pref, exchange)) = parsed_record.rdata.split_once(' ') {
                    if let Ok(preference) = pref.parse::<u16>() {
                        record.priority = Some(preference);
                        record.rdata = exchange.trim().to_string();
                    }
                }
            }
            RecordType::SRV => {
                let fields: Vec<&str> = parsed_record.rdata.split_whitespace().collect();
                if fields.len() == 4 {
                    record.priority = fields[0].parse().ok();
                    record.weight = fields[1].parse().ok();
                    record.port = fields[2].parse().ok();
                    record.rdata = fields[3].to_string();
                }
            }
            _ => {}
        }
        store.create_record(record).await?;
    }
    Ok(zone)
}
