//! Name normalization and the RFC4034 section 6.1 canonical ordering.

use std::cmp::Ordering;

/// Lowercase and ensure the trailing dot. The empty string and "." both come
/// back as the root.
pub fn normalize_name(input: &str) -> String {
    let mut name = input.trim().to_ascii_lowercase();
    if !name.ends_with('.') {
        name.push('.');
    }
    name
}

/// Labels of a name, least significant first ("www.example.test." gives
/// ["test", "example", "www"] reversed to most-significant-first order).
fn labels_reversed(name: &str) -> Vec<&str> {
    name.trim_end_matches('.')
        .split('.')
        .filter(|l| !l.is_empty())
        .rev()
        .collect()
}

/// Canonical name comparison: trim the trailing dot, lowercase, compare
/// labels right to left, shorter name first on a tie.
pub fn canonical_cmp(a: &str, b: &str) -> Ordering {
    let a = a.to_ascii_lowercase();
    let b = b.to_ascii_lowercase();
    let a_labels = labels_reversed(&a);
    let b_labels = labels_reversed(&b);
    for (la, lb) in a_labels.iter().zip(b_labels.iter()) {
        match la.as_bytes().cmp(lb.as_bytes()) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a_labels.len().cmp(&b_labels.len())
}

/// Sort names into canonical zone order.
pub fn canonical_sort(names: &mut [String]) {
    names.sort_by(|a, b| canonical_cmp(a, b));
}

/// Uncompressed lowercase wire form: length-prefixed labels plus the root
/// terminator. Signing and NSEC3 hashing inputs are built from this.
pub fn name_to_wire(name: &str) -> Vec<u8> {
    let trimmed = name.trim_end_matches('.');
    let mut out = Vec::with_capacity(trimmed.len() + 2);
    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            out.push(label.len() as u8);
            out.extend(label.to_ascii_lowercase().as_bytes());
        }
    }
    out.push(0);
    out
}

/// Number of labels, wildcards excluded, for the RRSIG labels field.
pub fn rrsig_label_count(name: &str) -> u8 {
    name.trim_end_matches('.')
        .split('.')
        .filter(|l| !l.is_empty() && *l != "*")
        .count() as u8
}

/// Strip the leftmost label. "www.example.test." becomes "example.test.",
/// the root has no parent.
pub fn parent_name(name: &str) -> Option<String> {
    let trimmed = name.trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.split_once('.') {
        Some((_, rest)) if !rest.is_empty() => Some(format!("{rest}.")),
        _ => Some(".".to_string()),
    }
}

/// The wildcard owner names that could match a query name inside a zone,
/// nearest first. The apex itself never yields a candidate.
pub fn wildcard_candidates(qname: &str, zone_name: &str) -> Vec<String> {
    let mut out = vec![];
    let mut current = qname.to_string();
    while current != zone_name {
        let parent = match parent_name(&current) {
            Some(value) => value,
            None => break,
        };
        out.push(format!("*.{parent}"));
        if parent == zone_name || parent == "." {
            break;
        }
        current = parent;
    }
    out
}
