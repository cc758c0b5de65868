//! NSEC3 hashed-name construction, RFC5155 section 5.

use ring::digest::{Context, SHA1_FOR_LEGACY_USE_ONLY};

use crate::name::name_to_wire;

/// The RFC5155 "base32hex" alphabet. This is NOT RFC4648 base32; DNS zones
/// use the extended-hex digits so hashed owner names sort the same as their
/// hash bytes.
const ZONE_BASE32_ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Iterated SHA-1 over the wire form of the name: H0 = SHA1(wire || salt),
/// Hi = SHA1(Hi-1 || salt).
pub fn nsec3_hash(name: &str, iterations: u16, salt: &[u8]) -> Vec<u8> {
    let mut input = name_to_wire(name);
    for _ in 0..=iterations {
        let mut ctx = Context::new(&SHA1_FOR_LEGACY_USE_ONLY);
        ctx.update(&input);
        ctx.update(salt);
        input = ctx.finish().as_ref().to_vec();
    }
    input
}

/// Encode bytes with the zone alphabet, 5-bit groups MSB-first; trailing
/// bits are left-shifted to fill the final group.
pub fn zone_base32_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len().div_ceil(5) * 8);
    let mut accum: u16 = 0;
    let mut bits: u32 = 0;
    for &byte in input {
        accum = (accum << 8) | byte as u16;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let group = ((accum >> bits) & 0x1F) as usize;
            out.push(ZONE_BASE32_ALPHABET[group] as char);
        }
    }
    if bits > 0 {
        let group = ((accum << (5 - bits)) & 0x1F) as usize;
        out.push(ZONE_BASE32_ALPHABET[group] as char);
    }
    out
}
