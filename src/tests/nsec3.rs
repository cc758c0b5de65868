use crate::nsec3::{nsec3_hash, zone_base32_encode};

#[test]
fn test_known_vector_rfc5155() {
    // RFC5155 Appendix A: H(example) with salt aabbccdd, 12 iterations
    let hash = nsec3_hash("example.", 12, &[0xAA, 0xBB, 0xCC, 0xDD]);
    assert_eq!(
        zone_base32_encode(&hash),
        "0p9mhaveqvm6t7vbl5lop2u3t2rp3tom"
    );
}

#[test]
fn test_known_vector_a_example() {
    let hash = nsec3_hash("a.example.", 12, &[0xAA, 0xBB, 0xCC, 0xDD]);
    assert_eq!(
        zone_base32_encode(&hash),
        "35mthgpgcu1qg68fab165klnsnk3dpvl"
    );
}

#[test]
fn test_zero_iterations_is_one_hash() {
    // iterations=0 still hashes once
    let hash = nsec3_hash("example.test.", 0, &[]);
    assert_eq!(hash.len(), 20);
}

#[test]
fn test_case_insensitive_hashing() {
    let lower = nsec3_hash("www.example.test.", 10, &[0xAB, 0xCD]);
    let upper = nsec3_hash("WWW.EXAMPLE.TEST.", 10, &[0xAB, 0xCD]);
    assert_eq!(lower, upper);
}

#[test]
fn test_base32_alphabet() {
    // 5-bit groups MSB-first over 0xFF -> 11111 111(00) -> 'v', then 28='s'
    assert_eq!(zone_base32_encode(&[0xFF]), "vs");
    assert_eq!(zone_base32_encode(&[0x00]), "00");
    assert_eq!(zone_base32_encode(&[]), "");
}
