use crate::error::AuthNsError;
use crate::wire::{BufferPool, WireBuffer};

#[test]
fn test_name_roundtrip() {
    let mut buf = WireBuffer::new();
    buf.write_name("Cheese.World.").expect("write");
    buf.seek(0).expect("seek");
    assert_eq!(buf.read_name().expect("read"), "cheese.world.");
}

#[test]
fn test_name_without_trailing_dot() {
    let mut buf = WireBuffer::new();
    buf.write_name("cheese.world").expect("write");
    buf.seek(0).expect("seek");
    assert_eq!(buf.read_name().expect("read"), "cheese.world.");
}

#[test]
fn test_root_name() {
    let mut buf = WireBuffer::new();
    buf.write_name(".").expect("write");
    assert_eq!(buf.bytes(), &[0]);
    buf.seek(0).expect("seek");
    assert_eq!(buf.read_name().expect("read"), ".");
}

#[test]
fn test_label_63_ok_64_fails() {
    let label63 = "a".repeat(63);
    let mut buf = WireBuffer::new();
    buf.write_name(&format!("{label63}.test.")).expect("63 byte label");
    buf.seek(0).expect("seek");
    assert_eq!(buf.read_name().expect("read"), format!("{label63}.test."));

    let label64 = "a".repeat(64);
    let mut buf = WireBuffer::new();
    assert!(matches!(
        buf.write_name(&format!("{label64}.test.")),
        Err(AuthNsError::LabelTooLong)
    ));
}

#[test]
fn test_compression_emits_pointer() {
    let mut buf = WireBuffer::new();
    buf.enable_compression();
    // pad so offsets are nonzero, the way a header would
    buf.write_bytes(&[0u8; 12]).expect("pad");
    buf.write_name("ns1.example.test.").expect("first name");
    let after_first = buf.pos();
    buf.write_name("example.test.").expect("second name");
    // a bare pointer is two bytes
    assert_eq!(buf.pos() - after_first, 2);

    buf.seek(after_first).expect("seek");
    assert_eq!(buf.read_name().expect("read"), "example.test.");
}

#[test]
fn test_compressed_suffix_shares_bytes() {
    let mut buf = WireBuffer::new();
    buf.enable_compression();
    buf.write_bytes(&[0u8; 12]).expect("pad");
    buf.write_name("www.example.test.").expect("first");
    let start = buf.pos();
    buf.write_name("mail.example.test.").expect("second");
    // "mail" label (5 bytes) plus a pointer (2 bytes)
    assert_eq!(buf.pos() - start, 7);
}

fn pointer_chain(jumps: usize) -> WireBuffer {
    // a chain of pointers starting at 0, each hop 10 bytes up, ending in a
    // real name
    let mut raw = vec![0u8; 200];
    for hop in 0..jumps {
        let at = hop * 10;
        let target = (hop + 1) * 10;
        raw[at] = 0xC0 | ((target >> 8) as u8);
        raw[at + 1] = (target & 0xFF) as u8;
    }
    let at = jumps * 10;
    raw[at] = 3;
    raw[at + 1..at + 4].copy_from_slice(b"foo");
    raw[at + 4] = 0;
    let mut buf = WireBuffer::new();
    buf.load(&raw).expect("load");
    buf
}

#[test]
fn test_five_pointer_jumps_succeed() {
    let mut buf = pointer_chain(5);
    assert_eq!(buf.read_name().expect("read"), "foo.");
    // the cursor only advanced past the first pointer
    assert_eq!(buf.pos(), 2);
}

#[test]
fn test_six_pointer_jumps_fail() {
    let mut buf = pointer_chain(6);
    assert!(matches!(buf.read_name(), Err(AuthNsError::TooManyJumps)));
}

#[test]
fn test_read_past_end() {
    let mut buf = WireBuffer::new();
    buf.load(&[0x01]).expect("load");
    assert!(matches!(buf.read_u16(), Err(AuthNsError::EndOfBuffer)));
}

#[test]
fn test_set_u16_backpatch() {
    let mut buf = WireBuffer::new();
    buf.write_u16(0).expect("placeholder");
    buf.write_bytes(b"xyz").expect("payload");
    buf.set_u16(0, 3).expect("patch");
    assert_eq!(buf.bytes(), &[0, 3, b'x', b'y', b'z']);
}

#[test]
fn test_pool_returns_buffers() {
    let pool = BufferPool::new(1);
    {
        let mut buf = pool.acquire();
        buf.write_u32(0xDEADBEEF).expect("write");
        assert_eq!(buf.len(), 4);
    }
    // same buffer comes back reset
    let buf = pool.acquire();
    assert_eq!(buf.len(), 0);
    assert_eq!(buf.pos(), 0);
}
