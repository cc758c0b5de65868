use std::net::{Ipv4Addr, Ipv6Addr};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::enums::{OpCode, PacketType, Rcode, RecordClass, RecordType};
use crate::message::{Message, Question, ResourceRecord};
use crate::rdata::{DNSCharString, RData};
use crate::{Header, HEADER_BYTES};

fn query_header(id: u16) -> Header {
    Header {
        id,
        qr: PacketType::Query,
        opcode: OpCode::Query,
        recursion_desired: true,
        qdcount: 1,
        ..Header::default()
    }
}

fn a_record(name: &str, address: [u8; 4]) -> ResourceRecord {
    ResourceRecord {
        name: name.to_string(),
        rrtype: RecordType::A,
        class: RecordClass::Internet,
        ttl: 300,
        rdata: RData::A {
            address: Ipv4Addr::from(address),
        },
    }
}

#[test]
fn test_question_roundtrip() {
    let message = Message {
        header: query_header(4321),
        questions: vec![Question {
            qname: "www.example.test.".to_string(),
            qtype: RecordType::A,
            qclass: RecordClass::Internet,
        }],
        ..Default::default()
    };
    let bytes = message.to_bytes(false).expect("serialize");
    let parsed = Message::parse(&bytes).expect("parse");
    assert_eq!(parsed.header.id, 4321);
    assert_eq!(parsed.questions, message.questions);
}

#[test]
fn test_full_message_roundtrip() {
    let mut header = query_header(7);
    header.qr = PacketType::Answer;
    header.authoritative = true;
    let message = Message {
        header,
        questions: vec![Question {
            qname: "example.test.".to_string(),
            qtype: RecordType::ANY,
            qclass: RecordClass::Internet,
        }],
        answers: vec![
            a_record("example.test.", [192, 0, 2, 1]),
            ResourceRecord {
                name: "example.test.".to_string(),
                rrtype: RecordType::AAAA,
                class: RecordClass::Internet,
                ttl: 60,
                rdata: RData::AAAA {
                    address: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1),
                },
            },
            ResourceRecord {
                name: "example.test.".to_string(),
                rrtype: RecordType::MX,
                class: RecordClass::Internet,
                ttl: 60,
                rdata: RData::MX {
                    preference: 10,
                    exchange: "mail.example.test.".into(),
                },
            },
            ResourceRecord {
                name: "example.test.".to_string(),
                rrtype: RecordType::TXT,
                class: RecordClass::Internet,
                ttl: 60,
                rdata: RData::TXT {
                    txtdata: DNSCharString::from("v=spf1 -all"),
                },
            },
            ResourceRecord {
                name: "_sip._tcp.example.test.".to_string(),
                rrtype: RecordType::SRV,
                class: RecordClass::Internet,
                ttl: 60,
                rdata: RData::SRV {
                    priority: 10,
                    weight: 5,
                    port: 5060,
                    target: "sip.example.test.".into(),
                },
            },
        ],
        authorities: vec![ResourceRecord {
            name: "example.test.".to_string(),
            rrtype: RecordType::SOA,
            class: RecordClass::Internet,
            ttl: 300,
            rdata: RData::SOA {
                mname: "ns1.example.test.".into(),
                rname: "admin.example.test.".into(),
                serial: 100,
                refresh: 3600,
                retry: 900,
                expire: 604800,
                minimum: 300,
            },
        }],
        ..Default::default()
    };

    // with and without compression the parse must agree
    for compress in [false, true] {
        let bytes = message.to_bytes(compress).expect("serialize");
        let parsed = Message::parse(&bytes).expect("parse");
        assert_eq!(parsed.answers, message.answers, "compress={compress}");
        assert_eq!(parsed.authorities, message.authorities);
        assert_eq!(parsed.header.ancount, 5);
    }
}

#[test]
fn test_compression_shrinks_output() {
    let message = Message {
        header: query_header(1),
        questions: vec![Question {
            qname: "www.example.test.".to_string(),
            qtype: RecordType::A,
            qclass: RecordClass::Internet,
        }],
        answers: vec![
            a_record("www.example.test.", [10, 0, 0, 1]),
            a_record("www.example.test.", [10, 0, 0, 2]),
        ],
        ..Default::default()
    };
    let flat = message.to_bytes(false).expect("serialize flat");
    let packed = message.to_bytes(true).expect("serialize packed");
    assert!(packed.len() < flat.len());
}

#[test]
fn test_opt_carries_size_and_do_bit() {
    let message = Message {
        header: query_header(9),
        questions: vec![Question {
            qname: "example.test.".to_string(),
            qtype: RecordType::A,
            qclass: RecordClass::Internet,
        }],
        additionals: vec![ResourceRecord {
            name: ".".to_string(),
            rrtype: RecordType::OPT,
            class: RecordClass::Internet,
            ttl: 0,
            rdata: RData::OPT {
                udp_size: 1232,
                ext_rcode: 0,
                version: 0,
                flags: 0x8000,
                options: vec![],
            },
        }],
        ..Default::default()
    };
    let bytes = message.to_bytes(true).expect("serialize");
    let parsed = Message::parse(&bytes).expect("parse");
    assert_eq!(parsed.edns(), Some((1232, true)));
}

#[test]
fn test_opt_floors_payload_at_512() {
    let message = Message {
        header: query_header(9),
        questions: vec![Question {
            qname: "example.test.".to_string(),
            qtype: RecordType::A,
            qclass: RecordClass::Internet,
        }],
        additionals: vec![ResourceRecord {
            name: ".".to_string(),
            rrtype: RecordType::OPT,
            class: RecordClass::Internet,
            ttl: 0,
            rdata: RData::OPT {
                udp_size: 100,
                ext_rcode: 0,
                version: 0,
                flags: 0,
                options: vec![],
            },
        }],
        ..Default::default()
    };
    let bytes = message.to_bytes(true).expect("serialize");
    let parsed = Message::parse(&bytes).expect("parse");
    assert_eq!(parsed.edns(), Some((512, false)));
}

#[test]
fn test_class_any_writes_empty_rdata() {
    // the RFC2136 "delete RRset" form
    let record = ResourceRecord {
        name: "gone.example.test.".to_string(),
        rrtype: RecordType::A,
        class: RecordClass::Any,
        ttl: 0,
        rdata: RData::A {
            address: Ipv4Addr::new(1, 2, 3, 4),
        },
    };
    let message = Message {
        header: Header {
            opcode: OpCode::Update,
            ..Header::default()
        },
        authorities: vec![record],
        ..Default::default()
    };
    let bytes = message.to_bytes(false).expect("serialize");
    let parsed = Message::parse(&bytes).expect("parse");
    assert_eq!(parsed.authorities[0].class, RecordClass::Any);
    assert_eq!(parsed.authorities[0].rdata, RData::Empty);
}

#[test]
fn test_tsig_offset_recorded() {
    let mut message = Message {
        header: query_header(5),
        questions: vec![Question {
            qname: "example.test.".to_string(),
            qtype: RecordType::SOA,
            qclass: RecordClass::Internet,
        }],
        ..Default::default()
    };
    message.additionals.push(ResourceRecord {
        name: "k1.".to_string(),
        rrtype: RecordType::TSIG,
        class: RecordClass::Any,
        ttl: 0,
        rdata: RData::TSIG {
            algorithm: "hmac-sha256.".into(),
            time_signed: 1_700_000_000,
            fudge: 300,
            mac: vec![0xAB; 32],
            original_id: 5,
            error: 0,
            other: vec![],
        },
    });
    let bytes = message.to_bytes(false).expect("serialize");
    let parsed = Message::parse(&bytes).expect("parse");
    let offset = parsed.tsig_offset.expect("tsig offset");
    assert!(offset > HEADER_BYTES);
    assert!(parsed.tsig().is_some());
    // the offset points at the record's owner name in the raw bytes
    assert_eq!(bytes[offset], 2);
    assert_eq!(&bytes[offset + 1..offset + 3], b"k1");
}

#[test]
fn test_header_rcode_roundtrip() {
    for rcode in [
        Rcode::NoError,
        Rcode::FormatError,
        Rcode::NxDomain,
        Rcode::NotAuth,
        Rcode::YxRrset,
    ] {
        let message = Message {
            header: Header {
                id: 1,
                qr: PacketType::Answer,
                rcode,
                ..Header::default()
            },
            ..Default::default()
        };
        let bytes = message.to_bytes(false).expect("serialize");
        let parsed = Message::parse(&bytes).expect("parse");
        assert_eq!(parsed.header.rcode, rcode);
    }
}

/// A normalized (lowercase, trailing dot) name of one to three short labels.
fn random_name(rng: &mut StdRng) -> String {
    let mut name = String::new();
    for _ in 0..rng.gen_range(1..=3) {
        for _ in 0..rng.gen_range(1..=8) {
            name.push(char::from(b'a' + rng.gen_range(0..26u8)));
        }
        name.push('.');
    }
    name
}

fn random_char_string(rng: &mut StdRng) -> DNSCharString {
    let len = rng.gen_range(0..48);
    let data: Vec<u8> = (0..len).map(|_| rng.gen_range(b'a'..=b'z')).collect();
    DNSCharString { data }
}

/// Sorted, deduplicated type codes the way a bit map canonically carries them.
fn random_type_codes(rng: &mut StdRng) -> Vec<u16> {
    let mut types: Vec<u16> = (0..rng.gen_range(1..5))
        .map(|_| rng.gen_range(1..=255u16))
        .collect();
    types.sort_unstable();
    types.dedup();
    types
}

fn random_rdata(rng: &mut StdRng) -> RData {
    match rng.gen_range(0..11) {
        0 => RData::A {
            address: Ipv4Addr::from(rng.gen::<[u8; 4]>()),
        },
        1 => RData::AAAA {
            address: Ipv6Addr::from(rng.gen::<[u8; 16]>()),
        },
        2 => RData::NS {
            nsdname: random_name(rng).into(),
        },
        3 => RData::CNAME {
            cname: random_name(rng).into(),
        },
        4 => RData::MX {
            preference: rng.gen(),
            exchange: random_name(rng).into(),
        },
        5 => RData::TXT {
            txtdata: random_char_string(rng),
        },
        6 => RData::SOA {
            mname: random_name(rng).into(),
            rname: random_name(rng).into(),
            serial: rng.gen(),
            refresh: rng.gen(),
            retry: rng.gen(),
            expire: rng.gen(),
            minimum: rng.gen(),
        },
        7 => RData::SRV {
            priority: rng.gen(),
            weight: rng.gen(),
            port: rng.gen(),
            target: random_name(rng).into(),
        },
        8 => RData::HINFO {
            cpu: random_char_string(rng),
            os: random_char_string(rng),
        },
        9 => RData::DS {
            key_tag: rng.gen(),
            algorithm: rng.gen_range(1..=16),
            digest_type: rng.gen_range(1..=4),
            digest: (0..32).map(|_| rng.gen()).collect(),
        },
        _ => RData::NSEC {
            next_name: random_name(rng).into(),
            types: random_type_codes(rng),
        },
    }
}

fn random_record(rng: &mut StdRng) -> ResourceRecord {
    let rdata = random_rdata(rng);
    ResourceRecord {
        name: random_name(rng),
        rrtype: rdata.record_type(),
        class: RecordClass::Internet,
        ttl: rng.gen_range(0..86_400),
        rdata,
    }
}

fn random_message(rng: &mut StdRng) -> Message {
    let questions = vec![Question {
        qname: random_name(rng),
        qtype: [
            RecordType::A,
            RecordType::AAAA,
            RecordType::MX,
            RecordType::SOA,
            RecordType::TXT,
            RecordType::ANY,
        ][rng.gen_range(0..6)],
        qclass: RecordClass::Internet,
    }];
    let answers: Vec<ResourceRecord> = (0..rng.gen_range(0..4))
        .map(|_| random_record(rng))
        .collect();
    let authorities: Vec<ResourceRecord> = (0..rng.gen_range(0..3))
        .map(|_| random_record(rng))
        .collect();
    let additionals: Vec<ResourceRecord> = (0..rng.gen_range(0..3))
        .map(|_| random_record(rng))
        .collect();

    let header = Header {
        id: rng.gen(),
        qr: PacketType::Answer,
        opcode: [OpCode::Query, OpCode::Status, OpCode::Notify, OpCode::Update]
            [rng.gen_range(0..4)],
        authoritative: rng.gen(),
        truncated: rng.gen(),
        recursion_desired: rng.gen(),
        recursion_available: rng.gen(),
        z: false,
        ad: rng.gen(),
        cd: rng.gen(),
        rcode: [
            Rcode::NoError,
            Rcode::FormatError,
            Rcode::ServFail,
            Rcode::NxDomain,
            Rcode::NotAuth,
            Rcode::YxDomain,
        ][rng.gen_range(0..6)],
        qdcount: questions.len() as u16,
        ancount: answers.len() as u16,
        nscount: authorities.len() as u16,
        arcount: additionals.len() as u16,
    };

    Message {
        header,
        questions,
        answers,
        authorities,
        additionals,
        tsig_offset: None,
    }
}

#[test]
fn test_random_message_roundtrip() {
    // names are generated normalized, so parse(serialize(m)) reproduces the
    // message exactly, with or without compression
    let mut rng = StdRng::seed_from_u64(0x5EED_D715);
    for round in 0..64 {
        let message = random_message(&mut rng);
        for compress in [false, true] {
            let bytes = message.to_bytes(compress).expect("serialize");
            let parsed = Message::parse(&bytes).expect("parse");
            assert_eq!(parsed, message, "round {round} compress={compress}");
        }
    }
}

#[test]
fn test_unknown_type_passthrough() {
    let record = ResourceRecord {
        name: "x.example.test.".to_string(),
        rrtype: RecordType::InvalidType,
        class: RecordClass::Internet,
        ttl: 30,
        rdata: RData::Unknown {
            rrtype: 999,
            bytes: vec![1, 2, 3, 4],
        },
    };
    let mut buf = crate::wire::WireBuffer::new();
    record.write(&mut buf).expect("write");
    // the unknown payload survives byte for byte
    let bytes = buf.bytes();
    assert_eq!(&bytes[bytes.len() - 4..], &[1, 2, 3, 4]);
}
