//! Wire-format vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use obsrpc_core::protocol::Packet;

use vector_loader::load;

#[test]
fn wire_vectors() {
    let files = [
        "inspect_request.json",
        "pdu_voltage_reply.json",
        "long_name_in_buffer.json",
        "short_name_inline.json",
        "remote_error_reply.json",
        "more_packet_reply.json",
        "truncated_header.json",
        "length_mismatch.json",
    ];

    for f in files {
        let v = load(f);
        let raw = v.frame.decode();
        let res = Packet::from_bytes(&raw);

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.error_code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let p = res.expect("expected ok packet");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(p.protocol() as u64, ex["protocol"].as_u64().unwrap(), "vector={}", v.description);
        assert_eq!(p.index() as u64, ex["index"].as_u64().unwrap(), "vector={}", v.description);
        assert_eq!(p.command() as u64, ex["command"].as_u64().unwrap(), "vector={}", v.description);
        assert_eq!(p.option() as u64, ex["option"].as_u64().unwrap(), "vector={}", v.description);
        assert_eq!(p.channel() as u64, ex["channel"].as_u64().unwrap(), "vector={}", v.description);
        assert_eq!(p.errorcode() as u64, ex["errorcode"].as_u64().unwrap(), "vector={}", v.description);
        assert_eq!(p.length() as u64, ex["length"].as_u64().unwrap(), "vector={}", v.description);

        if let Some(df0) = ex.get("df0").and_then(|d| d.as_f64()) {
            assert_eq!(p.df0(), df0, "vector={}", v.description);
        }
        if let Some(name) = ex.get("name").and_then(|n| n.as_str()) {
            assert_eq!(p.name().unwrap(), name, "vector={}", v.description);
        }
        if let Some(payload) = ex.get("payload_hex").and_then(|n| n.as_str()) {
            assert_eq!(p.buffer(), hex::decode(payload).unwrap(), "vector={}", v.description);
        }

        // Re-encoding a decoded frame reproduces it byte for byte.
        assert_eq!(p.to_bytes().as_ref(), raw.as_slice(), "vector={}", v.description);
    }
}
