//! RESP2 decoder vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use bytes::BytesMut;

use rulesync_core::protocol::resp::{decode_frame, Frame, Push};

mod vector_loader;
use vector_loader::{load, TestVector};

#[test]
fn resp_vectors() {
    let files = [
        "resp_message.json",
        "resp_subscribe_ack.json",
        "resp_error_reply.json",
        "resp_null_bulk.json",
        "resp_bad_bulk_terminator.json",
    ];

    for f in files {
        let v: TestVector = load(f);
        let mut buf = BytesMut::from(v.frame.decode().as_slice());
        let res = decode_frame(&mut buf);

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.kind().as_str(), err.kind, "vector={}", v.description);
            continue;
        }

        let frame = res.expect("expected ok").expect("expected a complete frame");
        assert!(buf.is_empty(), "vector={} left trailing bytes", v.description);
        let ex = v.expect.expect("missing expect block");

        match ex["kind"].as_str().unwrap() {
            "message" => match Push::classify(&frame) {
                Push::Message { channel, payload } => {
                    assert_eq!(channel, ex["channel"].as_str().unwrap(), "vector={}", v.description);
                    assert_eq!(&payload[..], ex["payload"].as_str().unwrap().as_bytes(), "vector={}", v.description);
                }
                other => panic!("vector={} expected message, got {other:?}", v.description),
            },
            "subscribed" => match Push::classify(&frame) {
                Push::Subscribed { channel, count } => {
                    assert_eq!(channel, ex["channel"].as_str().unwrap(), "vector={}", v.description);
                    assert_eq!(count, ex["count"].as_i64().unwrap(), "vector={}", v.description);
                }
                other => panic!("vector={} expected subscribe ack, got {other:?}", v.description),
            },
            "error" => {
                assert_eq!(frame, Frame::Error(ex["text"].as_str().unwrap().to_string()), "vector={}", v.description);
            }
            "null_bulk" => assert_eq!(frame, Frame::Bulk(None), "vector={}", v.description),
            other => panic!("unknown expect kind: {other}"),
        }
    }
}
