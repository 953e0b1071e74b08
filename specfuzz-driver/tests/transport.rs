use proptest::prelude::*;
use specfuzz_driver::{Channel, LoadRequest, Reply, Request, Response, TransportError};
use std::io::Cursor;

fn request() -> impl Strategy<Value = Request> {
    prop_oneof![
        (".*", any::<i32>(), any::<i32>(), -1e6f32..1e6, ".*").prop_map(
            |(path, class, type_, version, name)| Request::Load(LoadRequest {
                path,
                class,
                type_,
                version,
                name,
            })
        ),
        (".*", any::<Option<u64>>()).prop_map(|(text, seed)| Request::Call { text, seed }),
        any::<i32>().prop_map(Request::Status),
        Just(Request::ListFunctions),
        Just(Request::Exit),
    ]
}

proptest! {
    #[test]
    fn messages_survive_framing(requests in prop::collection::vec(request(), 1..8)) {
        let mut writer = Channel::new(Vec::new());
        for r in &requests {
            writer.send(r).expect("send");
        }
        let mut reader = Channel::new(Cursor::new(writer.into_inner()));
        for r in &requests {
            prop_assert_eq!(&reader.receive::<Request>().expect("receive"), r);
        }
        prop_assert!(matches!(reader.receive::<Request>(), Err(TransportError::Closed)));
    }
}

#[test]
fn garbage_payload_is_recoverable() {
    // a whole frame whose payload names no request variant, followed by a valid frame
    let mut bytes = vec![0, 0, 0, 4, 0xff, 0xff, 0xff, 0x7f];
    let mut tail = Channel::new(Vec::new());
    tail.send(&Request::ListFunctions).expect("send");
    bytes.extend(tail.into_inner());

    let mut channel = Channel::new(Cursor::new(bytes));
    let err = channel.receive::<Request>().expect_err("garbage");
    assert!(matches!(err, TransportError::Decode(_)));
    assert!(err.is_recoverable());
    assert_eq!(
        channel.receive::<Request>().expect("next frame"),
        Request::ListFunctions
    );
}

#[test]
fn short_frames_are_not_recoverable() {
    let mut channel = Channel::new(Cursor::new(vec![0, 0, 1, 0, 42]));
    let err = channel.receive::<Response>().expect_err("truncated");
    assert!(!err.is_recoverable());
}

#[test]
fn limits_apply_to_both_directions() {
    let reply = Response::Call(Reply::with_output("x".repeat(100)));
    let mut big = Channel::new(Vec::new());
    big.send(&reply).expect("fits the default limit");
    let bytes = big.into_inner();

    let mut small = Channel::new(Cursor::new(bytes)).with_max_frame(64);
    assert!(matches!(
        small.receive::<Response>(),
        Err(TransportError::Oversize { max: 64, .. })
    ));

    let mut small = Channel::new(Vec::new()).with_max_frame(64);
    assert!(matches!(
        small.send(&reply),
        Err(TransportError::Oversize { .. })
    ));
}
