use specfuzz_driver::protocol::FAILURE;
use specfuzz_driver::{
    Channel, Client, ClientConfig, ClientError, DriverConfig, ErrorKind, LoadRequest, Request,
    Response, Server, UnixConnector, DEFAULT_MAX_FRAME,
};
use specfuzz_runtime::spec::Value;
use specfuzz_runtime::{Driver, HostTarget, Registry};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn alpha_driver() -> Arc<Driver> {
    let alpha = HostTarget::builder()
        .with_interface_text(
            "target \"alpha\" class 1 type 2 version 1.0;
             doThing(int32,string)->int32;",
        )
        .expect("valid interface")
        .with_function("doThing", |args| match args {
            [Value::I32(x), Value::String(s)] => {
                Ok(Some(Value::I32(x.wrapping_add(s.len() as i32))))
            }
            _ => anyhow::bail!("bad arguments"),
        })
        .build()
        .expect("all functions declared");
    Arc::new(Driver::new(
        Registry::in_process_only().with_target("/mods/a.so", alpha),
    ))
}

fn start(dir: &TempDir) -> (Client<UnixConnector>, thread::JoinHandle<()>) {
    let config = DriverConfig {
        socket: dir.path().join("driver.sock"),
        max_frame: DEFAULT_MAX_FRAME,
    };
    let server = Server::bind(&config, alpha_driver()).expect("binds");
    let handle = thread::spawn(move || server.run().expect("runs"));
    let client = Client::new(
        UnixConnector::new(&config.socket),
        ClientConfig {
            backoff_base: Duration::from_millis(5),
            ..ClientConfig::default()
        },
    );
    (client, handle)
}

fn load_alpha() -> Request {
    Request::Load(LoadRequest {
        path: "/mods/a.so".to_owned(),
        class: 1,
        type_: 2,
        version: 1.0,
        name: "alpha".to_owned(),
    })
}

#[test]
fn one_channel_session() {
    let dir = TempDir::new().expect("tempdir");
    let (client, server) = start(&dir);
    let mut channel: Channel<_> = client.connect().expect("connects");

    channel.send(&load_alpha()).expect("send");
    match channel.receive::<Response>().expect("receive") {
        Response::Load(reply) => assert_eq!(reply.code, 0),
        other => panic!("unexpected {:?}", other),
    }

    channel.send(&Request::ListFunctions).expect("send");
    let listing = channel.receive::<Response>().expect("receive");
    assert!(listing
        .reply()
        .output_text()
        .contains("doThing(int32,string)->int32"));

    channel
        .send(&Request::Call {
            text: "doThing(5,\"x\")".to_owned(),
            seed: None,
        })
        .expect("send");
    let call = channel.receive::<Response>().expect("receive");
    assert_eq!(call.reply().output_text(), "doThing(5, \"x\") -> int32 = 6");

    channel.send(&Request::Exit).expect("send");
    // the driver hangs up without answering; a write may still land in the socket buffer
    let after = channel
        .send(&Request::ListFunctions)
        .and_then(|()| channel.receive::<Response>());
    assert!(after.is_err());

    server.join().expect("server stops");
    assert!(!dir.path().join("driver.sock").exists());
}

#[test]
fn one_request_per_connection() {
    let dir = TempDir::new().expect("tempdir");
    let (client, server) = start(&dir);

    let early = client.connect_and_send(&Request::Call {
        text: "doThing".to_owned(),
        seed: Some(3),
    });
    match early {
        Err(ClientError::Failed {
            code: FAILURE,
            report: Some(report),
        }) => assert_eq!(report.kind, ErrorKind::NoTargetLoaded),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(client.connect_and_send(&load_alpha()).expect("answered"), "");
    let first = client
        .connect_and_send(&Request::Call {
            text: "doThing".to_owned(),
            seed: Some(3),
        })
        .expect("answered");
    let second = client
        .connect_and_send(&Request::Call {
            text: "doThing".to_owned(),
            seed: Some(3),
        })
        .expect("answered");
    assert!(first.starts_with("doThing("));
    assert_eq!(first, second);

    assert_eq!(
        client
            .connect_and_send(&Request::Status(0))
            .expect("answered"),
        ""
    );
    assert_eq!(client.connect_and_send(&Request::Exit).expect("sent"), "");
    server.join().expect("server stops");
}
