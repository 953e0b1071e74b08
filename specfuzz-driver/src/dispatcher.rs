use crate::protocol::{ErrorKind, ErrorReport, Reply, Request, Response};
use crate::transport::{Channel, TransportError};
use specfuzz_runtime::Driver;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether the driver currently holds a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Loaded,
}

/// What the connection loop should do after a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Reply(Response),
    Exit,
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    /// The client hung up.
    Closed,
    /// The client asked the driver to shut down.
    Exit,
}

/// Maps requests onto the shared driver session.
#[derive(Clone)]
pub struct Dispatcher {
    driver: Arc<Driver>,
}

impl Dispatcher {
    pub fn new(driver: Arc<Driver>) -> Self {
        Dispatcher { driver }
    }

    pub fn state(&self) -> State {
        if self.driver.is_loaded() {
            State::Loaded
        } else {
            State::Idle
        }
    }

    pub fn dispatch(&self, request: Request) -> Outcome {
        debug!(request = ?request, "dispatching");
        let response = match request {
            Request::Load(load) => Response::Load(match self.driver.load(load.into()) {
                Ok(()) => Reply::ok(),
                Err(e) => Reply::failure(ErrorReport::from(&e)),
            }),
            Request::Call { text, seed } => {
                Response::Call(match self.driver.call(&text, seed) {
                    Ok(record) => Reply::with_output(record.to_string()),
                    Err(e) => {
                        warn!(invocation = %text, error = %e, "call failed");
                        Reply::failure(ErrorReport::from(&e))
                    }
                })
            }
            // accepted for compatibility; there is nothing to report
            Request::Status(_) => Response::Status(Reply::ok()),
            Request::ListFunctions => {
                Response::ListFunctions(match self.driver.interface_text() {
                    Ok(Some(text)) => Reply::with_output(text),
                    Ok(None) => Reply::ok(),
                    Err(e) => Reply::failure(ErrorReport::from(&e)),
                })
            }
            Request::Exit => {
                self.driver.unload();
                info!("exit requested");
                return Outcome::Exit;
            }
        };
        Outcome::Reply(response)
    }

    /// Answer requests on `channel` until the client hangs up or asks to exit.
    ///
    /// A frame that decodes to no valid request is answered with `Response::Rejected` and the
    /// connection continues; any other transport failure ends it.
    pub fn serve<S: Read + Write>(
        &self,
        channel: &mut Channel<S>,
    ) -> Result<Session, TransportError> {
        loop {
            let request = match channel.receive::<Request>() {
                Ok(request) => request,
                Err(TransportError::Closed) => return Ok(Session::Closed),
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "rejecting request");
                    let report = ErrorReport {
                        kind: ErrorKind::Decode,
                        message: e.to_string(),
                    };
                    channel.send(&Response::Rejected(Reply::failure(report)))?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            match self.dispatch(request) {
                Outcome::Reply(response) => channel.send(&response)?,
                Outcome::Exit => return Ok(Session::Exit),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LoadRequest, FAILURE, SUCCESS};
    use specfuzz_runtime::spec::Value;
    use specfuzz_runtime::{HostTarget, Registry};

    fn dispatcher() -> Dispatcher {
        let alpha = HostTarget::builder()
            .with_interface_text(
                "target \"alpha\" class 1 type 2 version 1.0;
                 doThing(int32)->int32;",
            )
            .expect("valid interface")
            .with_function("doThing", |args| match args {
                [Value::I32(x)] => Ok(Some(Value::I32(x.wrapping_mul(2)))),
                _ => anyhow::bail!("bad arguments"),
            })
            .build()
            .expect("all functions declared");
        let bare = HostTarget::builder().build().expect("no functions");
        let registry = Registry::in_process_only()
            .with_target("/mods/a.so", alpha)
            .with_target("/mods/bare.so", bare);
        Dispatcher::new(Arc::new(Driver::new(registry)))
    }

    fn load(path: &str) -> Request {
        Request::Load(LoadRequest {
            path: path.to_owned(),
            class: 1,
            type_: 2,
            version: 1.0,
            name: String::new(),
        })
    }

    fn reply(outcome: Outcome) -> Reply {
        match outcome {
            Outcome::Reply(response) => response.into_reply(),
            Outcome::Exit => panic!("unexpected exit"),
        }
    }

    #[test]
    fn state_machine() {
        let d = dispatcher();
        assert_eq!(d.state(), State::Idle);

        let r = reply(d.dispatch(Request::ListFunctions));
        assert_eq!(r.code, FAILURE);
        assert_eq!(r.error.map(|e| e.kind), Some(ErrorKind::NoTargetLoaded));

        assert_eq!(reply(d.dispatch(load("/mods/a.so"))).code, SUCCESS);
        assert_eq!(d.state(), State::Loaded);

        let r = reply(d.dispatch(Request::Call {
            text: "doThing(21)".to_owned(),
            seed: None,
        }));
        assert_eq!(r.output_text(), "doThing(21) -> int32 = 42");

        let r = reply(d.dispatch(load("/mods/missing.so")));
        assert_eq!(r.error.map(|e| e.kind), Some(ErrorKind::Load));
        assert_eq!(d.state(), State::Loaded);

        assert_eq!(reply(d.dispatch(Request::Status(7))).code, SUCCESS);

        assert_eq!(d.dispatch(Request::Exit), Outcome::Exit);
        assert_eq!(d.state(), State::Idle);
    }

    #[test]
    fn undecodable_requests_are_rejected() {
        use std::io::Write;
        use std::os::unix::net::UnixStream;

        let (ours, theirs) = UnixStream::pair().expect("socket pair");
        let d = dispatcher();
        let server = std::thread::spawn(move || d.serve(&mut Channel::new(theirs)));

        let mut raw = ours.try_clone().expect("clone");
        raw.write_all(&[0, 0, 0, 4, 0xff, 0xff, 0xff, 0x7f])
            .expect("write garbage frame");
        let mut channel = Channel::new(ours);
        match channel.receive::<Response>().expect("reply") {
            Response::Rejected(r) => assert_eq!(r.error.map(|e| e.kind), Some(ErrorKind::Decode)),
            other => panic!("unexpected {:?}", other),
        }

        channel.send(&Request::Status(0)).expect("send");
        assert!(matches!(
            channel.receive::<Response>().expect("reply"),
            Response::Status(_)
        ));
        channel.send(&Request::Exit).expect("send");
        assert_eq!(
            server.join().expect("no panic").expect("clean session"),
            Session::Exit
        );
    }

    #[test]
    fn deeply_nested_literals_fail_the_call() {
        let d = dispatcher();
        assert_eq!(reply(d.dispatch(load("/mods/a.so"))).code, SUCCESS);
        for text in &[
            format!("doThing({})", "{".repeat(200_000)),
            format!("doThing({}{})", "{".repeat(1000), "}".repeat(1000)),
        ] {
            let r = reply(d.dispatch(Request::Call {
                text: text.clone(),
                seed: Some(1),
            }));
            assert_eq!(r.code, FAILURE);
            assert_eq!(r.error.map(|e| e.kind), Some(ErrorKind::Spec));
        }
        assert_eq!(d.state(), State::Loaded);
    }

    #[test]
    fn target_without_interface_lists_nothing() {
        let d = dispatcher();
        assert_eq!(reply(d.dispatch(load("/mods/bare.so"))).code, SUCCESS);
        let r = reply(d.dispatch(Request::ListFunctions));
        assert!(r.is_success());
        assert!(r.output.is_empty());

        let r = reply(d.dispatch(Request::Call {
            text: "doThing".to_owned(),
            seed: Some(1),
        }));
        assert_eq!(r.error.map(|e| e.kind), Some(ErrorKind::UnknownFunction));
    }
}
