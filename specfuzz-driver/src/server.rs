use crate::config::DriverConfig;
use crate::dispatcher::{Dispatcher, Session};
use crate::transport::Channel;
use specfuzz_runtime::Driver;
use std::fs;
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Accepts control connections on a Unix domain socket.
///
/// Every connection is served on its own thread against the same driver session. The server
/// stops accepting once any connection sends `Exit`.
pub struct Server {
    listener: UnixListener,
    socket: PathBuf,
    max_frame: usize,
    dispatcher: Dispatcher,
    exiting: Arc<AtomicBool>,
}

impl Server {
    /// Bind the configured socket, replacing a stale socket file left by an earlier run.
    pub fn bind(config: &DriverConfig, driver: Arc<Driver>) -> io::Result<Self> {
        match fs::remove_file(&config.socket) {
            Ok(()) => debug!(socket = %config.socket.display(), "removed stale socket"),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => (),
            Err(e) => return Err(e),
        }
        let listener = UnixListener::bind(&config.socket)?;
        info!(socket = %config.socket.display(), "listening");
        Ok(Server {
            listener,
            socket: config.socket.clone(),
            max_frame: config.max_frame,
            dispatcher: Dispatcher::new(driver),
            exiting: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Serve connections until one of them requests `Exit`.
    pub fn run(self) -> io::Result<()> {
        for stream in self.listener.incoming() {
            if self.exiting.load(Ordering::SeqCst) {
                break;
            }
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let dispatcher = self.dispatcher.clone();
            let exiting = self.exiting.clone();
            let socket = self.socket.clone();
            let max_frame = self.max_frame;
            // connections still open at exit are abandoned with the process
            thread::spawn(move || {
                let mut channel = Channel::new(stream).with_max_frame(max_frame);
                match dispatcher.serve(&mut channel) {
                    Ok(Session::Closed) => debug!("connection closed"),
                    Ok(Session::Exit) => {
                        exiting.store(true, Ordering::SeqCst);
                        // wake the accept loop so it sees the flag
                        if let Err(e) = UnixStream::connect(&socket) {
                            warn!(error = %e, "could not wake listener");
                        }
                    }
                    Err(e) => warn!(error = %e, "connection dropped"),
                }
            });
        }

        if let Err(e) = fs::remove_file(&self.socket) {
            warn!(socket = %self.socket.display(), error = %e, "could not remove socket");
        }
        info!("driver stopped");
        Ok(())
    }
}
