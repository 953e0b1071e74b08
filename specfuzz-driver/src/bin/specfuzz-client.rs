use specfuzz_driver::{logging, Client, ClientConfig, LoadRequest, Reply, Request, UnixConnector};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "specfuzz-client")]
struct Opt {
    /// Path of the driver's Unix domain socket
    #[structopt(long = "socket", parse(from_os_str), default_value = "/tmp/specfuzz-driver.sock")]
    socket: PathBuf,

    /// Connection attempts before giving up
    #[structopt(long = "attempts", default_value = "3")]
    attempts: u32,

    /// Base of the cubic delay between attempts, in milliseconds
    #[structopt(long = "backoff-ms", default_value = "50")]
    backoff_ms: u64,

    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Load a target module, replacing the current one
    #[structopt(name = "load")]
    Load {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
        class: i32,
        #[structopt(name = "type")]
        type_: i32,
        version: f32,
        /// Required target name; any name is accepted when omitted
        #[structopt(long = "name", default_value = "")]
        name: String,
    },
    /// Call a function, e.g. `doThing` or `doThing(5, _)`
    #[structopt(name = "call")]
    Call {
        invocation: String,
        /// Seed for argument synthesis; random when omitted
        #[structopt(long = "seed")]
        seed: Option<u64>,
    },
    #[structopt(name = "status")]
    Status {
        #[structopt(default_value = "0")]
        code: i32,
    },
    /// Print the loaded target's interface
    #[structopt(name = "list-functions")]
    ListFunctions,
    /// Unload the target and stop the driver
    #[structopt(name = "exit")]
    Exit,
}

impl From<Command> for Request {
    fn from(command: Command) -> Request {
        match command {
            Command::Load {
                path,
                class,
                type_,
                version,
                name,
            } => Request::Load(LoadRequest {
                path: path.to_string_lossy().into_owned(),
                class,
                type_,
                version,
                name,
            }),
            Command::Call { invocation, seed } => Request::Call {
                text: invocation,
                seed,
            },
            Command::Status { code } => Request::Status(code),
            Command::ListFunctions => Request::ListFunctions,
            Command::Exit => Request::Exit,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    logging::init(opt.verbose)?;

    let config = ClientConfig {
        attempts: opt.attempts,
        backoff_base: Duration::from_millis(opt.backoff_ms),
        ..ClientConfig::default()
    };
    let client = Client::new(UnixConnector::new(opt.socket), config);
    let request = Request::from(opt.command);
    if let Some(response) = client.request(&request)? {
        let reply = response.into_reply();
        let stdout = io::stdout();
        let stderr = io::stderr();
        if !print_reply(&reply, &mut stdout.lock(), &mut stderr.lock())? {
            process::exit(1);
        }
    }
    Ok(())
}

/// Print the reply's output and error; returns whether the request succeeded.
fn print_reply<O: Write, E: Write>(reply: &Reply, out: &mut O, err: &mut E) -> io::Result<bool> {
    let output = reply.output_text();
    if !output.is_empty() {
        writeln!(out, "{}", output.trim_end())?;
    }
    if let Some(ref error) = reply.error {
        writeln!(err, "error: {}", error)?;
    }
    Ok(reply.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use specfuzz_driver::{ErrorKind, ErrorReport};

    #[test]
    fn failures_go_to_stderr() {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let reply = Reply::failure(ErrorReport {
            kind: ErrorKind::NoTargetLoaded,
            message: "No target loaded".to_owned(),
        });
        assert!(!print_reply(&reply, &mut out, &mut err).expect("writes"));
        assert!(out.is_empty());
        assert_eq!(
            String::from_utf8(err).expect("utf-8"),
            "error: NoTargetLoaded: No target loaded\n"
        );
    }

    #[test]
    fn output_goes_to_stdout() {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let reply = Reply::with_output("reset() -> void");
        assert!(print_reply(&reply, &mut out, &mut err).expect("writes"));
        assert_eq!(String::from_utf8(out).expect("utf-8"), "reset() -> void\n");
        assert!(err.is_empty());
    }
}
