use specfuzz_driver::{logging, DriverConfig, Server, DEFAULT_MAX_FRAME};
use specfuzz_runtime::{Driver, Registry};
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "specfuzz-driver")]
struct Opt {
    /// Path of the Unix domain socket to listen on
    #[structopt(long = "socket", parse(from_os_str), default_value = "/tmp/specfuzz-driver.sock")]
    socket: PathBuf,

    /// Largest accepted message, in bytes
    #[structopt(long = "max-frame")]
    max_frame: Option<usize>,

    /// Increase log verbosity; may be repeated
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    logging::init(opt.verbose.saturating_add(1))?;

    let config = DriverConfig {
        socket: opt.socket,
        max_frame: opt.max_frame.unwrap_or(DEFAULT_MAX_FRAME),
    };
    let driver = Arc::new(Driver::new(Registry::new()));
    Server::bind(&config, driver)?.run()?;
    Ok(())
}
