//! chardev control client
//!
//! Drives the control requests of a FIFO unit from the command line:
//!
//! ```bash
//! chardev-ctl clear
//! chardev-ctl info
//! chardev-ctl resize          # 1024 bytes
//! chardev-ctl --fill hello resize 4
//! ```
//!
//! The unit lives in this process, so `--capacity` and `--fill` set up the
//! state a request is run against. A request the unit refuses is reported
//! on the error stream and is not a failure of the client itself; only bad
//! usage (status 2) and a unit that cannot be brought up (status 1) are.

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;

use chardev_core::constants::{DEFAULT_FIFO_CAPACITY, DEFAULT_RESIZE_REQUEST};
use chardev_core::{
    ControlRequest, ControlResponse, ControlTarget, DeviceError, FifoConfig, FifoDevice, InitError,
};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use thiserror::Error;

/// Request completed or was reported
pub const EXIT_OK: i32 = 0;

/// The client itself failed
pub const EXIT_FAILURE: i32 = 1;

/// Arguments did not parse
pub const EXIT_USAGE: i32 = 2;

// =============================================================================
// Arguments
// =============================================================================

/// Send a control request to a chardev FIFO unit
#[derive(Parser, Debug)]
#[command(name = "chardev-ctl", version, about, long_about = None)]
pub struct Cli {
    /// Capacity the unit is created with
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_FIFO_CAPACITY)]
    pub capacity: usize,

    /// Bytes written into the unit before the request
    #[arg(long, value_name = "TEXT")]
    pub fill: Option<String>,

    /// Print the response as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging (RUST_LOG still wins)
    #[arg(short, long)]
    pub verbose: bool,

    /// Request to send
    #[command(subcommand)]
    pub command: Command,
}

/// Control request selected on the command line
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Discard every held byte
    Clear,
    /// Show capacity, fill level and free space
    Info,
    /// Replace the storage with a new capacity
    Resize {
        /// New capacity in bytes
        #[arg(default_value_t = DEFAULT_RESIZE_REQUEST, allow_negative_numbers = true)]
        size: i64,
    },
}

impl Command {
    /// The control request this command sends
    pub fn request(self) -> ControlRequest {
        match self {
            Self::Clear => ControlRequest::Clear,
            Self::Info => ControlRequest::QueryInfo,
            Self::Resize { size } => ControlRequest::Resize(size),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failures of the client itself
#[derive(Error, Debug)]
pub enum CtlError {
    #[error("device init failed: {0}")]
    Init(#[from] InitError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Entry points
// =============================================================================

/// Parse `args` (program name first), run the request, return the exit status
pub fn run<I, T>(args: I, out: &mut dyn Write, err: &mut dyn Write) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let program = program_name(&args);

    // Up before parsing so argument errors are logged too
    init_logging(wants_verbose(&args));

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            return match write!(out, "{}", e.render()) {
                Ok(()) => EXIT_OK,
                Err(io) => {
                    log::error!("help not printed: {}", io);
                    EXIT_FAILURE
                }
            };
        }
        Err(e) => {
            log::debug!("argument error: {}", e);
            if let Err(io) = print_usage(out, &program) {
                log::error!("usage not printed: {}", io);
                return EXIT_FAILURE;
            }
            return EXIT_USAGE;
        }
    };

    match execute(&cli, out, err) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            if let Err(io) = writeln!(err, "{}: {}", program, e) {
                log::error!("{} (and the error stream failed: {})", e, io);
            }
            EXIT_FAILURE
        }
    }
}

/// Bring up a unit as `cli` describes and send it the request
pub fn execute(cli: &Cli, out: &mut dyn Write, err: &mut dyn Write) -> Result<(), CtlError> {
    let mut fifo = FifoDevice::new(FifoConfig { capacity: cli.capacity, ..FifoConfig::default() });
    fifo.init()?;

    if let Some(text) = &cli.fill {
        let accepted = fifo.write(text.as_bytes())?;
        log::info!("preloaded {} of {} bytes", accepted, text.len());
    }

    let result = report(&fifo, cli.command.request(), cli.json, out, err);
    fifo.teardown();
    result
}

/// Send one request to `target` and print the outcome
///
/// A refused request goes to `err` and still counts as reported.
pub fn report(
    target: &dyn ControlTarget,
    request: ControlRequest,
    json: bool,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), CtlError> {
    match target.control(request) {
        Ok(response) if json => writeln!(out, "{}", serde_json::to_string(&response)?)?,
        Ok(ControlResponse::Cleared) => writeln!(out, "fifo cleared.")?,
        Ok(ControlResponse::Info(info)) => writeln!(
            out,
            "fifo info: size={}, filled={}, empty={}.",
            info.capacity, info.length, info.available
        )?,
        Ok(ControlResponse::Resized { capacity }) => writeln!(out, "fifo resize: resize={}", capacity)?,
        Err(e) => {
            log::warn!("{:?} refused: {}", request, e);
            writeln!(err, "control request failed: {} ({})", e, e.code())?;
        }
    }
    Ok(())
}

/// Print the short usage banner
pub fn print_usage(out: &mut dyn Write, program: &str) -> std::io::Result<()> {
    writeln!(out, "invalid usage.")?;
    writeln!(out, "usage1: {} clear", program)?;
    writeln!(out, "usage2: {} info", program)?;
    writeln!(out, "usage3: {} resize [SIZE]", program)
}

fn program_name(args: &[OsString]) -> String {
    args.first()
        .and_then(|arg| Path::new(arg).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chardev-ctl".to_string())
}

fn wants_verbose(args: &[OsString]) -> bool {
    args.iter().skip(1).any(|arg| arg == "-v" || arg == "--verbose")
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    // A second run in the same process keeps the first logger
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).try_init();
}
