//! `chardev-ctl` binary
//!
//! See the library docs for the commands and exit statuses.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let status = chardev_ctl::run(std::env::args_os(), &mut io::stdout().lock(), &mut io::stderr().lock());
    ExitCode::from(status as u8)
}
