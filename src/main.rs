// src/main.rs

use std::ffi::OsString;

use toolbelt::{cli, logging, report_error, run};

fn main() {
    let args: Vec<OsString> = std::env::args_os().collect();
    if let Err(err) = logging::init_logging(cli::prescan_logging(&args)) {
        eprintln!("tools error: {err}");
        std::process::exit(1);
    }
    if let Err(err) = run(args) {
        std::process::exit(report_error(&err));
    }
}
