use std::process::ExitCode;

use tetherd::{SystemShutdownSignal, run_daemon};

fn main() -> ExitCode {
    match run_daemon(&SystemShutdownSignal) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("tetherd: {error}");
            ExitCode::FAILURE
        }
    }
}
