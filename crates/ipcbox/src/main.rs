//! ipcbox - filesystem IPC from the shell
//!
//! A thin CLI over `ipcbox-core`: semaphores, queues, endpoints and topics
//! that any process sharing the filesystem can use.

use clap::Parser;
use ipcbox_core::IpcError;

mod commands;

use commands::Cli;

/// Exit status for "busy, try again" outcomes (`trywait`, timed-out waits).
const EXIT_CONTENTION: i32 = 2;

fn main() {
    ipcbox_core::logging::init();
    let cli = Cli::parse();

    if let Err(e) = cli.execute() {
        eprintln!("Error: {e}");
        let contention = e
            .downcast_ref::<IpcError>()
            .is_some_and(IpcError::is_contention);
        std::process::exit(if contention { EXIT_CONTENTION } else { 1 });
    }
}
