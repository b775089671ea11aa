//! Semaphore subcommands

use anyhow::Result;
use clap::Subcommand;
use ipcbox_core::Config;

use super::TimeoutArg;

#[derive(Subcommand, Debug)]
pub enum SemCommand {
    /// Create a semaphore owned by this holder
    Init {
        name: String,

        /// Initial permit count
        #[arg(long, default_value_t = 0)]
        value: u32,
    },

    /// Remove a semaphore (owner only)
    Destroy { name: String },

    /// Take a permit, blocking until one is available
    Wait {
        name: String,

        #[command(flatten)]
        timeout: TimeoutArg,
    },

    /// Take a permit only if one is available now
    Trywait { name: String },

    /// Return a permit
    Post { name: String },

    /// Print the current count
    Peek { name: String },

    /// Print the holder that created the semaphore
    Owner { name: String },
}

pub fn execute(command: SemCommand, config: &Config) -> Result<()> {
    match command {
        SemCommand::Init { name, value } => config.semaphore(&name).init(value)?,
        SemCommand::Destroy { name } => config.semaphore(&name).destroy()?,
        SemCommand::Wait { name, timeout } => config.semaphore(&name).wait(timeout.timeout())?,
        SemCommand::Trywait { name } => config.semaphore(&name).trywait()?,
        SemCommand::Post { name } => config.semaphore(&name).post()?,
        SemCommand::Peek { name } => println!("{}", config.semaphore(&name).peek()?),
        SemCommand::Owner { name } => println!("{}", config.semaphore(&name).owner()?),
    }
    Ok(())
}
