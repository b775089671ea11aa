//! Queue subcommands

use anyhow::Result;
use clap::Subcommand;
use ipcbox_core::Config;
use std::io::BufRead;

use super::TimeoutArg;

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Create an empty queue owned by this holder
    Init { name: String },

    /// Remove a queue and its items (owner only)
    Destroy { name: String },

    /// Append items; reads one item per stdin line when none are given
    Put { name: String, items: Vec<String> },

    /// Remove and print the head item, blocking until one arrives
    Get {
        name: String,

        #[command(flatten)]
        timeout: TimeoutArg,
    },

    /// Print queued items, head first, without removing them
    List { name: String },

    /// Print the number of queued items
    Len { name: String },
}

pub fn execute(command: QueueCommand, config: &Config) -> Result<()> {
    match command {
        QueueCommand::Init { name } => config.queue(&name).init()?,
        QueueCommand::Destroy { name } => config.queue(&name).destroy()?,
        QueueCommand::Put { name, items } => {
            let queue = config.queue(&name);
            if items.is_empty() {
                for line in std::io::stdin().lock().lines() {
                    queue.put(&line?)?;
                }
            } else {
                for item in &items {
                    queue.put(item)?;
                }
            }
        }
        QueueCommand::Get { name, timeout } => {
            println!("{}", config.queue(&name).get(timeout.timeout())?);
        }
        QueueCommand::List { name } => {
            config.queue(&name).foreach(|item| {
                println!("{item}");
                true
            })?;
        }
        QueueCommand::Len { name } => println!("{}", config.queue(&name).len()?),
    }
    Ok(())
}
