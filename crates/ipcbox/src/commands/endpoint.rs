//! Endpoint subcommands

use anyhow::Result;
use clap::Subcommand;
use ipcbox_core::{Config, Envelope};
use std::io::{Read, Write};

use super::TimeoutArg;

#[derive(Subcommand, Debug)]
pub enum EndpointCommand {
    /// Create an endpoint (or reuse an existing one) and print its name
    ///
    /// Without a name, a private name under priv/<user>/ is generated.
    Open { name: Option<String> },

    /// Tear an endpoint down (opener only)
    Close { name: String },

    /// Send a message; reads the payload from stdin when DATA is omitted
    Send {
        source: String,
        destination: String,
        data: Option<String>,
    },

    /// Receive the next message, blocking until one arrives
    ///
    /// Prints the payload bytes as sent.
    Recv {
        name: String,

        #[command(flatten)]
        timeout: TimeoutArg,

        /// Print the encoded envelope instead of the payload
        #[arg(long, conflicts_with = "json")]
        raw: bool,

        /// Print the decoded envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the topics an endpoint is subscribed to
    Subscriptions { name: String },

    /// Print the account that opened an endpoint
    Owner { name: String },
}

pub fn execute(command: EndpointCommand, config: &Config) -> Result<()> {
    let uipc = config.uipc();

    match command {
        EndpointCommand::Open { name } => println!("{}", uipc.open(name.as_deref())?),
        EndpointCommand::Close { name } => uipc.close(&name)?,
        EndpointCommand::Send {
            source,
            destination,
            data,
        } => {
            let payload = payload_or_stdin(data)?;
            uipc.send(&source, &destination, &payload)?;
        }
        EndpointCommand::Recv {
            name,
            timeout,
            raw,
            json,
        } => {
            let msg = uipc.recv(&name, timeout.timeout())?;
            if raw {
                println!("{msg}");
                return Ok(());
            }

            let envelope = Envelope::decode(&msg)?;
            let payload = envelope.payload()?;
            if json {
                let output = serde_json::json!({
                    "version": envelope.version,
                    "source": envelope.source,
                    "destination": envelope.destination,
                    "user": envelope.user,
                    "timestamp": envelope.timestamp,
                    "payload": String::from_utf8_lossy(&payload),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&payload)?;
                stdout.flush()?;
            }
        }
        EndpointCommand::Subscriptions { name } => {
            for topic in uipc.subscriptions(&name)? {
                println!("{topic}");
            }
        }
        EndpointCommand::Owner { name } => println!("{}", uipc.owner(&name)?),
    }
    Ok(())
}

/// The payload given on the command line, else all of stdin.
pub(super) fn payload_or_stdin(data: Option<String>) -> Result<Vec<u8>> {
    match data {
        Some(data) => Ok(data.into_bytes()),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}
