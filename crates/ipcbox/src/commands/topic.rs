//! Topic subcommands

use anyhow::Result;
use clap::Subcommand;
use ipcbox_core::Config;

use super::endpoint::payload_or_stdin;

#[derive(Subcommand, Debug)]
pub enum TopicCommand {
    /// Subscribe an endpoint to a topic, creating the topic if needed
    Subscribe { endpoint: String, topic: String },

    /// Remove an endpoint's subscription
    Unsubscribe { endpoint: String, topic: String },

    /// Send a message to every subscriber of a topic
    ///
    /// Reads the payload from stdin when DATA is omitted.
    Publish {
        endpoint: String,
        topic: String,
        data: Option<String>,

        /// Print the delivery report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the endpoints subscribed to a topic
    Subscribers { topic: String },
}

pub fn execute(command: TopicCommand, config: &Config) -> Result<()> {
    let uipc = config.uipc();

    match command {
        TopicCommand::Subscribe { endpoint, topic } => uipc.subscribe(&endpoint, &topic)?,
        TopicCommand::Unsubscribe { endpoint, topic } => uipc.unsubscribe(&endpoint, &topic)?,
        TopicCommand::Publish {
            endpoint,
            topic,
            data,
            json,
        } => {
            let payload = payload_or_stdin(data)?;
            let report = uipc.publish(&endpoint, &topic, &payload)?;
            if json {
                let output = serde_json::json!({
                    "topic": topic,
                    "delivered": report.delivered,
                    "failed": report.failed,
                    "pruned": report.pruned,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!(
                    "Published to {} subscriber(s) of '{topic}' ({} failed)",
                    report.delivered, report.failed
                );
            }
        }
        TopicCommand::Subscribers { topic } => {
            for endpoint in uipc.subscribers(&topic)? {
                println!("{endpoint}");
            }
        }
    }
    Ok(())
}
