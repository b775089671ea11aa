//! CLI command dispatch and execution

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ipcbox_core::config::{resolve_config, Config, ConfigOverrides};
use ipcbox_core::home::get_home_dir;
use ipcbox_core::Timeout;
use std::path::PathBuf;
use tracing::debug;

mod endpoint;
mod queue;
mod sem;
mod topic;

/// ipcbox - filesystem semaphores, queues and pub/sub endpoints
#[derive(Parser, Debug)]
#[command(
    name = "ipcbox",
    version,
    about = "Filesystem semaphores, queues and pub/sub endpoints",
    long_about = "Inter-process coordination over a shared filesystem. \
                  Names without '/' resolve under ~/.toolbox; names with '/' are paths."
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand
#[derive(Args, Debug)]
struct GlobalArgs {
    /// Config file (default: ~/.config/ipcbox/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base directory for semaphores, queues and endpoints
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Shared endpoint directory (default: <root>/uipc)
    #[arg(long, global = true)]
    uipc_root: Option<PathBuf>,

    /// Account stamped into sent messages and endpoint owner files
    #[arg(long, global = true)]
    user: Option<String>,

    /// Delay between poll attempts, in milliseconds
    #[arg(long, global = true)]
    poll_ms: Option<u64>,

    /// Identity recorded as lock holder (default: IPCBOX_HOLDER or the pid)
    ///
    /// Resources are owned by their holder, so pass the same value to the
    /// invocation that destroys a resource as to the one that created it.
    #[arg(long, global = true)]
    holder: Option<String>,
}

impl GlobalArgs {
    fn resolve(&self) -> Result<Config> {
        let home_dir = get_home_dir()?;
        let overrides = ConfigOverrides {
            config_path: self.config.clone(),
            root: self.root.clone(),
            uipc_root: self.uipc_root.clone(),
            poll_interval_ms: self.poll_ms,
            user: self.user.clone(),
            holder: self.holder.clone(),
        };
        let config = resolve_config(&overrides, &home_dir)?;
        debug!(
            uipc_root = %config.paths.uipc_root.display(),
            poll_ms = config.polling.interval_ms,
            holder = %config.identity.holder,
            "Resolved configuration"
        );
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Counting semaphores
    #[command(subcommand)]
    Sem(sem::SemCommand),

    /// FIFO queues of single-line items
    #[command(subcommand)]
    Queue(queue::QueueCommand),

    /// Named message endpoints
    #[command(subcommand)]
    Endpoint(endpoint::EndpointCommand),

    /// Topic subscription and publishing
    #[command(subcommand)]
    Topic(topic::TopicCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let config = self.global.resolve()?;
        match self.command {
            Commands::Sem(cmd) => sem::execute(cmd, &config),
            Commands::Queue(cmd) => queue::execute(cmd, &config),
            Commands::Endpoint(cmd) => endpoint::execute(cmd, &config),
            Commands::Topic(cmd) => topic::execute(cmd, &config),
        }
    }
}

/// Poll budget shared by blocking subcommands
#[derive(Args, Debug, Clone, Copy)]
pub struct TimeoutArg {
    /// Poll rounds before giving up; 0 tries once, negative or omitted waits forever
    #[arg(long, allow_negative_numbers = true)]
    timeout: Option<i64>,
}

impl TimeoutArg {
    pub fn timeout(self) -> Timeout {
        self.timeout
            .map(Timeout::from_rounds)
            .unwrap_or(Timeout::Infinite)
    }
}
