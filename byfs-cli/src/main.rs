//! CLI for the byfs remote file service.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod fs;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use byfs::Config;
use byfs::url::RemoteUrl;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "byfs", version, about = "Client for byfs remote file servers")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

/// Connection options shared by every subcommand.
///
/// Precedence: config file < `BYFS_*` environment < flags < a `byfs://`
/// URL argument (host and port only).
#[derive(clap::Args, Debug, Default)]
struct GlobalArgs {
    /// Server host.
    #[arg(long, global = true, env = "BYFS_SERVER")]
    server: Option<String>,

    /// Server port.
    #[arg(long, global = true, env = "BYFS_PORT")]
    port: Option<u16>,

    /// Connect timeout in seconds.
    #[arg(long, global = true, env = "BYFS_TIMEOUT", value_name = "SECS")]
    timeout: Option<u64>,

    /// Shared secret for the auth challenge.
    #[arg(long, global = true, env = "BYFS_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Config file (default: <config dir>/byfs/config.json).
    #[arg(long, global = true, env = "BYFS_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// List a remote directory.
    Ls(fs::LsArgs),

    /// Show metadata of a remote path.
    Stat(fs::StatArgs),

    /// Create remote directories.
    Mkdir(fs::MkdirArgs),

    /// Remove a remote directory.
    Rmdir(fs::RmdirArgs),

    /// Remove remote files.
    Rm(fs::RmArgs),

    /// Move or rename a remote path.
    Mv(fs::PairArgs),

    /// Copy a remote file on the server.
    Cp(fs::PairArgs),

    /// Download a remote file.
    Get(fs::GetArgs),

    /// Upload a local file.
    Put(fs::PutArgs),

    /// Show or write the effective configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

/// Subcommands for `byfs config`.
#[derive(Subcommand)]
enum ConfigAction {
    /// Print the merged configuration as JSON, secret redacted.
    Show,
    /// Write the merged configuration to the config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// Machine-readable JSON.
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);
    if let Err(e) = cli.dispatch() {
        eprintln!("byfs: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    fn dispatch(self) -> Result<()> {
        if let Command::Completion { shell } = self.command {
            clap_complete::generate(shell, &mut Self::command(), "byfs", &mut std::io::stdout());
            return Ok(());
        }

        let endpoint = self.command.remote_args().into_iter().find_map(RemoteUrl::parse);
        let config = self.global.resolve(endpoint.as_ref())?;
        let client = byfs::Client::new(config);
        let result = match self.command {
            Command::Ls(args) => fs::ls(&client, &args),
            Command::Stat(args) => fs::stat(&client, &args),
            Command::Mkdir(args) => fs::mkdir(&client, &args),
            Command::Rmdir(args) => fs::rmdir(&client, &args),
            Command::Rm(args) => fs::rm(&client, &args),
            Command::Mv(args) => fs::mv(&client, &args),
            Command::Cp(args) => fs::cp(&client, &args),
            Command::Get(args) => fs::get(&client, &args),
            Command::Put(args) => fs::put(&client, &args),
            Command::Config { action } => self.global.config_cmd(client.config(), &action),
            Command::Completion { .. } => Ok(()),
        };
        client.close();
        result
    }
}

impl Command {
    /// Arguments naming remote paths; any of them may be a `byfs://` URL.
    fn remote_args(&self) -> Vec<&str> {
        match self {
            Self::Ls(a) => vec![a.path.as_str()],
            Self::Stat(a) => vec![a.path.as_str()],
            Self::Mkdir(a) => a.paths.iter().map(String::as_str).collect(),
            Self::Rmdir(a) => vec![a.path.as_str()],
            Self::Rm(a) => a.paths.iter().map(String::as_str).collect(),
            Self::Mv(a) | Self::Cp(a) => vec![a.from.as_str(), a.to.as_str()],
            Self::Get(a) => vec![a.remote.as_str()],
            Self::Put(a) => vec![a.remote.as_str()],
            Self::Config { .. } | Self::Completion { .. } => Vec::new(),
        }
    }
}

impl GlobalArgs {
    fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| dirs::config_dir().map(|d| d.join("byfs").join("config.json")))
    }

    /// Merges the config file, environment, flags and URL endpoint.
    fn resolve(&self, endpoint: Option<&RemoteUrl>) -> Result<Config> {
        let base = match self.config_path() {
            Some(path) if self.config.is_some() || path.exists() => Config::load(&path)
                .with_context(|| format!("loading {}", path.display()))?,
            _ => Config::default(),
        };

        let mut b = base.to_builder();
        if let Some(server) = &self.server {
            b = b.server(server.as_str());
        }
        if let Some(port) = self.port {
            b = b.port(port);
        }
        if let Some(secs) = self.timeout {
            b = b.timeout(Duration::from_secs(secs));
        }
        if let Some(secret) = &self.secret {
            b = b.secret(secret.as_str());
        }
        if let Some(url) = endpoint {
            b = b.server(url.host.as_str()).port(url.port);
        }
        b.build().context("invalid configuration")
    }

    fn config_cmd(&self, config: &Config, action: &ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            }
            ConfigAction::Init { force } => {
                let path = self
                    .config_path()
                    .ok_or_else(|| anyhow::anyhow!("no platform config directory"))?;
                if path.exists() && !force {
                    anyhow::bail!("{} exists (use --force to overwrite)", path.display());
                }
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
                config.save(&path)?;
                println!("{}", path.display());
            }
        }
        Ok(())
    }
}

/// Formats bytes into a human-readable size string.
#[allow(clippy::cast_precision_loss)]
fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}
