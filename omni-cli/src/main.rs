//! omni: entry point.
//!
//! ```text
//! omni shell <agent>                     Interactive shell
//! omni stat <agent> <path>               Print remote file metadata
//! omni download <agent> <remote> [dest]  Fetch a file
//! omni upload <agent> <local> <remote>   Send a file (--verify to check)
//! omni --gen-config                      Dump default config and exit
//! ```

use std::path::PathBuf;

use bytes::Bytes;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use omni_core::{FileTransfer, Session};
use omni_cli::config::ClientConfig;
use omni_cli::{files, shell};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "omni", about = "Remote shell and file transfer for omni agents")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "omni.toml")]
    config: PathBuf,

    /// Server base URL (overrides config).
    #[arg(long)]
    server: Option<String>,

    /// API key (overrides config).
    #[arg(long)]
    api_key: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug)]
struct Target {
    /// Agent name.
    agent: String,

    /// Agent id, when several agents share a name.
    #[arg(long)]
    agent_id: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open an interactive shell on the agent.
    Shell {
        #[command(flatten)]
        target: Target,

        /// Program to run instead of the configured one.
        #[arg(long)]
        cmd: Option<String>,
    },
    /// Print metadata for a remote file.
    Stat {
        #[command(flatten)]
        target: Target,
        path: String,
    },
    /// Download a remote file.
    Download {
        #[command(flatten)]
        target: Target,
        remote: String,
        /// Local file or directory (default: current directory).
        dest: Option<PathBuf>,
    },
    /// Upload a local file.
    Upload {
        #[command(flatten)]
        target: Target,
        local: PathBuf,
        remote: String,
        /// Re-download and compare hashes after upload.
        #[arg(long)]
        verify: bool,
    },
}

impl Command {
    fn target(&self) -> &Target {
        match self {
            Self::Shell { target, .. }
            | Self::Stat { target, .. }
            | Self::Download { target, .. }
            | Self::Upload { target, .. } => target,
        }
    }
}

fn file_transfer<'a>(
    session: &'a Session,
    config: &ClientConfig,
    cancel: &CancellationToken,
) -> FileTransfer<'a> {
    let files = session.files().with_cancellation(cancel.clone());
    match config.request_timeout() {
        Some(after) => files.with_timeout(after),
        None => files,
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        println!("{}", ClientConfig::default_toml()?);
        return Ok(());
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let mut config = ClientConfig::load(&cli.config);
    if let Some(server) = cli.server {
        config.server.base_url = server;
    }
    if let Some(api_key) = cli.api_key {
        config.server.api_key = api_key;
    }

    // Logs go to stderr so they never interleave with shell output.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("omni v{}", env!("CARGO_PKG_VERSION"));

    let target = command.target();
    let session = Session::new(config.session_config(&target.agent, target.agent_id));
    session.connect().await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; cancelling");
        ctrl_c.cancel();
    });

    let result = match command {
        Command::Shell { cmd, .. } => {
            let mut options = config.terminal_options();
            if let Some(cmd) = cmd {
                options.cmd = cmd;
            }
            shell::run(&session, &options).await
        }
        Command::Stat { path, .. } => {
            let info = file_transfer(&session, &config, &cancel)
                .get_file_info(&path)
                .await?;
            println!("path:  {}", info.path);
            println!("size:  {}", info.size);
            println!("mtime: {}", info.mtime);
            if let Some(mode) = info.mode {
                println!("mode:  {mode:o}");
            }
            for (key, value) in &info.extra {
                println!("{key}: {value}");
            }
            Ok(())
        }
        Command::Download { remote, dest, .. } => {
            let transfer = file_transfer(&session, &config, &cancel);
            let file = transfer
                .download_file(&remote, files::progress_line(&remote))
                .await?;
            let dest = dest.unwrap_or_else(|| PathBuf::from("."));
            let saved = files::save(&file, &dest)?;
            info!("saved {} ({} bytes)", saved.display(), file.data.len());
            Ok(())
        }
        Command::Upload {
            local,
            remote,
            verify,
            ..
        } => {
            let data = Bytes::from(tokio::fs::read(&local).await?);
            let transfer = file_transfer(&session, &config, &cancel);
            files::upload(
                &transfer,
                &remote,
                data,
                verify || config.transfer.verify,
                files::progress_line(&remote),
            )
            .await
        }
    };

    session.close();
    result?;
    Ok(())
}
