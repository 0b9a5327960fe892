//! sealdrop: push a file through untrusted storage without the storage ever
//! seeing plaintext.
//!
//! Commands:
//!   send <file>            - encrypt, upload, print the share token
//!   recv <token>           - download and decrypt to a local file
//!   serve <token>          - expose a drop over HTTP for a generic consumer
//!   abort <session>        - best-effort cleanup of a stranded session
//!
//! The share token is `{object_id}#{key}`; everything after the `#` never
//! travels to the storage service.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use sealdrop_core::config::SealdropConfig;
use sealdrop_core::{ContentMeta, SealdropError};
use sealdrop_crypto::{generate_key, ShareToken};
use sealdrop_proxy::{ProxyBridge, ProxyState, Registration};
use sealdrop_storage::StorageTransferClient;
use sealdrop_transfer::{
    CiphertextSource, DownloadSession, MultipartTransferClient, UploadOptions, UploadSession,
};

// ── CLI structure ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sealdrop",
    version,
    about = "End-to-end encrypted file drops over untrusted storage"
)]
struct Cli {
    /// Path to sealdrop.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SEALDROP_CONFIG",
        default_value = "/etc/sealdrop/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SEALDROP_LOG", default_value = "warn")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "SEALDROP_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt and upload a file, printing the share token
    ///
    /// Credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY
    /// environment variables (SEALDROP_ACCESS_KEY_ID is also honored).
    Send {
        /// File to send
        file: PathBuf,
        /// Display name offered to the receiver (default: the file name)
        #[arg(long)]
        name: Option<String>,
        /// Requested retention in seconds
        #[arg(long)]
        expiry: Option<u64>,
    },

    /// Download a drop and decrypt it to a local file
    Recv {
        /// Share token ({object_id}#{key})
        token: String,
        /// Output path (default: the sender's display name)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Serve a drop over HTTP so a browser or curl can fetch the plaintext
    ///
    /// The link is single-use: the virtual address is consumed by the first
    /// request.
    Serve {
        /// Share token ({object_id}#{key})
        token: String,
        /// Listen address (default: from config)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Best-effort cleanup of a session that will not be finalized
    Abort {
        /// Session identifier
        session: String,
    },
}

// ── main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, &cli.log_format);

    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Send { file, name, expiry } => cmd_send(&config, &file, name, expiry).await,
        Commands::Recv { token, output } => cmd_recv(&config, &token, output.as_deref()).await,
        Commands::Serve { token, listen } => cmd_serve(&config, &token, listen).await,
        Commands::Abort { session } => cmd_abort(&config, &session).await,
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}

async fn load_config(path: &Path) -> Result<SealdropConfig> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            SealdropConfig::from_toml(&text).with_context(|| format!("parsing {}", path.display()))
        }
        Err(_) => {
            warn!(
                "config file not found at {}, using built-in defaults",
                path.display()
            );
            Ok(SealdropConfig::default())
        }
    }
}

fn build_client(config: &SealdropConfig) -> Result<StorageTransferClient> {
    let access_key = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("SEALDROP_ACCESS_KEY_ID"))
        .context("storage credentials not set: export AWS_ACCESS_KEY_ID")?;
    let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("SEALDROP_SECRET_ACCESS_KEY"))
        .context("AWS_SECRET_ACCESS_KEY not set")?;

    let op = sealdrop_storage::build_from_config(&config.storage, &access_key, &secret_key)
        .context("building storage operator")?;
    Ok(StorageTransferClient::new(
        op,
        &config.storage.prefix,
        &config.transfer,
    ))
}

// ── `sealdrop send` ───────────────────────────────────────────────────────────

async fn cmd_send(
    config: &SealdropConfig,
    path: &Path,
    name: Option<String>,
    expiry: Option<u64>,
) -> Result<()> {
    let client = build_client(config)?;

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let total_size = file
        .metadata()
        .await
        .with_context(|| format!("reading size of {}", path.display()))?
        .len();

    let display_name = name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "drop.bin".to_string())
    });
    let meta = ContentMeta {
        name: display_name.clone(),
        content_type: None,
        expiry_secs: expiry,
    };

    let key = generate_key();
    let session = UploadSession::begin(
        &client,
        key.clone(),
        total_size,
        &meta,
        UploadOptions::from(&config.transfer),
    )
    .await?;

    println!(
        "Sending {} ({}) in {} parts of {}",
        display_name,
        fmt_bytes(total_size),
        session.plan().total_parts,
        fmt_bytes(session.plan().plain_chunk_size as u64),
    );

    // Ctrl-C cancels cooperatively: in-flight parts settle, the remote
    // session is aborted.
    let cancel = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancelling transfer");
            cancel.cancel();
        }
    });

    let pb = make_progress_bar(total_size, "send");
    let mut progress = session.progress();
    let pb_feed = pb.clone();
    let feeder = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snap = *progress.borrow();
            pb_feed.set_position(snap.completed_bytes);
            pb_feed.set_message(format!("{}/s", fmt_bytes(snap.bytes_per_sec as u64)));
        }
    });

    let outcome = session.run(file).await;
    let _ = feeder.await;

    match outcome {
        Ok(outcome) => {
            pb.finish_with_message("done");
            let token = ShareToken::new(outcome.handle.clone(), key);
            println!("  object:  {}", outcome.handle);
            println!("  parts:   {}", outcome.parts.len());
            println!("  bytes:   {}", fmt_bytes(total_size));
            println!();
            println!("Share token (keep the part after '#' off the record):");
            println!("  {}", token.encode());
            Ok(())
        }
        Err(SealdropError::Cancelled) => {
            pb.abandon_with_message("cancelled");
            println!("Transfer cancelled; remote session aborted.");
            Ok(())
        }
        Err(err) => {
            pb.abandon_with_message("failed");
            Err(err.into())
        }
    }
}

// ── `sealdrop recv` ───────────────────────────────────────────────────────────

async fn cmd_recv(config: &SealdropConfig, token: &str, output: Option<&Path>) -> Result<()> {
    let token = ShareToken::parse(token)?;
    let client = build_client(config)?;

    let session = DownloadSession::open(&client, &token.handle, token.key)
        .await?;
    let meta = session.meta().clone();

    let out_path = match output {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(safe_file_name(&meta.name)),
    };

    println!(
        "Receiving {} ({}) -> {}",
        meta.name,
        fmt_bytes(meta.total_size),
        out_path.display()
    );
    let pb = make_spinner("recv");

    // Write to a temp file and rename into place, so a failed download never
    // leaves a plausible-looking partial file behind.
    let tmp = out_path.with_extension("sealdrop_tmp");
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .with_context(|| format!("creating {}", tmp.display()))?;

    match session.copy_to(&mut file).await {
        Ok(bytes) => {
            drop(file);
            tokio::fs::rename(&tmp, &out_path)
                .await
                .with_context(|| format!("renaming to {}", out_path.display()))?;
            pb.finish_with_message("done");
            println!("  wrote {} ({})", out_path.display(), fmt_bytes(bytes));
            Ok(())
        }
        Err(err) => {
            drop(file);
            let _ = tokio::fs::remove_file(&tmp).await;
            pb.abandon_with_message("failed");
            Err(anyhow::Error::from(err)
                .context("download failed; partial output was discarded"))
        }
    }
}

// ── `sealdrop serve` ──────────────────────────────────────────────────────────

async fn cmd_serve(config: &SealdropConfig, token: &str, listen: Option<String>) -> Result<()> {
    let token = ShareToken::parse(token)?;
    let client = Arc::new(build_client(config)?);

    let meta = client
        .read_meta(&token.handle)
        .await?;

    let bridge = ProxyBridge::spawn(Duration::from_millis(config.proxy.handshake_timeout_ms));
    let address = uuid::Uuid::new_v4().simple().to_string();
    bridge
        .register(Registration {
            address: address.clone(),
            display_name: meta.name.clone(),
            total_size: meta.total_size,
            remote: token.handle.clone(),
            key: token.key,
            plain_chunk_size: meta.plain_chunk_size,
        })
        .await?;

    let listen = listen.unwrap_or_else(|| config.proxy.listen.clone());
    info!(object = %token.handle, address = %address, "drop registered");
    println!(
        "Serving {} ({}) at http://{listen}/d/{address}",
        meta.name,
        fmt_bytes(meta.total_size)
    );
    println!("The link is single-use; press Ctrl-C to stop.");

    sealdrop_proxy::serve(
        &listen,
        ProxyState {
            bridge,
            source: client,
        },
    )
    .await
}

// ── `sealdrop abort` ──────────────────────────────────────────────────────────

async fn cmd_abort(config: &SealdropConfig, session: &str) -> Result<()> {
    let client = build_client(config)?;
    client.abort(session).await?;
    println!("Session {session} aborted.");
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}").unwrap());
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Keep only the final path component of a sender-supplied name.
fn safe_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    if base.is_empty() || base == "." || base == ".." {
        "drop.bin".to_string()
    } else {
        base
    }
}

fn fmt_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
