//! `bigup`: resumable chunked uploads from the command line.

mod config;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use bigup_http::HttpUploadApi;
use bigup_transfer::UploadFile;
use bigup_uploader::{
    JsonFileSessionStore, LocalDirApi, SessionStore, Sha256Fingerprinter, SubscriberOrder,
    UploadApi, Uploader,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::render::ProgressPrinter;

#[derive(Parser)]
#[command(name = "bigup")]
#[command(about = "Resumable chunked file uploads")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files in chunks, resuming from chunks the destination already holds
    Upload(UploadArgs),
    /// List uploads interrupted in a previous run
    Sessions(SessionsArgs),
}

#[derive(Args)]
struct UploadArgs {
    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Base URL of the upload server
    #[arg(long, conflicts_with = "target")]
    server: Option<String>,

    /// Upload into a local directory instead of a server
    #[arg(long)]
    target: Option<PathBuf>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of chunks in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Failed attempts tolerated per chunk
    #[arg(long)]
    max_retries: Option<u32>,

    /// Record in-flight sessions in this file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Attach a key/value attribute to every upload (repeatable)
    #[arg(long = "attr", num_args = 2, value_names = ["KEY", "VALUE"])]
    attrs: Vec<String>,
}

#[derive(Args)]
struct SessionsArgs {
    /// Session state file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Where uploaded files go.
#[derive(Debug, PartialEq)]
enum Destination {
    Server(String),
    Target(PathBuf),
}

/// Picks the destination, command-line flags first.
fn destination(args: &UploadArgs, config: &CliConfig) -> anyhow::Result<Destination> {
    if let Some(url) = &args.server {
        return Ok(Destination::Server(url.clone()));
    }
    if let Some(dir) = &args.target {
        return Ok(Destination::Target(dir.clone()));
    }
    match (&config.server, &config.target) {
        (Some(url), _) => Ok(Destination::Server(url.clone())),
        (None, Some(dir)) => Ok(Destination::Target(dir.clone())),
        (None, None) => bail!("no destination: pass --server or --target"),
    }
}

fn load_config(path: Option<&std::path::Path>) -> CliConfig {
    match CliConfig::load(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            CliConfig::default()
        }
    }
}

/// Opens every path up front, so a bad path fails before anything starts.
fn open_files(paths: &[PathBuf]) -> anyhow::Result<Vec<UploadFile>> {
    paths
        .iter()
        .map(|path| {
            UploadFile::from_path(path).with_context(|| format!("cannot read {}", path.display()))
        })
        .collect()
}

async fn upload(args: UploadArgs) -> anyhow::Result<ExitCode> {
    let file_config = load_config(args.config.as_deref());
    let files = open_files(&args.files)?;

    let mut uploader_config = file_config.uploader.clone();
    if let Some(limit) = args.concurrency {
        uploader_config.concurrency_limit = limit;
    }
    if let Some(retries) = args.max_retries {
        uploader_config.max_retries = retries;
    }
    let state_file = args.state_file.clone().or_else(|| file_config.state_file.clone());
    if state_file.is_some() {
        uploader_config.persist = true;
    }

    let api: Arc<dyn UploadApi> = match destination(&args, &file_config)? {
        Destination::Server(url) => {
            Arc::new(HttpUploadApi::new(&url).with_context(|| format!("bad server URL {url}"))?)
        }
        Destination::Target(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("cannot create {}", dir.display()))?;
            Arc::new(LocalDirApi::new(&dir))
        }
    };

    let mut builder = Uploader::builder(api)
        .fingerprinter(Arc::new(Sha256Fingerprinter))
        .config(uploader_config);
    if let Some(path) = state_file {
        let store = JsonFileSessionStore::open(path.clone())
            .with_context(|| format!("cannot open state file {}", path.display()))?;
        builder = builder.session_store(Arc::new(store));
    }
    let uploader = builder.build();

    let printer = Arc::new(ProgressPrinter::new());
    let handler = printer.clone();
    uploader.subscribe(SubscriberOrder::default(), move |event| handler.handle(event));

    let canceler = uploader.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, canceling uploads");
            for id in canceler.active_sessions() {
                canceler.cancel(&id);
            }
        }
    });

    let mut pending = Vec::with_capacity(args.files.len());
    for file in files {
        let name = file.name().to_string();
        match uploader.submit_with_attributes(file, &args.attrs) {
            Ok(handle) => pending.push((name, handle)),
            Err(e) => {
                for (_, handle) in &pending {
                    uploader.cancel(handle.session_id());
                }
                return Err(e).with_context(|| format!("cannot upload {name}"));
            }
        }
    }

    let mut failed = 0usize;
    for (name, handle) in pending {
        let completion = handle.wait().await;
        if completion.is_err() {
            failed += 1;
        }
        println!("{}", render::summary(&name, &completion));
    }
    interrupt.abort();

    tracing::info!(files = args.files.len(), failed, "uploads finished");
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn sessions(args: SessionsArgs) -> anyhow::Result<ExitCode> {
    let file_config = load_config(args.config.as_deref());
    let Some(path) = args.state_file.or(file_config.state_file) else {
        bail!("no state file: pass --state-file or set state_file in the config");
    };

    let store = JsonFileSessionStore::open(path.clone())
        .with_context(|| format!("cannot open state file {}", path.display()))?;
    let records = store.load_all()?;
    if records.is_empty() {
        println!("no interrupted uploads");
    }
    for r in records {
        println!(
            "{}  {}  {}  {:.1}%",
            r.session_id, r.file_name, r.state, r.progress
        );
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr so progress lines stay readable on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting bigup");

    match Cli::parse().command {
        Commands::Upload(args) => upload(args).await,
        Commands::Sessions(args) => sessions(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload_args(argv: &[&str]) -> UploadArgs {
        let mut full = vec!["bigup", "upload"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Upload(args) => args,
            Commands::Sessions(_) => panic!("expected upload"),
        }
    }

    #[test]
    fn parses_repeated_attributes() {
        let args = upload_args(&[
            "a.bin", "b.bin", "--target", "/tmp/out", "--attr", "owner", "ana", "--attr", "tag",
            "x",
        ]);
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.attrs, ["owner", "ana", "tag", "x"]);
    }

    #[test]
    fn server_and_target_conflict() {
        let argv = [
            "bigup", "upload", "a.bin", "--server", "http://x", "--target", "/tmp",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn attribute_needs_a_value() {
        let argv = ["bigup", "upload", "a.bin", "--attr", "owner"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn open_files_fails_before_any_upload_on_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.bin");
        std::fs::write(&good, b"abc").unwrap();
        let missing = dir.path().join("missing.bin");

        let err = open_files(&[good.clone(), missing]).unwrap_err();
        assert!(err.to_string().contains("missing.bin"));

        let files = open_files(&[good]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name(), "a.bin");
        assert_eq!(files[0].size(), 3);
    }

    #[test]
    fn flags_override_config_destination() {
        let config = CliConfig {
            server: Some("http://files.local".into()),
            ..CliConfig::default()
        };

        let args = upload_args(&["a.bin", "--target", "/tmp/out"]);
        assert_eq!(
            destination(&args, &config).unwrap(),
            Destination::Target("/tmp/out".into())
        );

        let args = upload_args(&["a.bin"]);
        assert_eq!(
            destination(&args, &config).unwrap(),
            Destination::Server("http://files.local".into())
        );
        assert!(destination(&args, &CliConfig::default()).is_err());
    }
}
