//! unhelm CLI - Helm Release Manifest Extractor
//!
//! Reads the Secret Helm stores a release in and writes every resource of the
//! release manifest to `<kind>.<name>.yaml` in the output directory.

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, prelude::*};
use unhelm::{
    ClusterConfig, ExportedFile, FileSecretSource, KubeSecretSource, ReleaseRecord, SecretSource,
};

#[derive(Parser)]
#[command(
    name = "unhelm",
    about = "Helm Release Manifest Extractor",
    long_about = "Decode the Secret a Helm release is stored in and write each Kubernetes resource of its manifest to its own file"
)]
struct Cli {
    /// Name of the release Secret, e.g. sh.helm.release.v1.podinfo.v1
    name: String,
    /// Directory to write resources into (must exist, defaults to the current directory)
    output_dir: Option<PathBuf>,
    /// Path to the kubeconfig file
    #[arg(long, default_value_os_t = unhelm::config::default_kubeconfig())]
    kubeconfig: PathBuf,
    /// Namespace holding the release Secret
    #[arg(short = 'n', long = "namespace", visible_alias = "n", default_value = unhelm::config::DEFAULT_NAMESPACE)]
    namespace: String,
    /// Read the Secret from a YAML or JSON file instead of the cluster
    #[arg(short = 'f', long)]
    secret_file: Option<PathBuf>,
    /// List the files that would be written without writing them
    #[arg(long)]
    dry_run: bool,
    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
#[async_backtrace::framed]
async fn main() {
    // Enable backtraces by default
    if env::var("RUST_BACKTRACE").is_err() {
        unsafe {
            env::set_var("RUST_BACKTRACE", "1");
        }
    }

    color_eyre::config::HookBuilder::default()
        .capture_span_trace_by_default(true)
        .display_location_section(true)
        .display_env_section(false)
        .install()
        .expect("Failed to install color-eyre");

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(error) = run(cli).await {
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_error::ErrorLayer::default())
        .init();
}

#[async_backtrace::framed]
async fn run(cli: Cli) -> Result<()> {
    let output_dir = match &cli.output_dir {
        Some(dir) => dir.clone(),
        None => env::current_dir().wrap_err("Failed to determine the current directory")?,
    };

    match &cli.secret_file {
        Some(path) => {
            tracing::debug!(path = %path.display(), "reading release Secret from file");
            extract(&FileSecretSource::new(path), &cli, &output_dir).await
        }
        None => {
            let config = ClusterConfig::new(&cli.kubeconfig, &cli.namespace);
            let source = KubeSecretSource::connect(&config).await.with_context(|| {
                format!("Failed to connect using {}", config.kubeconfig.display())
            })?;
            tracing::debug!(namespace = %config.namespace, "reading release Secret from cluster");
            extract(&source, &cli, &output_dir).await
        }
    }
}

#[async_backtrace::framed]
async fn extract<S: SecretSource>(source: &S, cli: &Cli, output_dir: &Path) -> Result<()> {
    if cli.dry_run {
        let payload = source
            .retrieve(&cli.name)
            .await
            .with_context(|| format!("Failed to retrieve release Secret {}", cli.name))?;
        let record = unhelm::decode(&payload)
            .with_context(|| format!("Failed to decode release Secret {}", cli.name))?;
        return print_plan(&record, output_dir);
    }

    let unpacked = unhelm::unpack(source, &cli.name, output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to unpack release Secret {} into {}",
                cli.name,
                output_dir.display()
            )
        })?;

    for file in &unpacked.files {
        println!("{}", file.path.display());
    }
    print_summary(&cli.name, &unpacked.record, &unpacked.files);

    Ok(())
}

fn print_plan(record: &ReleaseRecord, output_dir: &Path) -> Result<()> {
    let documents = unhelm::plan(&record.manifest).wrap_err("Failed to read manifest")?;

    for document in &documents {
        println!("{}", output_dir.join(document.file_name()).display());
    }
    eprintln!();
    eprintln!("Dry run: {} resources, nothing written", documents.len());

    Ok(())
}

fn print_summary(secret: &str, record: &ReleaseRecord, files: &[ExportedFile]) {
    eprintln!();
    eprintln!("=== Export Summary ===");
    eprintln!("Secret: {}", secret);
    if let Some(name) = &record.name {
        match record.version {
            Some(version) => eprintln!("Release: {} (revision {})", name, version),
            None => eprintln!("Release: {}", name),
        }
    }
    if let Some(namespace) = &record.namespace {
        eprintln!("Namespace: {}", namespace);
    }
    eprintln!("Resources written: {}", files.len());
}
