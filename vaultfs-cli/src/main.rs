use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "vaultfs")]
#[command(about = "Projects a content-addressed object store as a read-only directory tree")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the object store as a projected directory
    Mount {
        /// Root directory of the content-addressed object store
        #[arg(short, long)]
        instance_path: PathBuf,

        /// Directory to become the projection root
        #[arg(short, long)]
        virtual_root: PathBuf,

        /// Cache liveness window in seconds
        #[arg(long, default_value_t = 3600)]
        cache_ttl: u64,

        /// Enable verbose tracing
        #[arg(long)]
        debug: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match &cli.command {
        Commands::Mount { debug: true, .. } => "vaultfs=trace",
        _ => "vaultfs=info",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Mount {
            instance_path,
            virtual_root,
            cache_ttl,
            debug,
        } => mount(instance_path, virtual_root, cache_ttl, debug),
    }
}

#[cfg(windows)]
fn mount(instance_path: PathBuf, virtual_root: PathBuf, cache_ttl: u64, debug: bool) -> Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use vaultfs_core::config::MountConfig;
    use vaultfs_core::store::{ObjectStore, ObjectStoreFileSystem};
    use vaultfs_windows::VirtualizationHost;

    let config = MountConfig::new(instance_path, virtual_root)
        .cache_ttl(Duration::from_secs(cache_ttl))
        .debug(debug);

    // The host loop: a single-threaded runtime driven on its own thread.
    // Every logical-filesystem call the bridge schedules runs here.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let handle = runtime.handle().clone();
    std::thread::Builder::new()
        .name("vaultfs-host-loop".to_string())
        .spawn(move || runtime.block_on(std::future::pending::<()>()))?;

    let store = Arc::new(ObjectStore::new(&config.instance_path));
    let fs = Arc::new(ObjectStoreFileSystem::new(store));

    let host = VirtualizationHost::new(config, fs, handle)?;
    host.start()?;

    println!("Projection running. Press Enter to stop.");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    host.stop()?;
    let stats = host.stats();
    tracing::info!(
        placeholder_queries = stats.provider.placeholder_queries,
        enumerations = stats.provider.enumerations,
        file_reads = stats.provider.file_reads,
        bytes_served = stats.provider.bytes_served,
        denied_writes = stats.provider.denied_writes,
        cache_hits = stats.cache.hits,
        cache_misses = stats.cache.misses,
        "session totals"
    );
    Ok(())
}

#[cfg(not(windows))]
fn mount(_instance_path: PathBuf, _virtual_root: PathBuf, _cache_ttl: u64, _debug: bool) -> Result<()> {
    anyhow::bail!("mounting a projection requires Windows with ProjFS enabled")
}
