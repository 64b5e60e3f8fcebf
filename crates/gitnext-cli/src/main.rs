//! `gitnextd`: starts one node watching a directory and syncing it with
//! any configured peers. Flags override the ini config file, which in
//! turn overrides built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gitnext_commit::Identity;
use gitnext_node::{Node, NodeConfig};
use ini::Ini;

#[derive(Parser, Debug)]
#[command(name = "gitnextd", about = "Peer-to-peer directory sync daemon")]
struct Cli {
    /// INI config file; see the `[main]` section for `apikey`, `serializer`, `storage`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to watch and keep synced.
    #[arg(long)]
    watch: Option<PathBuf>,

    /// Object store cache directory.
    #[arg(long)]
    cache: Option<PathBuf>,

    /// TCP port to accept peer connections on.
    #[arg(long)]
    port: Option<u16>,

    /// Remote peer address (`host:port`); may be repeated.
    #[arg(long = "remote")]
    remotes: Vec<String>,

    /// Branch name to publish and track.
    #[arg(long)]
    branch: Option<String>,

    /// Shared apikey used to sign and verify wire messages.
    #[arg(long)]
    apikey: Option<String>,

    /// Blob serializer plugin: `gut` or `proto`.
    #[arg(long)]
    serializer: Option<String>,

    /// How long to wait for a requested blob before giving up.
    #[arg(long)]
    blob_timeout_secs: Option<u64>,

    /// Debounce window for filesystem events.
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Commit author name.
    #[arg(long)]
    author_name: Option<String>,

    /// Commit author email.
    #[arg(long)]
    author_email: Option<String>,
}

fn ini_value(ini: &Option<Ini>, key: &str) -> Option<String> {
    ini.as_ref()
        .and_then(|i| i.section(Some("main")))
        .and_then(|s| s.get(key))
        .map(str::to_string)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ini = match &cli.config {
        Some(path) => Some(
            Ini::load_from_file(path)
                .with_context(|| format!("loading config file {}", path.display()))?,
        ),
        None => None,
    };

    // `watch`/`cache` are CLI-only per the config file's documented `[main]`
    // keys (apikey/serializer/storage); `storage` there names the storage
    // *backend* plugin, not a path, so it never feeds these defaults.
    let watch_dir = cli.watch.unwrap_or_else(|| PathBuf::from("_sync"));
    let cache_dir = cli.cache.unwrap_or_else(|| PathBuf::from("_cache"));
    let storage_backend = ini_value(&ini, "storage").unwrap_or_else(|| "gut".to_string());
    if storage_backend != "gut" {
        anyhow::bail!("unsupported storage backend: {storage_backend}");
    }
    let branch_name = cli
        .branch
        .or_else(|| ini_value(&ini, "branch"))
        .unwrap_or_else(|| "main".to_string());
    let apikey = cli
        .apikey
        .or_else(|| ini_value(&ini, "apikey"))
        .unwrap_or_default();
    let serializer = cli
        .serializer
        .or_else(|| ini_value(&ini, "serializer"))
        .unwrap_or_else(|| "gut".to_string());
    let listen_port = Some(cli.port.unwrap_or(9251));
    let blob_timeout_secs = cli
        .blob_timeout_secs
        .or_else(|| ini_value(&ini, "blob_timeout_secs").and_then(|v| v.parse().ok()))
        .unwrap_or(30);
    let debounce_ms = cli
        .debounce_ms
        .or_else(|| ini_value(&ini, "debounce_ms").and_then(|v| v.parse().ok()))
        .unwrap_or(50);

    let mut remotes = cli.remotes;
    if let Some(configured) = ini_value(&ini, "remotes") {
        remotes.extend(configured.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from));
    }

    let identity = Identity {
        name: cli
            .author_name
            .or_else(|| ini_value(&ini, "author_name"))
            .unwrap_or_else(|| Identity::default().name),
        email: cli
            .author_email
            .or_else(|| ini_value(&ini, "author_email"))
            .unwrap_or_else(|| Identity::default().email),
    };

    let config = NodeConfig {
        watch_dir,
        cache_dir,
        branch_name,
        serializer,
        listen_port,
        remotes,
        apikey: apikey.into_bytes(),
        identity,
        debounce: Duration::from_millis(debounce_ms),
        blob_timeout: Duration::from_secs(blob_timeout_secs),
    };

    Node::new(config).run().await?;
    Ok(())
}
