use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pullsync_core::{
    load_config, metrics, toread, validate_config, CacheBackend, CandidateSource, Config,
    ExpiryMode, GcsObjectStore, HttpPullSource, Matcher, MemoryCache, PresenceCache, PullCatalog,
    RemoteLocator, RetryPolicy, SanitizedConfig, SqliteCache, SyncOptions, SyncRunner,
    SystemClock, TodoRunner, TokioSleeper, UploadOptions, UploadRunner,
};

const DEFAULT_CONFIG: &str = "pullsync.toml";

#[derive(Debug, Parser)]
#[command(name = "pullsync", version, about = "Keep a local mirror of your pull list")]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, short, global = true, env = "PULLSYNC_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reload the unread pull list into the cache.
    Fetch,
    /// Look for remote files for every unread pull without one.
    Scan,
    /// Mirror the next unread pulls into a local directory.
    Sync {
        #[arg(long, short)]
        destination: Option<PathBuf>,
        /// Number of pulls to keep locally.
        #[arg(long, short = 'n')]
        count: Option<usize>,
        /// Also expire local files for pulls not admitted this run.
        #[arg(long)]
        strict: bool,
    },
    /// Match local archives against pulls and upload them.
    Upload {
        #[arg(long, short = 'd')]
        scandir: PathBuf,
        #[arg(long, short)]
        threshold: Option<f64>,
        /// Upload acceptable matches instead of only reporting them.
        #[arg(long)]
        commit: bool,
        #[arg(long, value_enum, default_value_t = CheckType::Unseen)]
        check_type: CheckType,
    },
    /// Keep a plain text reading list in step with the unread pulls.
    Todo {
        #[arg(long, short = 'f')]
        todo: PathBuf,
        #[command(subcommand)]
        action: TodoAction,
    },
    /// Print unread pulls in reading order.
    Toread {
        /// Only newly published pulls.
        #[arg(long, short)]
        new: bool,
    },
    /// Print the effective configuration with secrets redacted.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CheckType {
    New,
    Unseen,
}

impl From<CheckType> for CandidateSource {
    fn from(check: CheckType) -> Self {
        match check {
            CheckType::New => CandidateSource::New,
            CheckType::Unseen => CandidateSource::Unseen,
        }
    }
}

#[derive(Debug, Subcommand)]
enum TodoAction {
    /// Rewrite the file from the unread list, keeping a timestamped backup.
    Sync,
    /// Mark pulls read for entries removed from the file.
    Push,
}

struct Services {
    cache: Arc<dyn PresenceCache>,
    catalog: Arc<PullCatalog>,
    locator: Arc<RemoteLocator>,
}

impl Services {
    fn build(config: &Config) -> Result<Self> {
        let cache: Arc<dyn PresenceCache> = match config.cache.backend {
            CacheBackend::Sqlite => Arc::new(
                SqliteCache::new(&config.cache.path).with_context(|| {
                    format!("Failed to open cache at {}", config.cache.path.display())
                })?,
            ),
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
        };

        let source = HttpPullSource::new(&config.pulldb).context("Failed to build pull client")?;
        let store = GcsObjectStore::new(&config.storage).context("Failed to build storage client")?;

        let catalog = PullCatalog::new(Arc::new(source), cache.clone())
            .with_batch_size(config.cache.batch_size);
        let locator = RemoteLocator::new(
            cache.clone(),
            Arc::new(store),
            Arc::new(TokioSleeper),
            RetryPolicy::from(&config.retry),
            config.storage.bucket.clone(),
        )
        .with_prefix_root(config.storage.prefix_root.clone());

        Ok(Self {
            cache,
            catalog: Arc::new(catalog),
            locator: Arc::new(locator),
        })
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("pullsync: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    validate_config(&config).context("Invalid configuration")?;

    init_logging(config.logging.json);
    info!(config = %cli.config.display(), "Configuration loaded");

    if let Command::Config = cli.command {
        return print_config(&config);
    }

    let services = Services::build(&config)?;
    let outcome = dispatch(cli.command, &config, &services).await;

    if let Some(path) = &config.metrics.textfile {
        if let Err(e) = write_metrics(path) {
            warn!(path = %path.display(), "Failed to write metrics: {:#}", e);
        }
    }

    outcome
}

async fn dispatch(command: Command, config: &Config, services: &Services) -> Result<()> {
    match command {
        Command::Fetch => {
            let count = services.catalog.refresh_unread().await?;
            info!(count, "Unread pulls cached");
        }
        Command::Scan => {
            let unseen = services.catalog.list_unseen()?;
            info!(count = unseen.len(), "Looking for unseen pulls");
            for (id, descriptors) in services.locator.locate_all(&unseen).await {
                for descriptor in descriptors {
                    println!("{:6} {}", id, descriptor.object_name);
                }
            }
        }
        Command::Sync {
            destination,
            count,
            strict,
        } => {
            let mut options = match (destination, SyncOptions::from_config(&config.sync)) {
                (Some(destination), Some(mut options)) => {
                    options.destination = destination;
                    options
                }
                (Some(destination), None) => {
                    let mut options = SyncOptions::new(destination);
                    options.count = config.sync.count;
                    options.mode = ExpiryMode::from_strict(config.sync.strict);
                    options
                }
                (None, Some(options)) => options,
                (None, None) => anyhow::bail!("No sync destination configured"),
            };
            if let Some(count) = count {
                options.count = count;
            }
            if strict {
                options.mode = ExpiryMode::Strict;
            }

            SyncRunner::new(services.catalog.clone(), services.locator.clone())
                .run(&options)
                .await?;
        }
        Command::Upload {
            scandir,
            threshold,
            commit,
            check_type,
        } => {
            let options = UploadOptions {
                scan_dir: scandir,
                threshold: threshold.unwrap_or(config.matcher.threshold),
                commit,
                candidates: check_type.into(),
            };
            let runner = UploadRunner::new(
                services.catalog.clone(),
                services.locator.clone(),
                Matcher::new(),
            );
            for outcome in runner.run(&options).await? {
                println!(
                    "{:.3} {} {:6} {:?} {}",
                    outcome.weighted_distance,
                    if outcome.acceptable { '+' } else { '-' },
                    outcome.pull_id,
                    outcome.action,
                    outcome.file.display(),
                );
            }
        }
        Command::Todo { todo, action } => {
            let runner = TodoRunner::new(services.catalog.clone(), Arc::new(SystemClock));
            match action {
                TodoAction::Sync => {
                    if let Some(backup) = runner.sync(&todo).await? {
                        info!(backup = %backup.display(), "Previous list backed up");
                    }
                }
                TodoAction::Push => {
                    let read = runner.push(&todo).await?;
                    info!(count = read.len(), "Pulls marked read");
                }
            }
        }
        Command::Toread { new } => {
            let pulls = if new {
                services.catalog.fetch_new().await?
            } else {
                services.catalog.list_unread()?
            };
            for line in toread::report(&pulls, services.cache.as_ref())? {
                println!("{}", line);
            }
        }
        Command::Config => print_config(config)?,
    }
    Ok(())
}

fn print_config(config: &Config) -> Result<()> {
    let sanitized = SanitizedConfig::from(config);
    println!("{}", serde_json::to_string_pretty(&sanitized)?);
    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn write_metrics(path: &Path) -> Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, metrics::encode_metrics())
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to move {}", tmp.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_flags() {
        let cli = Cli::try_parse_from([
            "pullsync", "sync", "--destination", "/tmp/mirror", "-n", "10", "--strict",
        ])
        .unwrap();
        match cli.command {
            Command::Sync {
                destination,
                count,
                strict,
            } => {
                assert_eq!(destination, Some(PathBuf::from("/tmp/mirror")));
                assert_eq!(count, Some(10));
                assert!(strict);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_upload_defaults_to_unseen() {
        let cli = Cli::try_parse_from(["pullsync", "upload", "-d", "/tmp/scan"]).unwrap();
        match cli.command {
            Command::Upload {
                check_type, commit, ..
            } => {
                assert_eq!(CandidateSource::from(check_type), CandidateSource::Unseen);
                assert!(!commit);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from([
            "pullsync", "upload", "-d", "/tmp/scan", "--check-type", "new", "--commit",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Upload {
                check_type: CheckType::New,
                commit: true,
                ..
            }
        ));
    }

    #[test]
    fn test_todo_requires_action() {
        assert!(Cli::try_parse_from(["pullsync", "todo", "-f", "todo.txt"]).is_err());
        let cli = Cli::try_parse_from(["pullsync", "todo", "-f", "todo.txt", "push"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Todo {
                action: TodoAction::Push,
                ..
            }
        ));
    }

    #[test]
    fn test_metrics_textfile_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pullsync.prom");
        write_metrics(&path).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("pullsync.prom.tmp").exists());
    }
}
