use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use fsbrowser_core::{ConnectionConfig, ListingView, Session};
use fsbrowser_platform::path;
use fsbrowser_platform::{Backend, BackendError, MemoryBackend};

mod browse;

#[derive(Parser, Debug)]
#[command(name = "fsbrowser")]
#[command(about = "Browse and manage a remote filesystem as an impersonated user")]
#[command(version)]
struct Cli {
    /// Path to connection config file
    #[arg(long, env = "FSBROWSER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// User to perform operations as
    #[arg(long, short, env = "FSBROWSER_USER", global = true)]
    user: Option<String>,

    /// Filesystem URI (e.g., file:///srv/data or memory://)
    #[arg(long, env = "FSBROWSER_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Backend setting as key=value (repeatable)
    #[arg(short = 'D', long = "property", value_name = "KEY=VALUE", global = true)]
    properties: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "FSBROWSER_LOG_LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// List every entry instead of the first page
        #[arg(long, short)]
        all: bool,
    },
    /// Show metadata of a path as JSON
    Stat { path: String },
    /// Create a directory and any missing parents
    Mkdir { path: String },
    /// Create empty files
    Touch {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Remove files or directories recursively
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Delete immediately instead of moving to trash
        #[arg(long)]
        skip_trash: bool,
    },
    /// Copy sources to a destination
    Cp {
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },
    /// Move sources to a destination
    Mv {
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },
    /// Upload local files into a remote directory
    Put {
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },
    /// Download remote paths into a local directory
    Get {
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },
    /// Print a file to stdout
    Cat { path: String },
    /// Report block health of a subtree
    Fsck {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Interactive directory browser
    Browse {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print the effective connection config
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            let denied = e
                .downcast_ref::<fsbrowser_core::Error>()
                .is_some_and(|err| err.is_access_denied());
            if denied {
                eprintln!("hint: permission denied, retry with a different --user");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(ConnectionConfig::default_path);
    let config = load_config(&cli, &config_path)?;

    if let Commands::Config { save } = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        if save {
            config.save(&config_path)?;
            info!("config saved to {}", config_path.display());
        }
        return Ok(());
    }

    let backend = create_backend(&config)?;
    let session = Arc::new(
        Session::open(backend, config.clone())
            .with_context(|| format!("failed to connect to {}", config.endpoint))?,
    );
    debug!("session {} open", session.id());

    let result = dispatch(&session, cli.command);
    session.close();
    result
}

fn load_config(cli: &Cli, config_path: &std::path::Path) -> Result<ConnectionConfig> {
    let mut config = if config_path.exists() {
        info!("loading config from {}", config_path.display());
        ConnectionConfig::load(config_path)?
    } else {
        ConnectionConfig::default()
    };

    // CLI args override config file
    if let Some(user) = &cli.user {
        config.user = user.clone();
    }
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    for property in &cli.properties {
        let (key, value) = property
            .split_once('=')
            .with_context(|| format!("invalid property {:?}, expected KEY=VALUE", property))?;
        config.properties.insert(key.trim().to_string(), value.trim().to_string());
    }

    if config.user.is_empty() {
        anyhow::bail!("user is required (--user or config file)");
    }
    Ok(config)
}

fn dispatch(session: &Arc<Session>, command: Commands) -> Result<()> {
    match command {
        Commands::Ls { path, all } => {
            let view = ListingView::new(session.clone(), &path)?;
            if all {
                view.load_all()?;
            }
            let mut out = io::stdout().lock();
            browse::print_rows(&mut out, &view, false)?;
            if view.has_more_rows() {
                writeln!(out, "... more entries not shown (use --all)")?;
            }
        }
        Commands::Stat { path } => {
            let entry = session.status(&path)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Commands::Mkdir { path } => session.mkdir(&path)?,
        Commands::Touch { paths } => session.touch(&paths)?,
        Commands::Rm { paths, skip_trash } => session.remove(&paths, skip_trash)?,
        Commands::Cp { mut paths } => {
            let dest = split_dest(&mut paths)?;
            session.copy(&paths, &dest)?;
        }
        Commands::Mv { mut paths } => {
            let dest = split_dest(&mut paths)?;
            session.move_to(&paths, &dest)?;
        }
        Commands::Put { mut paths } => {
            let dest = split_dest(&mut paths)?;
            let local: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
            session.copy_from_local(&local, &dest)?;
        }
        Commands::Get { mut paths } => {
            let local_dir = PathBuf::from(split_dest(&mut paths)?);
            session.copy_to_local(&paths, &local_dir)?;
        }
        Commands::Cat { path } => {
            let mut reader = session.open_for_read(&path)?;
            let mut out = io::stdout().lock();
            io::copy(&mut reader, &mut out).context("failed to read remote file")?;
            out.flush()?;
        }
        Commands::Fsck { path } => {
            let report = session.structural_check(&path)?;
            for (key, value) in &report {
                println!("{}:\t{}", key, value);
            }
        }
        Commands::Browse { path } => browse::run(session.clone(), &path)?,
        Commands::Config { .. } => {}
    }
    Ok(())
}

/// Pop the trailing destination argument.
fn split_dest(paths: &mut Vec<String>) -> Result<String> {
    let dest = paths.pop().context("missing destination")?;
    if paths.is_empty() {
        anyhow::bail!("at least one source is required");
    }
    Ok(dest)
}

fn create_backend(config: &ConnectionConfig) -> Result<Arc<dyn Backend>> {
    match path::scheme(&config.endpoint).as_deref() {
        Some("memory") => {
            // A fresh tree per process, with a home directory for the user.
            let backend = MemoryBackend::new();
            let home = format!("/user/{}", config.user);
            backend.add_dir(&home, &config.user, &config.user, 0o755);
            Ok(Arc::new(backend))
        }
        Some("file") => create_local_backend(),
        Some(other) => Err(BackendError::UnsupportedScheme(other.to_string()).into()),
        None => anyhow::bail!("endpoint {} has no scheme", config.endpoint),
    }
}

#[cfg(unix)]
fn create_local_backend() -> Result<Arc<dyn Backend>> {
    Ok(Arc::new(fsbrowser_local::LocalBackend::new()))
}

#[cfg(not(unix))]
fn create_local_backend() -> Result<Arc<dyn Backend>> {
    anyhow::bail!("file:// endpoints are not supported on this platform")
}
