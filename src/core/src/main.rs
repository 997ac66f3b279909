use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use logserver::configuration::config::Config;
use logserver::configuration::types::StorageConfig;
use logserver::ingestion::dispatcher::Dispatcher;
use logserver::ingestion::lines::feed_lines;
use logserver::storage::lifecycle::{self, Shutdown, ShutdownTrigger};
use logserver::storage::loader::{load, Backend};
use logserver::storage::migrate::migrate;
use logserver::storage::storage_trait::Storer;
use logserver::web_interface::web_server::WebServer;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "logserver")]
#[command(version)]
#[command(about = "Telemetry sample store with a pivoted JSON view")]
struct Args {
    config_file: String,

    /// Log at debug level regardless of the configured level
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest `<topic> <payload>` lines from stdin and serve the HTTP view (default)
    Serve,
    /// Print the pivoted view of one module as JSON
    View { module: String },
    /// Copy modules from another store into the configured one
    Migrate {
        #[arg(long)]
        from_kind: String,
        #[arg(long)]
        from_path: String,
        /// Modules to copy; all modules of the source when empty
        modules: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.config_file.is_empty() {
        eprintln!("No configuration file given");
        std::process::exit(1);
    }

    let config = match Config::from_file(Path::new(args.config_file.as_str())) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Unable to import configuration from file: {}", e);
            std::process::exit(1);
        }
    };

    let level = if args.debug {
        LevelFilter::Debug
    } else {
        config.log_level.parse().unwrap_or(LevelFilter::Info)
    };
    // RUST_LOG, when set, wins over the configured level
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_target(false)
        .init();

    info!("Configuration imported from {}", args.config_file);

    let (trigger, shutdown) = lifecycle::channel();
    let trigger = Arc::new(trigger);
    watch_stop_signals(trigger.clone());

    let result = match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, &trigger, shutdown).await,
        Command::View { module } => view(&config, &module, shutdown).await,
        Command::Migrate {
            from_kind,
            from_path,
            modules,
        } => {
            let source = StorageConfig {
                kind: from_kind,
                path: from_path,
                read_only: true,
            };
            run_migration(&config, &source, modules, shutdown).await
        }
    };

    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            1
        }
    };
    // a pending stdin read sits on a blocking thread the runtime would wait
    // for on drop
    std::process::exit(code);
}

/// Fires `trigger` on SIGINT or SIGTERM.
fn watch_stop_signals(trigger: Arc<ShutdownTrigger>) {
    let signals = match lifecycle::stop_signals() {
        Ok(signals) => signals,
        Err(e) => {
            error!("Unable to install the shutdown signal handlers: {}", e);
            return;
        }
    };
    tokio::spawn(async move {
        let signal = signals.await;
        info!("{:?} received, shutting down", signal);
        trigger.trigger();
    });
}

async fn serve(
    config: &Config,
    trigger: &ShutdownTrigger,
    shutdown: Shutdown,
) -> Result<(), Box<dyn Error>> {
    let addr = config.bind_address()?;
    let backend = Arc::new(load(&config.storage, shutdown.clone()).await?);
    let storage: Arc<dyn Storer> = backend.clone();

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let reader = BufReader::new(tokio::io::stdin());
    let feeder = tokio::spawn(feed_lines(reader, tx, shutdown.clone()));

    let dispatcher = Dispatcher::new(storage.clone(), config.ingest.clone());
    let dispatch_shutdown = shutdown.clone();
    let dispatching = tokio::spawn(async move { dispatcher.run(rx, dispatch_shutdown).await });

    info!("{} rules loaded, reading messages from stdin", config.ingest.len());
    let served = WebServer::new(storage).start(addr, shutdown).await;
    // make sure the ingestion side stops too when the server could not start
    trigger.trigger();

    match feeder.await {
        Ok(Ok(lines)) => info!("{} messages read", lines),
        Ok(Err(e)) => error!("Reading messages failed: {}", e),
        Err(e) => error!("Message reader aborted: {}", e),
    }
    if let Err(e) = dispatching.await {
        error!("Dispatcher aborted: {}", e);
    }
    backend.close().await;
    served?;
    Ok(())
}

async fn view(config: &Config, module: &str, shutdown: Shutdown) -> Result<(), Box<dyn Error>> {
    let backend = load(&config.storage, shutdown).await?;
    let view = backend.view(module).await;
    backend.close().await;
    println!("{}", serde_json::to_string_pretty(&view?)?);
    Ok(())
}

async fn run_migration(
    config: &Config,
    source: &StorageConfig,
    modules: Vec<String>,
    shutdown: Shutdown,
) -> Result<(), Box<dyn Error>> {
    let from: Backend = load(source, shutdown.clone()).await?;
    let to: Backend = load(&config.storage, shutdown.clone()).await?;
    let modules = if modules.is_empty() {
        from.modules().await?
    } else {
        modules
    };

    info!(
        "Migrating {} modules from {} to {}",
        modules.len(),
        from.kind(),
        to.kind()
    );
    let copied = migrate(&from, &to, &modules, &shutdown).await;
    from.close().await;
    to.close().await;
    info!("{} records copied", copied?);
    Ok(())
}
