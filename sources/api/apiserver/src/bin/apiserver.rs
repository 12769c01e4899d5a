//! This is the primary binary for the configuration API server.

use log::info;
use simplelog::{ColorChoice, Config as LogConfig, LevelFilter, TermLogger, TerminalMode};
use snafu::ResultExt;
use std::env;
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::sync::Arc;

use apiserver::config::{Role, ServerConfig};
use apiserver::server::{ConfigurationService, Master, Replica, SlaveRegistry};
use apiserver::serve;
use syncdog::{LocalReplica, Syncer};

type Result<T> = std::result::Result<T, error::Error>;

mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub(super) enum Error {
        #[snafu(display("{}", source))]
        Config { source: apiserver::config::Error },

        #[snafu(display("{}", source))]
        Server { source: apiserver::server::Error },

        #[snafu(display("Unable to start syncing: {}", source))]
        Sync { source: syncdog::Error },

        #[snafu(display("Logger setup error: {}", source))]
        Logger { source: log::SetLoggerError },
    }
}

/// Stores user-supplied arguments.
struct Args {
    config_path: PathBuf,
    log_level: LevelFilter,
    color: ColorChoice,
}

/// Informs the user about proper usage of the program and exits.
fn usage() -> ! {
    let program_name = env::args().next().unwrap_or_else(|| "program".to_string());
    eprintln!(
        r"Usage: {}
            [ --config PATH ]
            [ --no-color ]
            [ --log-level trace|debug|info|warn|error ]

    Config path defaults to {}",
        program_name,
        constants::APISERVER_CONFIG_PATH
    );
    process::exit(2);
}

/// Prints a more specific message before exiting through usage().
fn usage_msg<S: AsRef<str>>(msg: S) -> ! {
    eprintln!("{}\n", msg.as_ref());
    usage();
}

/// Parses user arguments into an Args structure.
fn parse_args(args: env::Args) -> Args {
    let mut config_path = None;
    let mut log_level = None;
    let mut color = ColorChoice::Auto;

    let mut iter = args.skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                config_path = Some(PathBuf::from(
                    iter.next()
                        .unwrap_or_else(|| usage_msg("Did not give argument to --config")),
                ))
            }

            "--log-level" => {
                let log_level_str = iter
                    .next()
                    .unwrap_or_else(|| usage_msg("Did not give argument to --log-level"));
                log_level = Some(LevelFilter::from_str(&log_level_str).unwrap_or_else(|_| {
                    usage_msg(format!("Invalid log level '{}'", log_level_str))
                }));
            }

            "--no-color" => color = ColorChoice::Never,

            _ => usage(),
        }
    }

    Args {
        config_path: config_path
            .unwrap_or_else(|| PathBuf::from(constants::APISERVER_CONFIG_PATH)),
        log_level: log_level.unwrap_or(LevelFilter::Info),
        color,
    }
}

/// Builds the service for the configured role.  A replica also gets its syncer running in the
/// background.
fn build_service(config: &ServerConfig) -> Result<Arc<dyn ConfigurationService>> {
    match config.role {
        Role::Replica => {
            let registry = SlaveRegistry::new(config.slave_expiry());
            let sync = config.sync_settings().context(error::ConfigSnafu)?;
            let syncer = Syncer::connect(sync, Arc::new(LocalReplica::new()))
                .context(error::SyncSnafu)?;
            let replica = Replica::new(syncer.replica(), registry, syncer.waker());
            actix_web::rt::spawn(syncer.run());
            info!("Replicating from {}", sync.masters.join(", "));
            Ok(Arc::new(replica))
        }
        Role::Master => {
            let master = Master::from_config(config).context(error::ServerSnafu)?;
            info!(
                "Serving data store at {}, version {}",
                config.datastore_path.display(),
                master.store().version()
            );
            Ok(Arc::new(master))
        }
    }
}

/// Starts a web server to accept user requests, dispatching those requests to the service.
async fn run() -> Result<()> {
    let args = parse_args(env::args());

    // TerminalMode::Mixed will send errors to stderr and anything less to stdout.
    TermLogger::init(
        args.log_level,
        LogConfig::default(),
        TerminalMode::Mixed,
        args.color,
    )
    .context(error::LoggerSnafu)?;

    let config = ServerConfig::from_file(&args.config_path).context(error::ConfigSnafu)?;
    let service = build_service(&config)?;

    let threads_suffix = match config.threads {
        n if n > 1 => "s",
        _ => "",
    };
    info!(
        "Starting {:?} server at {} with {} thread{}",
        config.role, config.listen, config.threads, threads_suffix,
    );

    serve(service, config.listen, config.threads)
        .await
        .context(error::ServerSnafu)
}

// Returning a Result from main makes it print a Debug representation of the error, but with Snafu
// we have nice Display representations of the error, so we wrap "main" (run) and print any error.
// https://github.com/shepmaster/snafu/issues/110
#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}", e);
        process::exit(1);
    }
}
