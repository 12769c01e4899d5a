//! Keeps this host's copy of the configuration in sync with a master.  With `--once` it polls a
//! single time and exits nonzero unless the poll succeeded, which is handy from scripts.

use argh::FromArgs;
use log::info;
use simplelog::{Config as LogConfig, LevelFilter, SimpleLogger};
use snafu::{ensure, ResultExt};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use syncdog::{LocalReplica, SyncSettings, SyncState, Syncer};

/// Sync a local configuration replica from a master.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the TOML config file
    #[argh(option, short = 'c', default = "constants::SYNCDOG_CONFIG_PATH.into()")]
    config: PathBuf,

    /// log level (off, error, warn, info, debug, trace)
    #[argh(option, default = "LevelFilter::Info")]
    log_level: LevelFilter,

    /// poll once and exit
    #[argh(switch)]
    once: bool,
}

async fn run() -> Result<()> {
    let args: Args = argh::from_env();

    // SimpleLogger will send errors to stderr and anything less to stdout.
    SimpleLogger::init(args.log_level, LogConfig::default()).context(error::LoggerSnafu)?;

    let settings = SyncSettings::from_file(&args.config).context(error::SyncSnafu)?;
    let replica = Arc::new(LocalReplica::new());
    let mut syncer = Syncer::connect(&settings, replica).context(error::SyncSnafu)?;
    info!(
        "Syncing from {} master{}",
        settings.masters.len(),
        if settings.masters.len() == 1 { "" } else { "s" }
    );

    if args.once {
        let state = syncer.tick().await;
        ensure!(state == SyncState::Synced, error::NotSyncedSnafu { state });
        if let Some(version) = syncer.replica().version() {
            println!("{}", version);
        }
        return Ok(());
    }

    syncer.run().await;
    Ok(())
}

// Returning a Result from main makes it print a Debug representation of the error, but with Snafu
// we have nice Display representations of the error, so we wrap "main" (run) and print any error.
// https://github.com/shepmaster/snafu/issues/110
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}", e);
        process::exit(1);
    }
}

mod error {
    use snafu::Snafu;
    use syncdog::SyncState;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub(super) enum Error {
        #[snafu(display("Logger setup error: {}", source))]
        Logger { source: log::SetLoggerError },

        #[snafu(display("{}", source))]
        Sync { source: syncdog::Error },

        #[snafu(display("Poll finished {}", state))]
        NotSynced { state: SyncState },
    }
}
type Result<T> = std::result::Result<T, error::Error>;
