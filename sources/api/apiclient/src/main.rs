//! Command-line administration of a configuration server.  Each subcommand maps to one API
//! operation, or to one of the helpers in the `get` and `set` modules.

use apiclient::{get, set, ConfigServiceClient};
use apitypes::Version;
use argh::FromArgs;
use log::debug;
use simplelog::{Config as LogConfig, LevelFilter, SimpleLogger};
use snafu::ResultExt;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// Administer a configuration server.
#[derive(Debug, FromArgs)]
struct Args {
    /// base URL of the server
    #[argh(option, short = 's', default = "constants::API_URL.to_string()")]
    server: String,

    /// identity to act as; the authenticating transport normally provides this
    #[argh(option, short = 'i')]
    identity: Option<String>,

    /// seconds to wait for each request
    #[argh(option, default = "constants::REQUEST_TIMEOUT_SECS")]
    timeout_secs: u64,

    /// log level (off, error, warn, info, debug, trace)
    #[argh(option, default = "LevelFilter::Warn")]
    log_level: LevelFilter,

    #[argh(subcommand)]
    command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Version(VersionArgs),
    Dump(DumpArgs),
    WriteEnabled(WriteEnabledArgs),
    Commit(CommitArgs),
    Merge(MergeArgs),
    Set(SetArgs),
    History(HistoryArgs),
    Contents(ContentsArgs),
    Diff(DiffArgs),
    Rollback(RollbackArgs),
    Slaves(SlavesArgs),
}

/// Print the current version
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionArgs {}

/// Print the current configuration
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "dump")]
struct DumpArgs {}

/// Print whether the server accepts commits
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "write-enabled")]
struct WriteEnabledArgs {}

/// Replace the configuration with the contents of a file
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "commit")]
struct CommitArgs {
    /// CFG file to commit
    #[argh(positional)]
    file: PathBuf,
}

/// Merge a file onto the current configuration and commit the result
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "merge")]
struct MergeArgs {
    /// CFG file to merge
    #[argh(positional)]
    file: PathBuf,
}

/// Set one option and commit the result
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "set")]
struct SetArgs {
    /// option path, e.g. /Systems/Database/Port
    #[argh(positional)]
    path: String,

    /// new value
    #[argh(positional)]
    value: String,
}

/// List recent commits, newest first
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "history")]
struct HistoryArgs {
    /// how many entries to list (the server allows at most 100)
    #[argh(option, short = 'n', default = "10")]
    limit: usize,
}

/// Print the content of historical versions
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "contents")]
struct ContentsArgs {
    /// versions to print
    #[argh(positional)]
    versions: Vec<String>,
}

/// Show what changed between two versions
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "diff")]
struct DiffArgs {
    /// older version
    #[argh(positional)]
    old: String,

    /// newer version
    #[argh(positional)]
    new: String,
}

/// Make an earlier version current again, as a new commit
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "rollback")]
struct RollbackArgs {
    /// version to roll back to
    #[argh(positional)]
    version: String,
}

/// List slaves that have registered with the server
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "slaves")]
struct SlavesArgs {}

fn parse_version(input: &str) -> Result<Version> {
    input.parse().context(error::VersionSnafu { given: input })
}

async fn run() -> Result<()> {
    let args: Args = argh::from_env();

    // SimpleLogger will send errors to stderr and anything less to stdout.
    SimpleLogger::init(args.log_level, LogConfig::default()).context(error::LoggerSnafu)?;

    let mut client = ConfigServiceClient::new(&args.server, Duration::from_secs(args.timeout_secs))
        .context(error::ClientSnafu)?;
    if let Some(identity) = args.identity {
        client = client.with_identity(identity);
    }
    debug!("Talking to {}", client.base_url());

    match args.command {
        Command::Version(_) => {
            let version = client.get_version().await.context(error::ClientSnafu)?;
            println!("{}", version);
        }

        Command::Dump(_) => {
            let (version, text) = get::dump(&client).await.context(error::GetSnafu)?;
            println!("# version {}", version);
            print!("{}", text);
        }

        Command::WriteEnabled(_) => {
            let enabled = client.write_enabled().await.context(error::ClientSnafu)?;
            println!("{}", enabled);
        }

        Command::Commit(cmd) => {
            let response = set::commit_file(&client, &cmd.file)
                .await
                .context(error::SetSnafu)?;
            println!("{} ({})", response.version, response.summary);
        }

        Command::Merge(cmd) => {
            let response = set::merge_file(&client, &cmd.file)
                .await
                .context(error::SetSnafu)?;
            println!("{} ({})", response.version, response.summary);
        }

        Command::Set(cmd) => {
            let response = set::set_value(&client, &cmd.path, &cmd.value)
                .await
                .context(error::SetSnafu)?;
            println!("{} ({})", response.version, response.summary);
        }

        Command::History(cmd) => {
            let entries = client
                .get_commit_history(cmd.limit)
                .await
                .context(error::ClientSnafu)?;
            for entry in entries {
                println!(
                    "{}  {}  {}",
                    entry.version,
                    entry.timestamp.to_rfc3339(),
                    entry.author
                );
            }
        }

        Command::Contents(cmd) => {
            let versions = cmd
                .versions
                .iter()
                .map(|v| parse_version(v))
                .collect::<Result<Vec<_>>>()?;
            let contents = client
                .get_version_contents(&versions)
                .await
                .context(error::ClientSnafu)?;
            for entry in contents {
                println!("# version {}", entry.version);
                print!("{}", entry.content);
            }
        }

        Command::Diff(cmd) => {
            let old = parse_version(&cmd.old)?;
            let new = parse_version(&cmd.new)?;
            let changes = get::diff_versions(&client, &old, &new)
                .await
                .context(error::GetSnafu)?;
            for change in &changes {
                println!("{}", change);
            }
            println!("{}", datastore::summarize(&changes));
        }

        Command::Rollback(cmd) => {
            let version = parse_version(&cmd.version)?;
            let response = client
                .rollback_to_version(&version)
                .await
                .context(error::ClientSnafu)?;
            println!("{} ({})", response.version, response.summary);
        }

        Command::Slaves(_) => {
            let slaves = client.list_slaves().await.context(error::ClientSnafu)?;
            for slave in slaves {
                let version = slave
                    .version
                    .as_ref()
                    .map(Version::as_str)
                    .unwrap_or("-");
                println!(
                    "{}  {}  {}",
                    slave.url,
                    slave.last_seen.to_rfc3339(),
                    version
                );
            }
        }
    }
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

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub(super) enum Error {
        #[snafu(display("Logger setup error: {}", source))]
        Logger { source: log::SetLoggerError },

        #[snafu(display("'{}' is not a version: {}", given, source))]
        Version {
            given: String,
            source: datastore::Error,
        },

        #[snafu(display("{}", source))]
        Client { source: apiclient::Error },

        #[snafu(display("{}", source))]
        Get { source: apiclient::get::Error },

        #[snafu(display("{}", source))]
        Set { source: apiclient::set::Error },
    }
}
type Result<T> = std::result::Result<T, error::Error>;
