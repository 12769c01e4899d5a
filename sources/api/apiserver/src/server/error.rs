use snafu::Snafu;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

// We want server (router/handler) and service errors together so it's easy to define response
// error codes for all the high-level types of errors that could happen during a request.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum Error {
    // Set-up errors
    #[snafu(display("Unable to bind to {}: {}", addr, source))]
    BindAddress { addr: SocketAddr, source: io::Error },

    #[snafu(display("Unable to start server: {}", source))]
    ServerStart { source: io::Error },

    #[snafu(display("Unable to open data store at {}: {}", path.display(), source))]
    OpenStore {
        path: PathBuf,
        source: datastore::Error,
    },

    #[snafu(display("Unable to read seed configuration {}: {}", path.display(), source))]
    SeedRead { path: PathBuf, source: io::Error },

    #[snafu(display("Unable to commit seed configuration {}: {}", path.display(), source))]
    Seed {
        path: PathBuf,
        source: datastore::Error,
    },

    // Request errors
    #[snafu(display("Missing required input '{}'", input))]
    MissingInput { input: String },

    #[snafu(display("Input '{}' cannot be empty", input))]
    EmptyInput { input: String },

    #[snafu(display("Invalid {} '{}': {}", input, given, source))]
    InvalidNumber {
        input: String,
        given: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("Invalid version: {}", source))]
    InvalidVersion { source: datastore::Error },

    #[snafu(display("Invalid slave URL '{}': {}", url, source))]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    // Authorization errors
    #[snafu(display("This server is a read-only replica and doesn't accept writes"))]
    WriteDisabled,

    #[snafu(display("Writes require an authenticated identity"))]
    MissingIdentity,

    #[snafu(display("'{}' is not allowed to write configuration", identity))]
    Unauthorized { identity: String },

    #[snafu(display("This replica hasn't synced with a master yet"))]
    NotSynced,

    // Store errors
    #[snafu(display("{}", source))]
    DataStore { source: datastore::Error },

    #[snafu(display("Slave registry lock poisoned"))]
    RegistryLock,

    #[snafu(display("Unable to serialize response: {}", source))]
    ResponseSerialization { source: serde_json::Error },
}

pub type Result<T> = std::result::Result<T, Error>;
