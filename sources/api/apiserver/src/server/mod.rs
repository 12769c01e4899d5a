//! The server module owns the API surface.  It interfaces with the configuration through the
//! server::service module.

mod error;
mod registry;
mod service;
pub use error::Error;
pub use registry::SlaveRegistry;
pub use service::{ConfigurationService, Master, Replica, BOOTSTRAP_AUTHOR};

use actix_web::body::BoxBody;
use actix_web::{
    error::{InternalError, ResponseError},
    web, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use apiclient::ConfigServiceClient;
use apitypes::{
    CommitResponse, HistoryEntry, IfNewerResponse, PublishRequest, SlaveHandle, SnapshotResponse,
    Version, VersionContent, VersionResponse, WriteEnabledResponse,
};
use datastore::MAX_HISTORY_RESPONSE;
use error::Result;
use log::{debug, info, warn};
use snafu::{OptionExt, ResultExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Largest CFG document accepted by a commit.
const MAX_COMMIT_BYTES: usize = 16 * 1024 * 1024;

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

// Router

/// This is the primary interface of the module.  It defines the server and application that actix
/// spawns for requests.  Every handler reaches the configuration through the shared `service`.
pub async fn serve(
    service: Arc<dyn ConfigurationService>,
    listen: SocketAddr,
    threads: usize,
) -> Result<()> {
    let service = web::Data::from(service);

    let http_server = HttpServer::new(move || {
        App::new()
            // This makes the service available to API methods merely by having a Data parameter.
            .app_data(service.clone())
            .configure(routes)
    })
    .workers(threads)
    .bind(listen)
    .context(error::BindAddressSnafu { addr: listen })?;

    info!("Listening on {}", listen);
    http_server.run().await.context(error::ServerStartSnafu)
}

/// Registers the API's routes and request limits.
pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg
        // In our implementation of ResponseError on our own error type below, we include the
        // error message in the response for debugging purposes.  If actix rejects a request
        // early because it doesn't fit our model, though, it doesn't even get to the
        // ResponseError implementation.  This configuration of the Json extractor allows us to
        // add the error message into the response.
        .app_data(web::JsonConfig::default().error_handler(|err, _req| {
            let body = err.to_string();
            InternalError::from_response(err, HttpResponse::BadRequest().body(body)).into()
        }))
        .app_data(web::PayloadConfig::new(MAX_COMMIT_BYTES))
        .route(constants::API_VERSION_URI, web::get().to(get_version))
        .route(constants::API_DATA_URI, web::get().to(get_compressed_data))
        .route(
            constants::API_DATA_IF_NEWER_URI,
            web::get().to(get_compressed_data_if_newer),
        )
        .route(constants::API_SLAVES_URI, web::get().to(list_slaves))
        .route(constants::API_SLAVES_URI, web::post().to(publish_slave_server))
        .route(constants::API_COMMIT_URI, web::post().to(commit_new_data))
        .route(constants::API_WRITE_ENABLED_URI, web::get().to(write_enabled))
        .route(constants::API_HISTORY_URI, web::get().to(get_commit_history))
        .route(
            constants::API_HISTORY_CONTENTS_URI,
            web::get().to(get_version_contents),
        )
        .route(constants::API_ROLLBACK_URI, web::post().to(rollback_to_version))
        .route(constants::API_REFRESH_URI, web::post().to(refresh));
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

// Handler methods called by the router

type Service = web::Data<dyn ConfigurationService>;

async fn get_version(data: Service) -> Result<VersionBody> {
    Ok(VersionBody(VersionResponse {
        version: data.get_version(),
    }))
}

async fn get_compressed_data(data: Service) -> Result<SnapshotBody> {
    Ok(SnapshotBody(data.get_compressed_data()))
}

/// Returns the current snapshot only if it's newer than the 'version' query parameter.  A slave
/// that has never synced has no version to send, so a missing or empty version is accepted and
/// counts as older than everything.
async fn get_compressed_data_if_newer(
    query: web::Query<HashMap<String, String>>,
    data: Service,
) -> Result<IfNewerBody> {
    let client_version = query.get("version").map(String::as_str).unwrap_or("");
    Ok(IfNewerBody(data.get_compressed_data_if_newer(client_version)?))
}

/// Registers the slave described in the request body.
async fn publish_slave_server(
    request: web::Json<PublishRequest>,
    data: Service,
) -> Result<HttpResponse> {
    data.publish_slave_server(request.into_inner())?;
    Ok(HttpResponse::NoContent().finish())
}

async fn list_slaves(data: Service) -> Result<SlavesBody> {
    Ok(SlavesBody(data.list_slaves()?))
}

/// Replaces the configuration with the CFG text in the request body.
async fn commit_new_data(req: HttpRequest, body: String, data: Service) -> Result<CommitBody> {
    let response = data.commit_new_data(&body, identity(&req))?;
    nudge_slaves(data.get_ref());
    Ok(CommitBody(response))
}

async fn write_enabled(data: Service) -> Result<WriteEnabledBody> {
    Ok(WriteEnabledBody(WriteEnabledResponse {
        write_enabled: data.write_enabled(),
    }))
}

/// Returns recent history, newest first; 'limit' defaults to, and is capped at, the most the
/// server will ever return.
async fn get_commit_history(
    query: web::Query<HashMap<String, String>>,
    data: Service,
) -> Result<HistoryBody> {
    let limit = match query.get("limit") {
        Some(limit_str) => limit_str
            .parse::<usize>()
            .context(error::InvalidNumberSnafu {
                input: "limit",
                given: limit_str,
            })?,
        None => MAX_HISTORY_RESPONSE,
    };
    Ok(HistoryBody(data.get_commit_history(limit)?))
}

/// Returns the content of each version in the comma-separated 'versions' query parameter.
async fn get_version_contents(
    query: web::Query<HashMap<String, String>>,
    data: Service,
) -> Result<ContentsBody> {
    let versions_str = query.get("versions").context(error::MissingInputSnafu {
        input: "versions",
    })?;
    let versions = comma_separated("versions", versions_str)?
        .into_iter()
        .map(parse_version)
        .collect::<Result<Vec<_>>>()?;
    Ok(ContentsBody(data.get_version_contents(&versions)?))
}

/// Makes the version in the 'version' query parameter current again.
async fn rollback_to_version(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
    data: Service,
) -> Result<CommitBody> {
    let version_str = query.get("version").context(error::MissingInputSnafu {
        input: "version",
    })?;
    let version = parse_version(version_str)?;
    let response = data.rollback_to_version(&version, identity(&req))?;
    nudge_slaves(data.get_ref());
    Ok(CommitBody(response))
}

async fn refresh(data: Service) -> HttpResponse {
    data.refresh();
    HttpResponse::NoContent().finish()
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

// Helpers for handler methods called by the router

/// The caller's identity, as passed on by the authenticating transport.
fn identity(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(constants::IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
}

fn comma_separated<'a>(key_name: &'static str, input: &'a str) -> Result<Vec<&'a str>> {
    if input.is_empty() {
        return error::EmptyInputSnafu { input: key_name }.fail();
    }
    Ok(input.split(',').collect())
}

fn parse_version(input: &str) -> Result<Version> {
    input.parse().context(error::InvalidVersionSnafu)
}

/// Tells live slaves to poll now rather than at their next tick.  This runs in the background
/// and failures are only logged; slaves catch up on their own schedule regardless.
fn nudge_slaves(service: &dyn ConfigurationService) {
    let urls = service.notify_targets();
    if urls.is_empty() {
        return;
    }
    actix_web::rt::spawn(async move {
        let timeout = Duration::from_secs(constants::REQUEST_TIMEOUT_SECS);
        for url in urls {
            let result = match ConfigServiceClient::new(&url, timeout) {
                Ok(client) => client.refresh().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => debug!("Nudged slave {}", url),
                Err(e) => warn!("Unable to nudge slave {}: {}", url, e),
            }
        }
    });
}

// Can also override `status_code` if we need to set the code without the error_response builder.
impl ResponseError for error::Error {
    /// Maps our error types to the HTTP error code they should return.
    fn error_response(&self) -> HttpResponse {
        use error::Error::*;
        match self {
            // 400 Bad Request
            MissingInput { .. } => HttpResponse::BadRequest(),
            EmptyInput { .. } => HttpResponse::BadRequest(),
            InvalidNumber { .. } => HttpResponse::BadRequest(),
            InvalidVersion { .. } => HttpResponse::BadRequest(),
            InvalidUrl { .. } => HttpResponse::BadRequest(),

            // 403 Forbidden
            WriteDisabled => HttpResponse::Forbidden(),
            MissingIdentity => HttpResponse::Forbidden(),
            Unauthorized { .. } => HttpResponse::Forbidden(),

            // Store errors depend on what went wrong underneath
            DataStore { source } => match source {
                datastore::Error::InvalidContent { .. } => HttpResponse::BadRequest(),
                datastore::Error::InvalidVersion { .. } => HttpResponse::BadRequest(),
                datastore::Error::VersionNotFound { .. } => HttpResponse::NotFound(),
                datastore::Error::CommitConflict { .. } => HttpResponse::Conflict(),
                _ => HttpResponse::InternalServerError(),
            },

            // 503 Service Unavailable
            NotSynced => HttpResponse::ServiceUnavailable(),

            // 500 Internal Server Error
            RegistryLock => HttpResponse::InternalServerError(),
            ResponseSerialization { .. } => HttpResponse::InternalServerError(),
            BindAddress { .. } => HttpResponse::InternalServerError(),
            ServerStart { .. } => HttpResponse::InternalServerError(),
            OpenStore { .. } => HttpResponse::InternalServerError(),
            SeedRead { .. } => HttpResponse::InternalServerError(),
            Seed { .. } => HttpResponse::InternalServerError(),
        }
        // Include the error message in the response, and for all error types.  Admin tools print
        // it as-is so the caller sees exactly why a commit was refused.
        .body(self.to_string())
    }
}

/// Helper macro for implementing the actix-web Responder trait for a type.
/// $for: the type for which we implement Responder.
/// $self: just pass "self"  (macro hygiene requires this)
/// $serialize_expr: the thing to serialize for a response; this is just "self" again if $for
///    implements Serialize, or is "self.0" for a newtype over something implementing Serialize
macro_rules! impl_responder_for {
    ($for:ident, $self:ident, $serialize_expr:expr) => (
        impl Responder for $for {
            type Body = BoxBody;

            fn respond_to($self, _req: &HttpRequest) -> HttpResponse {
                match serde_json::to_string(&$serialize_expr)
                    .context(error::ResponseSerializationSnafu)
                {
                    Ok(body) => HttpResponse::Ok()
                        .content_type("application/json")
                        .body(body),
                    Err(e) => e.error_response(),
                }
            }
        }
    )
}

/// This lets us respond from our handler methods with a VersionResponse (or Result<VersionResponse>)
struct VersionBody(VersionResponse);
impl_responder_for!(VersionBody, self, self.0);

/// This lets us respond from our handler methods with a SnapshotResponse (or Result<SnapshotResponse>)
struct SnapshotBody(SnapshotResponse);
impl_responder_for!(SnapshotBody, self, self.0);

/// This lets us respond from our handler methods with an IfNewerResponse (or Result<IfNewerResponse>)
struct IfNewerBody(IfNewerResponse);
impl_responder_for!(IfNewerBody, self, self.0);

/// This lets us respond from our handler methods with a list of slaves
struct SlavesBody(Vec<SlaveHandle>);
impl_responder_for!(SlavesBody, self, self.0);

/// This lets us respond from our handler methods with a CommitResponse (or Result<CommitResponse>)
struct CommitBody(CommitResponse);
impl_responder_for!(CommitBody, self, self.0);

struct WriteEnabledBody(WriteEnabledResponse);
impl_responder_for!(WriteEnabledBody, self, self.0);

/// This lets us respond from our handler methods with a list of history entries
struct HistoryBody(Vec<HistoryEntry>);
impl_responder_for!(HistoryBody, self, self.0);

/// This lets us respond from our handler methods with a list of version contents
struct ContentsBody(Vec<VersionContent>);
impl_responder_for!(ContentsBody, self, self.0);
