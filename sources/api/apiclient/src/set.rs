//! Helpers for changing configuration through the API.  The API only accepts complete trees, so
//! each helper fetches the current tree, changes it locally, and commits the result.

use crate::get;
use crate::ConfigServiceClient;
use apitypes::CommitResponse;
use cfgtree::ConfigNode;
use log::info;
use snafu::ResultExt;
use std::fs;
use std::path::Path;

/// Sets a single option, given as a path like `/Systems/Database/Port`.
pub async fn set_value<S1, S2>(
    client: &ConfigServiceClient,
    path: S1,
    value: S2,
) -> Result<CommitResponse>
where
    S1: AsRef<str>,
    S2: AsRef<str>,
{
    let (version, mut tree) = get::current_tree(client).await.context(error::GetSnafu)?;
    tree.set_value(path.as_ref(), value.as_ref())
        .context(error::EditSnafu)?;
    info!("Setting {} on top of version {}", path.as_ref(), version);
    commit_tree(client, &tree).await
}

/// Merges the CFG file at `path` onto the current tree and commits the result.
pub async fn merge_file<P>(client: &ConfigServiceClient, path: P) -> Result<CommitResponse>
where
    P: AsRef<Path>,
{
    let overlay = read_file(path)?;
    let (version, mut tree) = get::current_tree(client).await.context(error::GetSnafu)?;
    tree.merge_from(&overlay);
    info!("Merging onto version {}", version);
    commit_tree(client, &tree).await
}

/// Commits the CFG file at `path` as the complete new configuration.
pub async fn commit_file<P>(client: &ConfigServiceClient, path: P) -> Result<CommitResponse>
where
    P: AsRef<Path>,
{
    // Parse locally first so mistakes are reported with the file name.
    let tree = read_file(path)?;
    commit_tree(client, &tree).await
}

fn read_file<P: AsRef<Path>>(path: P) -> Result<ConfigNode> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).context(error::ReadFileSnafu { path })?;
    cfgtree::parse(text).context(error::ParseFileSnafu { path })
}

async fn commit_tree(client: &ConfigServiceClient, tree: &ConfigNode) -> Result<CommitResponse> {
    client
        .commit_new_data(cfgtree::serialize(tree))
        .await
        .context(error::RequestSnafu)
}

mod error {
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Failed to read '{}': {}", path.display(), source))]
        ReadFile {
            path: PathBuf,
            source: std::io::Error,
        },

        #[snafu(display("Unable to parse '{}': {}", path.display(), source))]
        ParseFile {
            path: PathBuf,
            source: cfgtree::Error,
        },

        #[snafu(display("{}", source))]
        Get {
            #[snafu(source(from(crate::get::Error, Box::new)))]
            source: Box<crate::get::Error>,
        },

        #[snafu(display("Unable to change configuration: {}", source))]
        Edit { source: cfgtree::Error },

        #[snafu(display("{}", source))]
        Request {
            #[snafu(source(from(crate::Error, Box::new)))]
            source: Box<crate::Error>,
        },
    }
}
pub use error::Error;
pub type Result<T> = std::result::Result<T, error::Error>;
