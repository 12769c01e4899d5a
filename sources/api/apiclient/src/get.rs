//! Helpers for reading configuration through the API.

use crate::ConfigServiceClient;
use apitypes::Version;
use cfgtree::{Change, ConfigNode};
use snafu::{ensure, ResultExt};

/// Fetches the server's current snapshot and returns its version and CFG text.
pub async fn dump(client: &ConfigServiceClient) -> Result<(Version, String)> {
    let snapshot = client
        .get_compressed_data()
        .await
        .context(error::RequestSnafu)?;
    let text = datastore::compression::expand_maybe(&snapshot.data).context(error::ExpandSnafu)?;
    Ok((snapshot.version, text))
}

/// Fetches the server's current tree.
pub async fn current_tree(client: &ConfigServiceClient) -> Result<(Version, ConfigNode)> {
    let (version, text) = dump(client).await?;
    let tree = cfgtree::parse(text).context(error::ParseSnafu {
        version: version.as_str(),
    })?;
    Ok((version, tree))
}

/// Compares two historical versions, returning what changed from `old` to `new`.
pub async fn diff_versions(
    client: &ConfigServiceClient,
    old: &Version,
    new: &Version,
) -> Result<Vec<Change>> {
    let contents = client
        .get_version_contents(&[old.clone(), new.clone()])
        .await
        .context(error::RequestSnafu)?;
    ensure!(
        contents.len() == 2,
        error::ContentCountSnafu {
            expected: 2usize,
            got: contents.len()
        }
    );

    let mut trees = Vec::with_capacity(2);
    for entry in contents {
        let tree = cfgtree::parse(&entry.content).context(error::ParseSnafu {
            version: entry.version.as_str(),
        })?;
        trees.push(tree);
    }
    Ok(cfgtree::diff(&trees[0], &trees[1]))
}

mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("{}", source))]
        Request {
            #[snafu(source(from(crate::Error, Box::new)))]
            source: Box<crate::Error>,
        },

        #[snafu(display("Unable to read snapshot from server: {}", source))]
        Expand { source: datastore::Error },

        #[snafu(display("Server returned unparseable content for {}: {}", version, source))]
        Parse {
            version: String,
            source: cfgtree::Error,
        },

        #[snafu(display("Server returned {} contents, expected {}", got, expected))]
        ContentCount { expected: usize, got: usize },
    }
}
pub use error::Error;
pub type Result<T> = std::result::Result<T, error::Error>;
