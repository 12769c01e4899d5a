//! Version tokens identify committed states of the configuration.
//!
//! A version is a fixed-width decimal microsecond stamp followed by a short digest of the
//! committed content, e.g. `00001760870400000000.3f9a0c1b2d4e`.  The fixed width means string
//! order and commit order agree, so comparing tokens needs no parsing.  Callers should stick to
//! `is_newer` and equality rather than picking the token apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::ensure;
use std::fmt;
use std::str::FromStr;

use super::{error, Error, Result};

const STAMP_WIDTH: usize = 20;
const DIGEST_WIDTH: usize = 12;
const SEPARATOR: char = '.';

/// An opaque, ordered token naming one committed state of the configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// The version of a store that has never been committed to.
    pub fn initial() -> Self {
        Self::from_parts(0, "")
    }

    /// Stamps `content` committed at `now`.  The result always compares newer than `previous`,
    /// even if the clock hasn't moved (or moved backward) since it was stamped.
    pub fn next(previous: &Version, content: &str, now: DateTime<Utc>) -> Self {
        let micros = u64::try_from(now.timestamp_micros()).unwrap_or(0);
        let stamp = match previous.stamp() {
            Some(last) if micros <= last => last + 1,
            _ => micros,
        };
        Self::from_parts(stamp, content)
    }

    fn from_parts(stamp: u64, content: &str) -> Self {
        let digest = hex::encode(Sha256::digest(content.as_bytes()));
        Version(format!(
            "{:0width$}{}{}",
            stamp,
            SEPARATOR,
            &digest[..DIGEST_WIDTH],
            width = STAMP_WIDTH
        ))
    }

    fn stamp(&self) -> Option<u64> {
        self.0
            .split_once(SEPARATOR)
            .and_then(|(stamp, _)| stamp.parse().ok())
    }

    /// Returns whether this version was committed after `other`.
    pub fn is_newer(&self, other: &Version) -> bool {
        self > other
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let invalid = |msg: &str| error::InvalidVersionSnafu {
            given: input,
            msg: msg.to_string(),
        };

        let (stamp, digest) = input.split_once(SEPARATOR).ok_or_else(|| {
            invalid(&format!("missing '{}' separator", SEPARATOR)).build()
        })?;
        ensure!(
            stamp.len() == STAMP_WIDTH && stamp.bytes().all(|b| b.is_ascii_digit()),
            invalid(&format!("stamp must be {} decimal digits", STAMP_WIDTH))
        );
        ensure!(
            digest.len() == DIGEST_WIDTH
                && digest
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)),
            invalid(&format!("digest must be {} lowercase hex digits", DIGEST_WIDTH))
        );

        Ok(Version(input.to_string()))
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(input: String) -> Result<Self> {
        input.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn at(micros: i64) -> DateTime<Utc> {
        Utc.timestamp_micros(micros).unwrap()
    }

    #[test]
    fn initial_is_stable() {
        assert_eq!(Version::initial(), Version::initial());
        assert!(Version::initial()
            .as_str()
            .starts_with("00000000000000000000."));
        assert!(Version::initial().as_str().parse::<Version>().is_ok());
    }

    #[test]
    fn next_is_newer() {
        let first = Version::next(&Version::initial(), "A = 1", at(1_700_000_000_000_000));
        assert!(first.is_newer(&Version::initial()));
        assert!(first.as_str().starts_with("00001700000000000000."));

        let second = Version::next(&first, "A = 2", at(1_700_000_000_000_500));
        assert!(second.is_newer(&first));
        assert!(!first.is_newer(&second));
        assert!(!first.is_newer(&first));
    }

    #[test]
    fn stalled_clock_still_advances() {
        let now = at(1_700_000_000_000_000);
        let first = Version::next(&Version::initial(), "A = 1", now);
        let same_time = Version::next(&first, "A = 1", now);
        let backward = Version::next(&same_time, "A = 1", at(5));
        assert!(same_time.is_newer(&first));
        assert!(backward.is_newer(&same_time));
    }

    #[test]
    fn digest_depends_on_content() {
        let now = at(42);
        let a = Version::next(&Version::initial(), "A = 1", now);
        let b = Version::next(&Version::initial(), "A = 2", now);
        assert_ne!(a, b);
    }

    #[test]
    fn parse() {
        assert!("00000000000000000042.0123456789ab".parse::<Version>().is_ok());
        for bad in &[
            "",
            "42.0123456789ab",
            "00000000000000000042",
            "00000000000000000042.0123456789AB",
            "00000000000000000042.0123",
            "0000000000000000004x.0123456789ab",
            "../../../etc/passwd",
        ] {
            assert!(bad.parse::<Version>().is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn serde_checks_format() {
        let version: Version = serde_json::from_str("\"00000000000000000042.0123456789ab\"").unwrap();
        assert_eq!(
            serde_json::to_string(&version).unwrap(),
            "\"00000000000000000042.0123456789ab\""
        );
        assert!(serde_json::from_str::<Version>("\"nope\"").is_err());
    }
}
