//! Features that own a version in the ledger.

use crate::error::{Error, ErrorKind};
use std::fmt;
use std::str::FromStr;

/// A subsystem of the media database whose tables are versioned
/// independently of the containing database.
///
/// The stored integer for each variant is fixed (see [`Feature::id`]).
/// Features defined outside this crate must use [`Feature::External`], whose
/// ids start at [`Feature::EXTERNAL`] so they can never collide with the
/// built-in ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    /// Tables used for offline functionality (downloads).
    Offline,
    /// Tables used for cache content metadata.
    CacheContentMetadata,
    /// Tables used for cache file metadata.
    CacheFileMetadata,
    /// Tables used by an external feature. The payload is an offset from
    /// [`Feature::EXTERNAL`].
    External(u32),
}

impl Feature {
    pub const OFFLINE: i64 = 0;
    pub const CACHE_CONTENT_METADATA: i64 = 1;
    pub const CACHE_FILE_METADATA: i64 = 2;
    /// First id reserved for features defined outside this crate.
    pub const EXTERNAL: i64 = 1000;

    /// The integer stored in the `feature` column.
    #[must_use]
    pub fn id(&self) -> i64 {
        match self {
            Self::Offline => Self::OFFLINE,
            Self::CacheContentMetadata => Self::CACHE_CONTENT_METADATA,
            Self::CacheFileMetadata => Self::CACHE_FILE_METADATA,
            Self::External(offset) => Self::EXTERNAL + i64::from(*offset),
        }
    }
}

impl TryFrom<i64> for Feature {
    type Error = Error;
    fn try_from(id: i64) -> Result<Self, Self::Error> {
        match id {
            Self::OFFLINE => Ok(Self::Offline),
            Self::CACHE_CONTENT_METADATA => Ok(Self::CacheContentMetadata),
            Self::CACHE_FILE_METADATA => Ok(Self::CacheFileMetadata),
            id if id >= Self::EXTERNAL => u32::try_from(id - Self::EXTERNAL)
                .map(Self::External)
                .map_err(|_| exn::Exn::from(ErrorKind::InvalidData("feature"))),
            _ => exn::bail!(ErrorKind::InvalidData("feature")),
        }
    }
}

impl FromStr for Feature {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "offline" => Ok(Self::Offline),
            "cache-content-metadata" => Ok(Self::CacheContentMetadata),
            "cache-file-metadata" => Ok(Self::CacheFileMetadata),
            "external" => Ok(Self::External(0)),
            other => match other.strip_prefix("external:") {
                Some(offset) => offset
                    .parse::<u32>()
                    .map(Self::External)
                    .map_err(|_| exn::Exn::from(ErrorKind::InvalidData("feature"))),
                None => other
                    .parse::<i64>()
                    .map_err(|_| exn::Exn::from(ErrorKind::InvalidData("feature")))
                    .and_then(Self::try_from),
            },
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => f.write_str("offline"),
            Self::CacheContentMetadata => f.write_str("cache-content-metadata"),
            Self::CacheFileMetadata => f.write_str("cache-file-metadata"),
            Self::External(0) => f.write_str("external"),
            Self::External(offset) => write!(f, "external:{offset}"),
        }
    }
}
