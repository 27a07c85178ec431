use crate::Feature;
use crate::error::{Error, ErrorKind};
use exn::ResultExt;

/// Sentinel returned by [`VersionLedger::get_version`](crate::VersionLedger::get_version)
/// when no version is recorded.
pub const VERSION_UNSET: i32 = -1;

/// Composite key of the ledger: one version per feature instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionKey {
    pub feature: Feature,
    /// Distinguishes independent instances of the same feature (for
    /// example, two cache directories).
    pub instance_uid: String,
}
impl VersionKey {
    pub fn new(feature: Feature, instance_uid: impl Into<String>) -> Self {
        Self { feature, instance_uid: instance_uid.into() }
    }
}

/// A single row of the version table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionRecord {
    pub key: VersionKey,
    pub version: i32,
}
impl VersionRecord {
    pub fn new(feature: Feature, instance_uid: impl Into<String>, version: i32) -> Self {
        Self { key: VersionKey::new(feature, instance_uid), version }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct VersionRow {
    pub(crate) feature: i64,
    pub(crate) instance_uid: String,
    pub(crate) version: i64,
}
impl From<&VersionRecord> for VersionRow {
    fn from(record: &VersionRecord) -> Self {
        Self {
            feature: record.key.feature.id(),
            instance_uid: record.key.instance_uid.clone(),
            version: i64::from(record.version),
        }
    }
}
impl TryFrom<VersionRow> for VersionRecord {
    type Error = Error;
    fn try_from(row: VersionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            key: VersionKey { feature: Feature::try_from(row.feature)?, instance_uid: row.instance_uid },
            version: i32::try_from(row.version).or_raise(|| ErrorKind::InvalidData("version"))?,
        })
    }
}
