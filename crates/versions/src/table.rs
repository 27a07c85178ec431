//! Naming of the version table.

use crate::error::{ErrorKind, Result};

/// Prefix shared by every table the media database owns.
pub const DEFAULT_TABLE_PREFIX: &str = "ExoPlayer";

/// The version table of one database.
///
/// The name is `{prefix}Versions`. It ends up interpolated into SQL (table
/// names cannot be bound as parameters), so the prefix must be a plain
/// identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionTable {
    name: String,
}

impl VersionTable {
    pub fn with_prefix(prefix: impl AsRef<str>) -> Result<Self> {
        let prefix = prefix.as_ref();
        if !is_identifier(prefix) {
            exn::bail!(ErrorKind::InvalidData("table prefix"));
        }
        Ok(Self { name: format!("{prefix}Versions") })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for VersionTable {
    fn default() -> Self {
        Self { name: format!("{DEFAULT_TABLE_PREFIX}Versions") }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
