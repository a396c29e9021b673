use serde::{Deserialize, Serialize};
use std::fmt;

/// Node identifier, taken from the node's directory name in the bundle
/// (usually the node's listen address)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new NodeId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Index of an artifact file in the bundle's file table.
///
/// Assigned after sorting files by (node, relative path), so the same bundle
/// always produces the same ids regardless of filesystem enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u32);

impl FileId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Stable identifier of a parsed record: the file it came from and its
/// position in that file's parse order.
///
/// Timelines, rules and findings carry these instead of record copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    pub file: FileId,
    pub seq: u32,
}

impl RecordId {
    pub fn new(file: FileId, seq: u32) -> Self {
        Self { file, seq }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.file, self.seq)
    }
}

impl std::str::FromStr for RecordId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::Error::InvalidValue(format!("record id '{}'", s));
        let (file, seq) = s.split_once('#').ok_or_else(invalid)?;
        let file = file
            .strip_prefix('f')
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let seq = seq.parse::<u32>().map_err(|_| invalid())?;
        Ok(Self::new(FileId(file), seq))
    }
}

// Record ids serialize as their display form ("f3#17") so reports stay
// readable and stable for downstream tooling.
impl Serialize for RecordId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
