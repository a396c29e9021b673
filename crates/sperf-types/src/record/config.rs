use crate::{FileId, NodeId};
use serde::{Deserialize, Serialize};

/// One key/value pair from a configuration dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub node: NodeId,
    pub file: FileId,
    /// Flattened key (`client_encryption_options.enabled`, `-Xmx`)
    pub key: String,
    pub value: String,
    pub line: u64,
}
