use sha2::{Digest, Sha256};

/// Compute a short, stable bundle identifier from its node ids and file paths.
///
/// Only names are hashed (not contents), so the id identifies the layout of a
/// bundle rather than its bytes.
pub fn bundle_hash<'a>(
    nodes: impl IntoIterator<Item = &'a str>,
    files: impl IntoIterator<Item = String>,
) -> String {
    let mut hasher = Sha256::new();
    for node in nodes {
        hasher.update(b"node:");
        hasher.update(node.as_bytes());
        hasher.update(b"\n");
    }
    for file in files {
        hasher.update(b"file:");
        hasher.update(file.as_bytes());
        hasher.update(b"\n");
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Truncate a string to a maximum length
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>() + "...(truncated)"
    }
}
