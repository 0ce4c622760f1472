//! Shared helpers for artifacts on disk.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Streaming SHA-256 of a file. Returns `(hex digest, size in bytes)`.
pub fn file_checksum(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok((hex::encode(hasher.finalize()), size))
}

/// Format a byte count for display.
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.1} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.1} MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1} KB", bytes as f64 / 1_000.0)
    } else {
        format!("{} B", bytes)
    }
}

/// Format seconds as `1h02m03s`, `2m05s` or `4.2s`.
pub fn format_seconds(seconds: f64) -> String {
    let whole = seconds as u64;
    if whole >= 3600 {
        format!("{}h{:02}m{:02}s", whole / 3600, (whole % 3600) / 60, whole % 60)
    } else if whole >= 60 {
        format!("{}m{:02}s", whole / 60, whole % 60)
    } else {
        format!("{:.1}s", seconds)
    }
}
