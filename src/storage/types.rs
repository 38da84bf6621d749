//! Storage types

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata about a storage object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: i64,
    pub content_type: Option<String>,
}

/// A storage object with its data
#[derive(Debug)]
pub struct StorageObject {
    pub metadata: ObjectMetadata,
    pub data: Vec<u8>,
}

/// Result of storing an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredBlob {
    pub key: String,
    pub url: String,
}

/// Key for a block attachment: `blocks/YYYY/MM/DD/<uuid>-<name>`
pub fn block_file_key(file_name: &str) -> String {
    let today = Utc::now();
    format!(
        "blocks/{:04}/{:02}/{:02}/{}-{}",
        today.year(),
        today.month(),
        today.day(),
        Uuid::new_v4(),
        sanitize_file_name(file_name)
    )
}

/// Key for a page cover: `covers/<uuid>-<name>`
pub fn cover_key(file_name: &str) -> String {
    format!("covers/{}-{}", Uuid::new_v4(), sanitize_file_name(file_name))
}

/// Keep only the final path component and characters safe in URLs and paths
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
