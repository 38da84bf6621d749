//! Multipart upload extraction shared by attachment and cover routes

use axum::extract::Multipart;

use crate::error::{AppError, Result};

/// Form field carrying the uploaded file
pub const FILE_FIELD: &str = "file";

/// A file received through a multipart form
#[derive(Debug)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Upload {
    pub fn size(&self) -> i64 {
        self.data.len() as i64
    }
}

/// Read the `file` field from a multipart body
pub async fn read_file_field(mut multipart: Multipart) -> Result<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            tracing::debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                mime_guess::from_path(&file_name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read file data: {}", e)))?
            .to_vec();

        tracing::debug!("Read {} bytes of '{}' ({})", data.len(), file_name, content_type);

        return Ok(Upload {
            file_name,
            content_type,
            data,
        });
    }

    Err(AppError::Validation(format!(
        "No file provided. Use field name '{}'",
        FILE_FIELD
    )))
}
