use axum::extract::Multipart;
use bytes::Bytes;
use uuid::Uuid;

use crate::errors::AppError;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const FILE_FIELD: &str = "file";

#[derive(Debug)]
pub struct ImageUpload {
    pub body: Bytes,
    pub content_type: String,
    pub extension: &'static str,
}

/// Reads the `file` field of a multipart form and checks it is a supported image.
pub async fn read_image(mut multipart: Multipart) -> Result<ImageUpload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        let body = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
        return validate_image(body, content_type);
    }
    Err(AppError::Validation(format!(
        "Multipart field '{FILE_FIELD}' is required"
    )))
}

fn validate_image(body: Bytes, content_type: String) -> Result<ImageUpload, AppError> {
    let extension = match content_type.as_str() {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        other => {
            return Err(AppError::Validation(format!(
                "Unsupported image type '{other}'"
            )))
        }
    };
    if body.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    if body.len() > MAX_IMAGE_BYTES {
        return Err(AppError::Validation(format!(
            "Image exceeds {} MiB",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(ImageUpload {
        body,
        content_type,
        extension,
    })
}

pub fn avatar_path(user_id: Uuid, extension: &str) -> String {
    format!("avatars/{user_id}/{}.{extension}", Uuid::new_v4())
}

pub fn listing_media_path(owner_id: Uuid, listing_id: Uuid, extension: &str) -> String {
    format!("listings/{owner_id}/{listing_id}/{}.{extension}", Uuid::new_v4())
}
