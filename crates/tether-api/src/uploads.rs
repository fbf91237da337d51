//! Multipart form collection and image validation shared by the photo,
//! group and message upload routes.

use std::collections::HashMap;

use axum::http::StatusCode;
use axum_extra::extract::Multipart;
use axum_extra::extract::multipart::MultipartError;
use image::ImageFormat;

use crate::error::ApiError;

/// Profile and group photos.
pub const MAX_PHOTO_SIZE: usize = 10 * 1024 * 1024;
/// Message attachments.
pub const MAX_ATTACHMENT_SIZE: usize = 32 * 1024 * 1024;

/// Declared types a message attachment may carry.
const ATTACHMENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif"];

#[derive(Debug)]
pub struct FilePart {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A fully read multipart body: text fields and file fields by name.
#[derive(Debug, Default)]
pub struct Form {
    texts: HashMap<String, String>,
    files: HashMap<String, FilePart>,
}

impl Form {
    /// Reads every field. Names listed in `file_limits` are kept as bytes and
    /// rejected with 413 when larger than their limit; every other field is
    /// read as text. Empty file parts are dropped.
    pub async fn read(mut multipart: Multipart, file_limits: &[(&str, usize)]) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or("").to_string();

            if let Some(&(_, limit)) = file_limits.iter().find(|(n, _)| *n == name) {
                let content_type = field.content_type().map(|ct| ct.to_string());
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if bytes.len() > limit {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "{} exceeds maximum size of {} bytes",
                        name, limit
                    )));
                }
                if !bytes.is_empty() {
                    form.files.insert(name, FilePart { content_type, bytes: bytes.to_vec() });
                }
            } else {
                let text = field.text().await.map_err(multipart_error)?;
                form.texts.insert(name, text);
            }
        }

        Ok(form)
    }

    /// Identifier-style text field, trimmed; blank counts as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    /// Free text exactly as sent. Only the empty string counts as absent.
    pub fn raw_text(&self, name: &str) -> Option<&str> {
        self.texts.get(name).map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<FilePart> {
        self.files.remove(name)
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::bad_request(format!("invalid multipart body: {}", err.body_text()))
    }
}

/// Photos are accepted by content, not by declared type: the bytes must
/// carry a JPEG or PNG signature.
pub fn validate_photo(bytes: &[u8]) -> Result<(), ApiError> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg | ImageFormat::Png) => Ok(()),
        _ => Err(ApiError::UnsupportedMediaType("photo must be a JPEG or PNG image".into())),
    }
}

/// Attachments are accepted by declared content type.
pub fn validate_attachment(part: &FilePart) -> Result<(), ApiError> {
    let declared = part
        .content_type
        .as_deref()
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase());

    match declared {
        Some(ct) if ATTACHMENT_TYPES.contains(&ct.as_str()) => Ok(()),
        _ => Err(ApiError::UnsupportedMediaType(
            "attachment must be image/jpeg, image/png or image/gif".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_signatures() {
        assert!(validate_photo(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]).is_ok());
        assert!(validate_photo(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00]).is_ok());
        assert!(matches!(
            validate_photo(b"GIF89a"),
            Err(ApiError::UnsupportedMediaType(_))
        ));
        assert!(validate_photo(&[]).is_err());
    }

    #[test]
    fn text_fields() {
        let mut form = Form::default();
        form.texts.insert("content".into(), "  indented\n".into());
        form.texts.insert("blank".into(), "   ".into());
        form.texts.insert("empty".into(), String::new());

        assert_eq!(form.text("content"), Some("indented"));
        assert_eq!(form.raw_text("content"), Some("  indented\n"));
        assert_eq!(form.text("blank"), None);
        assert_eq!(form.raw_text("blank"), Some("   "));
        assert_eq!(form.raw_text("empty"), None);
        assert_eq!(form.raw_text("missing"), None);
    }

    #[test]
    fn attachment_types() {
        let part = |ct: Option<&str>| FilePart {
            content_type: ct.map(str::to_string),
            bytes: vec![1],
        };
        assert!(validate_attachment(&part(Some("image/gif"))).is_ok());
        assert!(validate_attachment(&part(Some("IMAGE/PNG; charset=binary"))).is_ok());
        assert!(validate_attachment(&part(Some("application/pdf"))).is_err());
        assert!(validate_attachment(&part(None)).is_err());
    }
}
