//! File-system media store for product and profile images.
//!
//! Uploads arrive inline in JSON as base64 (optionally a `data:` URI). They are
//! decoded and sniffed before any database work starts, written under
//! `media_root`, and referenced by URL under `media_url`.

use crate::config::AppConfig;
use crate::errors::ServiceError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// An image payload: a base64 string / data URI, or an object naming the file.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ImageUpload {
    Encoded(String),
    File {
        filename: Option<String>,
        data: String,
    },
}

impl ImageUpload {
    fn payload(&self) -> &str {
        match self {
            ImageUpload::Encoded(data) => data,
            ImageUpload::File { data, .. } => data,
        }
    }
}

/// Image bytes that passed validation
#[derive(Debug, Clone)]
pub struct DecodedImage {
    bytes: Vec<u8>,
    extension: &'static str,
}

impl DecodedImage {
    pub fn extension(&self) -> &'static str {
        self.extension
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A file written to the store
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    pub url: String,
}

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

/// Decodes and validates an upload. `field` names the payload field in errors.
pub fn decode_image(field: &str, upload: &ImageUpload) -> Result<DecodedImage, ServiceError> {
    let raw = upload.payload().trim();
    let encoded = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest.split_once(',').ok_or_else(|| {
                ServiceError::ValidationError(format!("{}: malformed data URI", field))
            })?;
            if !meta.starts_with("image/") || !meta.ends_with(";base64") {
                return Err(ServiceError::ValidationError(format!(
                    "{}: only base64 encoded images are accepted",
                    field
                )));
            }
            data
        }
        None => raw,
    };

    let bytes = STANDARD.decode(encoded).map_err(|_| {
        ServiceError::ValidationError(format!("{}: invalid base64 payload", field))
    })?;

    let extension = sniff_extension(&bytes).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "{}: upload a valid image (png, jpeg, gif or webp)",
            field
        ))
    })?;

    Ok(DecodedImage { bytes, extension })
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    base_url: String,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(&cfg.media_root, &cfg.media_url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Writes `image` under `folder` with a fresh name.
    pub async fn save(&self, folder: &str, image: &DecodedImage) -> Result<StoredFile, ServiceError> {
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ServiceError::MediaError(format!("create {}: {}", dir.display(), e)))?;

        let name = format!("{}.{}", Uuid::new_v4(), image.extension);
        let path = dir.join(&name);
        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| ServiceError::MediaError(format!("write {}: {}", path.display(), e)))?;

        debug!("Stored {} bytes at {}", image.bytes.len(), path.display());
        Ok(StoredFile {
            path,
            url: format!("{}/{}/{}", self.base_url, folder, name),
        })
    }

    /// Writes every image or none: a failure removes the files already written.
    pub async fn save_all(
        &self,
        folder: &str,
        images: &[DecodedImage],
    ) -> Result<Vec<StoredFile>, ServiceError> {
        let mut stored = Vec::with_capacity(images.len());
        for image in images {
            match self.save(folder, image).await {
                Ok(file) => stored.push(file),
                Err(e) => {
                    self.discard(&stored).await;
                    return Err(e);
                }
            }
        }
        Ok(stored)
    }

    /// Best-effort removal of freshly written files.
    pub async fn discard(&self, files: &[StoredFile]) {
        for file in files {
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                warn!("Failed to remove {}: {}", file.path.display(), e);
            }
        }
    }

    /// Maps a public URL back to a path inside the store.
    pub fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let relative = url
            .strip_prefix(&self.base_url)?
            .trim_start_matches('/');
        let relative = Path::new(relative);
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Best-effort removal of files that are no longer referenced.
    pub async fn remove_urls(&self, urls: &[String]) {
        for url in urls {
            let Some(path) = self.path_for_url(url) else {
                continue;
            };
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    fn png_b64() -> String {
        STANDARD.encode(PNG)
    }

    #[test]
    fn decodes_data_uri_and_raw_base64() {
        let uri = ImageUpload::Encoded(format!("data:image/png;base64,{}", png_b64()));
        assert_eq!(decode_image("main_image", &uri).unwrap().extension(), "png");

        let raw = ImageUpload::File {
            filename: Some("scarf.png".into()),
            data: png_b64(),
        };
        assert_eq!(decode_image("main_image", &raw).unwrap().len(), PNG.len());
    }

    #[test]
    fn rejects_non_images() {
        let text = ImageUpload::Encoded(STANDARD.encode(b"hello world"));
        assert_matches!(
            decode_image("main_image", &text),
            Err(ServiceError::ValidationError(msg)) if msg.starts_with("main_image")
        );

        let not_base64 = ImageUpload::Encoded("%%%".into());
        assert_matches!(
            decode_image("main_image", &not_base64),
            Err(ServiceError::ValidationError(_))
        );

        let pdf = ImageUpload::Encoded(format!("data:application/pdf;base64,{}", png_b64()));
        assert_matches!(
            decode_image("main_image", &pdf),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn url_mapping_stays_inside_root() {
        let store = MediaStore::new("/srv/media", "/media/");
        assert_eq!(
            store.path_for_url("/media/products/a.png"),
            Some(PathBuf::from("/srv/media/products/a.png"))
        );
        assert_eq!(store.path_for_url("/media/../etc/passwd"), None);
        assert_eq!(store.path_for_url("https://cdn.example/a.png"), None);
    }

    #[tokio::test]
    async fn save_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path(), "/media");
        let image = decode_image("image", &ImageUpload::Encoded(png_b64())).unwrap();

        let stored = store.save("products", &image).await.unwrap();
        assert!(stored.url.starts_with("/media/products/"));
        assert!(stored.url.ends_with(".png"));
        assert_eq!(tokio::fs::read(&stored.path).await.unwrap(), PNG);

        store.remove_urls(&[stored.url.clone()]).await;
        assert!(!stored.path.exists());
    }
}
