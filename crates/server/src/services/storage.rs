// Upload storage for avatars, job attachments and portfolio files

use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::error::{AppError, Result};

pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "pdf", "doc", "docx", "txt"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

const URL_PREFIX: &str = "/uploads/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFolder {
    Avatars,
    Projects,
    Portfolio,
}

impl UploadFolder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Avatars => "avatars",
            Self::Projects => "projects",
            Self::Portfolio => "portfolio",
        }
    }

    const ALL: [UploadFolder; 3] = [Self::Avatars, Self::Projects, Self::Portfolio];
}

#[derive(Clone)]
pub struct StorageService {
    base_path: PathBuf,
    max_bytes: usize,
}

impl StorageService {
    pub fn new(base_path: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            base_path: base_path.into(),
            max_bytes,
        }
    }

    pub async fn init(&self) -> Result<()> {
        for folder in UploadFolder::ALL {
            fs::create_dir_all(self.base_path.join(folder.as_str()))
                .await
                .map_err(|e| {
                    AppError::Internal(format!("Failed to create storage directory: {e}"))
                })?;
        }
        Ok(())
    }

    /// Validates and persists an upload, returning the URL it is served under.
    pub async fn save(&self, folder: UploadFolder, file_name: &str, data: &[u8]) -> Result<String> {
        let extension = allowed_extension(file_name)?;

        if data.len() > self.max_bytes {
            return Err(AppError::Validation(format!(
                "File {file_name} is too large (limit is {} MB)",
                self.max_bytes / (1024 * 1024)
            )));
        }

        let stored_name = format!("{}.{extension}", Uuid::new_v4());
        let dir = self.base_path.join(folder.as_str());
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create directories: {e}")))?;

        fs::write(dir.join(&stored_name), data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write file: {e}")))?;

        tracing::debug!(folder = folder.as_str(), file = %stored_name, bytes = data.len(), "Stored upload");

        Ok(format!("{URL_PREFIX}{}/{stored_name}", folder.as_str()))
    }

    /// Removes the file behind an upload URL. Unknown or foreign URLs are ignored.
    pub async fn delete(&self, url: &str) -> Result<()> {
        let Some(path) = self.resolve(url) else {
            return Ok(());
        };

        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to delete file: {e}")))?;
        }

        Ok(())
    }

    pub async fn delete_all(&self, urls: &[String]) {
        for url in urls {
            if let Err(e) = self.delete(url).await {
                tracing::warn!(url = %url, error = %e, "Failed to remove stored file");
            }
        }
    }

    fn resolve(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix(URL_PREFIX)?;
        let (folder, name) = relative.split_once('/')?;

        if !UploadFolder::ALL.iter().any(|f| f.as_str() == folder) {
            return None;
        }
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return None;
        }

        Some(self.base_path.join(folder).join(name))
    }
}

fn allowed_extension(file_name: &str) -> Result<String> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::Validation(format!(
            "Unsupported file type: {file_name}"
        )));
    }

    Ok(extension)
}

pub fn is_image(file_name: &str) -> bool {
    allowed_extension(file_name)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(dir: &tempfile::TempDir) -> StorageService {
        StorageService::new(dir.path(), 16)
    }

    #[tokio::test]
    async fn save_returns_url_under_folder() {
        let dir = tempfile::tempdir().unwrap();
        let storage = service(&dir);

        let url = storage
            .save(UploadFolder::Portfolio, "Report.PDF", b"%PDF")
            .await
            .unwrap();

        assert!(url.starts_with("/uploads/portfolio/"));
        assert!(url.ends_with(".pdf"));
        let stored = dir.path().join(url.trim_start_matches("/uploads/"));
        assert_eq!(std::fs::read(stored).unwrap(), b"%PDF");
    }

    #[tokio::test]
    async fn save_rejects_disallowed_and_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let storage = service(&dir);

        let err = storage
            .save(UploadFolder::Projects, "run.exe", b"MZ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = storage
            .save(UploadFolder::Projects, "notes.txt", &[b'a'; 17])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_removes_file_and_ignores_foreign_urls() {
        let dir = tempfile::tempdir().unwrap();
        let storage = service(&dir);

        let url = storage
            .save(UploadFolder::Avatars, "me.png", b"png")
            .await
            .unwrap();
        storage.delete(&url).await.unwrap();
        assert!(!dir.path().join(url.trim_start_matches("/uploads/")).exists());

        // Missing files and paths outside the upload root are no-ops
        storage.delete(&url).await.unwrap();
        storage.delete("/static/default-avatar.svg").await.unwrap();
        storage.delete("/uploads/avatars/../../etc/passwd").await.unwrap();
    }

    #[test]
    fn image_detection_uses_extension() {
        assert!(is_image("face.JPG"));
        assert!(!is_image("cv.docx"));
        assert!(!is_image("noext"));
    }
}
