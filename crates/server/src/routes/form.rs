use std::collections::HashMap;

use axum::{body::Bytes, extract::Multipart};

use crate::{
    error::{AppError, Result},
    services::storage::{StorageService, UploadFolder},
};

pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

/// A multipart body split into text fields and file parts. Repeated text fields keep
/// every value in order.
#[derive(Default)]
pub struct MultipartForm {
    fields: HashMap<String, Vec<String>>,
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field.bytes().await.map_err(|e| {
                        AppError::BadRequest(format!("Failed to read file {file_name}: {e}"))
                    })?;
                    // Browsers send an empty part for an untouched file input
                    if file_name.is_empty() || data.is_empty() {
                        continue;
                    }
                    form.files.push(UploadedFile { file_name, data });
                }
                None => {
                    let value = field.text().await.map_err(|e| {
                        AppError::BadRequest(format!("Failed to read field {name}: {e}"))
                    })?;
                    form.fields.entry(name).or_default().push(value);
                }
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str> {
        self.text(name)
            .ok_or_else(|| AppError::Validation(format!("Missing field: {name}")))
    }

    pub fn all(&self, name: &str) -> Vec<String> {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    /// Stores every file part. On failure the files already written are removed again.
    pub async fn save_files(&self, storage: &StorageService, folder: UploadFolder) -> Result<Vec<String>> {
        let mut saved = Vec::with_capacity(self.files.len());
        for file in &self.files {
            match storage.save(folder, &file.file_name, &file.data).await {
                Ok(url) => saved.push(url),
                Err(e) => {
                    storage.delete_all(&saved).await;
                    return Err(e);
                }
            }
        }
        Ok(saved)
    }
}
