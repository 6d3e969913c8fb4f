use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AppConfig;

const UPLOAD_ROOT: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Error)]
pub enum CloudinaryError {
    #[error("no cloudinary cloud name configured")]
    MissingCloudName,
    #[error("no cloudinary upload preset configured")]
    MissingPreset,
    #[error("file {0} is empty")]
    EmptyFile(String),
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("http error: {0}")]
    Http(String),
    #[error("cloudinary api error: {0}")]
    Api(String),
    #[error("cloudinary returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// What the asset is, as far as Cloudinary's upload path is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    /// PDFs and other documents, e.g. ID scans.
    Raw,
    Auto,
}

impl ResourceKind {
    fn path_segment(&self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Raw => "raw",
            ResourceKind::Auto => "auto",
        }
    }

    pub fn for_file(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" => ResourceKind::Image,
            "pdf" | "doc" | "docx" => ResourceKind::Raw,
            _ => ResourceKind::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub secure_url: String,
    pub public_id: String,
    #[serde(default)]
    pub bytes: Option<u64>,
}

/// Unsigned uploads straight to Cloudinary, bypassing the backend.
pub struct Uploader {
    upload_root: String,
    cloud_name: String,
    preset: String,
    client: reqwest::Client,
}

impl Uploader {
    pub fn from_config(config: &AppConfig) -> Result<Self, CloudinaryError> {
        let cloud_name = config
            .cloudinary_cloud_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(CloudinaryError::MissingCloudName)?
            .to_string();
        let preset = config
            .cloudinary_upload_preset
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(CloudinaryError::MissingPreset)?
            .to_string();

        Ok(Self {
            upload_root: UPLOAD_ROOT.to_string(),
            cloud_name,
            preset,
            client: reqwest::Client::new(),
        })
    }

    /// Points uploads at another host, e.g. a local stand-in.
    pub fn with_upload_root(mut self, root: &str) -> Self {
        self.upload_root = root.trim_end_matches('/').to_string();
        self
    }

    pub fn upload_url(&self, kind: ResourceKind) -> String {
        format!(
            "{}/{}/{}/upload",
            self.upload_root,
            self.cloud_name,
            kind.path_segment()
        )
    }

    pub async fn upload_file(
        &self,
        path: &Path,
        folder: Option<&str>,
    ) -> Result<UploadedAsset, CloudinaryError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| CloudinaryError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        self.upload_bytes(bytes, &file_name, ResourceKind::for_file(path), folder)
            .await
    }

    pub async fn upload_bytes(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        kind: ResourceKind,
        folder: Option<&str>,
    ) -> Result<UploadedAsset, CloudinaryError> {
        if bytes.is_empty() {
            return Err(CloudinaryError::EmptyFile(file_name.to_string()));
        }

        let mut form = Form::new()
            .text("upload_preset", self.preset.clone())
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()));
        if let Some(folder) = folder.map(str::trim).filter(|f| !f.is_empty()) {
            form = form.text("folder", folder.to_string());
        }

        let response = self
            .client
            .post(self.upload_url(kind))
            .multipart(form)
            .send()
            .await
            .map_err(|err| CloudinaryError::Http(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| CloudinaryError::Http(err.to_string()))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), file_name, "upload rejected");
            return Err(CloudinaryError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let asset: UploadedAsset = serde_json::from_str(&text)
            .map_err(|err| CloudinaryError::Api(format!("unexpected upload response: {err}")))?;
        info!(public_id = %asset.public_id, file_name, "asset uploaded");
        Ok(asset)
    }
}

/// Cloudinary's `/error/message`, or the raw body when it is not JSON.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(|val| val.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
