use anyhow::Context;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use uuid::Uuid;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Credentials and destination for the upstream drive, read once from the
/// environment at startup. Request input must never influence these.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub folder_id: Option<String>,
}

impl RelayConfig {
    pub fn from_env() -> RelayConfig {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        RelayConfig {
            client_id: var("DRIVE_CLIENT_ID"),
            client_secret: var("DRIVE_CLIENT_SECRET"),
            redirect_uri: var("DRIVE_REDIRECT_URI"),
            refresh_token: var("DRIVE_REFRESH_TOKEN"),
            folder_id: var("DRIVE_FOLDER_ID"),
        }
    }
}

/// Content sniffing by magic bytes; the declared MIME type of an upload is
/// untrusted client input.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    None
}

#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// The relay's request/response contract, kept byte-for-byte compatible with
/// the portal's upload endpoint: 200 with fileId/fileName, 405 for anything
/// but POST, 500 with a generic message for every failure.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub method: String,
    pub file: Option<FilePart>,
}

#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Seam for the upstream blob store. The production cloud-drive client lives
/// on the far side of this trait; the daemon ships a workspace-folder store.
pub trait ObjectStore {
    fn put(&self, file_name: &str, mime: &str, bytes: &[u8]) -> anyhow::Result<String>;
}

pub fn handle_upload(store: &dyn ObjectStore, req: &RelayRequest) -> RelayResponse {
    if req.method != "POST" {
        return RelayResponse {
            status: 405,
            body: json!({ "message": "Method Not Allowed" }),
        };
    }
    let Some(file) = req.file.as_ref() else {
        return RelayResponse {
            status: 500,
            body: json!({ "message": "Upload failed" }),
        };
    };
    match store.put(&file.file_name, &file.mime, &file.bytes) {
        Ok(file_id) => RelayResponse {
            status: 200,
            body: json!({
                "message": "File uploaded successfully",
                "fileId": file_id,
                "fileName": file.file_name,
            }),
        },
        Err(e) => {
            eprintln!("upload relay failed: {e:?}");
            RelayResponse {
                status: 500,
                body: json!({ "message": "Upload failed" }),
            }
        }
    }
}

/// Stores objects under `<root>[/<folder>]/<fileId>` with a sidecar metadata
/// document carrying the original filename, MIME type, length and checksum.
pub struct FolderStore {
    root: PathBuf,
}

impl FolderStore {
    pub fn new(uploads_root: PathBuf, config: &RelayConfig) -> FolderStore {
        let root = match config.folder_id.as_deref() {
            Some(folder) => uploads_root.join(folder),
            None => uploads_root,
        };
        FolderStore { root }
    }

    pub fn object_path(&self, file_id: &str) -> PathBuf {
        self.root.join(file_id)
    }
}

impl ObjectStore for FolderStore {
    fn put(&self, file_name: &str, mime: &str, bytes: &[u8]) -> anyhow::Result<String> {
        std::fs::create_dir_all(&self.root).with_context(|| {
            format!("failed to create uploads dir {}", self.root.to_string_lossy())
        })?;

        let file_id = Uuid::new_v4().to_string();
        let object_path = self.root.join(&file_id);
        std::fs::write(&object_path, bytes).with_context(|| {
            format!("failed to write object {}", object_path.to_string_lossy())
        })?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let meta = json!({
            "fileName": file_name,
            "mimeType": mime,
            "byteLength": bytes.len(),
            "sha256": format!("{:x}", hasher.finalize()),
            "uploadedAt": chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        });
        let meta_path = self.root.join(format!("{}.json", file_id));
        std::fs::write(&meta_path, serde_json::to_string_pretty(&meta)?).with_context(|| {
            format!("failed to write metadata {}", meta_path.to_string_lossy())
        })?;

        Ok(file_id)
    }
}
