//! Loading local files into media payloads for outgoing messages.

use std::path::{Path, PathBuf};

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A file ready to be attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    /// MIME type guessed from the file extension.
    pub mimetype: String,
    /// File contents, base64 encoded.
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a regular file", .0.display())]
    NotAFile(PathBuf),

    #[error("Unsupported media type: {}", .0.display())]
    UnsupportedType(PathBuf),
}

/// Read the file at `path` and encode it as a [`MediaPayload`].
///
/// Fails if the file is missing or unreadable, is not a regular file, or
/// has an extension with no known MIME type.
pub async fn load_media(path: &Path) -> Result<MediaPayload, MediaError> {
    let read_err = |source| MediaError::Read {
        path: path.to_path_buf(),
        source,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(read_err)?;
    if !metadata.is_file() {
        return Err(MediaError::NotAFile(path.to_path_buf()));
    }

    let mimetype = mime_guess::from_path(path)
        .first()
        .ok_or_else(|| MediaError::UnsupportedType(path.to_path_buf()))?;

    let bytes = tokio::fs::read(path).await.map_err(read_err)?;
    log::debug!("Loaded {} bytes of {} from {}", bytes.len(), mimetype, path.display());

    Ok(MediaPayload {
        mimetype: mimetype.essence_str().to_string(),
        data: base64::engine::general_purpose::STANDARD.encode(bytes),
        filename: path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string),
    })
}
