//! Error types for render backend operations.

use std::fmt;

use super::TextureId;

/// Errors reported by a [`RenderBackend`](super::RenderBackend).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Texture allocation failed.
    TextureCreate(String),
    /// Uploading pixels into an existing texture failed.
    TextureUpdate { id: TextureId, reason: String },
    /// Deleting a texture failed.
    TextureDelete { id: TextureId, reason: String },
    /// The backend does not know the texture.
    UnknownTexture(TextureId),
    /// A draw call failed.
    Draw(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::TextureCreate(msg) => write!(f, "Texture create failed: {}", msg),
            BackendError::TextureUpdate { id, reason } => {
                write!(f, "Texture update failed for {}: {}", id, reason)
            }
            BackendError::TextureDelete { id, reason } => {
                write!(f, "Texture delete failed for {}: {}", id, reason)
            }
            BackendError::UnknownTexture(id) => write!(f, "Unknown texture: {}", id),
            BackendError::Draw(msg) => write!(f, "Draw failed: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}
