//! File URL signing boundary
//!
//! Signed-URL generation is an external collaborator; the pipeline only
//! needs a signer to turn a message file into a client-fetchable URL when
//! emitting `message_file` frames.

use uuid::Uuid;

/// Signs download URLs for message file attachments
pub trait FileSigner: Send + Sync {
    fn sign_url(&self, file_id: Uuid, extension: &str) -> String;
}

/// Derive the extension (with leading dot) from a stored file URL
///
/// Falls back to `.bin` when the URL has no extension or an implausibly
/// long one.
pub fn file_extension(url: &str) -> String {
    match url.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && !ext.contains('/') => {
            let extension = format!(".{ext}");
            if extension.len() > 10 {
                ".bin".to_string()
            } else {
                extension
            }
        }
        _ => ".bin".to_string(),
    }
}
