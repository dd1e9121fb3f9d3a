//! Identity verification against a stored reference image
//!
//! The comparison itself is delegated to a remote vision model; this module
//! defines the seam (`FaceVerifier`), the Gemini-backed client and a fixed
//! verifier for offline use.

pub mod gemini;

use anyhow::Result;
use async_trait::async_trait;

pub use gemini::GeminiVerifier;

use crate::types::VerificationResult;

/// Compares a live capture with a reference image
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FaceVerifier: Send + Sync {
    /// Both images may be data URLs or bare base64; the reference may also be
    /// an http(s) URL.
    async fn verify(&self, captured: &str, reference: &str) -> Result<VerificationResult>;
}

/// Always returns the same verdict
#[derive(Debug, Clone)]
pub struct StaticVerifier {
    result: VerificationResult,
}

impl StaticVerifier {
    pub fn new(result: VerificationResult) -> Self {
        Self { result }
    }

    /// Accepts every capture with the given confidence
    pub fn accepting(confidence: f64) -> Self {
        Self::new(VerificationResult {
            is_match: true,
            confidence,
            message: "Identity accepted (offline verifier).".to_string(),
        })
    }

    /// Rejects every capture with the given reason
    pub fn rejecting(message: impl Into<String>) -> Self {
        Self::new(VerificationResult {
            is_match: false,
            confidence: 0.0,
            message: message.into(),
        })
    }
}

#[async_trait]
impl FaceVerifier for StaticVerifier {
    async fn verify(&self, captured: &str, _reference: &str) -> Result<VerificationResult> {
        if strip_data_url(captured).trim().is_empty() {
            anyhow::bail!("Captured image is empty");
        }
        Ok(self.result.clone())
    }
}

/// Base64 payload of an image, without any `data:image/<kind>;base64,` prefix
pub fn strip_data_url(image: &str) -> &str {
    match split_data_url(image) {
        Some((_, payload)) => payload,
        None => image,
    }
}

/// MIME type declared by a data URL, `image/jpeg` otherwise
pub fn image_mime_type(image: &str) -> String {
    match split_data_url(image) {
        Some((kind, _)) => format!("image/{}", kind),
        None => "image/jpeg".to_string(),
    }
}

fn split_data_url(image: &str) -> Option<(&str, &str)> {
    let rest = image.strip_prefix("data:image/")?;
    let (kind, payload) = rest.split_once(";base64,")?;
    if kind.is_empty() || !kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((kind, payload))
}

/// Whether the image must be fetched before it can be sent inline
pub fn is_remote_image(image: &str) -> bool {
    image.starts_with("http://") || image.starts_with("https://")
}
