//! OCR engine abstraction.
//!
//! Defines the [`OcrEngine`] trait so the local Tesseract binary and an HTTP
//! OCR sidecar can be swapped by configuration.

pub mod sidecar;
pub mod tesseract;

use crate::config::{OcrBackend, Settings};
use serde::Deserialize;
use std::sync::Arc;

/// Recognized text, shaped like the sidecar's JSON response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OcrOutput {
    pub data: OcrData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OcrData {
    #[serde(default)]
    pub text: String,
}

impl OcrOutput {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            data: OcrData { text: text.into() },
        }
    }
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;
    /// Recognize text in `image` using the given language hint (e.g. `eng`).
    async fn recognize(&self, image: &[u8], lang: &str) -> anyhow::Result<OcrOutput>;
}

/// Build the engine selected by `settings`.
pub fn from_settings(settings: &Settings) -> Arc<dyn OcrEngine> {
    match &settings.ocr_backend {
        OcrBackend::Tesseract { binary } => Arc::new(tesseract::TesseractCli::new(binary.clone())),
        OcrBackend::Sidecar { url } => {
            Arc::new(sidecar::OcrSidecar::new(reqwest::Client::new(), url.clone()))
        }
    }
}
