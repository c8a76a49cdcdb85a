//! HTTP OCR sidecar engine.

use super::{OcrEngine, OcrOutput};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    image: String,
    lang: &'a str,
}

pub struct OcrSidecar {
    url: String,
    client: reqwest::Client,
}

impl OcrSidecar {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl OcrEngine for OcrSidecar {
    fn name(&self) -> &str {
        "sidecar"
    }

    async fn recognize(&self, image: &[u8], lang: &str) -> anyhow::Result<OcrOutput> {
        info!("OcrSidecar: sending {} bytes (lang={})", image.len(), lang);

        let body = RecognizeRequest {
            image: BASE64.encode(image),
            lang,
        };

        let response = self
            .client
            .post(format!("{}/recognize", self.url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OCR sidecar error ({}): {}", status, error_text);
        }

        Ok(response.json().await?)
    }
}
