//! Local Tesseract OCR engine.

use super::{OcrEngine, OcrOutput};
use anyhow::{Context, Result};
use image::ImageOutputFormat;
use std::io::Cursor;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs `tesseract stdin stdout -l <lang>` with the image piped in.
pub struct TesseractCli {
    binary: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// Decode any supported image format and re-encode it as PNG.
///
/// Fails for corrupt or unrecognized images.
pub fn normalize_to_png(image: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(image).context("Failed to decode image")?;
    let mut png = Cursor::new(Vec::new());
    decoded
        .write_to(&mut png, ImageOutputFormat::Png)
        .context("Failed to re-encode image as PNG")?;
    Ok(png.into_inner())
}

#[async_trait::async_trait]
impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &[u8], lang: &str) -> Result<OcrOutput> {
        let png = normalize_to_png(image)?;
        debug!("Running {} on {} byte PNG (lang={})", self.binary, png.len(), lang);

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", lang])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to run {}", self.binary))?;

        let mut stdin = child.stdin.take().context("tesseract stdin unavailable")?;
        let writer = tokio::spawn(async move {
            stdin.write_all(&png).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for tesseract")?;
        let written = writer.await.context("tesseract stdin writer panicked")?;

        // An early exit breaks the pipe; its stderr says why.
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tesseract failed ({}): {}", output.status, stderr.trim());
        }
        written.context("Failed to write image to tesseract")?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!("tesseract: {}", stderr.trim());
        }

        Ok(OcrOutput::from_text(
            String::from_utf8_lossy(&output.stdout).into_owned(),
        ))
    }
}
