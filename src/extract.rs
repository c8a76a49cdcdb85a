//! Text extraction dispatch: PDF text layer, OCR for images, placeholder otherwise.

use crate::error::{Error, Result};
use crate::model::{ExtractedText, UploadedFile};
use crate::ocr::OcrEngine;
use crate::pdf::{self, PdfParser};
use std::sync::Arc;
use tracing::{debug, info};

pub struct TextExtractor {
    pdf: Arc<dyn PdfParser>,
    ocr: Arc<dyn OcrEngine>,
    ocr_lang: String,
}

impl TextExtractor {
    pub fn new(pdf: Arc<dyn PdfParser>, ocr: Arc<dyn OcrEngine>, ocr_lang: impl Into<String>) -> Self {
        Self {
            pdf,
            ocr,
            ocr_lang: ocr_lang.into(),
        }
    }

    /// Extract the text of one file.
    ///
    /// Unsupported media types yield a placeholder text rather than an error.
    pub async fn extract<'a>(&self, file: &'a UploadedFile) -> Result<ExtractedText<'a>> {
        let text = if file.is_pdf() {
            let pages = self
                .pdf
                .pages(&file.content)
                .map_err(|e| extraction_error(file, e))?;
            info!("Read {} pages from {}", pages.len(), file.original_name);
            pdf::join_pages(&pages)
        } else if file.is_image() {
            let output = self
                .ocr
                .recognize(&file.content, &self.ocr_lang)
                .await
                .map_err(|e| extraction_error(file, e))?;
            info!("OCR ({}) finished for {}", self.ocr.name(), file.original_name);
            output.data.text
        } else {
            info!(
                "Unsupported media type {} for {}",
                file.mime_type, file.original_name
            );
            unsupported_placeholder(&file.original_name)
        };

        debug!("Extracted text for {}:\n{}", file.original_name, text);

        Ok(ExtractedText {
            source_file: file,
            text,
        })
    }
}

pub fn unsupported_placeholder(original_name: &str) -> String {
    format!("Unsupported file type: {}", original_name)
}

fn extraction_error(file: &UploadedFile, e: anyhow::Error) -> Error {
    Error::Extraction {
        file: file.original_name.clone(),
        message: format!("{e:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrOutput;
    use crate::pdf::PdfPage;
    use std::sync::Mutex;

    struct FixedPdf(Vec<Vec<&'static str>>);

    impl PdfParser for FixedPdf {
        fn pages(&self, _data: &[u8]) -> anyhow::Result<Vec<PdfPage>> {
            Ok(self
                .0
                .iter()
                .map(|items| PdfPage {
                    items: items.iter().map(|s| s.to_string()).collect(),
                })
                .collect())
        }
    }

    struct FailingPdf;

    impl PdfParser for FailingPdf {
        fn pages(&self, _data: &[u8]) -> anyhow::Result<Vec<PdfPage>> {
            anyhow::bail!("Failed to load PDF: invalid file header")
        }
    }

    /// Records the language hint it was called with.
    #[derive(Default)]
    struct RecordingOcr {
        text: &'static str,
        langs: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl OcrEngine for RecordingOcr {
        fn name(&self) -> &str {
            "recording"
        }

        async fn recognize(&self, _image: &[u8], lang: &str) -> anyhow::Result<OcrOutput> {
            self.langs.lock().unwrap().push(lang.to_string());
            Ok(OcrOutput::from_text(self.text))
        }
    }

    fn extractor(pdf: impl PdfParser + 'static, ocr: Arc<RecordingOcr>) -> TextExtractor {
        TextExtractor::new(Arc::new(pdf), ocr, "eng")
    }

    #[tokio::test]
    async fn test_pdf_pages_joined() {
        let pdf = FixedPdf(vec![vec!["Name:", "Jane", "Doe"], vec!["LDL", "160", "mg/dL"], vec![]]);
        let ex = extractor(pdf, Arc::new(RecordingOcr::default()));
        let file = UploadedFile::new("lab.pdf", "application/pdf", b"%PDF".to_vec());

        let extracted = ex.extract(&file).await.unwrap();
        assert_eq!(extracted.text, "Name: Jane Doe\nLDL 160 mg/dL");
        assert_eq!(extracted.source_file.original_name, "lab.pdf");
    }

    #[tokio::test]
    async fn test_image_goes_through_ocr_untrimmed() {
        let ocr = Arc::new(RecordingOcr {
            text: "  BP 120/80\n",
            ..Default::default()
        });
        let ex = extractor(FixedPdf(vec![]), ocr.clone());
        let file = UploadedFile::new("scan.jpg", "image/jpeg", vec![0xff, 0xd8]);

        let extracted = ex.extract(&file).await.unwrap();
        assert_eq!(extracted.text, "  BP 120/80\n");
        assert_eq!(*ocr.langs.lock().unwrap(), vec!["eng".to_string()]);
    }

    #[tokio::test]
    async fn test_unsupported_type_yields_placeholder() {
        let ocr = Arc::new(RecordingOcr::default());
        let ex = extractor(FailingPdf, ocr.clone());
        let file = UploadedFile::new("notes.txt", "text/plain", b"hello".to_vec());

        let extracted = ex.extract(&file).await.unwrap();
        assert_eq!(extracted.text, "Unsupported file type: notes.txt");
        assert!(ocr.langs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parser_failure_is_extraction_error() {
        let ex = extractor(FailingPdf, Arc::new(RecordingOcr::default()));
        let file = UploadedFile::new("broken.pdf", "application/pdf", b"garbage".to_vec());

        match ex.extract(&file).await.unwrap_err() {
            Error::Extraction { file, message } => {
                assert_eq!(file, "broken.pdf");
                assert!(message.contains("invalid file header"));
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
    }
}
