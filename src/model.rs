//! Request-scoped data types for the report pipeline.
//!
//! Nothing here outlives a single upload request.

use serde::{Deserialize, Serialize};

/// Media type of PDF uploads.
pub const PDF_MIME: &str = "application/pdf";

/// A file received in the `files` multipart field, buffered in memory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        original_name: impl Into<String>,
        mime_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            mime_type: mime_type.into(),
            content,
        }
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == PDF_MIME
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Plain text pulled out of an uploaded file. Empty text is valid.
#[derive(Debug, Clone)]
pub struct ExtractedText<'a> {
    pub source_file: &'a UploadedFile,
    pub text: String,
}

/// One entry of the upload response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub file_name: String,
    pub summary: String,
}

/// Successful upload response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummariesResponse {
    pub summaries: Vec<PatientSummary>,
}
