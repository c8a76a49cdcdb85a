//! Report pipeline: extract → summarize → simplify → merge, per file.

use crate::config::{PromptProfile, REPORT_TEXT_PLACEHOLDER, SUMMARY_HTML_PLACEHOLDER};
use crate::error::Result;
use crate::extract::TextExtractor;
use crate::html;
use crate::llm::{ChatCompletion, ChatRequest};
use crate::model::{PatientSummary, UploadedFile};
use std::sync::Arc;
use tracing::{debug, info};

/// Summarizer output when the model returns nothing usable.
pub const NO_SUMMARY: &str = "No summary generated.";

/// Orchestrates the stages for each uploaded file.
pub struct ReportPipeline {
    extractor: TextExtractor,
    llm: Arc<dyn ChatCompletion>,
}

impl ReportPipeline {
    pub fn new(extractor: TextExtractor, llm: Arc<dyn ChatCompletion>) -> Self {
        Self { extractor, llm }
    }

    /// Process every file in order.
    ///
    /// The first failure aborts the batch; summaries already produced are dropped.
    pub async fn process_batch(
        &self,
        files: &[UploadedFile],
        profile: &PromptProfile,
    ) -> Result<Vec<PatientSummary>> {
        let mut summaries = Vec::with_capacity(files.len());
        for file in files {
            summaries.push(self.process_file(file, profile).await?);
        }
        Ok(summaries)
    }

    pub async fn process_file(
        &self,
        file: &UploadedFile,
        profile: &PromptProfile,
    ) -> Result<PatientSummary> {
        info!(
            "Processing {} ({}, {} bytes) with profile {}",
            file.original_name,
            file.mime_type,
            file.content.len(),
            profile.name
        );

        let extracted = self.extractor.extract(file).await?;
        let summary_html = self.summarize(&extracted.text, profile).await?;
        let explanation_html = self.simplify(&summary_html, profile).await?;

        Ok(PatientSummary {
            file_name: extracted.source_file.original_name.clone(),
            summary: html::merge(&summary_html, &explanation_html),
        })
    }

    /// First LLM call: structured clinical HTML.
    pub async fn summarize(&self, text: &str, profile: &PromptProfile) -> Result<String> {
        let template = &profile.summarizer;
        let request =
            ChatRequest::from_template(template, template.render(REPORT_TEXT_PLACEHOLDER, text));

        debug!("Calling summarizer ({})", template.model);
        let mut summary = self
            .llm
            .complete(request)
            .await?
            .unwrap_or_default();

        if profile.cleanup.truncate_explanation {
            summary = html::truncate_explanation_section(&summary);
        }
        if profile.cleanup.normalize_headings {
            summary = html::normalize_bold_headings(&summary);
        }
        // Cleanup can strip a reply down to nothing.
        if summary.trim().is_empty() {
            summary = NO_SUMMARY.to_string();
        }
        Ok(summary)
    }

    /// Second LLM call: plain-language bullet list.
    pub async fn simplify(&self, summary_html: &str, profile: &PromptProfile) -> Result<String> {
        let template = &profile.simplifier;
        let request = ChatRequest::from_template(
            template,
            template.render(SUMMARY_HTML_PLACEHOLDER, summary_html),
        );

        debug!("Calling simplifier ({})", template.model);
        let explanation = self.llm.complete(request).await?.unwrap_or_default();
        Ok(html::remove_markdown_bold(&explanation))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{compact_profile, detailed_profile};
    use crate::error::Error;
    use crate::ocr::{OcrEngine, OcrOutput};
    use crate::pdf::{PdfPage, PdfParser};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// LLM stand-in that replays queued answers and records requests.
    #[derive(Default)]
    pub(crate) struct ScriptedLlm {
        answers: Mutex<VecDeque<Result<Option<String>>>>,
        pub(crate) requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedLlm {
        pub(crate) fn new(answers: Vec<Result<Option<String>>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                requests: Mutex::default(),
            }
        }

        pub(crate) fn replying(answers: &[&str]) -> Self {
            Self::new(answers.iter().map(|a| Ok(Some(a.to_string()))).collect())
        }
    }

    #[async_trait::async_trait]
    impl ChatCompletion for ScriptedLlm {
        async fn complete(&self, request: ChatRequest) -> Result<Option<String>> {
            self.requests.lock().unwrap().push(request);
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted answer left").into()))
        }
    }

    pub(crate) struct FixedOcr(pub(crate) &'static str);

    #[async_trait::async_trait]
    impl OcrEngine for FixedOcr {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn recognize(&self, _image: &[u8], _lang: &str) -> anyhow::Result<OcrOutput> {
            Ok(OcrOutput::from_text(self.0))
        }
    }

    pub(crate) struct OnePagePdf(pub(crate) &'static [&'static str]);

    impl PdfParser for OnePagePdf {
        fn pages(&self, _data: &[u8]) -> anyhow::Result<Vec<PdfPage>> {
            Ok(vec![PdfPage {
                items: self.0.iter().map(|s| s.to_string()).collect(),
            }])
        }
    }

    pub(crate) fn pipeline_with(llm: Arc<ScriptedLlm>) -> ReportPipeline {
        let extractor = TextExtractor::new(
            Arc::new(OnePagePdf(&["Cholesterol", "240", "mg/dL"])),
            Arc::new(FixedOcr("BP 120/80")),
            "eng",
        );
        ReportPipeline::new(extractor, llm)
    }

    fn image(name: &str) -> UploadedFile {
        UploadedFile::new(name, "image/png", vec![1, 2, 3])
    }

    #[tokio::test]
    async fn test_image_end_to_end() {
        let llm = Arc::new(ScriptedLlm::replying(&["<b>Summary</b>", "<ul><li>ok</li></ul>"]));
        let pipeline = pipeline_with(llm.clone());

        let summary = pipeline
            .process_file(&image("bp.png"), &compact_profile())
            .await
            .unwrap();

        assert_eq!(summary.file_name, "bp.png");
        let s = &summary.summary;
        let a = s.find("<b>Summary</b>").unwrap();
        let b = s.find("Patient-Friendly Explanation").unwrap();
        let c = s.find("<ul><li>ok</li></ul>").unwrap();
        assert!(a < b && b < c);

        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].messages[1].content.contains("BP 120/80"));
        assert_eq!(requests[0].temperature, Some(0.3));
        assert_eq!(
            requests[1].messages[1].content,
            "Rewrite this for a patient in short bullet points:\n<b>Summary</b>"
        );
        assert_eq!(requests[1].model, "llama-3.3-70b-versatile");
    }

    #[tokio::test]
    async fn test_empty_llm_output_falls_back() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(None), Ok(None)]));
        let pipeline = pipeline_with(llm.clone());

        let summary = pipeline
            .process_file(&image("blank.png"), &compact_profile())
            .await
            .unwrap();

        assert!(summary.summary.contains(NO_SUMMARY));
        assert!(summary
            .summary
            .contains("<b>Patient-Friendly Explanation:</b>\n    \n  </div>"));
        // The fallback text is what the simplifier is asked to rewrite.
        assert!(llm.requests.lock().unwrap()[1].messages[1]
            .content
            .ends_with(NO_SUMMARY));
    }

    #[tokio::test]
    async fn test_unsupported_file_still_summarized() {
        let llm = Arc::new(ScriptedLlm::replying(&["<b>?</b>", "<ul><li>?</li></ul>"]));
        let pipeline = pipeline_with(llm.clone());
        let file = UploadedFile::new("notes.txt", "text/plain", b"hi".to_vec());

        let summaries = pipeline
            .process_batch(std::slice::from_ref(&file), &compact_profile())
            .await
            .unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].file_name, "notes.txt");
        assert!(llm.requests.lock().unwrap()[0].messages[1]
            .content
            .contains("Unsupported file type: notes.txt"));
    }

    #[tokio::test]
    async fn test_simplifier_bold_markers_stripped() {
        let llm = Arc::new(ScriptedLlm::replying(&[
            "<b>Summary</b>",
            "<ul><li>Your **cholesterol** is high</li></ul>",
        ]));
        let summary = pipeline_with(llm)
            .process_file(&image("a.png"), &compact_profile())
            .await
            .unwrap();
        assert!(summary.summary.contains("<li>Your cholesterol is high</li>"));
    }

    #[tokio::test]
    async fn test_detailed_profile_cleans_summary_before_simplifying() {
        let raw = "<b>Key Findings:</b>\n<ul><li>LDL 160</li></ul>\n<b>Patient-Friendly Explanation:</b>\n<ul><li>dup</li></ul>";
        let llm = Arc::new(ScriptedLlm::replying(&[raw, "<ul><li>ok</li></ul>"]));
        let pipeline = pipeline_with(llm.clone());

        let summary = pipeline
            .process_file(&UploadedFile::new("lab.pdf", "application/pdf", vec![]), &detailed_profile())
            .await
            .unwrap();

        assert!(summary.summary.contains("<p><b>Key Findings:</b></p>"));
        assert!(!summary.summary.contains("dup"));
        assert_eq!(summary.summary.matches("Patient-Friendly Explanation").count(), 1);

        let requests = llm.requests.lock().unwrap();
        assert!(requests[0].messages[1].content.contains("Cholesterol 240 mg/dL"));
        assert!(!requests[1].messages[1].content.contains("dup"));
    }

    #[tokio::test]
    async fn test_summary_emptied_by_cleanup_falls_back() {
        let llm = Arc::new(ScriptedLlm::replying(&[
            "<b>Patient-Friendly Explanation:</b><ul><li>x</li></ul>",
            "<ul><li>ok</li></ul>",
        ]));
        let pipeline = pipeline_with(llm.clone());

        let summary = pipeline
            .process_file(&image("scan.png"), &detailed_profile())
            .await
            .unwrap();

        assert!(summary.summary.contains(NO_SUMMARY));
        assert!(!summary.summary.contains("<li>x</li>"));
        assert!(llm.requests.lock().unwrap()[1].messages[1]
            .content
            .ends_with(NO_SUMMARY));
    }

    #[tokio::test]
    async fn test_failure_discards_earlier_summaries() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(Some("<b>first</b>".to_string())),
            Ok(Some("<ul><li>first</li></ul>".to_string())),
            Err(Error::Upstream {
                status: 503,
                details: json!({ "error": "unavailable" }),
            }),
        ]));
        let pipeline = pipeline_with(llm.clone());
        let files = vec![image("one.png"), image("two.png"), image("three.png")];

        let err = pipeline
            .process_batch(&files, &compact_profile())
            .await
            .unwrap_err();

        assert_eq!(err.status_code().as_u16(), 503);
        // Processing stops at the failing file.
        assert_eq!(llm.requests.lock().unwrap().len(), 3);
    }
}
