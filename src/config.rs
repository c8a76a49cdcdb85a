//! Service settings and prompt profiles.
//!
//! Settings come from the environment (after `.env` is loaded). Prompt
//! profiles are built in, and more can be loaded from a directory of JSON
//! files that override built-ins with the same name.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_LLM_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_PROFILE: &str = "detailed";

/// Placeholder for the extracted report text in summarizer templates.
pub const REPORT_TEXT_PLACEHOLDER: &str = "{report_text}";
/// Placeholder for the summarizer output in simplifier templates.
pub const SUMMARY_HTML_PLACEHOLDER: &str = "{summary_html}";

// ============================================================================
// Settings
// ============================================================================

/// Which OCR backend to run for image uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrBackend {
    /// Local `tesseract` executable.
    Tesseract { binary: String },
    /// HTTP OCR sidecar at the given base URL.
    Sidecar { url: String },
}

/// Process-level settings read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub llm_api_url: String,
    pub bind_addr: SocketAddr,
    pub max_files: usize,
    pub max_body_bytes: usize,
    pub llm_timeout: Option<Duration>,
    pub ocr_backend: OcrBackend,
    pub ocr_lang: String,
    pub profiles_dir: Option<PathBuf>,
    pub default_profile: String,
}

impl Settings {
    /// Read settings from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("GROQ_API_KEY")
            .filter(|k| !k.is_empty())
            .context("GROQ_API_KEY environment variable not set")?;

        let host = lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(&lookup, "PORT", 3001)?;
        let bind_addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("Invalid BIND_ADDR/PORT: {}:{}", host, port))?;

        let llm_timeout = lookup("LLM_TIMEOUT_SECS")
            .map(|v| {
                v.parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("Invalid LLM_TIMEOUT_SECS: {}", v))
            })
            .transpose()?;

        let ocr_backend = match lookup("OCR_URL").filter(|u| !u.is_empty()) {
            Some(url) => OcrBackend::Sidecar {
                url: url.trim_end_matches('/').to_string(),
            },
            None => OcrBackend::Tesseract {
                binary: lookup("TESSERACT_BIN").unwrap_or_else(|| "tesseract".to_string()),
            },
        };

        Ok(Self {
            api_key,
            llm_api_url: lookup("LLM_API_URL").unwrap_or_else(|| DEFAULT_LLM_API_URL.to_string()),
            bind_addr,
            max_files: parse_or(&lookup, "MAX_FILES", 10)?,
            max_body_bytes: parse_or(&lookup, "MAX_BODY_BYTES", 100 * 1024 * 1024)?,
            llm_timeout,
            ocr_backend,
            ocr_lang: lookup("OCR_LANG").unwrap_or_else(|| "eng".to_string()),
            profiles_dir: lookup("PROFILES_DIR").map(PathBuf::from),
            default_profile: lookup("DEFAULT_PROFILE").unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

// ============================================================================
// Prompt profiles
// ============================================================================

/// One chat-completion call described as data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub model: String,
    /// System message (style guide).
    pub system: String,
    /// User message; the input is substituted for the stage's placeholder.
    pub user_template: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl PromptTemplate {
    /// Substitute `value` for every occurrence of `placeholder`.
    pub fn render(&self, placeholder: &str, value: &str) -> String {
        self.user_template.replace(placeholder, value)
    }
}

/// Post-processing applied to summarizer output before it is reused.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SummaryCleanup {
    /// Wrap standalone `<b>...</b>` heading lines in `<p>`.
    #[serde(default)]
    pub normalize_headings: bool,
    /// Drop a trailing "Patient-Friendly Explanation" section.
    #[serde(default)]
    pub truncate_explanation: bool,
}

/// Prompt variant for both LLM stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub summarizer: PromptTemplate,
    pub simplifier: PromptTemplate,
    #[serde(default)]
    pub cleanup: SummaryCleanup,
}

impl PromptProfile {
    /// Each stage's user template must embed that stage's input.
    pub fn validate(&self) -> Result<()> {
        let stages = [
            ("summarizer", &self.summarizer, REPORT_TEXT_PLACEHOLDER),
            ("simplifier", &self.simplifier, SUMMARY_HTML_PLACEHOLDER),
        ];
        for (stage, template, placeholder) in stages {
            if !template.user_template.contains(placeholder) {
                anyhow::bail!(
                    "Profile {:?}: {}.user_template is missing the {} placeholder",
                    self.name,
                    stage,
                    placeholder
                );
            }
        }
        Ok(())
    }
}

/// Loaded prompt profiles.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    profiles: HashMap<String, PromptProfile>,
    default_profile: String,
}

impl ProfileStore {
    /// Built-in profiles only.
    pub fn builtin() -> Self {
        let profiles = [detailed_profile(), compact_profile()]
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();

        Self {
            profiles,
            default_profile: DEFAULT_PROFILE.to_string(),
        }
    }

    /// Built-ins, overlaid with every `*.json` profile found in `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut store = Self::builtin();

        if !dir.exists() {
            anyhow::bail!("Profile directory does not exist: {:?}", dir);
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read profile: {:?}", path))?;

                let profile: PromptProfile = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse profile: {:?}", path))?;
                profile
                    .validate()
                    .with_context(|| format!("Invalid profile: {:?}", path))?;

                info!("Loaded profile: {} from {:?}", profile.name, path);
                store.profiles.insert(profile.name.clone(), profile);
            }
        }

        Ok(store)
    }

    /// Choose which profile `/upload` uses without `?profile=`.
    pub fn with_default(mut self, name: &str) -> Result<Self> {
        if !self.profiles.contains_key(name) {
            anyhow::bail!("Default profile {:?} not found. Available: {:?}", name, self.list());
        }
        self.default_profile = name.to_string();
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&PromptProfile> {
        self.profiles.get(name)
    }

    pub fn default_profile(&self) -> &PromptProfile {
        &self.profiles[&self.default_profile]
    }

    /// Profile names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

// ============================================================================
// Built-in prompts
// ============================================================================

const SUMMARIZER_MODEL: &str = "llama3-70b-8192";
const SIMPLIFIER_MODEL: &str = "llama-3.3-70b-versatile";

const SUMMARIZER_STYLE_GUIDE: &str = r#"You are a helpful medical summarizer that outputs clean, well-formatted HTML with bold headings and lists.
You are a medical report interpretation assistant.

Your task is to read a patient's medical report and produce a detailed, structured explanation that combines clinical accuracy with patient understanding.

Follow these rules:

1. Tone & Style
   - Professional but clear.
   - Avoid jargon where possible; when using medical terms, include a short explanation in parentheses.
   - Avoid fear-based wording unless results indicate a serious health risk.

2. Structure
   - Use HTML <b>bold headings</b> for each section, each heading on its own line.
   - Use <ul><li>...</li></ul> for lists where appropriate.
   - Patient Information: <strong>Name:</strong>, <strong>Age:</strong>, <strong>Gender:</strong>, <strong>Patient ID:</strong>, <strong>Date of Admission:</strong>, <strong>Date of Discharge:</strong>, <strong>Hospital:</strong>, <strong>Consultant:</strong>
   - Report Summary: the type of test, when it was done, and the laboratory.
   - Key Findings: main results with values, units, and reference ranges.
   - Interpretation: what each finding means in plain language.
   - Possible Causes: medical and non-medical factors that may influence the results.
   - Limitations: factors that might affect accuracy or require further tests.
   - Suggested Next Steps: follow-up actions or discussions with a healthcare provider.
   - Do not write a patient-friendly explanation section; it is produced separately.

3. Detail Level
   - Always include <b>exact values</b> and <b>reference ranges</b>, keeping the precision printed in the report.
   - Mention whether results are normal, borderline, or abnormal.
   - Link each value to its possible health significance.

4. Readability
   - Use short paragraphs or bullet points for clarity.
   - Keep sentences under 20 words when possible.
   - Preserve all formatting using HTML tags for headings, lists, and paragraphs.

5. Patient Context
   - Relate findings to the patient's health and potential future risks.
   - Provide a concise summary of the overall health status at the end.

Your goal: deliver an explanation that retains full medical precision, includes methodology and reference ranges, and is understandable for an educated patient. Output must be well-formatted HTML."#;

const DETAILED_USER_TEMPLATE: &str = r#"<b>Patient Information:</b>
<ul>
  <li><strong>Name:</strong></li>
  <li><strong>Age:</strong></li>
  <li><strong>Gender:</strong></li>
  <li><strong>Patient ID:</strong></li>
  <li><strong>Date of Admission:</strong></li>
  <li><strong>Date of Discharge:</strong></li>
  <li><strong>Hospital:</strong></li>
  <li><strong>Consultant:</strong></li>
</ul>

<b>Key Findings:</b>
<ul>
  <li>Finding with value, unit and reference range</li>
</ul>

<b>Interpretation:</b>
<ul>
  <li>What each finding means</li>
</ul>

<b>Possible Causes:</b>
<ul>
  <li>Cause</li>
</ul>

<b>Limitations / Suggested Next Steps:</b>
<ul>
  <li>Next step</li>
</ul>

Report text:
"""
{report_text}
""""#;

const COMPACT_USER_TEMPLATE: &str = r#"<b>Patient Information:</b>
<ul>
  <li><strong>Name:</strong></li>
  <li><strong>Age:</strong></li>
  <li><strong>Gender:</strong></li>
  <li><strong>Patient ID:</strong></li>
  <li><strong>Date of Admission:</strong></li>
  <li><strong>Date of Discharge:</strong></li>
  <li><strong>Hospital:</strong></li>
  <li><strong>Consultant:</strong></li>
</ul>

<b>Key Findings:</b>
<ul>
  <li>Finding 1</li>
  <li>Finding 2</li>
  <li>Finding 3</li>
</ul>

<b>Impression:</b>
<one short paragraph>

<b>Suggested Next Steps:</b>
<ul>
  <li>Next Step 1</li>
  <li>Next Step 2</li>
  <li>Next Step 3</li>
</ul>

Report text:
"""
{report_text}
""""#;

const SIMPLIFIER_STYLE_GUIDE: &str = r#"You are an expert medical report explainer whose primary goal is to help patients understand their medical summaries in clear, simple language.

Your task is to take a medical report summary and rewrite it in a way that is easy for patients to understand.

Focus on the most important findings, potential risks, and recommended next steps. Avoid medical terminology and jargon wherever possible. If you must use a medical term, add a brief explanation in brackets so the patient can easily grasp its meaning.

Present your output strictly as an HTML unordered list (<ul><li>...</li></ul>) containing exactly 4 to 6 bullet points. Each bullet is a short, direct sentence of no more than 18 words, written in a warm, reassuring manner.
Do not include any introductory or closing remarks, and do not add any text outside the list.

Your goal is to empower patients with clear, actionable information about their health in a format they can easily share or refer to."#;

const SIMPLIFIER_USER_TEMPLATE: &str = "Rewrite this for a patient in short bullet points:\n{summary_html}";

fn simplifier_template() -> PromptTemplate {
    PromptTemplate {
        model: SIMPLIFIER_MODEL.to_string(),
        system: SIMPLIFIER_STYLE_GUIDE.to_string(),
        user_template: SIMPLIFIER_USER_TEMPLATE.to_string(),
        temperature: None,
        max_tokens: None,
    }
}

/// Full clinical breakdown with causes and limitations.
pub fn detailed_profile() -> PromptProfile {
    PromptProfile {
        name: "detailed".to_string(),
        description: "Clinical summary with interpretation, causes and limitations".to_string(),
        summarizer: PromptTemplate {
            model: SUMMARIZER_MODEL.to_string(),
            system: SUMMARIZER_STYLE_GUIDE.to_string(),
            user_template: DETAILED_USER_TEMPLATE.to_string(),
            temperature: Some(0.3),
            max_tokens: Some(2048),
        },
        simplifier: simplifier_template(),
        cleanup: SummaryCleanup {
            normalize_headings: true,
            truncate_explanation: true,
        },
    }
}

/// Short findings/impression layout.
pub fn compact_profile() -> PromptProfile {
    PromptProfile {
        name: "compact".to_string(),
        description: "Key findings, impression and next steps".to_string(),
        summarizer: PromptTemplate {
            model: SUMMARIZER_MODEL.to_string(),
            system: SUMMARIZER_STYLE_GUIDE.to_string(),
            user_template: COMPACT_USER_TEMPLATE.to_string(),
            temperature: Some(0.3),
            max_tokens: Some(2048),
        },
        simplifier: simplifier_template(),
        cleanup: SummaryCleanup::default(),
    }
}
