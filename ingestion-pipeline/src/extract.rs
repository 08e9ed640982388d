use async_trait::async_trait;
use common::error::AppError;

/// Extraction output: per-page text when the format carries pages, a single
/// page otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub pages: Vec<String>,
}

impl ExtractedText {
    pub fn page_count(&self) -> u32 {
        u32::try_from(self.pages.len()).unwrap_or(u32::MAX)
    }

    pub fn full_text(&self) -> String {
        self.pages.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|page| page.trim().is_empty())
    }
}

/// External collaborator turning uploaded bytes into text.
///
/// PDF/DOCX/PPTX parsing lives outside the core; deployments plug their
/// extractor in here. The built-in implementation handles plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8], mime: &str) -> Result<ExtractedText, AppError>;
}

/// Plain-text extraction with form-feed page breaks.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, bytes: &[u8], mime: &str) -> Result<ExtractedText, AppError> {
        match mime {
            "text/plain" | "text/markdown" => {
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    AppError::Validation(format!("document is not valid UTF-8: {e}"))
                })?;

                let pages: Vec<String> = text.split('\u{c}').map(str::to_owned).collect();
                Ok(ExtractedText { pages })
            }
            other => Err(AppError::Validation(format!(
                "no extractor registered for mime type '{other}'"
            ))),
        }
    }
}
