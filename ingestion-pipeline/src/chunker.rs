use common::{error::AppError, utils::config::ChunkerSettings};
use text_splitter::{ChunkConfig, ChunkSizer, TextSplitter};

/// One chunk in document reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPiece {
    pub ordinal: u32,
    pub text: String,
    pub page: Option<u32>,
}

/// Deterministic byte-pair-like token counter.
///
/// Alphanumeric runs count one token per four characters (rounded up);
/// every other non-whitespace character counts as one token. Close enough
/// to the provider's tokenizer for sizing, with no model download and the
/// same answer on every deployment.
pub struct ApproxTokenCounter;

pub fn approx_token_count(text: &str) -> usize {
    let mut tokens = 0usize;
    let mut run_len = 0usize;

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            run_len = run_len.saturating_add(1);
        } else {
            tokens = tokens.saturating_add(run_len.div_ceil(4));
            run_len = 0;
            if !ch.is_whitespace() {
                tokens = tokens.saturating_add(1);
            }
        }
    }
    tokens.saturating_add(run_len.div_ceil(4))
}

impl ChunkSizer for ApproxTokenCounter {
    fn size(&self, chunk: &str) -> usize {
        approx_token_count(chunk)
    }
}

/// Split one text into overlapping chunks. Pure and deterministic: the same
/// input and settings always produce the same pieces.
pub fn chunk_text(text: &str, settings: &ChunkerSettings) -> Result<Vec<ChunkPiece>, AppError> {
    let pieces = split_text(text, settings)?;

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(ordinal, text)| ChunkPiece {
            ordinal: u32::try_from(ordinal).unwrap_or(u32::MAX),
            text,
            page: None,
        })
        .collect())
}

/// Split per-page texts, carrying 1-based page numbers through and keeping
/// the ordinal contiguous across pages.
pub fn chunk_pages(pages: &[String], settings: &ChunkerSettings) -> Result<Vec<ChunkPiece>, AppError> {
    let mut out = Vec::new();
    let mut ordinal = 0u32;

    for (page_index, page_text) in pages.iter().enumerate() {
        let page_number = u32::try_from(page_index).unwrap_or(u32::MAX).saturating_add(1);
        for text in split_text(page_text, settings)? {
            out.push(ChunkPiece {
                ordinal,
                text,
                page: Some(page_number),
            });
            ordinal = ordinal.saturating_add(1);
        }
    }

    Ok(out)
}

fn split_text(text: &str, settings: &ChunkerSettings) -> Result<Vec<String>, AppError> {
    if settings.size_tokens == 0 {
        return Err(AppError::Validation(
            "chunker.size_tokens must be greater than zero".into(),
        ));
    }
    if settings.overlap_tokens >= settings.size_tokens {
        return Err(AppError::Validation(format!(
            "chunker.size_tokens must exceed the configured overlap of {}",
            settings.overlap_tokens
        )));
    }

    let chunk_config = ChunkConfig::new(settings.size_tokens)
        .with_overlap(settings.overlap_tokens)
        .map_err(|e| AppError::Validation(format!("invalid chunk overlap: {e}")))?
        .with_sizer(ApproxTokenCounter);
    let splitter = TextSplitter::new(chunk_config);

    let chunks: Vec<String> = splitter.chunks(text).map(str::to_owned).collect();

    Ok(chunks)
}
