use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;

/// Deterministic in-process provider for tests.
///
/// Embeddings are token counts over a fixed vocabulary, L2-normalized, so
/// cosine ranking is exactly "which chunk shares the most query tokens".
/// Completions pop from scripted queues.
#[derive(Clone)]
pub struct StubBackend {
    vocab: Arc<Vec<String>>,
    completions: Arc<Mutex<VecDeque<String>>>,
    json_replies: Arc<Mutex<VecDeque<String>>>,
    default_reply: String,
}

impl StubBackend {
    pub fn with_vocab(words: &[&str]) -> Self {
        Self {
            vocab: Arc::new(words.iter().map(|w| (*w).to_lowercase()).collect()),
            completions: Arc::new(Mutex::new(VecDeque::new())),
            json_replies: Arc::new(Mutex::new(VecDeque::new())),
            default_reply: "Could you tell me more about that?".to_string(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.vocab.len()
    }

    pub fn push_completion(&self, text: impl Into<String>) {
        if let Ok(mut queue) = self.completions.lock() {
            queue.push_back(text.into());
        }
    }

    pub fn push_json(&self, value: Value) {
        self.push_json_text(value.to_string());
    }

    pub fn push_json_text(&self, text: impl Into<String>) {
        if let Ok(mut queue) = self.json_replies.lock() {
            queue.push_back(text.into());
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut counts = vec![0f32; self.vocab.len()];
        for token in tokenize(text) {
            if let Some(position) = self.vocab.iter().position(|word| *word == token) {
                if let Some(slot) = counts.get_mut(position) {
                    *slot += 1.0;
                }
            }
        }

        let norm: f32 = counts.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut counts {
                *value /= norm;
            }
        }
        counts
    }

    pub fn complete(&self) -> String {
        self.completions
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| self.default_reply.clone())
    }

    pub fn complete_json_text(&self) -> String {
        self.json_replies
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| "{}".to_string())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}
