use crate::error::RagError;
use crate::normalize::{normalize_text, word_count};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Chunks with this many words or fewer carry no retrievable content.
pub const MIN_MEANINGFUL_WORDS: usize = 5;
pub const DEFAULT_WINDOW_CHARS: usize = 1_000;
pub const DEFAULT_WINDOW_TOKENS: usize = 50;

static SENTENCE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[.!?]+(?:\s+|$)|\n\s*\n").expect("sentence break pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Contiguous, non-overlapping character windows over normalized text.
    FixedWindow { max_chars: usize },
    /// Contiguous windows of whitespace-separated words.
    TokenWindow { tokens: usize },
    /// One candidate per sentence of the raw text.
    Sentence,
}

impl Default for ChunkingStrategy {
    fn default() -> Self {
        Self::FixedWindow {
            max_chars: DEFAULT_WINDOW_CHARS,
        }
    }
}

impl ChunkingStrategy {
    /// Stable name, also used as the record id prefix for strategy ingestion.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FixedWindow { .. } => "fixed_window_split",
            Self::TokenWindow { .. } => "token_text_split",
            Self::Sentence => "semantic_chunk",
        }
    }

    pub fn validate(&self) -> Result<(), RagError> {
        match self {
            Self::FixedWindow { max_chars: 0 } => Err(RagError::Validation(
                "fixed window size must be greater than zero".to_string(),
            )),
            Self::TokenWindow { tokens: 0 } => Err(RagError::Validation(
                "token window size must be greater than zero".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Splits raw text into normalized chunks in source order, keeping only
    /// chunks with more than [`MIN_MEANINGFUL_WORDS`] words.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let candidates = match *self {
            Self::FixedWindow { max_chars } => chunk_fixed_window(&normalize_text(text), max_chars),
            Self::TokenWindow { tokens } => chunk_token_window(&normalize_text(text), tokens),
            Self::Sentence => chunk_sentences(text),
        };

        retain_meaningful(candidates)
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedWindow { max_chars } => write!(f, "{}({max_chars} chars)", self.name()),
            Self::TokenWindow { tokens } => write!(f, "{}({tokens} tokens)", self.name()),
            Self::Sentence => f.write_str(self.name()),
        }
    }
}

impl FromStr for ChunkingStrategy {
    type Err = RagError;

    /// Accepts `name` or `name:size`, e.g. `token_text_split:80` or `fixed:500`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (name, size) = match value.split_once(':') {
            Some((name, size)) => {
                let size = size.trim().parse::<usize>().map_err(|_| {
                    RagError::Validation(format!("invalid chunk window size in '{value}'"))
                })?;
                (name.trim(), Some(size))
            }
            None => (value.trim(), None),
        };

        let strategy = match name.to_ascii_lowercase().as_str() {
            "fixed" | "fixed_window" | "fixed_window_split" => Self::FixedWindow {
                max_chars: size.unwrap_or(DEFAULT_WINDOW_CHARS),
            },
            "token" | "token_window" | "token_text_split" => Self::TokenWindow {
                tokens: size.unwrap_or(DEFAULT_WINDOW_TOKENS),
            },
            "sentence" | "semantic" | "semantic_chunk" => Self::Sentence,
            other => {
                return Err(RagError::Validation(format!(
                    "unknown chunking strategy '{other}'"
                )))
            }
        };

        strategy.validate()?;
        Ok(strategy)
    }
}

pub fn is_meaningful(chunk: &str) -> bool {
    word_count(chunk) > MIN_MEANINGFUL_WORDS
}

pub fn retain_meaningful(chunks: Vec<String>) -> Vec<String> {
    chunks.into_iter().filter(|chunk| is_meaningful(chunk)).collect()
}

pub fn chunk_fixed_window(normalized: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = normalized.chars().collect();
    if chars.is_empty() || max_chars == 0 {
        return Vec::new();
    }

    chars
        .chunks(max_chars)
        .map(|window| window.iter().collect::<String>().trim().to_string())
        .filter(|window| !window.is_empty())
        .collect()
}

pub fn chunk_token_window(normalized: &str, tokens: usize) -> Vec<String> {
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.is_empty() || tokens == 0 {
        return Vec::new();
    }

    words.chunks(tokens).map(|window| window.join(" ")).collect()
}

pub fn chunk_sentences(raw: &str) -> Vec<String> {
    SENTENCE_BREAK
        .split(raw)
        .map(normalize_text)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}
