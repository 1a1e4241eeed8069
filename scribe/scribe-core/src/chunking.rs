//! Token-bounded, overlapping text chunks for independent summarization.
//!
//! Text is encoded with the `cl100k_base` BPE, cut into windows of
//! `chunk_size` tokens that advance by `chunk_size - overlap`, and each
//! window is decoded back to text. When the BPE is unavailable the same
//! windowing runs over characters at four characters per token.

use tiktoken_rs::CoreBPE;

use crate::tokens::cl100k;

/// Characters per token used by the character-window fallback.
const FALLBACK_CHARS_PER_TOKEN: usize = 4;

/// How many tokens a window edge may move to land on a UTF-8 boundary.
const BOUNDARY_SLACK: usize = 3;

/// Splits long text into overlapping chunks measured in tokens.
///
/// `overlap < chunk_size` is a precondition. If it is violated the splitter
/// still advances by at least one token per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkSplitter {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }

    /// Split `text` into chunks.
    ///
    /// Blank input yields no chunks. Non-blank input always yields at least
    /// one chunk, and no returned chunk is blank.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chunks = match cl100k() {
            Some(bpe) => self.split_tokens(bpe, text),
            None => {
                tracing::warn!("BPE tokenizer unavailable, splitting on character windows");
                self.split_chars(text)
            }
        };

        finish(text, chunks)
    }

    fn split_tokens(&self, bpe: &CoreBPE, text: &str) -> Vec<String> {
        let tokens = bpe.encode_with_special_tokens(text);
        let decode = |from: usize, to: usize| bpe.decode(tokens[from..to].to_vec()).ok();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < tokens.len() {
            let end = (start + self.chunk_size).min(tokens.len());
            if let Some(chunk) = decode_window(&decode, tokens.len(), start, end) {
                chunks.push(chunk);
            }
            if end == tokens.len() {
                break;
            }
            start += self.step();
        }

        chunks
    }

    fn split_chars(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let size = self.chunk_size * FALLBACK_CHARS_PER_TOKEN;
        let step = self.step() * FALLBACK_CHARS_PER_TOKEN;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

/// Decode the window `start..end`, nudging the edges when a window cuts a
/// multi-byte character in half. The end is extended first so that text is
/// not lost; the start is only skipped forward when extension is not enough.
fn decode_window<F>(decode: &F, len: usize, start: usize, end: usize) -> Option<String>
where
    F: Fn(usize, usize) -> Option<String>,
{
    for skip in 0..=BOUNDARY_SLACK {
        for extend in 0..=BOUNDARY_SLACK {
            let from = start + skip;
            let to = (end + extend).min(len);
            if from >= to {
                continue;
            }
            if let Some(text) = decode(from, to) {
                return Some(text);
            }
            if to == len {
                break;
            }
        }
    }
    tracing::debug!(start, end, "Could not decode chunk window, skipping");
    None
}

/// Drop blank chunks. If nothing is left, the whole text becomes one chunk.
fn finish(text: &str, chunks: Vec<String>) -> Vec<String> {
    let chunks: Vec<String> = chunks
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect();

    if chunks.is_empty() {
        tracing::debug!("Splitter produced no chunks, keeping text whole");
        return vec![text.to_string()];
    }

    chunks
}

/// Split `text` into token chunks of `chunk_size` with `overlap` tokens shared
/// between neighbours.
pub fn split_text_into_chunks(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    ChunkSplitter::new(chunk_size, overlap).split(text)
}
