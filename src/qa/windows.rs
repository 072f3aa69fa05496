//! Token-bounded context windows for question answering.
//!
//! QA models only see a fixed number of tokens at a time, so long documents are split into
//! overlapping windows and each window is answered separately. Boundaries come from
//! `semchunk-rs`; token counts come from `tiktoken-rs`, with a whitespace counter as the last
//! resort when no encoding can be built.

use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model};

/// Counts the tokens in a string.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Build a token counter for `model`.
///
/// Encoder models served for QA rarely have a `tiktoken` encoding of their own, so unknown
/// names fall back to `cl100k_base`, and then to whitespace counting.
pub fn build_token_counter(model: &str) -> TokenCounter {
    match resolve_encoding(model.trim()) {
        Ok(encoding) => {
            let encoding = Arc::new(encoding);
            Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len())
        }
        Err(error) => {
            tracing::warn!(
                model,
                error = %error,
                "Tokenizer unavailable; falling back to whitespace counter"
            );
            whitespace_token_counter()
        }
    }
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(error) => {
            tracing::debug!(
                model,
                error = %error,
                "No tokenizer registered for model; using 'cl100k_base'"
            );
            cl100k_base()
        }
    }
}

/// Counts whitespace separated words; non-blank text always counts as at least one token.
pub fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

/// Split `text` into at most `max_windows` windows of at most `max_tokens` tokens each.
///
/// Consecutive windows share up to `stride` tokens: every window after the first starts with
/// the tail of the previous semantic chunk.
pub fn context_windows(
    text: &str,
    max_tokens: usize,
    stride: usize,
    max_windows: usize,
    counter: &TokenCounter,
) -> Vec<String> {
    if max_tokens == 0 || max_windows == 0 || text.trim().is_empty() {
        return Vec::new();
    }
    if counter.as_ref()(text) <= max_tokens {
        return vec![text.trim().to_string()];
    }

    let stride = stride.min(max_tokens.saturating_sub(1));
    let base_size = (max_tokens - stride).max(1);
    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        base_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );

    let chunks = chunker.chunk(text);
    let mut windows = Vec::with_capacity(chunks.len().min(max_windows));
    let mut previous: Option<&str> = None;
    for chunk in &chunks {
        if windows.len() == max_windows {
            tracing::debug!(
                total = chunks.len(),
                kept = max_windows,
                "Context window limit reached"
            );
            break;
        }
        let window = match previous {
            Some(previous) if stride > 0 => {
                let tail = tail_with_token_limit(previous, stride, counter);
                join_with_space(tail, chunk)
            }
            _ => chunk.clone(),
        };
        windows.push(trim_start_to_budget(&window, max_tokens, counter));
        previous = Some(chunk);
    }
    windows
}

/// Keep the head of `text` that fits in `budget` tokens.
pub fn truncate_to_tokens(text: &str, budget: usize, counter: &TokenCounter) -> String {
    if counter.as_ref()(text) <= budget {
        return text.to_string();
    }

    let boundaries = char_boundaries(text);

    // Largest prefix whose token count fits.
    let (mut low, mut high) = (0, boundaries.len() - 1);
    while low < high {
        let mid = (low + high).div_ceil(2);
        if counter.as_ref()(&text[..boundaries[mid]]) <= budget {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    text[..boundaries[low]].trim_end().to_string()
}

fn join_with_space(tail: &str, current: &str) -> String {
    if tail.is_empty() {
        return current.to_string();
    }
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
    combined.push_str(tail);
    let tail_space = tail.chars().next_back().is_some_and(char::is_whitespace);
    let current_space = current.chars().next().is_some_and(char::is_whitespace);
    if !tail_space && !current_space {
        combined.push(' ');
    }
    combined.push_str(current);
    combined
}

fn tail_with_token_limit<'a>(text: &'a str, limit: usize, counter: &TokenCounter) -> &'a str {
    let fits = |offset: usize| counter.as_ref()(text[offset..].trim_start()) <= limit;
    if fits(0) {
        return text.trim_start();
    }

    let boundaries = char_boundaries(text);

    // Smallest suffix offset whose token count fits; the suffix at `text.len()` always does.
    let (mut low, mut high) = (0, boundaries.len() - 1);
    while low < high {
        let mid = (low + high) / 2;
        if fits(boundaries[mid]) {
            high = mid;
        } else {
            low = mid + 1;
        }
    }
    text[boundaries[low]..].trim_start()
}

fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect()
}

fn trim_start_to_budget(text: &str, budget: usize, counter: &TokenCounter) -> String {
    tail_with_token_limit(text, budget, counter).to_string()
}
