//! Paragraph chunking.
//!
//! Text is split on blank lines first. Paragraphs longer than the chunk size
//! are split on sentence boundaries and the sentences packed greedily back
//! together; a single oversized sentence is cut at character boundaries.
//! Offsets are byte positions into the source text, so
//! `&text[chunk.char_start..chunk.char_end] == chunk.text`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Default maximum chunk length in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 512;
const MIN_CHUNK_SIZE: usize = 16;

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[.!?]+["')\]]*\s+"#).unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: usize,
    /// Byte offset of the first byte, always on a char boundary.
    pub char_start: usize,
    /// Byte offset one past the last byte.
    pub char_end: usize,
}

/// Splits text into chunks of at most `chunk_size` bytes.
pub struct ParagraphChunker {
    chunk_size: usize,
}

impl Default for ParagraphChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ParagraphChunker {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(MIN_CHUNK_SIZE),
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let mut spans = Vec::new();
        for (start, end) in paragraph_spans(text) {
            self.split_paragraph(text, start, end, &mut spans);
        }
        spans
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| TextChunk {
                text: text[start..end].to_string(),
                chunk_index: i,
                char_start: start,
                char_end: end,
            })
            .collect()
    }

    fn split_paragraph(&self, text: &str, start: usize, end: usize, out: &mut Vec<(usize, usize)>) {
        if end - start <= self.chunk_size {
            out.push((start, end));
            return;
        }

        let mut sentences = Vec::new();
        let mut cursor = start;
        for m in SENTENCE_END.find_iter(&text[start..end]) {
            push_trimmed(text, cursor, start + m.end(), &mut sentences);
            cursor = start + m.end();
        }
        push_trimmed(text, cursor, end, &mut sentences);

        let mut current: Option<(usize, usize)> = None;
        for (s, e) in sentences {
            if e - s > self.chunk_size {
                out.extend(current.take());
                self.hard_split(text, s, e, out);
                continue;
            }
            current = match current {
                Some((cs, _)) if e - cs <= self.chunk_size => Some((cs, e)),
                Some(done) => {
                    out.push(done);
                    Some((s, e))
                }
                None => Some((s, e)),
            };
        }
        out.extend(current);
    }

    fn hard_split(&self, text: &str, start: usize, end: usize, out: &mut Vec<(usize, usize)>) {
        let mut pos = start;
        while pos < end {
            let mut cut = (pos + self.chunk_size).min(end);
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            push_trimmed(text, pos, cut, out);
            pos = cut;
        }
    }
}

fn paragraph_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    for sep in PARAGRAPH_BREAK.find_iter(text) {
        push_trimmed(text, cursor, sep.start(), &mut spans);
        cursor = sep.end();
    }
    push_trimmed(text, cursor, text.len(), &mut spans);
    spans
}

fn push_trimmed(text: &str, start: usize, end: usize, out: &mut Vec<(usize, usize)>) {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = slice.len() - slice.trim_start().len();
    out.push((start + lead, start + lead + trimmed.len()));
}
