use crate::error::IngestError;
use crate::models::Chunk;
use regex::Regex;

pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 1_000;

/// Decides whether a line opens a new chunk.
pub trait BoundaryPredicate: Send + Sync {
    fn is_boundary(&self, line: &str) -> bool;
}

impl<F> BoundaryPredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_boundary(&self, line: &str) -> bool {
        self(line)
    }
}

/// Top-level markdown heading: one marker character followed by a space.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownHeading {
    pub marker: char,
}

impl Default for MarkdownHeading {
    fn default() -> Self {
        Self { marker: '#' }
    }
}

impl BoundaryPredicate for MarkdownHeading {
    fn is_boundary(&self, line: &str) -> bool {
        let mut chars = line.chars();
        chars.next() == Some(self.marker) && chars.next() == Some(' ')
    }
}

#[derive(Debug, Clone)]
pub struct RegexBoundary {
    pattern: Regex,
}

impl RegexBoundary {
    pub fn new(pattern: &str) -> Result<Self, IngestError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl BoundaryPredicate for RegexBoundary {
    fn is_boundary(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }
}

pub struct Chunker {
    max_len: usize,
    boundary: Box<dyn BoundaryPredicate>,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_LENGTH)
    }
}

impl Chunker {
    pub fn new(max_len: usize) -> Self {
        Self::with_boundary(max_len, MarkdownHeading::default())
    }

    pub fn with_boundary(max_len: usize, boundary: impl BoundaryPredicate + 'static) -> Self {
        Self {
            max_len,
            boundary: Box::new(boundary),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Single greedy pass over lines. A boundary line always opens a new
    /// chunk. Before a line is appended, the buffer is flushed if the
    /// joined text (buffer + newline + line) would exceed `max_len`, so the
    /// triggering line starts the next chunk. Lines are never split.
    pub fn chunk(&self, source_id: &str, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut buffer = Buffer::default();

        for line in text.split('\n') {
            let line_len = line.chars().count();
            let starts_section = self.boundary.is_boundary(line);

            if !buffer.is_empty() && (starts_section || buffer.len_with(line_len) > self.max_len)
            {
                buffer.flush_into(&mut chunks, source_id);
            }

            buffer.push(line, line_len);
        }

        buffer.flush_into(&mut chunks, source_id);
        chunks
    }
}

#[derive(Default)]
struct Buffer {
    text: String,
    chars: usize,
    lines: usize,
}

impl Buffer {
    fn is_empty(&self) -> bool {
        self.lines == 0
    }

    fn len_with(&self, line_len: usize) -> usize {
        self.chars + 1 + line_len
    }

    fn push(&mut self, line: &str, line_len: usize) {
        if self.lines > 0 {
            self.text.push('\n');
            self.chars += 1;
        }
        self.text.push_str(line);
        self.chars += line_len;
        self.lines += 1;
    }

    fn flush_into(&mut self, chunks: &mut Vec<Chunk>, source_id: &str) {
        let text = std::mem::take(&mut self.text);
        self.chars = 0;
        self.lines = 0;

        if text.trim().is_empty() {
            return;
        }

        chunks.push(Chunk {
            text,
            source_id: source_id.to_string(),
            sequence_index: chunks.len() as u64,
        });
    }
}

pub fn chunk(source_id: &str, text: &str, max_len: usize) -> Vec<Chunk> {
    Chunker::new(max_len).chunk(source_id, text)
}
