//! Output buffer with tail-bounded prompt search.
//!
//! Device prompts only ever appear at the end of the received output, so
//! prompt patterns are searched against the last `search_depth` bytes of the
//! buffer rather than the whole thing. For large outputs (full routing
//! tables with paging disabled), this keeps each wait O(search_depth).
//!
//! ANSI escape sequences are stripped as data is appended, before any
//! pattern matching, so prompt regexes never have to account for them.

use std::fmt;
use std::ops::Range;

use regex::bytes::Regex;
use vte::{Params, Perform};

/// Buffer accumulating transport output between prompt matches.
pub struct OutputBuffer {
    buffer: Vec<u8>,

    /// How many bytes from the end to search for prompt patterns.
    search_depth: usize,

    /// Escape-sequence parser state, persisted so sequences split across
    /// read chunks are still stripped.
    parser: vte::Parser,
}

impl OutputBuffer {
    /// Create a new buffer searching the last `search_depth` bytes.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            search_depth,
            parser: vte::Parser::new(),
        }
    }

    /// Append raw transport data, stripping ANSI escape sequences.
    pub fn extend(&mut self, data: &[u8]) {
        let mut filter = AnsiFilter {
            out: &mut self.buffer,
        };
        self.parser.advance(&mut filter, data);
    }

    /// Search the tail of the buffer for `pattern`.
    ///
    /// Returns the match range in absolute buffer offsets.
    pub fn search_tail(&self, pattern: &Regex) -> Option<Range<usize>> {
        let start = self.buffer.len().saturating_sub(self.search_depth);
        let tail = &self.buffer[start..];
        pattern
            .find(tail)
            .map(|m| start + m.start()..start + m.end())
    }

    /// Check whether the buffer contains a literal byte string anywhere.
    pub fn contains(&self, needle: &[u8]) -> bool {
        memchr::memmem::find(&self.buffer, needle).is_some()
    }

    /// Split the buffer at a match range: everything before the match is
    /// returned together with the matched text, and the buffer keeps only
    /// what followed the match.
    pub fn split_match(&mut self, range: Range<usize>) -> (Vec<u8>, Vec<u8>) {
        let rest = self.buffer.split_off(range.end);
        let matched = self.buffer.split_off(range.start);
        let before = std::mem::replace(&mut self.buffer, rest);
        (before, matched)
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("len", &self.buffer.len())
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// `vte::Perform` sink that keeps printable text and line-control bytes,
/// dropping escape sequences and other control characters.
struct AnsiFilter<'a> {
    out: &'a mut Vec<u8>,
}

impl Perform for AnsiFilter<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.out.push(byte);
        }
    }

    fn hook(&mut self, _: &Params, _: &[u8], _: bool, _: char) {}
    fn put(&mut self, _: u8) {}
    fn unhook(&mut self) {}
    fn osc_dispatch(&mut self, _: &[&[u8]], _: bool) {}
    fn csi_dispatch(&mut self, _: &Params, _: &[u8], _: bool, _: char) {}
    fn esc_dispatch(&mut self, _: &[u8], _: bool, _: u8) {}
}
