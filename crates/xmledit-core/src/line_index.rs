//! Rope-backed line index.
//!
//! All positions here are 0-based and expressed in characters (Unicode scalar values).
//! The public buffer API converts to the 1-based line numbers used by XML line info.

use ropey::Rope;

/// Logical line index over the document text, O(log N) per lookup or edit.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    rope: Rope,
}

impl LineIndex {
    /// Create an empty index (one empty line).
    pub fn new() -> Self {
        Self { rope: Rope::new() }
    }

    /// Build the index from text.
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    /// Number of lines. An empty document has one line.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Total character count.
    pub fn char_count(&self) -> usize {
        self.rope.len_chars()
    }

    /// Character offset of the first character of `line`.
    pub fn line_to_char(&self, line: usize) -> Option<usize> {
        if line >= self.rope.len_lines() {
            return None;
        }
        Some(self.rope.line_to_char(line))
    }

    /// Character offset just past the last character of `line`, excluding the newline.
    pub fn line_end_char(&self, line: usize) -> Option<usize> {
        let start = self.line_to_char(line)?;
        Some(start + self.line_len_chars(line))
    }

    /// Number of characters on `line`, excluding the trailing newline.
    fn line_len_chars(&self, line: usize) -> usize {
        let slice = self.rope.line(line);
        let mut len = slice.len_chars();
        if len > 0 && slice.char(len - 1) == '\n' {
            len -= 1;
        }
        len
    }

    /// Line containing the character offset (clamped to the document end).
    pub fn char_to_line(&self, char_offset: usize) -> usize {
        self.rope.char_to_line(char_offset.min(self.rope.len_chars()))
    }

    /// Insert text at a character offset (clamped).
    pub fn insert(&mut self, char_offset: usize, text: &str) {
        let char_offset = char_offset.min(self.rope.len_chars());
        self.rope.insert(char_offset, text);
    }

    /// Delete `len_chars` characters starting at `start_char` (clamped).
    pub fn delete(&mut self, start_char: usize, len_chars: usize) {
        let start = start_char.min(self.rope.len_chars());
        let end = start.saturating_add(len_chars).min(self.rope.len_chars());
        if start < end {
            self.rope.remove(start..end);
        }
    }

    /// Text of `len_chars` characters starting at `start_char`, if in range.
    pub fn slice(&self, start_char: usize, len_chars: usize) -> Option<String> {
        let end = start_char.checked_add(len_chars)?;
        if end > self.rope.len_chars() {
            return None;
        }
        Some(self.rope.slice(start_char..end).to_string())
    }

    /// Complete text.
    pub fn get_text(&self) -> String {
        self.rope.to_string()
    }

    /// Text of `line`, excluding the newline.
    pub fn get_line_text(&self, line: usize) -> Option<String> {
        if line >= self.rope.len_lines() {
            return None;
        }
        let len = self.line_len_chars(line);
        Some(self.rope.line(line).slice(..len).to_string())
    }
}
