//! Text buffer collaborator.
//!
//! The engine never owns the document text. It talks to the host editor through the
//! [`TextBuffer`] trait: line-addressable reads, offset queries and a small set of edits,
//! plus change notifications. Lines are **1-based** (matching XML line info) and offsets
//! are **character** offsets.
//!
//! Every method takes `&self`: implementations synchronize internally so the analysis
//! scheduler can call them from its own thread. [`SharedBuffer`] is the implementation
//! shipped with the kernel.

use crate::line_index::LineIndex;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors produced by buffer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("line {line} is out of range (document has {line_count} lines)")]
    /// A 1-based line number outside `1..=line_count`.
    LineOutOfRange {
        /// Requested line.
        line: usize,
        /// Lines in the document.
        line_count: usize,
    },

    #[error("range {offset}+{len} is out of bounds (document has {char_count} characters)")]
    /// A character range that extends past the end of the document.
    RangeOutOfBounds {
        /// Start character offset.
        offset: usize,
        /// Length in characters.
        len: usize,
        /// Characters in the document.
        char_count: usize,
    },
}

/// The newline sequence a document was loaded with.
///
/// Text is stored with LF newlines; the original ending is re-applied when saving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// `\n`
    #[default]
    Lf,
    /// `\r\n`
    Crlf,
}

impl LineEnding {
    /// CRLF wins as soon as one occurrence is found.
    pub fn detect_in_text(text: &str) -> Self {
        if text.contains("\r\n") {
            Self::Crlf
        } else {
            Self::Lf
        }
    }

    /// Convert LF-normalized text to this ending.
    pub fn apply_to_text(self, text: &str) -> String {
        match self {
            Self::Lf => text.to_string(),
            Self::Crlf => text.replace('\n', "\r\n"),
        }
    }
}

/// Normalize CRLF and lone CR to LF.
pub(crate) fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// A single edit, in character offsets of the document before the edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDelta {
    /// Start character offset.
    pub start: usize,
    /// Text that was removed (may be empty).
    pub deleted_text: String,
    /// Text that was inserted (may be empty).
    pub inserted_text: String,
}

impl BufferDelta {
    /// Removed length in characters.
    pub fn deleted_len(&self) -> usize {
        self.deleted_text.chars().count()
    }

    /// Inserted length in characters.
    pub fn inserted_len(&self) -> usize {
        self.inserted_text.chars().count()
    }
}

/// Buffer notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEvent {
    /// The text changed.
    TextChanged(BufferDelta),
    /// The caret moved; `line` is the caret's new 1-based line.
    CaretMoved {
        /// New caret line.
        line: usize,
    },
}

/// Buffer notification callback.
///
/// Callbacks run on the thread that performed the change, after the buffer has released
/// its internal lock. They must not edit the buffer themselves.
pub type BufferCallback = Box<dyn FnMut(&BufferEvent) + Send>;

/// Operations the synchronization engine needs from the host editor.
pub trait TextBuffer: Send + Sync {
    /// Complete document text.
    fn text(&self) -> String;

    /// Number of lines.
    fn line_count(&self) -> usize;

    /// Text of a 1-based line without its newline.
    fn line_text(&self, line: usize) -> Result<String, BufferError>;

    /// Character offset where a 1-based line starts.
    fn line_start_offset(&self, line: usize) -> Result<usize, BufferError>;

    /// Character offset where a 1-based line ends, excluding the newline.
    fn line_end_offset(&self, line: usize) -> Result<usize, BufferError>;

    /// 1-based line of the caret.
    fn current_line(&self) -> usize;

    /// Caret character offset.
    fn caret_offset(&self) -> usize;

    /// Move the caret.
    fn set_caret_offset(&self, offset: usize) -> Result<(), BufferError>;

    /// Insert text at a character offset.
    fn insert(&self, offset: usize, text: &str) -> Result<(), BufferError>;

    /// Remove a whole 1-based line, including its newline.
    fn remove_line(&self, line: usize) -> Result<(), BufferError>;

    /// Replace `len` characters at `offset` with `text`.
    fn replace(&self, offset: usize, len: usize, text: &str) -> Result<(), BufferError>;

    /// Register a change callback.
    fn subscribe(&self, callback: BufferCallback);

    /// Text of `len` characters at `offset`.
    fn slice(&self, offset: usize, len: usize) -> Result<String, BufferError> {
        let text = self.text();
        let char_count = text.chars().count();
        if offset.saturating_add(len) > char_count {
            return Err(BufferError::RangeOutOfBounds {
                offset,
                len,
                char_count,
            });
        }
        Ok(text.chars().skip(offset).take(len).collect())
    }
}

struct BufferState {
    index: LineIndex,
    caret: usize,
    line_ending: LineEnding,
    version: u64,
}

impl BufferState {
    fn check_line(&self, line: usize) -> Result<usize, BufferError> {
        let line_count = self.index.line_count();
        if line == 0 || line > line_count {
            return Err(BufferError::LineOutOfRange { line, line_count });
        }
        Ok(line - 1)
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), BufferError> {
        let char_count = self.index.char_count();
        if offset.saturating_add(len) > char_count {
            return Err(BufferError::RangeOutOfBounds {
                offset,
                len,
                char_count,
            });
        }
        Ok(())
    }

    /// Apply one edit and return the events it produced.
    fn edit(&mut self, offset: usize, len: usize, text: &str) -> Vec<BufferEvent> {
        let inserted = normalize_newlines(text);
        let deleted = self.index.slice(offset, len).unwrap_or_default();
        let caret_line_before = self.index.char_to_line(self.caret);

        self.index.delete(offset, len);
        self.index.insert(offset, &inserted);
        self.version += 1;

        let inserted_len = inserted.chars().count();
        if self.caret >= offset + len {
            self.caret = self.caret - len + inserted_len;
        } else if self.caret > offset {
            self.caret = offset + inserted_len.min(self.caret - offset);
        }
        self.caret = self.caret.min(self.index.char_count());

        let mut events = vec![BufferEvent::TextChanged(BufferDelta {
            start: offset,
            deleted_text: deleted,
            inserted_text: inserted,
        })];
        let caret_line = self.index.char_to_line(self.caret);
        if caret_line != caret_line_before {
            events.push(BufferEvent::CaretMoved {
                line: caret_line + 1,
            });
        }
        events
    }
}

/// Thread-safe, rope-backed [`TextBuffer`].
///
/// # Example
///
/// ```rust
/// use xmledit_core::{SharedBuffer, TextBuffer};
///
/// let buffer = SharedBuffer::new("<pipeline>\r\n\t<sensor/>\r\n</pipeline>");
/// assert_eq!(buffer.line_text(2).unwrap(), "\t<sensor/>");
/// buffer.replace(buffer.line_start_offset(2).unwrap() + 1, 9, "<sensor a=\"1\"/>").unwrap();
/// assert!(buffer.text_for_saving().contains("<sensor a=\"1\"/>\r\n"));
/// ```
pub struct SharedBuffer {
    state: Mutex<BufferState>,
    callbacks: Mutex<Vec<BufferCallback>>,
}

impl SharedBuffer {
    /// Create a buffer from text; CRLF is normalized and remembered for saving.
    pub fn new(text: &str) -> Self {
        Self {
            state: Mutex::new(BufferState {
                index: LineIndex::from_text(&normalize_newlines(text)),
                caret: 0,
                line_ending: LineEnding::detect_in_text(text),
                version: 0,
            }),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Number of edits applied since creation.
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Line ending detected on load.
    pub fn line_ending(&self) -> LineEnding {
        self.state.lock().line_ending
    }

    /// Text converted back to the line ending detected on load.
    pub fn text_for_saving(&self) -> String {
        let state = self.state.lock();
        state.line_ending.apply_to_text(&state.index.get_text())
    }

    /// Move the caret to the start of a 1-based line.
    pub fn set_caret_line(&self, line: usize) -> Result<(), BufferError> {
        let offset = self.line_start_offset(line)?;
        self.set_caret_offset(offset)
    }

    fn notify(&self, events: Vec<BufferEvent>) {
        if events.is_empty() {
            return;
        }
        let mut callbacks = self.callbacks.lock();
        for event in &events {
            for callback in callbacks.iter_mut() {
                callback(event);
            }
        }
    }
}

impl TextBuffer for SharedBuffer {
    fn text(&self) -> String {
        self.state.lock().index.get_text()
    }

    fn line_count(&self) -> usize {
        self.state.lock().index.line_count()
    }

    fn line_text(&self, line: usize) -> Result<String, BufferError> {
        let state = self.state.lock();
        let idx = state.check_line(line)?;
        Ok(state.index.get_line_text(idx).unwrap_or_default())
    }

    fn line_start_offset(&self, line: usize) -> Result<usize, BufferError> {
        let state = self.state.lock();
        let idx = state.check_line(line)?;
        Ok(state.index.line_to_char(idx).unwrap_or_default())
    }

    fn line_end_offset(&self, line: usize) -> Result<usize, BufferError> {
        let state = self.state.lock();
        let idx = state.check_line(line)?;
        Ok(state.index.line_end_char(idx).unwrap_or_default())
    }

    fn current_line(&self) -> usize {
        let state = self.state.lock();
        state.index.char_to_line(state.caret) + 1
    }

    fn caret_offset(&self) -> usize {
        self.state.lock().caret
    }

    fn set_caret_offset(&self, offset: usize) -> Result<(), BufferError> {
        let event = {
            let mut state = self.state.lock();
            state.check_range(offset, 0)?;
            if state.caret == offset {
                None
            } else {
                state.caret = offset;
                Some(BufferEvent::CaretMoved {
                    line: state.index.char_to_line(offset) + 1,
                })
            }
        };
        self.notify(event.into_iter().collect());
        Ok(())
    }

    fn insert(&self, offset: usize, text: &str) -> Result<(), BufferError> {
        self.replace(offset, 0, text)
    }

    fn remove_line(&self, line: usize) -> Result<(), BufferError> {
        let events = {
            let mut state = self.state.lock();
            let idx = state.check_line(line)?;
            let start = state.index.line_to_char(idx).unwrap_or_default();
            let end = match state.index.line_to_char(idx + 1) {
                Some(next) => next,
                None => state.index.char_count(),
            };
            state.edit(start, end - start, "")
        };
        self.notify(events);
        Ok(())
    }

    fn replace(&self, offset: usize, len: usize, text: &str) -> Result<(), BufferError> {
        let events = {
            let mut state = self.state.lock();
            state.check_range(offset, len)?;
            if len == 0 && text.is_empty() {
                return Ok(());
            }
            state.edit(offset, len, text)
        };
        self.notify(events);
        Ok(())
    }

    fn subscribe(&self, callback: BufferCallback) {
        self.callbacks.lock().push(callback);
    }

    fn slice(&self, offset: usize, len: usize) -> Result<String, BufferError> {
        let state = self.state.lock();
        state.check_range(offset, len)?;
        Ok(state.index.slice(offset, len).unwrap_or_default())
    }
}
