//! Errors of the synchronization engine.

use crate::buffer::BufferError;
use crate::model::ModelError;
use thiserror::Error;

/// Errors returned by [`crate::ModelSyncEngine`] and [`crate::SelectionCoordinator`].
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("document is not well-formed: {0}")]
    /// The buffer text is not well-formed XML.
    Xml(#[from] roxmltree::Error),

    #[error(transparent)]
    /// A buffer operation failed.
    Buffer(#[from] BufferError),

    #[error(transparent)]
    /// A model property could not be read or written.
    Model(#[from] ModelError),

    #[error("engine is busy with another analysis or change")]
    /// Another analysis or write-back is in flight.
    Busy,

    #[error("line {line} no longer holds a <{expected}> element (found {found:?})")]
    /// The anchor line no longer starts an element of the model's tag.
    AnchorMismatch {
        /// Anchor line.
        line: usize,
        /// Tag of the model.
        expected: String,
        /// Tag found on the line, if any.
        found: Option<String>,
    },

    #[error("text at line {line} changed before write-back: expected {expected:?}, found {found:?}")]
    /// The buffer changed between locating an element and writing it back.
    TextDrift {
        /// Line of the element.
        line: usize,
        /// Start tag that was located.
        expected: String,
        /// Text found in the buffer at the same span.
        found: String,
    },

    #[error("no model is selected at line {0}")]
    /// No model is selected to receive a view edit.
    NoSelection(usize),
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
