//! Single-line tag recognition.
//!
//! The engine decides whether the caret sits on an editable element by looking at the
//! caret line alone. Exactly one tag is extracted per line: an opening tag (`<name ...`)
//! wins over a closing tag (`</name>`), and within each kind the leftmost match wins.

use regex::Regex;

/// Whether the recognized tag opens or closes an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `<name ...` (including self-closing tags).
    Open,
    /// `</name>`
    Close,
}

/// A tag found on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatch {
    /// Tag name, including any namespace prefix.
    pub name: String,
    /// Opening or closing.
    pub kind: TagKind,
}

/// Recognizes XML open/close tags in a single line.
#[derive(Debug, Clone)]
pub struct TagMatcher {
    open: Regex,
    close: Regex,
}

impl TagMatcher {
    /// Create a matcher.
    pub fn new() -> Self {
        // Both patterns are constant and known to compile.
        let open = Regex::new(r"<([A-Za-z_][\w.:-]*)").expect("valid open tag pattern");
        let close = Regex::new(r"</([A-Za-z_][\w.:-]*)\s*>").expect("valid close tag pattern");
        Self { open, close }
    }

    /// Returns `true` if the line holds an opening or closing tag.
    pub fn matches(&self, line: &str) -> bool {
        self.open.is_match(line) || self.close.is_match(line)
    }

    /// Extract the tag of a line; `None` when [`matches`](Self::matches) is `false`.
    pub fn find(&self, line: &str) -> Option<TagMatch> {
        if let Some(caps) = self.open.captures(line) {
            return Some(TagMatch {
                name: caps[1].to_string(),
                kind: TagKind::Open,
            });
        }
        self.close.captures(line).map(|caps| TagMatch {
            name: caps[1].to_string(),
            kind: TagKind::Close,
        })
    }

    /// Tag name of a line; `None` when the line holds no tag.
    pub fn tag_name(&self, line: &str) -> Option<String> {
        self.find(line).map(|m| m.name)
    }
}

impl Default for TagMatcher {
    fn default() -> Self {
        Self::new()
    }
}
