//! Locating and rewriting elements in the document text.
//!
//! Parsing is done with `roxmltree`, which keeps the byte range of every node and
//! attribute. That lets the engine rewrite exactly the start tag of an element while
//! leaving formatting, attribute order and quoting untouched everywhere else.
//!
//! Byte ranges here refer to the text that was parsed. Call [`char_offset`] to convert
//! them into the character offsets used by [`crate::TextBuffer`].

use roxmltree::{Document, Node, ParsingOptions};
use std::ops::Range;

/// Parse document text.
pub fn parse(text: &str) -> Result<Document<'_>, roxmltree::Error> {
    Document::parse_with_options(
        text,
        ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        },
    )
}

/// Convert a byte offset of `text` to a character offset.
pub fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

/// Byte offsets of line starts, for O(log n) byte-to-line lookups.
#[derive(Debug, Clone)]
pub struct LineMap {
    starts: Vec<usize>,
}

impl LineMap {
    /// Index the line starts of `text`.
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// 1-based line containing `byte`.
    pub fn line_of(&self, byte: usize) -> usize {
        match self.starts.binary_search(&byte) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// Byte offset of a 1-based line start.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        line.checked_sub(1).and_then(|idx| self.starts.get(idx).copied())
    }

    /// Text of a 1-based line of `text`, without the newline.
    pub fn line_text<'t>(&self, text: &'t str, line: usize) -> Option<&'t str> {
        let start = self.line_start(line)?;
        let end = self.line_start(line + 1).map_or(text.len(), |next| next - 1);
        text.get(start..end)
    }
}

/// An element located in the text. Valid only until the next edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElementRef {
    /// Tag name as written (including any prefix).
    pub tag: String,
    /// 1-based line of the start tag.
    pub line: usize,
    /// Byte range of the whole element.
    pub range: Range<usize>,
    /// Byte range of the start tag.
    pub start_tag: Range<usize>,
    /// Character offset of the start tag.
    pub start_char: usize,
    /// Length of the start tag in characters.
    pub start_tag_chars: usize,
}

impl XmlElementRef {
    /// Describe `node`.
    pub fn new(text: &str, lines: &LineMap, node: Node<'_, '_>) -> Self {
        let range = node.range();
        let start_tag = start_tag_range(text, node);
        Self {
            tag: qualified_name(text, node).to_string(),
            line: lines.line_of(range.start),
            start_char: char_offset(text, start_tag.start),
            start_tag_chars: text[start_tag.clone()].chars().count(),
            start_tag,
            range,
        }
    }

    /// The start tag as it appears in `text`.
    pub fn start_tag_text<'t>(&self, text: &'t str) -> &'t str {
        &text[self.start_tag.clone()]
    }
}

/// The first element, in document order, whose start tag begins on `line`.
pub fn element_at_line<'a, 'input>(
    doc: &'a Document<'input>,
    lines: &LineMap,
    line: usize,
) -> Option<Node<'a, 'input>> {
    doc.descendants()
        .filter(Node::is_element)
        .find(|n| lines.line_of(n.range().start) == line)
}

/// Child elements of `node`, in document order.
pub fn child_elements<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

/// The tag name exactly as written in the source.
pub fn qualified_name<'t>(text: &'t str, node: Node<'_, '_>) -> &'t str {
    let start = node.range().start + 1;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Byte range of the start tag of an element, `<` through `>`.
pub fn start_tag_range(text: &str, node: Node<'_, '_>) -> Range<usize> {
    let start = node.range().start;
    let after = node
        .attributes()
        .map(|a| a.range().end)
        .max()
        .unwrap_or(start + 1 + qualified_name(text, node).len());
    // Only whitespace and '/' can follow the last attribute.
    let end = text[after..]
        .find('>')
        .map(|i| after + i + 1)
        .unwrap_or(node.range().end);
    start..end
}

/// Returns `true` if the start tag of `node` closes itself (`<a/>`).
pub fn is_self_closing(text: &str, node: Node<'_, '_>) -> bool {
    let tag = start_tag_range(text, node);
    text[tag].ends_with("/>")
}

/// Leading whitespace of the line the element starts on.
pub fn indentation_of<'t>(text: &'t str, lines: &LineMap, node: Node<'_, '_>) -> &'t str {
    let start = node.range().start;
    let line_start = lines
        .line_start(lines.line_of(start))
        .unwrap_or_default();
    let prefix = &text[line_start..start];
    let end = prefix
        .find(|c: char| !c.is_whitespace())
        .unwrap_or(prefix.len());
    &prefix[..end]
}

/// Escape an attribute value for the given quote character.
pub fn escape_attribute(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' if quote == '"' => out.push_str("&quot;"),
            '\'' if quote == '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serialize an empty element, `<tag a="1"/>`.
pub fn render_element(tag: &str, attributes: &[(&str, &str)]) -> String {
    let mut out = format!("<{tag}");
    for (name, value) in attributes {
        out.push_str(&format!(" {name}=\"{}\"", escape_attribute(value, '"')));
    }
    out.push_str("/>");
    out
}

/// Start tag of `node` with attribute `xml_name` set to `value`, or removed for `None`.
///
/// Other attributes keep their order, spacing and quotes. A new attribute is appended
/// after the last existing one.
pub fn rewrite_attribute(
    text: &str,
    node: Node<'_, '_>,
    xml_name: &str,
    value: Option<&str>,
) -> String {
    let tag = start_tag_range(text, node);
    let existing = node.attributes().find(|a| a.name() == xml_name);

    let (edit, replacement) = match (existing, value) {
        (Some(attr), Some(value)) => {
            let range = attr.range();
            let quote = text[range.clone()].chars().last().unwrap_or('"');
            let qname = &text[attr.range_qname()];
            let rendered = format!("{qname}={quote}{}{quote}", escape_attribute(value, quote));
            (range, rendered)
        }
        (Some(attr), None) => {
            let range = attr.range();
            let lead = text[tag.start..range.start].trim_end().len();
            (tag.start + lead..range.end, String::new())
        }
        (None, Some(value)) => {
            let at = node
                .attributes()
                .map(|a| a.range().end)
                .max()
                .unwrap_or(tag.start + 1 + qualified_name(text, node).len());
            (
                at..at,
                format!(" {xml_name}=\"{}\"", escape_attribute(value, '"')),
            )
        }
        (None, None) => return text[tag].to_string(),
    };

    let mut out = String::with_capacity(tag.len() + replacement.len());
    out.push_str(&text[tag.start..edit.start]);
    out.push_str(&replacement);
    out.push_str(&text[edit.end..tag.end]);
    out
}

/// A byte-range replacement of the parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    /// Byte range to replace.
    pub range: Range<usize>,
    /// Replacement text.
    pub text: String,
    /// Lines added by the edit.
    pub added_lines: usize,
}

/// Edit inserting `child` as the first child of `parent`, on its own line.
///
/// The child is indented one `indent` deeper than the parent. A self-closing parent is
/// expanded into an open/close pair.
pub fn insert_first_child(
    text: &str,
    lines: &LineMap,
    parent: Node<'_, '_>,
    child: &str,
    indent: &str,
) -> TextEdit {
    let tag = start_tag_range(text, parent);
    let parent_indent = indentation_of(text, lines, parent);
    if is_self_closing(text, parent) {
        let name = qualified_name(text, parent);
        let head = text[tag.start..tag.end - 2].trim_end().len();
        TextEdit {
            range: tag.start + head..tag.end,
            text: format!(">\n{parent_indent}{indent}{child}\n{parent_indent}</{name}>"),
            added_lines: 2,
        }
    } else {
        TextEdit {
            range: tag.end..tag.end,
            text: format!("\n{parent_indent}{indent}{child}"),
            added_lines: 1,
        }
    }
}
