//! Streaming conversion of nested markup into `path value` records
//!
//! The engine tracks the open elements on an explicit stack and writes one
//! line per non-empty text run as soon as it is seen. Nothing but the stack is
//! held in memory, and records already written stay written if the input turns
//! out to be malformed later on.
//!
//! A document that ends with elements still open is accepted: once the last
//! token is consumed the run is considered complete.

use std::fmt;
use std::io::{BufRead, Write};
use tracing::debug;

use crate::error::{ErrorCode, Result, SoapCallError};

mod html;
pub mod tokenizer;

pub use tokenizer::{HtmlTokenizer, MarkupDialect, MarkupTokenizer, Token, XmlTokenizer};

/// Flatten `input` into `output` using the tokenizer for `dialect`
pub fn flatten<R: BufRead, W: Write>(
    dialect: MarkupDialect,
    key: &str,
    input: R,
    output: W,
) -> Result<FlattenStats> {
    match dialect {
        MarkupDialect::Xml => FlattenEngine::new(XmlTokenizer::new(input), key, output).run(),
        MarkupDialect::Html => FlattenEngine::new(HtmlTokenizer::new(input), key, output).run(),
    }
}

/// Ancestry of the current token, root first
#[derive(Debug, Default)]
pub struct PathStack {
    names: Vec<String>,
}

impl PathStack {
    pub fn push(&mut self, name: String) {
        self.names.push(name);
    }

    /// Pop the innermost element; closing with nothing open is malformed
    pub fn pop(&mut self, closing: &str) -> Result<String> {
        self.names.pop().ok_or_else(|| {
            SoapCallError::markup(
                ErrorCode::MARKUP_UNBALANCED,
                format!("closing tag </{closing}> has no matching opening tag"),
            )
        })
    }

    pub fn depth(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// `/`-joined path; `/` when nothing is open
    pub fn path(&self) -> String {
        format!("/{}", self.names.join("/"))
    }
}

/// One output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenRecord<'a> {
    /// `None` when only the value is printed
    pub path: Option<&'a str>,
    pub value: &'a str,
}

impl fmt::Display for FlattenRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path {
            Some(path) => write!(f, "{} {}", path, self.value),
            None => f.write_str(self.value),
        }
    }
}

/// Which records a flatten key lets through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    /// No key: every record, with its path
    All,
    Key(String),
}

impl KeyFilter {
    pub fn new(key: &str) -> Self {
        if key.is_empty() {
            KeyFilter::All
        } else {
            KeyFilter::Key(key.to_string())
        }
    }

    /// Decide how (and whether) the text `value` found at `path` is printed.
    ///
    /// An exact path match prints the bare value. A key ending in `/` prints
    /// full records whose *value* starts with the key; the comparison is
    /// against the text, not the path.
    pub fn select<'a>(&self, path: &'a str, value: &'a str) -> Option<FlattenRecord<'a>> {
        match self {
            KeyFilter::All => Some(FlattenRecord {
                path: Some(path),
                value,
            }),
            KeyFilter::Key(key) if key == path => Some(FlattenRecord { path: None, value }),
            KeyFilter::Key(key) if key.ends_with('/') && value.starts_with(key.as_str()) => {
                Some(FlattenRecord {
                    path: Some(path),
                    value,
                })
            }
            KeyFilter::Key(_) => None,
        }
    }
}

/// Counters reported once a run completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlattenStats {
    pub records: u64,
    pub max_depth: usize,
    /// Elements still open at end of input
    pub unclosed: usize,
}

/// One-shot engine: consumes its tokenizer and writer in `run`
pub struct FlattenEngine<T, W> {
    tokenizer: T,
    filter: KeyFilter,
    stack: PathStack,
    output: W,
    stats: FlattenStats,
}

impl<T: MarkupTokenizer, W: Write> FlattenEngine<T, W> {
    pub fn new(tokenizer: T, key: &str, output: W) -> Self {
        Self {
            tokenizer,
            filter: KeyFilter::new(key),
            stack: PathStack::default(),
            output,
            stats: FlattenStats::default(),
        }
    }

    pub fn run(mut self) -> Result<FlattenStats> {
        loop {
            match self.tokenizer.next_token()? {
                Token::Open(name) => {
                    self.stack.push(name);
                    self.stats.max_depth = self.stats.max_depth.max(self.stack.depth());
                }
                Token::Close(name) => {
                    self.stack.pop(&name)?;
                }
                Token::Text(text) => self.emit(&text)?,
                Token::Eof => break,
            }
        }

        self.output.flush()?;
        self.stats.unclosed = self.stack.depth();
        if self.stats.unclosed > 0 {
            debug!(
                "Input ended with {} element(s) still open at {}",
                self.stats.unclosed,
                self.stack.path()
            );
        }
        debug!("Flattened {} record(s)", self.stats.records);
        Ok(self.stats)
    }

    fn emit(&mut self, text: &str) -> Result<()> {
        let value = text.trim();
        if value.is_empty() {
            return Ok(());
        }

        let path = self.stack.path();
        if let Some(record) = self.filter.select(&path, value) {
            writeln!(self.output, "{record}")?;
            self.stats.records += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "<a><b>hello</b><c>world</c></a>";

    fn run(dialect: MarkupDialect, key: &str, input: &str) -> Result<String> {
        let mut out = Vec::new();
        flatten(dialect, key, input.as_bytes(), &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_every_path_without_key() {
        assert_eq!(
            run(MarkupDialect::Xml, "", DOC).unwrap(),
            "/a/b hello\n/a/c world\n"
        );
    }

    #[test]
    fn test_exact_key_prints_value_only() {
        assert_eq!(run(MarkupDialect::Xml, "/a/b", DOC).unwrap(), "hello\n");
    }

    #[test]
    fn test_prefix_key_matches_values_not_paths() {
        assert_eq!(run(MarkupDialect::Xml, "/a/", DOC).unwrap(), "");
        assert_eq!(
            run(MarkupDialect::Xml, "/a/", "<r><p>/a/x</p><p>/b/y</p></r>").unwrap(),
            "/r/p /a/x\n"
        );
    }

    #[test]
    fn test_unmatched_key_prints_nothing() {
        assert_eq!(run(MarkupDialect::Xml, "/a/d", DOC).unwrap(), "");
    }

    #[test]
    fn test_text_is_trimmed_and_blank_text_skipped() {
        let input = "<a>\n  <b>  padded value \n</b>\n</a>";
        assert_eq!(
            run(MarkupDialect::Xml, "", input).unwrap(),
            "/a/b padded value\n"
        );
    }

    #[test]
    fn test_mixed_content_keeps_parent_path() {
        let input = "<a>before<b>inner</b>after</a>";
        assert_eq!(
            run(MarkupDialect::Xml, "", input).unwrap(),
            "/a before\n/a/b inner\n/a after\n"
        );
    }

    #[test]
    fn test_unclosed_elements_are_accepted() {
        let mut out = Vec::new();
        let stats = flatten(MarkupDialect::Html, "", &b"<a><b>text"[..], &mut out).unwrap();
        assert_eq!(out, b"/a/b text\n");
        assert_eq!(stats.unclosed, 2);
        assert_eq!(stats.records, 1);
        assert_eq!(stats.max_depth, 2);
    }

    #[test]
    fn test_extra_closing_tag_in_html_is_unbalanced() {
        let mut out = Vec::new();
        let err = flatten(
            MarkupDialect::Html,
            "",
            &b"<a><b>hello</b></a></a><c>never</c>"[..],
            &mut out,
        )
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::MARKUP_UNBALANCED);
        assert!(err.to_string().contains("</a>"));
        // Records before the fault stay written; nothing after it is produced
        assert_eq!(out, b"/a/b hello\n");
    }

    #[test]
    fn test_extra_closing_tag_in_xml_is_malformed() {
        let err = run(MarkupDialect::Xml, "", "<a><b>hello</b></a></a>").unwrap_err();
        assert!(matches!(err, SoapCallError::MalformedMarkup { .. }));
    }

    #[test]
    fn test_html_void_elements_nest_like_any_other() {
        let out = run(MarkupDialect::Html, "", "<p>line<br>next</p>").unwrap();
        assert_eq!(out, "/p line\n/p/br next\n");
    }

    #[test]
    fn test_top_level_text_has_root_path() {
        assert_eq!(run(MarkupDialect::Html, "", "loose").unwrap(), "/ loose\n");
        assert_eq!(run(MarkupDialect::Html, "/", "loose").unwrap(), "loose\n");
    }

    #[test]
    fn test_path_stack() {
        let mut stack = PathStack::default();
        assert_eq!(stack.path(), "/");
        stack.push("a".to_string());
        stack.push("b".to_string());
        assert_eq!(stack.path(), "/a/b");
        assert_eq!(stack.pop("b").unwrap(), "b");
        assert_eq!(stack.pop("a").unwrap(), "a");
        assert!(stack.is_empty());
        assert!(stack.pop("a").is_err());
    }

    #[test]
    fn test_key_filter_order() {
        let filter = KeyFilter::new("/");
        assert_eq!(
            filter.select("/", "v"),
            Some(FlattenRecord {
                path: None,
                value: "v"
            })
        );
        assert_eq!(
            filter.select("/a", "/x").map(|r| r.to_string()),
            Some("/a /x".to_string())
        );
        assert_eq!(filter.select("/a", "x"), None);
    }
}
