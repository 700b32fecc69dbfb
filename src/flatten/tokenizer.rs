//! Structural tokenizers over quick-xml
//!
//! Both dialects reduce the markup to open/close/text tokens. Adjacent text,
//! CDATA and entity references are joined into one text token; comments,
//! processing instructions, declarations and self-closing elements only act as
//! separators between text runs.

use quick_xml::escape::{resolve_html5_entity, resolve_xml_entity};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{BufRead, BufReader};

use super::html::HtmlSource;
use crate::error::{ErrorCode, Result, SoapCallError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupDialect {
    Xml,
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Open(String),
    Close(String),
    Text(String),
    Eof,
}

pub trait MarkupTokenizer {
    fn next_token(&mut self) -> Result<Token>;
}

/// Strict XML: end tags must match, element names lose their namespace prefix
pub struct XmlTokenizer<R: BufRead> {
    inner: EventTokenizer<R>,
}

impl<R: BufRead> XmlTokenizer<R> {
    pub fn new(input: R) -> Self {
        Self {
            inner: EventTokenizer::new(Reader::from_reader(input), MarkupDialect::Xml),
        }
    }
}

impl<R: BufRead> MarkupTokenizer for XmlTokenizer<R> {
    fn next_token(&mut self) -> Result<Token> {
        self.inner.next_token()
    }
}

/// Lenient HTML: end tags are reported as they appear, names are lower-cased.
/// A `<` that cannot open a tag, a bare `&` and the bodies of `script` and
/// `style` are all read as text.
pub struct HtmlTokenizer<R: BufRead> {
    inner: EventTokenizer<BufReader<HtmlSource<R>>>,
}

impl<R: BufRead> HtmlTokenizer<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(BufReader::new(HtmlSource::new(input)));
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.allow_dangling_amp = true;

        Self {
            inner: EventTokenizer::new(reader, MarkupDialect::Html),
        }
    }
}

impl<R: BufRead> MarkupTokenizer for HtmlTokenizer<R> {
    fn next_token(&mut self) -> Result<Token> {
        self.inner.next_token()
    }
}

/// What a single reader event contributes
enum Step {
    Structural(Token),
    Separator,
    Append(String),
}

struct EventTokenizer<R: BufRead> {
    reader: Reader<R>,
    dialect: MarkupDialect,
    buf: Vec<u8>,
    text: String,
    pending: Option<Token>,
}

impl<R: BufRead> EventTokenizer<R> {
    fn new(reader: Reader<R>, dialect: MarkupDialect) -> Self {
        Self {
            reader,
            dialect,
            buf: Vec::new(),
            text: String::new(),
            pending: None,
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        loop {
            if let Some(token) = self.pending.take() {
                return Ok(token);
            }

            self.buf.clear();
            let step = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => classify(self.dialect, event)?,
                Err(e) => {
                    return Err(SoapCallError::markup(
                        ErrorCode::MARKUP_TOKENIZER,
                        format!("{} at byte {}", e, self.reader.error_position()),
                    ))
                }
            };

            match step {
                Step::Append(text) => self.text.push_str(&text),
                Step::Separator => {
                    if let Some(text) = self.take_text() {
                        return Ok(text);
                    }
                }
                Step::Structural(token) => match self.take_text() {
                    Some(text) => {
                        self.pending = Some(token);
                        return Ok(text);
                    }
                    None => return Ok(token),
                },
            }
        }
    }

    fn take_text(&mut self) -> Option<Token> {
        if self.text.is_empty() {
            None
        } else {
            Some(Token::Text(std::mem::take(&mut self.text)))
        }
    }
}

fn classify(dialect: MarkupDialect, event: Event<'_>) -> Result<Step> {
    let step = match event {
        Event::Start(e) => Step::Structural(Token::Open(match dialect {
            MarkupDialect::Xml => lossy(e.local_name().as_ref()),
            MarkupDialect::Html => lossy(e.name().as_ref()).to_ascii_lowercase(),
        })),
        Event::End(e) => Step::Structural(Token::Close(match dialect {
            MarkupDialect::Xml => lossy(e.local_name().as_ref()),
            MarkupDialect::Html => lossy(e.name().as_ref()).to_ascii_lowercase(),
        })),
        Event::Text(e) => Step::Append(e.xml_content().map_err(encoding_error)?.into_owned()),
        Event::CData(e) => Step::Append(lossy(&e.into_inner())),
        Event::GeneralRef(e) => {
            let name = e.decode().map_err(encoding_error)?;
            Step::Append(resolve_reference(dialect, &name))
        }
        Event::Eof => Step::Structural(Token::Eof),
        _ => Step::Separator,
    };
    Ok(step)
}

/// Resolve `&name;`; unknown references are kept literally
fn resolve_reference(dialect: MarkupDialect, name: &str) -> String {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => number.parse::<u32>().ok(),
        };
        if let Some(c) = code.and_then(char::from_u32) {
            return c.to_string();
        }
    } else {
        let resolved = match dialect {
            MarkupDialect::Xml => resolve_xml_entity(name),
            MarkupDialect::Html => resolve_html5_entity(name),
        };
        if let Some(value) = resolved {
            return value.to_string();
        }
    }
    format!("&{name};")
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn encoding_error(e: impl std::fmt::Display) -> SoapCallError {
    SoapCallError::markup(ErrorCode::MARKUP_TOKENIZER, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens<T: MarkupTokenizer>(mut tokenizer: T) -> Vec<Token> {
        let mut out = Vec::new();
        loop {
            let token = tokenizer.next_token().unwrap();
            let done = token == Token::Eof;
            out.push(token);
            if done {
                return out;
            }
        }
    }

    fn open(name: &str) -> Token {
        Token::Open(name.to_string())
    }

    fn close(name: &str) -> Token {
        Token::Close(name.to_string())
    }

    fn text(value: &str) -> Token {
        Token::Text(value.to_string())
    }

    #[test]
    fn test_xml_basic_sequence() {
        let got = tokens(XmlTokenizer::new(&b"<a><b>hi</b></a>"[..]));
        assert_eq!(
            got,
            vec![open("a"), open("b"), text("hi"), close("b"), close("a"), Token::Eof]
        );
    }

    #[test]
    fn test_xml_strips_namespace_prefix() {
        let got = tokens(XmlTokenizer::new(
            &br#"<soap:Envelope xmlns:soap="urn:x"><soap:Body/></soap:Envelope>"#[..],
        ));
        assert_eq!(got, vec![open("Envelope"), close("Envelope"), Token::Eof]);
    }

    #[test]
    fn test_xml_joins_entities_and_cdata() {
        let got = tokens(XmlTokenizer::new(
            &b"<a>fish &amp; chips &#x41;&#66; <![CDATA[<raw>]]> &unknown;</a>"[..],
        ));
        assert_eq!(
            got,
            vec![
                open("a"),
                text("fish & chips AB <raw> &unknown;"),
                close("a"),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_comments_split_text_runs() {
        let got = tokens(XmlTokenizer::new(&b"<a>one<!-- c -->two<br/>three</a>"[..]));
        assert_eq!(
            got,
            vec![
                open("a"),
                text("one"),
                text("two"),
                text("three"),
                close("a"),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_xml_mismatched_end_is_error() {
        let mut tokenizer = XmlTokenizer::new(&b"<a><b></a>"[..]);
        let err = loop {
            match tokenizer.next_token() {
                Ok(Token::Eof) => panic!("expected an error"),
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert_eq!(err.code(), ErrorCode::MARKUP_TOKENIZER);
    }

    #[test]
    fn test_html_lowercases_and_passes_unmatched_ends() {
        let got = tokens(HtmlTokenizer::new(&b"<HTML><Body>x &nbsp;&copy;</BODY></html></p>"[..]));
        assert_eq!(
            got,
            vec![
                open("html"),
                open("body"),
                text("x \u{a0}\u{a9}"),
                close("body"),
                close("html"),
                close("p"),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_html_keeps_prefixed_names() {
        let got = tokens(HtmlTokenizer::new(&b"<svg:rect>r</svg:rect>"[..]));
        assert_eq!(got[0], open("svg:rect"));
    }

    #[test]
    fn test_html_bare_ampersand_is_text() {
        let got = tokens(HtmlTokenizer::new(&b"<p>AT&T rocks &amp; rolls</p>"[..]));
        assert_eq!(
            got,
            vec![open("p"), text("AT&T rocks & rolls"), close("p"), Token::Eof]
        );
    }

    #[test]
    fn test_html_stray_angle_is_text() {
        let got = tokens(HtmlTokenizer::new(&b"<p>a < b</p>"[..]));
        assert_eq!(got, vec![open("p"), text("a < b"), close("p"), Token::Eof]);
    }

    #[test]
    fn test_html_script_body_is_one_text_run() {
        let got = tokens(HtmlTokenizer::new(
            &b"<SCRIPT>if (a<b && c) { x(); }</script><p>after</p>"[..],
        ));
        assert_eq!(
            got,
            vec![
                open("script"),
                text("if (a<b && c) { x(); }"),
                close("script"),
                open("p"),
                text("after"),
                close("p"),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_resolve_reference() {
        assert_eq!(resolve_reference(MarkupDialect::Xml, "lt"), "<");
        assert_eq!(resolve_reference(MarkupDialect::Xml, "nbsp"), "&nbsp;");
        assert_eq!(resolve_reference(MarkupDialect::Html, "nbsp"), "\u{a0}");
        assert_eq!(resolve_reference(MarkupDialect::Xml, "#233"), "é");
        assert_eq!(resolve_reference(MarkupDialect::Xml, "#xZZ"), "&#xZZ;");
    }
}
