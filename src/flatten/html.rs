//! Byte-level clean-up of real-world HTML ahead of the event reader
//!
//! An XML reader takes every `<` as the start of markup. Browsers do not: a
//! `<` that is not followed by a letter, `/`, `!` or `?` is plain text, and the
//! bodies of `script` and `style` are raw text up to their own end tag. This
//! adapter rewrites exactly those bytes into character references so the
//! reader sees the same text a browser would. Everything else passes through
//! untouched, including comments, CDATA sections and quoted attribute values.

use std::collections::VecDeque;
use std::io::{self, BufRead, Read};

/// End tag that closes `name` when its content is raw text
fn raw_text_close(name: &[u8]) -> Option<&'static [u8]> {
    match name {
        b"script" => Some(b"/script"),
        b"style" => Some(b"/style"),
        _ => None,
    }
}

#[derive(Debug)]
enum LexState {
    Text,
    Tag {
        closing: bool,
        naming: bool,
        name: Vec<u8>,
        quote: Option<u8>,
        last: u8,
    },
    /// Comment or CDATA section, passed through up to `end`
    Marked { end: &'static [u8], tail: Vec<u8> },
    /// Body of a raw-text element, up to `</close`
    RawText { close: &'static [u8] },
}

impl LexState {
    fn tag(closing: bool) -> Self {
        LexState::Tag {
            closing,
            naming: true,
            name: Vec::new(),
            quote: None,
            last: b'<',
        }
    }
}

pub(crate) struct HtmlSource<R> {
    inner: R,
    lookahead: VecDeque<u8>,
    out: VecDeque<u8>,
    state: LexState,
}

impl<R: BufRead> HtmlSource<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            lookahead: VecDeque::new(),
            out: VecDeque::new(),
            state: LexState::Text,
        }
    }

    /// Byte `n` positions ahead of the current one, if the input has it
    fn peek(&mut self, n: usize) -> io::Result<Option<u8>> {
        while self.lookahead.len() <= n {
            let chunk = self.inner.fill_buf()?;
            if chunk.is_empty() {
                break;
            }
            let len = chunk.len();
            self.lookahead.extend(chunk);
            self.inner.consume(len);
        }
        Ok(self.lookahead.get(n).copied())
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        self.peek(0)?;
        Ok(self.lookahead.pop_front())
    }

    fn ahead_matches(&mut self, expected: &[u8]) -> io::Result<bool> {
        for (i, want) in expected.iter().enumerate() {
            match self.peek(i)? {
                Some(got) if got.eq_ignore_ascii_case(want) => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Move `n` already-peeked bytes straight to the output
    fn pass_through(&mut self, n: usize) {
        for _ in 0..n {
            if let Some(b) = self.lookahead.pop_front() {
                self.out.push_back(b);
            }
        }
    }

    /// Process one input byte; `false` once the input is exhausted
    fn step(&mut self) -> io::Result<bool> {
        let Some(b) = self.next_byte()? else {
            return Ok(false);
        };

        let state = std::mem::replace(&mut self.state, LexState::Text);
        self.state = match state {
            LexState::Text if b == b'<' => self.open_angle()?,
            LexState::Text => {
                self.out.push_back(b);
                LexState::Text
            }
            LexState::Tag {
                closing,
                naming,
                name,
                quote,
                last,
            } => self.in_tag(b, closing, naming, name, quote, last),
            LexState::Marked { end, mut tail } => {
                self.out.push_back(b);
                tail.push(b);
                if tail.len() > end.len() {
                    tail.remove(0);
                }
                if tail == end {
                    LexState::Text
                } else {
                    LexState::Marked { end, tail }
                }
            }
            LexState::RawText { close } => self.in_raw_text(b, close)?,
        };
        Ok(true)
    }

    fn open_angle(&mut self) -> io::Result<LexState> {
        let next = self.peek(0)?;
        let state = match next {
            Some(b'!') if self.ahead_matches(b"!--")? => {
                self.out.push_back(b'<');
                self.pass_through(3);
                LexState::Marked {
                    end: b"-->",
                    tail: Vec::new(),
                }
            }
            Some(b'!') if self.ahead_matches(b"![CDATA[")? => {
                self.out.push_back(b'<');
                self.pass_through(8);
                LexState::Marked {
                    end: b"]]>",
                    tail: Vec::new(),
                }
            }
            Some(b'/') => {
                self.out.push_back(b'<');
                LexState::tag(true)
            }
            Some(c) if c == b'!' || c == b'?' || c.is_ascii_alphabetic() => {
                self.out.push_back(b'<');
                LexState::tag(false)
            }
            _ => {
                self.out.extend(b"&lt;");
                LexState::Text
            }
        };
        Ok(state)
    }

    fn in_tag(
        &mut self,
        b: u8,
        closing: bool,
        mut naming: bool,
        mut name: Vec<u8>,
        mut quote: Option<u8>,
        last: u8,
    ) -> LexState {
        self.out.push_back(b);

        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
        } else {
            if naming {
                if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':') {
                    name.push(b.to_ascii_lowercase());
                } else if !(b == b'/' && name.is_empty()) {
                    naming = false;
                }
            }
            match b {
                b'"' | b'\'' if !naming => quote = Some(b),
                b'>' => {
                    return match raw_text_close(&name) {
                        Some(close) if !closing && last != b'/' => LexState::RawText { close },
                        _ => LexState::Text,
                    };
                }
                _ => {}
            }
        }

        LexState::Tag {
            closing,
            naming,
            name,
            quote,
            last: b,
        }
    }

    fn in_raw_text(&mut self, b: u8, close: &'static [u8]) -> io::Result<LexState> {
        let state = match b {
            b'<' if self.closes_raw_text(close)? => {
                self.out.push_back(b'<');
                LexState::tag(true)
            }
            b'<' => {
                self.out.extend(b"&lt;");
                LexState::RawText { close }
            }
            b'&' => {
                self.out.extend(b"&amp;");
                LexState::RawText { close }
            }
            _ => {
                self.out.push_back(b);
                LexState::RawText { close }
            }
        };
        Ok(state)
    }

    /// `</script` (any case) followed by whitespace, `/`, `>` or the end of input
    fn closes_raw_text(&mut self, close: &[u8]) -> io::Result<bool> {
        if !self.ahead_matches(close)? {
            return Ok(false);
        }
        Ok(match self.peek(close.len())? {
            None => true,
            Some(c) => c.is_ascii_whitespace() || c == b'/' || c == b'>',
        })
    }
}

impl<R: BufRead> Read for HtmlSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.out.is_empty() {
            if !self.step()? {
                break;
            }
        }

        let n = buf.len().min(self.out.len());
        for (slot, b) in buf.iter_mut().zip(self.out.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}
