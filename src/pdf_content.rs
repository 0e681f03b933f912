//! Scanner for PDF content streams.
//!
//! Only the operators the OCR tier cares about are recognized:
//!
//! | Operator | Result |
//! |----------|--------|
//! | `/Name Do` | [`ContentOp::Paint`] |
//! | `BI <dict> ID <data> EI` | [`ContentOp::InlineImage`] |
//!
//! Every other token is read and dropped. Inline image data is cut out
//! here rather than by a full content parser, so a compressed inline image
//! or an operator the parser does not know never costs the rest of the page.

use lopdf::{Dictionary, Object, StringFormat};

/// An image-related operator found in a content stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentOp {
    /// `Do` with the XObject resource name.
    Paint(Vec<u8>),
    /// Inline image as `[dictionary, data]` operands.
    InlineImage(Vec<Object>),
}

/// Scans decoded content bytes for image paints, in stream order.
pub fn scan(content: &[u8]) -> Vec<ContentOp> {
    let mut lexer = Lexer::new(content);
    let mut ops = Vec::new();
    let mut operand_name: Option<Vec<u8>> = None;

    while let Some(token) = lexer.next_token() {
        match token {
            Token::Name(name) => {
                operand_name = Some(name);
                continue;
            }
            Token::Keyword(op) if op == b"Do" => {
                if let Some(name) = operand_name.take() {
                    ops.push(ContentOp::Paint(name));
                }
            }
            Token::Keyword(op) if op == b"BI" => {
                if let Some(operands) = lexer.inline_image() {
                    ops.push(ContentOp::InlineImage(operands));
                }
            }
            _ => {}
        }
        operand_name = None;
    }
    ops
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(Vec<u8>),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Null,
    String(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Keyword(Vec<u8>),
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

struct Lexer<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn regular_run(&mut self) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(is_regular) {
            self.pos += 1;
        }
        &self.buf[start..self.pos]
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            self.skip_whitespace_and_comments();
            let b = self.peek()?;
            let token = match b {
                b'/' => {
                    self.pos += 1;
                    Token::Name(decode_name(self.regular_run()))
                }
                b'(' => {
                    self.pos += 1;
                    Token::String(self.literal_string())
                }
                b'<' if self.buf.get(self.pos + 1) == Some(&b'<') => {
                    self.pos += 2;
                    Token::DictStart
                }
                b'<' => {
                    self.pos += 1;
                    Token::String(self.hex_string())
                }
                b'>' if self.buf.get(self.pos + 1) == Some(&b'>') => {
                    self.pos += 2;
                    Token::DictEnd
                }
                b'[' => {
                    self.pos += 1;
                    Token::ArrayStart
                }
                b']' => {
                    self.pos += 1;
                    Token::ArrayEnd
                }
                b')' | b'>' | b'{' | b'}' => {
                    self.pos += 1;
                    continue;
                }
                _ => keyword_or_number(self.regular_run()),
            };
            return Some(token);
        }
    }

    fn literal_string(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut depth = 1usize;
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'\\' => {
                    let Some(escaped) = self.peek() else { break };
                    self.pos += 1;
                    match escaped {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'0'..=b'7' => {
                            let mut value = u32::from(escaped - b'0');
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + u32::from(d - b'0');
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push(value as u8);
                        }
                        b'\n' => {}
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        other => out.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(b);
                }
                _ => out.push(b),
            }
        }
        out
    }

    fn hex_string(&mut self) -> Vec<u8> {
        let mut digits = Vec::new();
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'>' {
                break;
            }
            if let Some(d) = (b as char).to_digit(16) {
                digits.push(d as u8);
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(0);
        }
        digits.chunks(2).map(|pair| pair[0] << 4 | pair[1]).collect()
    }

    /// Reads one object value. `None` on a stray keyword or closing token.
    fn object(&mut self, depth: usize) -> Option<Object> {
        match self.next_token()? {
            Token::Name(name) => Some(Object::Name(name)),
            Token::Integer(v) => Some(Object::Integer(v)),
            Token::Real(v) => Some(Object::Real(v as _)),
            Token::Boolean(v) => Some(Object::Boolean(v)),
            Token::Null => Some(Object::Null),
            Token::String(bytes) => Some(Object::String(bytes, StringFormat::Literal)),
            Token::ArrayStart if depth < MAX_NESTING => {
                let mut items = Vec::new();
                loop {
                    self.skip_whitespace_and_comments();
                    if self.peek() == Some(b']') {
                        self.pos += 1;
                        return Some(Object::Array(items));
                    }
                    items.push(self.object(depth + 1)?);
                }
            }
            Token::DictStart if depth < MAX_NESTING => {
                let mut dict = Dictionary::new();
                loop {
                    match self.next_token()? {
                        Token::DictEnd => return Some(Object::Dictionary(dict)),
                        Token::Name(key) => {
                            let value = self.object(depth + 1)?;
                            dict.set(key, value);
                        }
                        _ => return None,
                    }
                }
            }
            _ => None,
        }
    }

    /// Reads an inline image after its `BI`, leaving the lexer after `EI`.
    fn inline_image(&mut self) -> Option<Vec<Object>> {
        let mut dict = Dictionary::new();
        loop {
            match self.next_token()? {
                Token::Keyword(op) if op == b"ID" => break,
                Token::Name(key) => {
                    let value = self.object(0)?;
                    dict.set(key, value);
                }
                _ => return None,
            }
        }

        // A single whitespace byte separates `ID` from the data.
        if self.peek().is_some_and(is_whitespace) {
            self.pos += 1;
        }
        let start = self.pos;
        let end = self
            .declared_end(&dict, start)
            .or_else(|| self.delimited_end(start))?;
        let data = self.buf[start..end].to_vec();
        Some(vec![
            Object::Dictionary(dict),
            Object::String(data, StringFormat::Hexadecimal),
        ])
    }

    /// End of unfiltered data whose length follows from the dictionary,
    /// accepted only when `EI` comes right after it.
    fn declared_end(&mut self, dict: &Dictionary, start: usize) -> Option<usize> {
        if dict.get(b"Filter").or_else(|_| dict.get(b"F")).is_ok() {
            return None;
        }
        let int = |long: &[u8], short: &[u8]| {
            dict.get(long)
                .or_else(|_| dict.get(short))
                .ok()
                .and_then(|o| o.as_i64().ok())
        };
        let width = usize::try_from(int(b"Width", b"W")?).ok()?;
        let height = usize::try_from(int(b"Height", b"H")?).ok()?;
        let bits = usize::try_from(int(b"BitsPerComponent", b"BPC").unwrap_or(8)).ok()?;
        let is_mask = matches!(
            dict.get(b"ImageMask").or_else(|_| dict.get(b"IM")),
            Ok(Object::Boolean(true))
        );
        let components = if is_mask {
            1
        } else {
            match dict.get(b"ColorSpace").or_else(|_| dict.get(b"CS")) {
                Ok(Object::Name(cs)) => color_components(cs)?,
                _ => return None,
            }
        };
        let bits = if is_mask { 1 } else { bits };
        let row = width.checked_mul(components)?.checked_mul(bits)?.div_ceil(8);
        let end = start.checked_add(row.checked_mul(height)?)?;

        let mut after = end;
        while self.buf.get(after).copied().is_some_and(is_whitespace) {
            after += 1;
        }
        if self.buf.get(after..after + 2) == Some(&b"EI"[..])
            && self.buf.get(after + 2).map_or(true, |b| !is_regular(*b))
        {
            self.pos = after + 2;
            return Some(end);
        }
        None
    }

    /// End of data found by searching for a whitespace-delimited `EI`.
    fn delimited_end(&mut self, start: usize) -> Option<usize> {
        let mut i = start;
        while i + 2 <= self.buf.len() {
            if &self.buf[i..i + 2] == b"EI"
                && i > start
                && is_whitespace(self.buf[i - 1])
                && self.buf.get(i + 2).map_or(true, |b| !is_regular(*b))
            {
                self.pos = i + 2;
                return Some(i - 1);
            }
            i += 1;
        }
        self.pos = self.buf.len();
        None
    }
}

const MAX_NESTING: usize = 16;

/// Samples per pixel for the device color spaces, by full or abbreviated name.
pub fn color_components(name: &[u8]) -> Option<usize> {
    match name {
        b"DeviceGray" | b"G" | b"CalGray" | b"Indexed" | b"I" => Some(1),
        b"DeviceRGB" | b"RGB" | b"CalRGB" => Some(3),
        b"DeviceCMYK" | b"CMYK" => Some(4),
        _ => None,
    }
}

fn decode_name(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hex = std::str::from_utf8(&raw[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

fn keyword_or_number(raw: &[u8]) -> Token {
    let text = String::from_utf8_lossy(raw);
    match text.as_ref() {
        "true" => return Token::Boolean(true),
        "false" => return Token::Boolean(false),
        "null" => return Token::Null,
        _ => {}
    }
    if raw
        .first()
        .is_some_and(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.'))
    {
        if let Ok(v) = text.parse::<i64>() {
            return Token::Integer(v);
        }
        if let Ok(v) = text.parse::<f64>() {
            return Token::Real(v);
        }
    }
    Token::Keyword(raw.to_vec())
}
