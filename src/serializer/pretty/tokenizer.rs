use super::token::*;
use crate::error::{Result, SerializerError, TokenizerError};
use std::io::Read;

type LexResult<T> = std::result::Result<T, TokenizerError>;

#[inline]
fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

#[inline]
fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

/// What may directly follow a number.
#[inline]
fn ends_number(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => is_space(c) || matches!(c, ':' | ',' | ';' | '}' | ']' | ')' | '#'),
    }
}

/// A lexer over a buffered text input.
///
/// The whole input is held in memory. Position is tracked as a char offset, with the
/// line and the offset of the line start kept alongside for error reporting.
pub struct Tokenizer {
    buffer: Vec<char>,
    pos: usize,
    line: usize,
    line_start: usize,
    next_token: Option<Token>,
}

impl Tokenizer {
    /// Buffer the input. When `enclosed`, only one brace-balanced region and the rest of
    /// its line is consumed from the reader.
    pub fn read(input: &mut dyn Read, enclosed: bool) -> Result<Self> {
        let bytes = if enclosed {
            read_enclosed(input)?
        } else {
            let mut buf = Vec::new();
            input.read_to_end(&mut buf)?;
            buf
        };
        let text = String::from_utf8(bytes)
            .map_err(|e| SerializerError::protocol(format!("invalid utf-8 in text input: {}", e)))?;
        Ok(Self::new(&text))
    }

    pub fn new(text: &str) -> Self {
        Self { buffer: text.chars().collect(), pos: 0, line: 1, line_start: 0, next_token: None }
    }

    #[inline]
    fn peek_char(&self) -> Option<char> {
        self.buffer.get(self.pos).copied()
    }

    #[inline]
    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.buffer.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.buffer.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(c)
    }

    #[inline]
    fn column(&self) -> usize {
        self.pos - self.line_start + 1
    }

    /// The content of a 1-based line, without the line break.
    pub fn line_content(&self, line: usize) -> String {
        let text: String = self.buffer.iter().collect();
        text.split('\n')
            .nth(line.saturating_sub(1))
            .map(|l| l.trim_end_matches('\r').to_string())
            .unwrap_or_default()
    }

    pub fn failure_at<S: Into<String>>(
        &self,
        line: usize,
        column: usize,
        length: usize,
        message: S,
    ) -> TokenizerError {
        let line_content = self.line_content(line);
        TokenizerError { message: message.into(), line, column, length, line_content }
    }

    pub fn failure<S: Into<String>>(&self, token: &Token, message: S) -> TokenizerError {
        self.failure_at(token.line(), token.column(), token.len(), message)
    }

    fn eof_failure(&self, expected: &str) -> TokenizerError {
        let message = format!("Expected {}, got end of file", expected);
        self.failure_at(self.line, self.column(), 1, message)
    }

    pub fn has_next(&mut self) -> Result<bool> {
        if self.next_token.is_none() {
            self.next_token = self.next_internal()?;
        }
        Ok(self.next_token.is_some())
    }

    pub fn next(&mut self) -> Result<Option<Token>> {
        if let Some(token) = self.next_token.take() {
            return Ok(Some(token));
        }
        Ok(self.next_internal()?)
    }

    pub fn peek(&mut self, expected: &str) -> Result<&Token> {
        if !self.has_next()? {
            return Err(self.eof_failure(expected).into());
        }
        match &self.next_token {
            Some(token) => Ok(token),
            None => Err(self.eof_failure(expected).into()),
        }
    }

    pub fn expect(&mut self, expected: &str) -> Result<Token> {
        match self.next()? {
            Some(token) => Ok(token),
            None => Err(self.eof_failure(expected).into()),
        }
    }

    /// Consume one of the given symbols and return it.
    pub fn expect_symbol(&mut self, expected: &str, symbols: &[char]) -> Result<char> {
        let token = self.expect(expected)?;
        for s in symbols {
            if token.is_symbol(*s) {
                return Ok(*s);
            }
        }
        let list: Vec<String> = symbols.iter().map(|s| format!("'{}'", s)).collect();
        let message =
            format!("Expected {}, one of [{}], but found '{}'", expected, list.join(", "), token);
        Err(self.failure(&token, message).into())
    }

    pub fn expect_identifier(&mut self, expected: &str) -> Result<Token> {
        let token = self.expect(expected)?;
        if !token.is_qualified_identifier() {
            let message = format!("Expected {}, but got '{}'", expected, token);
            return Err(self.failure(&token, message).into());
        }
        Ok(token)
    }

    pub fn expect_string_literal(&mut self, expected: &str) -> Result<Token> {
        let token = self.expect(expected)?;
        if !token.is_string_literal() {
            let message = format!("Expected {}, but got '{}'", expected, token);
            return Err(self.failure(&token, message).into());
        }
        Ok(token)
    }

    /// Read raw content up to the `end` char, which is consumed. Whitespace is kept.
    pub fn read_binary(&mut self, end: char) -> Result<String> {
        debug_assert!(self.next_token.is_none());
        let (line, column) = (self.line, self.column());
        let mut content = String::new();
        while let Some(c) = self.bump() {
            if c == end {
                return Ok(content);
            }
            content.push(c);
        }
        let length = content.chars().count();
        Err(self.failure_at(line, column, length, "Unexpected end of stream in binary").into())
    }

    fn next_internal(&mut self) -> LexResult<Option<Token>> {
        while let Some(c) = self.peek_char() {
            if is_space(c) {
                self.bump();
            } else if c == SHELL_COMMENT {
                while let Some(c) = self.peek_char() {
                    if c == '\n' || c == '\r' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
        let Some(c) = self.peek_char() else {
            return Ok(None);
        };
        if SYMBOLS.contains(c) {
            let (line, column) = (self.line, self.column());
            self.bump();
            return Ok(Some(Token::new(TokenKind::Symbol, c.to_string(), line, column)));
        }
        if c == '"' || c == '\'' {
            return self.next_string_literal().map(Some);
        }
        if c == '-' || c == '.' || c.is_ascii_digit() {
            return self.next_number().map(Some);
        }
        if is_ident_start(c) {
            return self.next_identifier().map(Some);
        }
        let message = format!("Unknown token initiator '{}'", c.escape_default());
        Err(self.failure_at(self.line, self.column(), 1, message))
    }

    fn text_from(&self, start: usize) -> String {
        self.buffer[start..self.pos].iter().collect()
    }

    fn next_string_literal(&mut self) -> LexResult<Token> {
        let (start, line, column) = (self.pos, self.line, self.column());
        let quote = self.bump();
        let mut escaped = false;
        loop {
            let Some(c) = self.peek_char() else {
                let length = self.pos - start;
                return Err(self.failure_at(
                    line,
                    column,
                    length,
                    "Unexpected end of stream in literal",
                ));
            };
            if c < ' ' || c == '\u{7f}' {
                if c == '\n' || c == '\r' {
                    let length = self.pos - start;
                    return Err(self.failure_at(
                        line,
                        column,
                        length,
                        "Unexpected line break in literal",
                    ));
                }
                return Err(self.failure_at(
                    line,
                    column,
                    self.pos - start + 1,
                    format!("Unescaped non-printable char in literal: '{}'", c.escape_default()),
                ));
            }
            self.bump();
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if Some(c) == quote {
                break;
            }
        }
        Ok(Token::new(TokenKind::StringLiteral, self.text_from(start), line, column))
    }

    fn consume_digits(&mut self, pred: fn(char) -> bool) -> usize {
        let mut n = 0;
        while self.peek_char().is_some_and(pred) {
            self.bump();
            n += 1;
        }
        n
    }

    fn next_number(&mut self) -> LexResult<Token> {
        let (start, line, column) = (self.pos, self.line, self.column());
        if self.peek_char() == Some('-') {
            self.bump();
            match self.peek_char() {
                None => {
                    return Err(self.failure_at(
                        line,
                        column,
                        1,
                        "Unexpected end of stream after negative indicator",
                    ));
                }
                Some(c) if c == '.' || c.is_ascii_digit() => {}
                Some(_) => {
                    let message = "No decimal after negative indicator";
                    return Err(self.failure_at(line, column, 1, message));
                }
            }
        }
        if self.peek_char() == Some('0') {
            match self.peek_char_at(1) {
                Some('x') => {
                    self.bump();
                    self.bump();
                    if self.consume_digits(|c| c.is_ascii_hexdigit()) == 0 {
                        let length = self.pos - start;
                        return Err(self.failure_at(line, column, length, "Missing hex digits"));
                    }
                    return self.finish_number(start, line, column);
                }
                Some(c) if c.is_ascii_digit() => {
                    self.bump();
                    self.consume_digits(|c| ('0'..='7').contains(&c));
                    return self.finish_number(start, line, column);
                }
                _ => {}
            }
        }
        let mut digits = self.consume_digits(|c| c.is_ascii_digit());
        if self.peek_char() == Some('.') {
            self.bump();
            digits += self.consume_digits(|c| c.is_ascii_digit());
        }
        if digits == 0 {
            let length = self.pos - start;
            return Err(self.failure_at(line, column, length, "Number without digits"));
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            self.bump();
            if matches!(self.peek_char(), Some('+') | Some('-')) {
                self.bump();
            }
            if self.peek_char().is_none() {
                return Err(self.failure_at(
                    line,
                    column,
                    self.pos - start,
                    "Unexpected end of stream after exponent indicator",
                ));
            }
            if self.consume_digits(|c| c.is_ascii_digit()) == 0 {
                let length = self.pos - start + 1;
                return Err(self.failure_at(line, column, length, "Missing exponent value"));
            }
        }
        self.finish_number(start, line, column)
    }

    fn finish_number(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token> {
        if !ends_number(self.peek_char()) {
            let text: String = self.buffer[start..=self.pos].iter().collect();
            return Err(self.failure_at(
                line,
                column,
                self.pos - start + 1,
                format!("Invalid termination of number: '{}'", text.escape_default()),
            ));
        }
        Ok(Token::new(TokenKind::Number, self.text_from(start), line, column))
    }

    fn next_identifier(&mut self) -> LexResult<Token> {
        let (start, line, column) = (self.pos, self.line, self.column());
        self.bump();
        loop {
            match self.peek_char() {
                Some('.') => {
                    self.bump();
                    match self.peek_char() {
                        Some(c) if is_ident_start(c) => {
                            self.bump();
                        }
                        Some('.') => {
                            return Err(self.failure_at(
                                line,
                                column,
                                self.pos - start + 1,
                                "Identifier with double '.'",
                            ));
                        }
                        Some(c) if c.is_ascii_digit() => {
                            return Err(self.failure_at(
                                line,
                                column,
                                self.pos - start + 1,
                                format!("Identifier part starting with digit '{}'", c),
                            ));
                        }
                        _ => {
                            return Err(self.failure_at(
                                line,
                                column,
                                self.pos - start,
                                "Identifier with trailing '.'",
                            ));
                        }
                    }
                }
                Some(c) if c == '_' || c.is_ascii_alphanumeric() => {
                    self.bump();
                }
                _ => break,
            }
        }
        match self.peek_char() {
            Some(c) if !is_space(c) && !SYMBOLS.contains(c) && c != SHELL_COMMENT => {
                let message = format!("Wrongly terminated identifier: '{}'", c.escape_default());
                Err(self.failure_at(line, column, self.pos - start, message))
            }
            _ => Ok(Token::new(TokenKind::Identifier, self.text_from(start), line, column)),
        }
    }
}

/// Read one brace-balanced region, skipping braces in literals and comments, then the
/// rest of the line it ends on.
fn read_enclosed(input: &mut dyn Read) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    let mut depth = 0usize;
    let mut literal: Option<u8> = None;
    let mut escaped = false;
    let mut comment = false;
    let mut closed = false;
    while input.read(&mut byte)? > 0 {
        let b = byte[0];
        out.push(b);
        if comment {
            if b == b'\n' || b == b'\r' {
                comment = false;
            }
        } else if let Some(quote) = literal {
            if escaped {
                escaped = false;
            } else if b == quote {
                literal = None;
            } else if b == b'\\' {
                escaped = true;
            }
        } else {
            match b {
                b'"' | b'\'' => literal = Some(b),
                b'#' => comment = true,
                b'{' => depth += 1,
                b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        closed = true;
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    if closed {
        while input.read(&mut byte)? > 0 {
            out.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
    }
    Ok(out)
}
