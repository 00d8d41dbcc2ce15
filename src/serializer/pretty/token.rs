use std::fmt;

pub const MESSAGE_START: char = '{';
pub const MESSAGE_END: char = '}';
pub const KEY_VALUE_SEP: char = ':';
pub const LIST_START: char = '[';
pub const LIST_END: char = ']';
pub const PARAMS_START: char = '(';
pub const PARAMS_END: char = ')';
pub const LINE_SEP_1: char = ',';
pub const LINE_SEP_2: char = ';';
pub const SHELL_COMMENT: char = '#';

pub const SYMBOLS: &str = "{}:,;[]()";

pub const B64: &str = "b64";
pub const HEX: &str = "hex";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Symbol,
    /// Quoted with single or double quotes, quotes included in the text.
    StringLiteral,
    Number,
    /// One or more identifier segments joined by dots.
    Identifier,
}

/// A lexical token with the 1-based position it starts at.
#[derive(Clone, PartialEq)]
pub struct Token {
    kind: TokenKind,
    text: String,
    line: usize,
    column: usize,
}

impl Token {
    pub(crate) fn new(kind: TokenKind, text: String, line: usize, column: usize) -> Self {
        Self { kind, text, line, column }
    }

    #[inline]
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn line(&self) -> usize {
        self.line
    }

    #[inline]
    pub fn column(&self) -> usize {
        self.column
    }

    /// Length in chars.
    #[inline]
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    #[inline]
    pub fn is_symbol(&self, symbol: char) -> bool {
        self.kind == TokenKind::Symbol && self.text.starts_with(symbol)
    }

    #[inline]
    pub fn is_string_literal(&self) -> bool {
        self.kind == TokenKind::StringLiteral
    }

    /// A single identifier segment, without dots.
    #[inline]
    pub fn is_identifier(&self) -> bool {
        self.kind == TokenKind::Identifier && !self.text.contains('.')
    }

    #[inline]
    pub fn is_qualified_identifier(&self) -> bool {
        self.kind == TokenKind::Identifier
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        self.kind == TokenKind::Number
    }

    /// Decimal, `0`-prefixed octal or `0x` hex, without fraction or exponent.
    pub fn is_integer(&self) -> bool {
        if self.kind != TokenKind::Number {
            return false;
        }
        let digits = self.text.strip_prefix('-').unwrap_or(&self.text);
        digits.starts_with("0x") || !digits.contains(['.', 'e', 'E'])
    }

    pub fn parse_integer(&self) -> Result<i64, String> {
        let (neg, digits) = match self.text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, self.text.as_str()),
        };
        let (radix, digits) = if let Some(hex) = digits.strip_prefix("0x") {
            (16, hex)
        } else if digits.len() > 1 && digits.starts_with('0') {
            (8, &digits[1..])
        } else {
            (10, digits)
        };
        let signed = if neg { format!("-{}", digits) } else { digits.to_string() };
        i64::from_str_radix(&signed, radix)
            .map_err(|e| format!("invalid integer {}: {}", self.text, e))
    }

    pub fn parse_double(&self) -> Result<f64, String> {
        if self.is_integer() {
            return self.parse_integer().map(|v| v as f64);
        }
        self.text.parse::<f64>().map_err(|e| format!("invalid number {}: {}", self.text, e))
    }

    /// The content of a string literal with escapes resolved.
    ///
    /// When not strict, an invalid escape sequence becomes `?`.
    pub fn decode_literal(&self, strict: bool) -> Result<String, String> {
        let mut chars: Vec<char> = self.text.chars().collect();
        if chars.len() < 2 {
            return Err(format!("not a string literal: {}", self.text));
        }
        chars.remove(0);
        chars.pop();
        let mut out = String::with_capacity(chars.len());
        let mut i = 0;
        let invalid = |out: &mut String, msg: String| -> Result<(), String> {
            if strict {
                return Err(msg);
            }
            out.push('?');
            Ok(())
        };
        while i < chars.len() {
            let c = chars[i];
            i += 1;
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some(&esc) = chars.get(i) else {
                invalid(&mut out, "unterminated escape at end of literal".to_string())?;
                break;
            };
            i += 1;
            match esc {
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                '"' | '\'' | '\\' | '/' => out.push(esc),
                'u' => {
                    let Some(high) = hex4(&chars, i) else {
                        invalid(&mut out, "invalid \\u escape".to_string())?;
                        i = (i + 4).min(chars.len());
                        continue;
                    };
                    i += 4;
                    if (0xd800..0xdc00).contains(&high) {
                        let low = if chars.get(i) == Some(&'\\') && chars.get(i + 1) == Some(&'u') {
                            hex4(&chars, i + 2).filter(|low| (0xdc00..0xe000).contains(low))
                        } else {
                            None
                        };
                        match low {
                            Some(low) => {
                                i += 6;
                                let cp = 0x10000 + ((high - 0xd800) << 10) + (low - 0xdc00);
                                match char::from_u32(cp) {
                                    Some(ch) => out.push(ch),
                                    None => {
                                        invalid(&mut out, "invalid surrogate pair".to_string())?
                                    }
                                }
                            }
                            None => {
                                invalid(&mut out, "unpaired surrogate in \\u escape".to_string())?
                            }
                        }
                    } else {
                        match char::from_u32(high) {
                            Some(ch) => out.push(ch),
                            None => invalid(&mut out, "invalid \\u escape".to_string())?,
                        }
                    }
                }
                '0'..='7' => {
                    let end = (i + 2).min(chars.len());
                    let octal: String = chars[i - 1..end].iter().collect();
                    match u32::from_str_radix(&octal, 8).ok().filter(|_| octal.len() == 3) {
                        Some(cp) if cp <= 0o377 => {
                            i = end;
                            out.push(char::from_u32(cp).unwrap_or('?'));
                        }
                        _ => invalid(&mut out, format!("invalid octal escape \\{}", octal))?,
                    }
                }
                other => invalid(&mut out, format!("invalid escaped char '\\{}'", other))?,
            }
        }
        Ok(out)
    }
}

fn hex4(chars: &[char], start: usize) -> Option<u32> {
    let digits = chars.get(start..start + 4)?;
    if !digits.iter().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let s: String = digits.iter().collect();
    u32::from_str_radix(&s, 16).ok()
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Token({:?}, {}:{})", self.text, self.line, self.column)
    }
}

impl fmt::Display for Token {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text)
    }
}
