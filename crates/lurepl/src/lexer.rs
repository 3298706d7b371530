// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Lua 5.4 token scanner.
//!
//! The compiler, the bundler and the minifier all work on token spans rather
//! than a full syntax tree. Tokens keep byte offsets into the original source
//! so callers can splice replacements without re-rendering untouched code.

use crate::error::{ReplError, Result};

/// Lua reserved words.
pub const KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

const SYMBOLS: &[&str] = &[
    "...", "..", "==", "~=", "<=", ">=", "<<", ">>", "//", "::", "+", "-", "*", "/", "%", "^", "#",
    "&", "~", "|", "<", ">", "=", "(", ")", "{", "}", "[", "]", ";", ":", ",", ".",
];

/// Token category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Spaces, tabs and newlines.
    Whitespace,
    /// Line or long comment.
    Comment,
    /// Identifier.
    Name,
    /// Reserved word.
    Keyword,
    /// Numeric literal.
    Number,
    /// Short or long string literal.
    String,
    /// Operator or punctuation.
    Symbol,
}

/// A token with its byte span in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Token category.
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// 1-indexed line of `start`.
    pub line: usize,
    /// 1-indexed column of `start`.
    pub column: usize,
}

impl Token {
    /// Returns the token text.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// True for whitespace and comments.
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    /// True when this is the given keyword.
    pub fn is_keyword(&self, source: &str, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text(source) == word
    }

    /// True when this is the given symbol.
    pub fn is_symbol(&self, source: &str, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text(source) == symbol
    }
}

struct Scanner<'a> {
    file: &'a str,
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
}

impl<'a> Scanner<'a> {
    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) {
        if self.bytes[self.pos] == b'\n' {
            self.line += 1;
            self.line_start = self.pos + 1;
        }
        self.pos += 1;
    }

    fn error(&self, message: &str, line: usize, column: usize) -> ReplError {
        ReplError::parse(self.file, self.source, message, line, column)
    }

    /// Returns the level of a long bracket opening at `pos`, if any.
    fn long_bracket_level(&self, pos: usize) -> Option<usize> {
        if self.bytes.get(pos) != Some(&b'[') {
            return None;
        }
        let mut level = 0;
        while self.bytes.get(pos + 1 + level) == Some(&b'=') {
            level += 1;
        }
        if self.bytes.get(pos + 1 + level) == Some(&b'[') {
            Some(level)
        } else {
            None
        }
    }

    fn long_bracket(&mut self, level: usize, what: &str, line: usize, column: usize) -> Result<()> {
        for _ in 0..level + 2 {
            self.bump();
        }
        loop {
            match self.peek(0) {
                None => return Err(self.error(&format!("unfinished long {}", what), line, column)),
                Some(b']') => {
                    let closes = (1..=level).all(|i| self.peek(i) == Some(b'='))
                        && self.peek(level + 1) == Some(b']');
                    if closes {
                        for _ in 0..level + 2 {
                            self.bump();
                        }
                        return Ok(());
                    }
                    self.bump();
                }
                Some(_) => self.bump(),
            }
        }
    }

    fn short_string(&mut self, quote: u8, line: usize, column: usize) -> Result<()> {
        self.bump();
        loop {
            match self.peek(0) {
                None | Some(b'\n') => return Err(self.error("unfinished string", line, column)),
                Some(b'\\') => {
                    self.bump();
                    if self.peek(0).is_some() {
                        self.bump();
                    }
                }
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => self.bump(),
            }
        }
    }

    fn number(&mut self) {
        let hex = self.peek(0) == Some(b'0') && matches!(self.peek(1), Some(b'x') | Some(b'X'));
        if hex {
            self.bump();
            self.bump();
        }
        while let Some(c) = self.peek(0) {
            let exponent = if hex { matches!(c, b'p' | b'P') } else { matches!(c, b'e' | b'E') };
            if exponent && matches!(self.peek(1), Some(b'+') | Some(b'-')) {
                self.bump();
                self.bump();
            } else if c.is_ascii_alphanumeric() || c == b'_' || (c == b'.' && self.peek(1) != Some(b'.')) {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        let Some(c) = self.peek(0) else {
            return Ok(None);
        };
        let start = self.pos;
        let line = self.line;
        let column = self.pos - self.line_start + 1;

        let kind = if c.is_ascii_whitespace() {
            while self.peek(0).is_some_and(|c| c.is_ascii_whitespace()) {
                self.bump();
            }
            TokenKind::Whitespace
        } else if c == b'-' && self.peek(1) == Some(b'-') {
            if let Some(level) = self.long_bracket_level(self.pos + 2) {
                self.bump();
                self.bump();
                self.long_bracket(level, "comment", line, column)?;
            } else {
                while self.peek(0).is_some_and(|c| c != b'\n') {
                    self.bump();
                }
            }
            TokenKind::Comment
        } else if c == b'"' || c == b'\'' {
            self.short_string(c, line, column)?;
            TokenKind::String
        } else if let Some(level) = self.long_bracket_level(self.pos) {
            self.long_bracket(level, "string", line, column)?;
            TokenKind::String
        } else if c.is_ascii_digit() || (c == b'.' && self.peek(1).is_some_and(|d| d.is_ascii_digit())) {
            self.number();
            TokenKind::Number
        } else if c.is_ascii_alphabetic() || c == b'_' {
            while self.peek(0).is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_') {
                self.bump();
            }
            if KEYWORDS.contains(&&self.source[start..self.pos]) {
                TokenKind::Keyword
            } else {
                TokenKind::Name
            }
        } else {
            let rest = &self.source[self.pos..];
            let Some(symbol) = SYMBOLS.iter().find(|s| rest.starts_with(**s)) else {
                let ch = rest.chars().next().unwrap_or('?');
                return Err(self.error(&format!("unexpected character '{}'", ch), line, column));
            };
            for _ in 0..symbol.len() {
                self.bump();
            }
            TokenKind::Symbol
        };

        Ok(Some(Token {
            kind,
            start,
            end: self.pos,
            line,
            column,
        }))
    }
}

/// Splits `source` into tokens, trivia included.
pub fn tokenize(file: &str, source: &str) -> Result<Vec<Token>> {
    let mut scanner = Scanner {
        file,
        source,
        bytes: source.as_bytes(),
        pos: 0,
        line: 1,
        line_start: 0,
    };

    // Skip a shebang line, as the Lua loader does
    if source.starts_with("#!") {
        while scanner.peek(0).is_some_and(|c| c != b'\n') {
            scanner.bump();
        }
    }

    let mut tokens = Vec::new();
    while let Some(token) = scanner.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

/// Splits `source` into tokens, dropping whitespace and comments.
pub fn significant_tokens(file: &str, source: &str) -> Result<Vec<Token>> {
    Ok(tokenize(file, source)?
        .into_iter()
        .filter(|t| !t.is_trivia())
        .collect())
}

/// Decodes the value of a string literal token.
///
/// Returns `None` for malformed escapes.
pub fn string_value(literal: &str) -> Option<String> {
    let bytes = literal.as_bytes();
    match bytes.first()? {
        b'[' => {
            let level = literal[1..].bytes().take_while(|b| *b == b'=').count();
            let body = &literal[level + 2..literal.len() - level - 2];
            // A newline right after the opening bracket is skipped
            let body = body
                .strip_prefix("\r\n")
                .or_else(|| body.strip_prefix('\n'))
                .unwrap_or(body);
            Some(body.to_string())
        }
        b'"' | b'\'' => {
            let inner = &literal[1..literal.len() - 1];
            let mut out = Vec::with_capacity(inner.len());
            let mut iter = inner.bytes().peekable();
            while let Some(b) = iter.next() {
                if b != b'\\' {
                    out.push(b);
                    continue;
                }
                match iter.next()? {
                    b'n' => out.push(b'\n'),
                    b't' => out.push(b'\t'),
                    b'r' => out.push(b'\r'),
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'v' => out.push(0x0b),
                    b'\n' => out.push(b'\n'),
                    b'x' => {
                        let hi = (iter.next()? as char).to_digit(16)?;
                        let lo = (iter.next()? as char).to_digit(16)?;
                        out.push((hi * 16 + lo) as u8);
                    }
                    b'z' => {
                        while iter.peek().is_some_and(|c| c.is_ascii_whitespace()) {
                            iter.next();
                        }
                    }
                    d if d.is_ascii_digit() => {
                        let mut value = (d - b'0') as u32;
                        for _ in 0..2 {
                            match iter.peek() {
                                Some(n) if n.is_ascii_digit() => {
                                    value = value * 10 + (*n - b'0') as u32;
                                    iter.next();
                                }
                                _ => break,
                            }
                        }
                        out.push(u8::try_from(value).ok()?);
                    }
                    other => out.push(other),
                }
            }
            String::from_utf8(out).ok()
        }
        _ => None,
    }
}

/// Renders `value` as a double-quoted Lua string literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Finds the index (into `tokens`) of the `end`/`until` that closes the
/// block opened at `open`.
///
/// `tokens` must be significant tokens. Openers are `function`, `if`, `do`
/// and `repeat`; `while`/`for` open through their `do`.
pub fn matching_block_end(source: &str, tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate().skip(open) {
        if token.kind != TokenKind::Keyword {
            continue;
        }
        match token.text(source) {
            "function" | "if" | "do" | "repeat" => depth += 1,
            "end" | "until" => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Finds the index of the symbol closing the bracket opened at `open`.
pub fn matching_bracket(source: &str, tokens: &[Token], open: usize) -> Option<usize> {
    let (opener, closer) = match tokens.get(open)?.text(source) {
        "(" => ("(", ")"),
        "{" => ("{", "}"),
        "[" => ("[", "]"),
        _ => return None,
    };
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate().skip(open) {
        if token.kind != TokenKind::Symbol {
            continue;
        }
        let text = token.text(source);
        if text == opener {
            depth += 1;
        } else if text == closer {
            depth -= 1;
            if depth == 0 {
                return Some(index);
            }
        }
    }
    None
}
