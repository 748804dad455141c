//! Single-pass, longest-match lexer over CHTL source text (spec §4.2).

use crate::config::Config;
use crate::diagnostics::{Diagnostic, ErrorKind, Reporter};
use crate::token::{Token, TokenType};

fn is_plain_identifier(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| (b as char).is_alphanumeric() || b == b'_')
}

const SECTION_KEYWORDS: &[(&str, TokenType)] = &[
    ("Template", TokenType::Template),
    ("Custom", TokenType::Custom),
    ("Origin", TokenType::Origin),
    ("Import", TokenType::Import),
    ("Namespace", TokenType::Namespace),
    ("Configuration", TokenType::Configuration),
    ("Name", TokenType::Name),
    ("OriginType", TokenType::OriginType),
];

pub struct Lexer<'a> {
    config: &'a Config,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    prev_ty: Option<TokenType>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, config: &'a Config) -> Self {
        Self {
            config,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            prev_ty: None,
        }
    }

    #[tracing::instrument(skip_all, name = "lexer.tokenize")]
    pub fn tokenize(mut self, reporter: &mut Reporter, file: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_insignificant_whitespace();
            if self.is_at_end() {
                tokens.push(Token::eof(self.line, self.column));
                break;
            }
            let start_pos = self.pos;
            match self.next_token(reporter, file) {
                Some(tok) => {
                    self.prev_ty = Some(tok.ty);
                    tokens.push(tok.with_byte(start_pos));
                }
                None => continue,
            }
        }
        tokens
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> u8 {
        let b = self.bytes[self.pos];
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        b
    }

    fn skip_insignificant_whitespace(&mut self) {
        loop {
            match self.peek(0) {
                Some(b) if (b as char).is_whitespace() => {
                    self.advance();
                }
                Some(b'/') if self.peek(1) == Some(b'/') => {
                    while !self.is_at_end() && self.peek(0) != Some(b'\n') {
                        self.advance();
                    }
                }
                Some(b'/') if self.peek(1) == Some(b'*') => {
                    self.advance();
                    self.advance();
                    while !self.is_at_end() && !(self.peek(0) == Some(b'*') && self.peek(1) == Some(b'/')) {
                        self.advance();
                    }
                    if !self.is_at_end() {
                        self.advance();
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self, reporter: &mut Reporter, file: &str) -> Option<Token> {
        let line = self.line;
        let column = self.column;
        let b = self.peek(0)?;

        // Generator comment: `-- ...` to end of line.
        if b == b'-' && self.peek(1) == Some(b'-') {
            self.advance();
            self.advance();
            let start = self.pos;
            while !self.is_at_end() && self.peek(0) != Some(b'\n') {
                self.advance();
            }
            let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).trim().to_string();
            return Some(Token::new(TokenType::GeneratorComment, text, line, column));
        }

        if b == b'[' {
            return self.lex_bracketed_section(reporter, file, line, column);
        }

        if b == b'@' {
            self.advance();
            let start = self.pos;
            while self.peek(0).is_some_and(|c| (c as char).is_alphanumeric() || c == b'_') {
                self.advance();
            }
            let name = String::from_utf8_lossy(&self.bytes[start..self.pos]).to_string();
            return Some(Token::new(TokenType::TypeIdentifier, format!("@{name}"), line, column));
        }

        if (b as char).is_alphabetic() || b == b'_' {
            return Some(self.lex_identifier_or_keyword(line, column));
        }

        if (b as char).is_ascii_digit() {
            return Some(self.lex_number(line, column));
        }

        if b == b'"' || b == b'\'' {
            return self.lex_quoted_string(reporter, file, line, column);
        }

        match b {
            b':' => self.single(TokenType::Colon, line, column),
            b';' => self.single(TokenType::Semicolon, line, column),
            b'{' => self.single(TokenType::LBrace, line, column),
            b'}' => self.single(TokenType::RBrace, line, column),
            b'[' => self.single(TokenType::LBracket, line, column),
            b']' => self.single(TokenType::RBracket, line, column),
            b'(' => self.single(TokenType::LParen, line, column),
            b')' => self.single(TokenType::RParen, line, column),
            b'.' => self.single(TokenType::Dot, line, column),
            b'#' => self.single(TokenType::Hash, line, column),
            b'&' => self.single(TokenType::Ampersand, line, column),
            b',' => self.single(TokenType::Comma, line, column),
            b'-' if self.peek(1) == Some(b'>') => {
                self.advance();
                self.advance();
                Some(Token::new(TokenType::Arrow, "->", line, column))
            }
            b'=' => self.single(TokenType::Equal, line, column),
            _ => Some(self.lex_unquoted_literal(line, column)),
        }
    }

    fn single(&mut self, ty: TokenType, line: u32, column: u32) -> Option<Token> {
        let b = self.advance();
        Some(Token::new(ty, (b as char).to_string(), line, column))
    }

    /// Lexes a bracketed section (spec §4.2). `[Ident]` tokenizes as one
    /// dedicated keyword token when `Ident` is a known section keyword.
    /// Immediately after a `[Configuration]` token, an unrecognized
    /// `[Ident]` is instead the named-configuration label
    /// (`[Configuration] [MyName] { ... }`): `[` and `]` lex as standalone
    /// delimiters so `MyName` tokenizes as a plain identifier. Anywhere
    /// else, an unrecognized bracketed section is still a hard error.
    fn lex_bracketed_section(&mut self, reporter: &mut Reporter, file: &str, line: u32, column: u32) -> Option<Token> {
        let save = (self.pos, self.line, self.column);
        self.advance(); // consume '['
        let start = self.pos;
        while self.peek(0).is_some_and(|c| c != b']' && c != b'\n') {
            self.advance();
        }
        let ident = String::from_utf8_lossy(&self.bytes[start..self.pos]).to_string();
        let terminated = self.peek(0) == Some(b']');

        if let Some((_, ty)) = SECTION_KEYWORDS.iter().find(|(name, _)| *name == ident) {
            if terminated {
                self.advance();
            } else {
                reporter.push(Diagnostic::error(
                    ErrorKind::LexicalError,
                    file,
                    line,
                    column,
                    "unterminated bracketed section",
                ));
            }
            return Some(Token::new(*ty, format!("[{ident}]"), line, column));
        }

        if terminated && self.prev_ty == Some(TokenType::Configuration) && is_plain_identifier(&ident) {
            (self.pos, self.line, self.column) = save;
            return self.single(TokenType::LBracket, line, column);
        }

        if terminated {
            self.advance();
        } else {
            reporter.push(Diagnostic::error(
                ErrorKind::LexicalError,
                file,
                line,
                column,
                "unterminated bracketed section",
            ));
        }
        reporter.push(
            Diagnostic::error(
                ErrorKind::SyntaxError,
                file,
                line,
                column,
                format!("unknown bracketed section `[{ident}]`"),
            )
            .with_hint("expected one of Template, Custom, Origin, Import, Namespace, Configuration, Name, OriginType"),
        );
        Some(Token::new(TokenType::LBracket, format!("[{ident}]"), line, column))
    }

    fn lex_identifier_or_keyword(&mut self, line: u32, column: u32) -> Token {
        let start = self.pos;
        while self.peek(0).is_some_and(|c| (c as char).is_alphanumeric() || c == b'_' || c == b'-') {
            self.advance();
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).to_string();

        // `at top` / `at bottom` compound keywords.
        if text == "at" {
            let save = (self.pos, self.line, self.column);
            self.skip_insignificant_whitespace();
            let tail_start = self.pos;
            while self.peek(0).is_some_and(|c| (c as char).is_alphabetic()) {
                self.advance();
            }
            let tail = String::from_utf8_lossy(&self.bytes[tail_start..self.pos]).to_string();
            match tail.as_str() {
                "top" => return Token::new(TokenType::AtTop, "at top", line, column),
                "bottom" => return Token::new(TokenType::AtBottom, "at bottom", line, column),
                _ => {
                    (self.pos, self.line, self.column) = save;
                }
            }
        }

        let ty = match text.as_str() {
            kw if kw == self.config.keyword("inherit") => TokenType::Inherit,
            kw if kw == self.config.keyword("delete") => TokenType::Delete,
            kw if kw == self.config.keyword("insert") => TokenType::Insert,
            "after" => TokenType::After,
            "before" => TokenType::Before,
            "replace" => TokenType::Replace,
            "from" => TokenType::From,
            "as" => TokenType::As,
            "except" => TokenType::Except,
            "use" => TokenType::Use,
            "html5" => TokenType::Html5,
            kw if kw == self.config.keyword("text") => TokenType::Text,
            kw if kw == self.config.keyword("style") => TokenType::Style,
            kw if kw == self.config.keyword("script") => TokenType::Script,
            _ => TokenType::Identifier,
        };
        Token::new(ty, text, line, column)
    }

    fn lex_number(&mut self, line: u32, column: u32) -> Token {
        let start = self.pos;
        while self.peek(0).is_some_and(|c| (c as char).is_ascii_digit() || c == b'.') {
            self.advance();
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).to_string();
        Token::new(TokenType::Number, text, line, column)
    }

    fn lex_quoted_string(&mut self, reporter: &mut Reporter, file: &str, line: u32, column: u32) -> Option<Token> {
        let quote = self.advance();
        let start = self.pos;
        while self.peek(0).is_some_and(|c| c != quote) {
            if self.peek(0) == Some(b'\\') {
                self.advance();
            }
            self.advance();
        }
        if self.is_at_end() {
            reporter.push(Diagnostic::error(
                ErrorKind::LexicalError,
                file,
                line,
                column,
                "unterminated string literal",
            ));
            return None;
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).to_string();
        self.advance(); // closing quote
        Some(Token::new(TokenType::String, text, line, column))
    }

    /// `HandleUnquotedLiteral`: consume until one of `{},:;()[]` (spec §4.2).
    fn lex_unquoted_literal(&mut self, line: u32, column: u32) -> Token {
        let start = self.pos;
        const STOP: &[u8] = b"{},:;()[]";
        while self.peek(0).is_some_and(|c| !STOP.contains(&c) && !(c as char).is_whitespace()) {
            self.advance();
        }
        if self.pos == start {
            // Guarantee progress on an unrecognized single byte.
            self.advance();
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).trim().to_string();
        Token::new(TokenType::LiteralString, text, line, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> (Vec<Token>, Reporter) {
        let config = Config::default();
        let mut reporter = Reporter::new();
        let tokens = Lexer::new(src, &config).tokenize(&mut reporter, "t.chtl");
        (tokens, reporter)
    }

    #[test]
    fn tokenizes_element_skeleton() {
        let (tokens, reporter) = lex("div { text { Hello } }");
        assert!(!reporter.has_errors());
        assert_eq!(tokens.first().unwrap().ty, TokenType::Identifier);
        assert!(tokens.iter().any(|t| t.ty == TokenType::Text));
        assert_eq!(tokens.last().unwrap().ty, TokenType::EndOfFile);
    }

    #[test]
    fn recognizes_bracketed_sections_and_type_identifiers() {
        let (tokens, _) = lex("[Template] @Style Btn { color: blue; }");
        assert_eq!(tokens[0].ty, TokenType::Template);
        assert_eq!(tokens[1].ty, TokenType::TypeIdentifier);
        assert_eq!(tokens[1].lexeme, "@Style");
    }

    #[test]
    fn line_and_column_are_monotonic() {
        let (tokens, _) = lex("div {\n  text { hi }\n}\n");
        let mut last = (0u32, 0u32);
        for t in &tokens {
            assert!((t.line, t.column) >= last);
            last = (t.line, t.column);
        }
    }

    #[test]
    fn unknown_bracketed_section_is_an_error() {
        let (_, reporter) = lex("[Bogus] foo");
        assert!(reporter.has_errors());
    }

    #[test]
    fn named_configuration_label_lexes_as_bracket_identifier_bracket() {
        let (tokens, reporter) = lex("[Configuration] [MyName] { }");
        assert!(!reporter.has_errors());
        assert_eq!(tokens[0].ty, TokenType::Configuration);
        assert_eq!(tokens[1].ty, TokenType::LBracket);
        assert_eq!(tokens[2].ty, TokenType::Identifier);
        assert_eq!(tokens[2].lexeme, "MyName");
        assert_eq!(tokens[3].ty, TokenType::RBracket);
    }
}
