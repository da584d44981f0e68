// File: src/lexer.rs
//
// Byte-at-a-time lexer for Monkey source text. Produces a flat token
// stream consumed by the parser; never seen by the compiler or VM.

use crate::token::{lookup_ident, Token, TokenKind};

pub struct Lexer {
    input: Vec<u8>,
    position: usize,      // current char
    read_position: usize, // next char
    ch: u8,                // current char under examination, 0 is NUL/EOF
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let mut lexer = Lexer {
            input: input.as_bytes().to_vec(),
            position: 0,
            read_position: 0,
            ch: 0,
            line: 1,
            column: 0,
        };
        lexer.read_char();
        lexer
    }

    /// Tokenizes the entire input, ending with a single `Eof` token.
    pub fn tokenize(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token();
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn read_char(&mut self) {
        if self.ch == b'\n' {
            self.line += 1;
            self.column = 0;
        }
        if self.read_position >= self.input.len() {
            self.ch = 0;
        } else {
            self.ch = self.input[self.read_position];
        }
        self.position = self.read_position;
        self.read_position += 1;
        self.column += 1;
    }

    fn peek_char(&self) -> u8 {
        if self.read_position >= self.input.len() {
            0
        } else {
            self.input[self.read_position]
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.ch, b' ' | b'\t' | b'\n' | b'\r') {
            self.read_char();
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        while is_letter(self.ch) {
            self.read_char();
        }
        String::from_utf8_lossy(&self.input[start..self.position]).into_owned()
    }

    fn read_number(&mut self) -> i64 {
        let start = self.position;
        while self.ch.is_ascii_digit() {
            self.read_char();
        }
        String::from_utf8_lossy(&self.input[start..self.position]).parse().unwrap_or(0)
    }

    fn read_string(&mut self) -> String {
        let mut s = String::new();
        loop {
            self.read_char();
            match self.ch {
                b'"' | 0 => break,
                b'\\' => {
                    self.read_char();
                    match self.ch {
                        b'n' => s.push('\n'),
                        b't' => s.push('\t'),
                        b'\\' => s.push('\\'),
                        b'"' => s.push('"'),
                        other => s.push(other as char),
                    }
                }
                other => s.push(other as char),
            }
        }
        s
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let (line, column) = (self.line, self.column);

        let kind = match self.ch {
            b'=' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'!' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            b'*' => TokenKind::Asterisk,
            b'/' => TokenKind::Slash,
            b'<' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b':' => TokenKind::Colon,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'"' => TokenKind::Str(self.read_string()),
            0 => TokenKind::Eof,
            ch if is_letter(ch) => {
                let ident = self.read_identifier();
                return Token { kind: lookup_ident(&ident), line, column };
            }
            ch if ch.is_ascii_digit() => {
                let value = self.read_number();
                return Token { kind: TokenKind::Int(value), line, column };
            }
            _ => TokenKind::Illegal,
        };

        self.read_char();
        Token { kind, line, column }
    }
}

fn is_letter(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_basic_program() {
        let input = "let five = 5;\nlet add = fn(x, y) { x + y; };\nadd(five, 10);";
        let tokens = Lexer::tokenize(input);
        let kinds: Vec<_> = tokens.into_iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Let,
                TokenKind::Ident("five".into()),
                TokenKind::Assign,
                TokenKind::Int(5),
                TokenKind::Semicolon,
                TokenKind::Let,
                TokenKind::Ident("add".into()),
                TokenKind::Assign,
                TokenKind::Function,
                TokenKind::LParen,
                TokenKind::Ident("x".into()),
                TokenKind::Comma,
                TokenKind::Ident("y".into()),
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Ident("x".into()),
                TokenKind::Plus,
                TokenKind::Ident("y".into()),
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Semicolon,
                TokenKind::Ident("add".into()),
                TokenKind::LParen,
                TokenKind::Ident("five".into()),
                TokenKind::Comma,
                TokenKind::Int(10),
                TokenKind::RParen,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_two_char_operators_and_strings() {
        let input = r#"1 <= 2; 2 >= 1; 1 == 1; 1 != 2; "hello world"; [1, 2]; {"a": 1};"#;
        let tokens = Lexer::tokenize(input);
        let kinds: Vec<_> = tokens.into_iter().map(|t| t.kind).collect();
        assert!(kinds.contains(&TokenKind::LtEq));
        assert!(kinds.contains(&TokenKind::GtEq));
        assert!(kinds.contains(&TokenKind::Eq));
        assert!(kinds.contains(&TokenKind::NotEq));
        assert!(kinds.contains(&TokenKind::Str("hello world".into())));
        assert!(kinds.contains(&TokenKind::LBracket));
        assert!(kinds.contains(&TokenKind::Colon));
    }
}
