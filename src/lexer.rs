// File: src/lexer.rs
//
// Tokenizer for the Slate source language. Produces positioned tokens; any
// malformed input (unknown character, unterminated string, out-of-range
// number) is reported as a parse error with the offending span.

use crate::errors::{CompileError, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Int(i32),
    Float(f32),
    Str(String),
    Keyword(String),
    Operator(String),
    Punctuation(char),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

const KEYWORDS: [&str; 12] = [
    "void", "string", "bool", "int", "float", "ivec2", "vec2", "if", "while", "return", "true",
    "false",
];

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self { chars: source.chars().peekable(), offset: 0, line: 1, column: 1 }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn position(&self) -> (usize, usize, usize) {
        (self.offset, self.line, self.column)
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut cursor = Cursor::new(source);

    while let Some(c) = cursor.peek() {
        let (start, start_line, start_column) = cursor.position();

        match c {
            ' ' | '\t' | '\r' | '\n' => {
                cursor.advance();
            }

            '/' => {
                cursor.advance();
                if cursor.peek() == Some('/') {
                    while let Some(c) = cursor.peek() {
                        if c == '\n' {
                            break;
                        }
                        cursor.advance();
                    }
                } else {
                    tokens.push(token(
                        TokenKind::Operator("/".into()),
                        start,
                        start_line,
                        start_column,
                        &cursor,
                    ));
                }
            }

            '"' => {
                cursor.advance();
                let mut value = String::new();
                let mut terminated = false;
                while let Some(c) = cursor.advance() {
                    match c {
                        '"' => {
                            terminated = true;
                            break;
                        }
                        '\\' => match cursor.advance() {
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some('\\') => value.push('\\'),
                            Some('"') => value.push('"'),
                            Some(other) => value.push(other),
                            None => break,
                        },
                        _ => value.push(c),
                    }
                }

                if !terminated {
                    return Err(CompileError::parse(
                        span_to(start, start_line, start_column, &cursor),
                        "unterminated string literal",
                    ));
                }

                tokens.push(token(TokenKind::Str(value), start, start_line, start_column, &cursor));
            }

            '0'..='9' => {
                let mut text = String::new();
                let mut is_float = false;
                while let Some(c) = cursor.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        cursor.advance();
                    } else if c == '.' && !is_float {
                        is_float = true;
                        text.push(c);
                        cursor.advance();
                    } else {
                        break;
                    }
                }

                let span = span_to(start, start_line, start_column, &cursor);
                let kind = if is_float {
                    match text.parse::<f32>() {
                        Ok(value) => TokenKind::Float(value),
                        Err(_) => {
                            return Err(CompileError::parse(span, "malformed float literal"));
                        }
                    }
                } else {
                    match text.parse::<i32>() {
                        Ok(value) => TokenKind::Int(value),
                        Err(_) => {
                            return Err(CompileError::parse(span, "integer literal out of range"));
                        }
                    }
                };

                tokens.push(Token { kind, span });
            }

            'a'..='z' | 'A'..='Z' | '_' => {
                let mut ident = String::new();
                while let Some(c) = cursor.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        cursor.advance();
                    } else {
                        break;
                    }
                }

                let kind = if KEYWORDS.contains(&ident.as_str()) {
                    TokenKind::Keyword(ident)
                } else {
                    TokenKind::Identifier(ident)
                };

                tokens.push(token(kind, start, start_line, start_column, &cursor));
            }

            '=' | '!' | '<' | '>' => {
                cursor.advance();
                let mut op = c.to_string();
                if cursor.peek() == Some('=') {
                    cursor.advance();
                    op.push('=');
                }
                tokens.push(token(
                    TokenKind::Operator(op),
                    start,
                    start_line,
                    start_column,
                    &cursor,
                ));
            }

            '+' | '-' | '*' => {
                cursor.advance();
                tokens.push(token(
                    TokenKind::Operator(c.to_string()),
                    start,
                    start_line,
                    start_column,
                    &cursor,
                ));
            }

            '(' | ')' | '{' | '}' | ',' | ';' => {
                cursor.advance();
                tokens.push(token(
                    TokenKind::Punctuation(c),
                    start,
                    start_line,
                    start_column,
                    &cursor,
                ));
            }

            _ => {
                cursor.advance();
                return Err(CompileError::parse(
                    span_to(start, start_line, start_column, &cursor),
                    format!("unexpected character '{}'", c),
                ));
            }
        }
    }

    let (offset, line, column) = cursor.position();
    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(offset, line, column, offset, line, column),
    });

    Ok(tokens)
}

fn span_to(start: usize, start_line: usize, start_column: usize, cursor: &Cursor) -> Span {
    Span::new(start, start_line, start_column, cursor.offset, cursor.line, cursor.column)
}

fn token(kind: TokenKind, start: usize, start_line: usize, start_column: usize, cursor: &Cursor) -> Token {
    Token { kind, span: span_to(start, start_line, start_column, cursor) }
}
