use qs_core::{ScriptLangError, SourceLocation, SourceSpan};

use crate::token::{Keyword, Token, TokenKind};

pub const FOREIGN_OPEN: &str = "<%";
pub const FOREIGN_CLOSE: &str = "%>";

/// Produces tokens on demand. Once `Eof` or an error has been yielded the
/// iterator is exhausted.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
            done: false,
        }
    }

    pub fn next_token(&mut self) -> Result<Token, ScriptLangError> {
        self.skip_trivia()?;

        let start = self.location();
        let start_pos = self.pos;
        let Some(ch) = self.peek_char() else {
            return Ok(self.make(TokenKind::Eof, start_pos, start));
        };

        if self.rest().starts_with(FOREIGN_OPEN) {
            return self.foreign_code(start_pos, start);
        }

        if ch == '"' || ch == '\'' {
            return self.string(ch, start_pos, start);
        }
        if ch.is_ascii_digit() {
            return self.number(start_pos, start);
        }
        if is_ident_start(ch) {
            return Ok(self.word(start_pos, start));
        }

        self.bump();
        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '!' => self.pick('=', TokenKind::BangEqual, TokenKind::Bang),
            '=' => self.pick('=', TokenKind::EqualEqual, TokenKind::Equal),
            '<' => self.pick('=', TokenKind::LessEqual, TokenKind::Less),
            '>' => self.pick('=', TokenKind::GreaterEqual, TokenKind::Greater),
            '&' if self.eat('&') => TokenKind::AmpAmp,
            '|' if self.eat('|') => TokenKind::PipePipe,
            other => {
                return Err(ScriptLangError::with_span(
                    "LEX_UNEXPECTED_CHAR",
                    format!("Unexpected character '{}'.", other),
                    SourceSpan {
                        start: start.clone(),
                        end: start,
                    },
                ))
            }
        };
        Ok(self.make(kind, start_pos, start))
    }

    fn foreign_code(
        &mut self,
        start_pos: usize,
        start: SourceLocation,
    ) -> Result<Token, ScriptLangError> {
        self.bump();
        self.bump();
        let body_start = self.pos;
        let Some(offset) = self.rest().find(FOREIGN_CLOSE) else {
            return Err(ScriptLangError::with_span(
                "LEX_UNTERMINATED_FOREIGN",
                format!("Foreign code block is missing its closing '{}'.", FOREIGN_CLOSE),
                SourceSpan {
                    start: start.clone(),
                    end: start,
                },
            ));
        };
        let body_end = body_start + offset;
        while self.pos < body_end {
            self.bump();
        }
        let code = self.src[body_start..body_end].to_string();
        self.bump();
        self.bump();
        Ok(self.make(TokenKind::ForeignCode(code), start_pos, start))
    }

    fn string(
        &mut self,
        quote: char,
        start_pos: usize,
        start: SourceLocation,
    ) -> Result<Token, ScriptLangError> {
        self.bump();
        let mut value = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(ScriptLangError::with_span(
                    "LEX_UNTERMINATED_STRING",
                    "String literal is missing its closing quote.",
                    SourceSpan {
                        start: start.clone(),
                        end: self.location(),
                    },
                ));
            };
            if ch == quote {
                break;
            }
            if ch != '\\' {
                value.push(ch);
                continue;
            }
            let escape_at = self.location();
            let escaped = match self.bump() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some('0') => '\0',
                Some('\\') => '\\',
                Some('"') => '"',
                Some('\'') => '\'',
                Some(other) => {
                    return Err(ScriptLangError::with_span(
                        "LEX_INVALID_ESCAPE",
                        format!("Unknown escape sequence '\\{}'.", other),
                        SourceSpan {
                            start: escape_at.clone(),
                            end: escape_at,
                        },
                    ))
                }
                None => {
                    return Err(ScriptLangError::with_span(
                        "LEX_UNTERMINATED_STRING",
                        "String literal is missing its closing quote.",
                        SourceSpan {
                            start: start.clone(),
                            end: escape_at,
                        },
                    ))
                }
            };
            value.push(escaped);
        }
        Ok(self.make(TokenKind::String(value), start_pos, start))
    }

    fn number(&mut self, start_pos: usize, start: SourceLocation) -> Result<Token, ScriptLangError> {
        while self.peek_char().is_some_and(|ch| ch.is_ascii_digit()) {
            self.bump();
        }
        let mut lookahead = self.rest().chars();
        if lookahead.next() == Some('.') && lookahead.next().is_some_and(|ch| ch.is_ascii_digit())
        {
            self.bump();
            while self.peek_char().is_some_and(|ch| ch.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = &self.src[start_pos..self.pos];
        let value = text.parse::<f64>().map_err(|_| {
            ScriptLangError::with_span(
                "LEX_INVALID_NUMBER",
                format!("Invalid number literal '{}'.", text),
                SourceSpan {
                    start: start.clone(),
                    end: self.location(),
                },
            )
        })?;
        Ok(self.make(TokenKind::Number(value), start_pos, start))
    }

    fn word(&mut self, start_pos: usize, start: SourceLocation) -> Token {
        while self.peek_char().is_some_and(is_ident_continue) {
            self.bump();
        }
        let text = &self.src[start_pos..self.pos];
        let kind = match text {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => match Keyword::from_word(text) {
                Some(keyword) => TokenKind::Keyword(keyword),
                None => TokenKind::Identifier(text.to_string()),
            },
        };
        self.make(kind, start_pos, start)
    }

    fn skip_trivia(&mut self) -> Result<(), ScriptLangError> {
        loop {
            match self.peek_char() {
                Some(ch) if ch.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.rest().starts_with("//") => {
                    while self.peek_char().is_some_and(|ch| ch != '\n') {
                        self.bump();
                    }
                }
                Some('/') if self.rest().starts_with("/*") => {
                    let start = self.location();
                    self.bump();
                    self.bump();
                    loop {
                        if self.rest().starts_with("*/") {
                            self.bump();
                            self.bump();
                            break;
                        }
                        if self.bump().is_none() {
                            return Err(ScriptLangError::with_span(
                                "LEX_UNTERMINATED_COMMENT",
                                "Block comment is missing its closing '*/'.",
                                SourceSpan {
                                    start: start.clone(),
                                    end: start,
                                },
                            ));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn make(&self, kind: TokenKind, start_pos: usize, start: SourceLocation) -> Token {
        Token {
            kind,
            lexeme: self.src[start_pos..self.pos].to_string(),
            span: SourceSpan {
                start,
                end: self.location(),
            },
        }
    }

    fn pick(&mut self, next: char, matched: TokenKind, otherwise: TokenKind) -> TokenKind {
        if self.eat(next) {
            matched
        } else {
            otherwise
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, ScriptLangError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.next_token();
        if !matches!(&result, Ok(token) if token.kind != TokenKind::Eof) {
            self.done = true;
        }
        Some(result)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod lexer_tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .map(|token| token.expect("lex should pass").kind)
            .collect()
    }

    #[test]
    fn lexes_declarations_operators_and_literals() {
        let tokens = kinds("var x = 10 + 5.5; // trailing\nnpc bob { name: 'Bob'; }");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Identifier("x".to_string()),
                TokenKind::Equal,
                TokenKind::Number(10.0),
                TokenKind::Plus,
                TokenKind::Number(5.5),
                TokenKind::Semicolon,
                TokenKind::Keyword(Keyword::Npc),
                TokenKind::Identifier("bob".to_string()),
                TokenKind::LBrace,
                TokenKind::Identifier("name".to_string()),
                TokenKind::Colon,
                TokenKind::String("Bob".to_string()),
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_char_operators_and_block_comments() {
        let tokens = kinds("a /* skip\n me */ <= b && !c || d != e");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::LessEqual,
                TokenKind::Identifier("b".to_string()),
                TokenKind::AmpAmp,
                TokenKind::Bang,
                TokenKind::Identifier("c".to_string()),
                TokenKind::PipePipe,
                TokenKind::Identifier("d".to_string()),
                TokenKind::BangEqual,
                TokenKind::Identifier("e".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn foreign_code_is_captured_verbatim() {
        let tokens = kinds("<% let x = \"}\"; x + 1 %> ;");
        assert_eq!(
            tokens,
            vec![
                TokenKind::ForeignCode(" let x = \"}\"; x + 1 ".to_string()),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = Lexer::new("a\n  bb")
            .collect::<Result<Vec<_>, _>>()
            .expect("lex should pass");
        assert_eq!(tokens[1].span.start, SourceLocation { line: 2, column: 3 });
        assert_eq!(tokens[1].span.end, SourceLocation { line: 2, column: 5 });
        assert_eq!(tokens[1].lexeme, "bb");
    }

    #[test]
    fn string_escapes_are_resolved() {
        assert_eq!(
            kinds(r#""a\n\"b\"""#)[0],
            TokenKind::String("a\n\"b\"".to_string())
        );
    }

    #[test]
    fn malformed_input_is_reported_not_skipped() {
        let mut lexer = Lexer::new("var s = \"open");
        let errors = lexer.by_ref().filter_map(Result::err).collect::<Vec<_>>();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "LEX_UNTERMINATED_STRING");
        assert_eq!(
            errors[0].span.as_ref().map(|span| span.start.column),
            Some(9)
        );
        assert!(lexer.next().is_none());

        let error = Lexer::new("a # b")
            .find_map(Result::err)
            .expect("should fail");
        assert_eq!(error.code, "LEX_UNEXPECTED_CHAR");

        let error = Lexer::new("<% never closed")
            .find_map(Result::err)
            .expect("should fail");
        assert_eq!(error.code, "LEX_UNTERMINATED_FOREIGN");

        let error = Lexer::new("'\\q'").find_map(Result::err).expect("should fail");
        assert_eq!(error.code, "LEX_INVALID_ESCAPE");

        let error = Lexer::new("/* open").find_map(Result::err).expect("should fail");
        assert_eq!(error.code, "LEX_UNTERMINATED_COMMENT");
    }
}
