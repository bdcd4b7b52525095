use crate::token::{Tok, TokKind};
use scope_ast::span::Span;

/// Upper bound on tokens produced for one source file.
pub const MAX_TOKENS: usize = 200_000;

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    produced: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            produced: 0,
        }
    }

    fn bump(&mut self) -> Option<u8> {
        if self.pos >= self.src.len() {
            None
        } else {
            let b = self.src[self.pos];
            self.pos += 1;
            Some(b)
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }
    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn span(&self, start: usize) -> Span {
        Span {
            start: start as u32,
            end: self.pos as u32,
        }
    }

    fn tok(&self, kind: TokKind, start: usize) -> Tok {
        Tok {
            kind,
            span: self.span(start),
        }
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(b) if (b as char).is_whitespace()) {
                self.bump();
            }
            // line comment: //
            if self.peek() == Some(b'/') && self.peek2() == Some(b'/') {
                self.bump();
                self.bump();
                while let Some(b) = self.peek() {
                    if b == b'\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            break;
        }
    }

    pub fn next_tok(&mut self) -> Tok {
        self.skip_ws_and_comments();
        let start = self.pos;
        let Some(b) = self.bump() else {
            return Tok {
                kind: TokKind::Eof,
                span: Span {
                    start: self.pos as u32,
                    end: self.pos as u32,
                },
            };
        };

        self.produced += 1;
        if self.produced > MAX_TOKENS {
            // Park at end of input so the parser stops after this error.
            self.pos = self.src.len();
            return self.tok(
                TokKind::Error(format!("token limit exceeded ({MAX_TOKENS} tokens)")),
                start,
            );
        }

        let c = b as char;

        // 2-char operators first
        if c == '=' && self.peek() == Some(b'=') {
            self.bump();
            return self.tok(TokKind::EqEq, start);
        }

        // 1-char punctuation/operators
        let single = match c {
            '(' => Some(TokKind::LParen),
            ')' => Some(TokKind::RParen),
            '{' => Some(TokKind::LBrace),
            '}' => Some(TokKind::RBrace),
            ',' => Some(TokKind::Comma),
            ';' => Some(TokKind::Semicolon),
            '+' => Some(TokKind::Plus),
            '-' => Some(TokKind::Minus),
            '*' => Some(TokKind::Star),
            '/' => Some(TokKind::Slash),
            '%' => Some(TokKind::Percent),
            '=' => Some(TokKind::Eq),
            '<' => Some(TokKind::Lt),
            '>' => Some(TokKind::Gt),
            _ => None,
        };
        if let Some(k) = single {
            return self.tok(k, start);
        }

        // integer
        if c.is_ascii_digit() {
            let mut s = String::from(c);
            while let Some(p) = self.peek() {
                if !p.is_ascii_digit() {
                    break;
                }
                s.push(p as char);
                self.bump();
            }
            let kind = match s.parse::<i64>() {
                Ok(v) => TokKind::Int(v),
                Err(_) => TokKind::Error(format!("integer literal `{s}` out of range")),
            };
            return self.tok(kind, start);
        }

        // ident / keywords
        if c.is_ascii_alphabetic() || c == '_' {
            let mut s = String::from(c);
            while let Some(p) = self.peek() {
                let ch = p as char;
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    s.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
            let kind = match s.as_str() {
                "let" => TokKind::KwLet,
                "in" => TokKind::KwIn,
                "if" => TokKind::KwIf,
                "else" => TokKind::KwElse,
                "while" => TokKind::KwWhile,
                "print" => TokKind::KwPrint,
                "is" => TokKind::KwIs,
                "pair" => TokKind::KwPair,
                "is_pair" => TokKind::KwIsPair,
                "fst" => TokKind::KwFst,
                "snd" => TokKind::KwSnd,
                "set_fst" => TokKind::KwSetFst,
                "set_snd" => TokKind::KwSetSnd,
                _ => TokKind::Ident(s),
            };
            return self.tok(kind, start);
        }

        // Skip the rest of a multi-byte UTF-8 sequence so the span covers the whole char.
        while matches!(self.peek(), Some(b) if b & 0xC0 == 0x80) {
            self.bump();
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        self.tok(TokKind::Error(format!("unexpected character `{text}`")), start)
    }
}
