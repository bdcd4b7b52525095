use scope_ast::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    // trivia / eof / error
    Eof,
    /// Error token (bad character, integer overflow, token limit exceeded)
    Error(String),
    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    // assignment
    Eq,
    // arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    // equality / relational
    EqEq,
    Lt,
    Gt,
    // idents / keywords
    Ident(String),
    KwLet,
    KwIn,
    KwIf,
    KwElse,
    KwWhile,
    KwPrint,
    KwIs,
    KwPair,
    KwIsPair,
    KwFst,
    KwSnd,
    KwSetFst,
    KwSetSnd,
    // literals
    Int(i64),
}

#[derive(Debug, Clone)]
pub struct Tok {
    pub kind: TokKind,
    pub span: Span,
}
