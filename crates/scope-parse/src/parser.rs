use crate::lexer::Lexer;
use crate::token::{Tok, TokKind};
use anyhow::{bail, Result};
use scope_ast::ast::{BinOp, Expr, Ident, PairField};
use scope_ast::span::Span;

/// Maximum nesting of prefix constructs before the parser gives up. Also
/// bounds how many operators may stack up in one operand chain.
pub const MAX_NESTING_DEPTH: usize = 512;

pub fn parse_str(_file: &str, src: &str) -> Result<Expr> {
    let mut p = Parser::new(src);
    p.parse_program()
}

struct Parser<'a> {
    lex: Lexer<'a>,
    cur: Tok,
    nxt: Tok,
    /// End offset of the most recently consumed token.
    prev_end: u32,
    depth: usize,
    /// Operator levels stacked in the expression parsed most recently.
    chain: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        let mut lex = Lexer::new(src);
        let cur = lex.next_tok();
        let nxt = lex.next_tok();
        Self {
            lex,
            cur,
            nxt,
            prev_end: 0,
            depth: 0,
            chain: 0,
        }
    }

    fn bump(&mut self) {
        self.prev_end = self.cur.span.end;
        self.cur = std::mem::replace(&mut self.nxt, self.lex.next_tok());
    }

    fn at(&self, k: &TokKind) -> bool {
        std::mem::discriminant(&self.cur.kind) == std::mem::discriminant(k)
    }

    fn expect(&mut self, k: TokKind) -> Result<Tok> {
        if let TokKind::Error(msg) = &self.cur.kind {
            bail!("{msg}");
        }
        if self.at(&k) {
            let t = self.cur.clone();
            self.bump();
            Ok(t)
        } else {
            bail!("expected {:?}, found {:?}", k, self.cur.kind)
        }
    }

    // ======= program =======

    fn parse_program(&mut self) -> Result<Expr> {
        let expr = self.parse_expr()?;
        match &self.cur.kind {
            TokKind::Eof => Ok(expr),
            TokKind::Error(msg) => bail!("{msg}"),
            other => bail!("trailing input after expression: {:?}", other),
        }
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        match &self.cur.kind {
            TokKind::Ident(s) => {
                let id = Ident {
                    text: s.clone(),
                    span: self.cur.span,
                };
                self.bump();
                Ok(id)
            }
            TokKind::Error(msg) => bail!("{msg}"),
            _ => bail!("expected identifier, found {:?}", self.cur.kind),
        }
    }

    // ======= sequence / assignment =======

    /// `assign (';' assign)*`: sequencing is the loosest form.
    fn parse_expr(&mut self) -> Result<Expr> {
        let first = self.parse_assign()?;
        if !matches!(self.cur.kind, TokKind::Semicolon) {
            return Ok(first);
        }

        let mut items = vec![first];
        while matches!(self.cur.kind, TokKind::Semicolon) {
            self.bump(); // consume ';'
            items.push(self.parse_assign()?);
        }
        let span = items[0].span().to(items[items.len() - 1].span());
        Ok(Expr::Seq { items, span })
    }

    /// `IDENT '=' assign | binary`
    fn parse_assign(&mut self) -> Result<Expr> {
        if matches!(self.cur.kind, TokKind::Ident(_)) && matches!(self.nxt.kind, TokKind::Eq) {
            let target = self.parse_ident()?;
            self.bump(); // consume '='
            let value = self.nested(Self::parse_assign)?;
            let span = target.span.to(value.span());
            return Ok(Expr::Assign {
                target,
                value: Box::new(value),
                span,
            });
        }
        self.parse_expr_bp(0)
    }

    // ======= binary operators (Pratt parser) =======
    //
    // Precedence (low -> high):
    //   5:  is ==
    //   7:  < >
    //   10: + -
    //   20: * / %

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        // Left folding builds depth without recursing, so the height of the
        // chain is tracked separately. `self.chain` carries the tallest
        // chain seen inside an operand back out to the caller.
        let outer = std::mem::take(&mut self.chain);
        let mut lhs = self.parse_prefix()?;
        let mut height = std::mem::take(&mut self.chain);

        loop {
            let (op, lbp, rbp) = match self.cur.kind {
                // equality
                TokKind::KwIs => (BinOp::ShallowEq, 5, 6),
                TokKind::EqEq => (BinOp::DeepEq, 5, 6),
                // relational
                TokKind::Lt => (BinOp::Lt, 7, 8),
                TokKind::Gt => (BinOp::Gt, 7, 8),
                // arithmetic
                TokKind::Plus => (BinOp::Add, 10, 11),
                TokKind::Minus => (BinOp::Sub, 10, 11),
                TokKind::Star => (BinOp::Mul, 20, 21),
                TokKind::Slash => (BinOp::Div, 20, 21),
                TokKind::Percent => (BinOp::Rem, 20, 21),
                _ => break,
            };

            if lbp < min_bp {
                break;
            }
            self.bump(); // consume operator
            let rhs = self.parse_expr_bp(rbp)?;
            height = height.max(std::mem::take(&mut self.chain)) + 1;
            if height > MAX_NESTING_DEPTH {
                bail!("operator chain exceeds {} levels", MAX_NESTING_DEPTH);
            }
            let span = lhs.span().to(rhs.span());
            lhs = Expr::Binary {
                lhs: Box::new(lhs),
                op,
                rhs: Box::new(rhs),
                span,
            };
        }

        self.chain = outer.max(height);
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        self.nested(Self::parse_prefix_inner)
    }

    /// Run `f` one nesting level deeper, failing once the limit is passed.
    fn nested(&mut self, f: fn(&mut Self) -> Result<Expr>) -> Result<Expr> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            bail!("expression nesting exceeds {} levels", MAX_NESTING_DEPTH);
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn parse_prefix_inner(&mut self) -> Result<Expr> {
        // Snapshot current token to avoid borrow issues when bumping
        let tok_kind = self.cur.kind.clone();
        let tok_span = self.cur.span;

        match tok_kind {
            TokKind::Int(v) => {
                self.bump();
                Ok(Expr::Lit(v, tok_span))
            }
            // negative literal
            TokKind::Minus => {
                self.bump();
                match self.cur.kind {
                    TokKind::Int(v) => {
                        let span = tok_span.to(self.cur.span);
                        self.bump();
                        Ok(Expr::Lit(-v, span))
                    }
                    _ => bail!("expected integer after '-', found {:?}", self.cur.kind),
                }
            }

            TokKind::Ident(_) => {
                let id = self.parse_ident()?;
                Ok(Expr::Var(id))
            }

            // grouping: ( e ) and { e } both yield the inner expression
            TokKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(TokKind::RParen)?;
                Ok(inner)
            }
            TokKind::LBrace => self.parse_braced(),

            TokKind::KwLet => self.parse_let(),
            TokKind::KwIf => self.parse_if(),
            TokKind::KwWhile => self.parse_while(),

            TokKind::KwPrint => {
                self.bump();
                let (expr, end) = self.parse_unary_args()?;
                Ok(Expr::Print {
                    expr: Box::new(expr),
                    span: tok_span.to(end),
                })
            }
            TokKind::KwIsPair => {
                self.bump();
                let (expr, end) = self.parse_unary_args()?;
                Ok(Expr::IsPair {
                    expr: Box::new(expr),
                    span: tok_span.to(end),
                })
            }
            TokKind::KwFst | TokKind::KwSnd => {
                let field = if tok_kind == TokKind::KwFst {
                    PairField::First
                } else {
                    PairField::Second
                };
                self.bump();
                let (expr, end) = self.parse_unary_args()?;
                Ok(Expr::PairGet {
                    field,
                    expr: Box::new(expr),
                    span: tok_span.to(end),
                })
            }
            TokKind::KwPair => {
                self.bump();
                let (first, second, end) = self.parse_binary_args()?;
                Ok(Expr::Pair {
                    first: Box::new(first),
                    second: Box::new(second),
                    span: tok_span.to(end),
                })
            }
            TokKind::KwSetFst | TokKind::KwSetSnd => {
                let field = if tok_kind == TokKind::KwSetFst {
                    PairField::First
                } else {
                    PairField::Second
                };
                self.bump();
                let (pair, value, end) = self.parse_binary_args()?;
                Ok(Expr::PairSet {
                    field,
                    pair: Box::new(pair),
                    value: Box::new(value),
                    span: tok_span.to(end),
                })
            }

            TokKind::Error(msg) => bail!("{msg}"),
            _ => bail!("unexpected token in expression: {:?}", tok_kind),
        }
    }

    /// `{ expr }`
    fn parse_braced(&mut self) -> Result<Expr> {
        self.expect(TokKind::LBrace)?;
        let inner = self.parse_expr()?;
        self.expect(TokKind::RBrace)?;
        Ok(inner)
    }

    /// `let name = value in body`; the body extends as far right as possible.
    fn parse_let(&mut self) -> Result<Expr> {
        let start = self.cur.span;
        self.expect(TokKind::KwLet)?;
        let name = self.parse_ident()?;
        self.expect(TokKind::Eq)?;
        let value = self.parse_assign()?;
        self.expect(TokKind::KwIn)?;
        let body = self.parse_expr()?;
        let span = start.to(body.span());
        Ok(Expr::Let {
            name,
            value: Box::new(value),
            body: Box::new(body),
            span,
        })
    }

    /// `if cond { e } else { e }` or `if cond { e } else if ...`
    fn parse_if(&mut self) -> Result<Expr> {
        let start = self.cur.span;
        self.expect(TokKind::KwIf)?;

        let cond = self.parse_assign()?;
        let then_ = self.parse_braced()?;
        self.expect(TokKind::KwElse)?;
        let else_ = if matches!(self.cur.kind, TokKind::KwIf) {
            self.nested(Self::parse_if)?
        } else {
            self.parse_braced()?
        };

        let span = Span {
            start: start.start,
            end: self.prev_end,
        };
        Ok(Expr::If {
            cond: Box::new(cond),
            then_: Box::new(then_),
            else_: Box::new(else_),
            span,
        })
    }

    /// `while cond { body }`
    fn parse_while(&mut self) -> Result<Expr> {
        let start = self.cur.span;
        self.expect(TokKind::KwWhile)?;

        let cond = self.parse_assign()?;
        let body = self.parse_braced()?;

        let span = Span {
            start: start.start,
            end: self.prev_end,
        };
        Ok(Expr::While {
            cond: Box::new(cond),
            body: Box::new(body),
            span,
        })
    }

    /// `( expr )` after a keyword; returns the expression and the `)` span.
    fn parse_unary_args(&mut self) -> Result<(Expr, Span)> {
        self.expect(TokKind::LParen)?;
        let expr = self.parse_expr()?;
        let close = self.expect(TokKind::RParen)?;
        Ok((expr, close.span))
    }

    /// `( expr , expr )` after a keyword.
    fn parse_binary_args(&mut self) -> Result<(Expr, Expr, Span)> {
        self.expect(TokKind::LParen)?;
        let a = self.parse_expr()?;
        self.expect(TokKind::Comma)?;
        let b = self.parse_expr()?;
        let close = self.expect(TokKind::RParen)?;
        Ok((a, b, close.span))
    }
}
