pub mod span {
    use serde::Serialize;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
    pub struct Span {
        pub start: u32,
        pub end: u32,
    }

    impl Span {
        /// Span covering both `self` and `other`.
        pub fn to(self, other: Span) -> Span {
            Span {
                start: self.start.min(other.start),
                end: self.end.max(other.end),
            }
        }
    }
}

pub mod ast {
    use super::span::Span;
    use serde::Serialize;
    use std::fmt;

    #[derive(Debug, Clone, Serialize)]
    pub struct Ident {
        pub text: String,
        pub span: Span,
    }

    /// A ScopeLang expression. Programs are a single expression.
    #[derive(Debug, Clone, Serialize)]
    pub enum Expr {
        Lit(i64, Span),
        Var(Ident),
        Binary {
            lhs: Box<Expr>,
            op: BinOp,
            rhs: Box<Expr>,
            span: Span,
        },
        /// `x = value`; the target must already be bound
        Assign {
            target: Ident,
            value: Box<Expr>,
            span: Span,
        },
        Print {
            expr: Box<Expr>,
            span: Span,
        },
        /// `a; b; c`: every item but the last is evaluated for effect.
        /// Held flat so long statement lists never form a deep tree.
        Seq { items: Vec<Expr>, span: Span },
        If {
            cond: Box<Expr>,
            then_: Box<Expr>,
            else_: Box<Expr>,
            span: Span,
        },
        While {
            cond: Box<Expr>,
            body: Box<Expr>,
            span: Span,
        },
        /// `let name = value in body`
        Let {
            name: Ident,
            value: Box<Expr>,
            body: Box<Expr>,
            span: Span,
        },
        Pair {
            first: Box<Expr>,
            second: Box<Expr>,
            span: Span,
        },
        IsPair {
            expr: Box<Expr>,
            span: Span,
        },
        /// `fst(e)` / `snd(e)`
        PairGet {
            field: PairField,
            expr: Box<Expr>,
            span: Span,
        },
        /// `set_fst(p, v)` / `set_snd(p, v)`
        PairSet {
            field: PairField,
            pair: Box<Expr>,
            value: Box<Expr>,
            span: Span,
        },
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub enum BinOp {
        // arithmetic
        Add,
        Sub,
        Mul,
        Div,
        Rem,
        // relational
        Lt,
        Gt,
        // equality
        ShallowEq,
        DeepEq,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub enum PairField {
        First,
        Second,
    }

    impl PairField {
        /// Cell offset of this component from the pair's address.
        pub fn offset(self) -> usize {
            match self {
                PairField::First => 0,
                PairField::Second => 1,
            }
        }
    }

    impl BinOp {
        pub fn symbol(self) -> &'static str {
            match self {
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
                BinOp::Rem => "%",
                BinOp::Lt => "<",
                BinOp::Gt => ">",
                BinOp::ShallowEq => "is",
                BinOp::DeepEq => "==",
            }
        }
    }

    impl Expr {
        pub fn span(&self) -> Span {
            match self {
                Expr::Lit(_, span) => *span,
                Expr::Var(id) => id.span,
                Expr::Binary { span, .. }
                | Expr::Assign { span, .. }
                | Expr::Print { span, .. }
                | Expr::Seq { span, .. }
                | Expr::If { span, .. }
                | Expr::While { span, .. }
                | Expr::Let { span, .. }
                | Expr::Pair { span, .. }
                | Expr::IsPair { span, .. }
                | Expr::PairGet { span, .. }
                | Expr::PairSet { span, .. } => *span,
            }
        }
    }

    /// An expression in operand position. Forms that extend as far right as
    /// they can (`let`, `;`, `=`) are parenthesized so the printed text keeps
    /// the tree's grouping.
    struct Operand<'a>(&'a Expr);

    impl fmt::Display for Operand<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self.0 {
                Expr::Let { .. } | Expr::Seq { .. } | Expr::Assign { .. } => {
                    write!(f, "({})", self.0)
                }
                e => write!(f, "{e}"),
            }
        }
    }

    // Compact source-like rendering, used by step traces.
    impl fmt::Display for Expr {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Expr::Lit(n, _) => write!(f, "{n}"),
                Expr::Var(id) => write!(f, "{}", id.text),
                Expr::Binary { lhs, op, rhs, .. } => {
                    write!(f, "({} {} {})", Operand(lhs), op.symbol(), Operand(rhs))
                }
                Expr::Assign { target, value, .. } => {
                    write!(f, "{} = {}", target.text, Operand(value))
                }
                Expr::Print { expr, .. } => write!(f, "print({expr})"),
                Expr::Seq { items, .. } => {
                    let last = items.len().saturating_sub(1);
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            f.write_str("; ")?;
                        }
                        // A `let` would swallow the statements after it.
                        let grouped = matches!(item, Expr::Seq { .. })
                            || (i < last && matches!(item, Expr::Let { .. }));
                        if grouped {
                            write!(f, "({item})")?;
                        } else {
                            write!(f, "{item}")?;
                        }
                    }
                    Ok(())
                }
                Expr::If {
                    cond, then_, else_, ..
                } => write!(
                    f,
                    "if {} {{ {then_} }} else {{ {else_} }}",
                    Operand(cond)
                ),
                Expr::While { cond, body, .. } => {
                    write!(f, "while {} {{ {body} }}", Operand(cond))
                }
                Expr::Let {
                    name, value, body, ..
                } => write!(f, "let {} = {} in {}", name.text, Operand(value), body),
                Expr::Pair { first, second, .. } => write!(f, "pair({first}, {second})"),
                Expr::IsPair { expr, .. } => write!(f, "is_pair({expr})"),
                Expr::PairGet { field, expr, .. } => match field {
                    PairField::First => write!(f, "fst({expr})"),
                    PairField::Second => write!(f, "snd({expr})"),
                },
                Expr::PairSet {
                    field, pair, value, ..
                } => match field {
                    PairField::First => write!(f, "set_fst({pair}, {value})"),
                    PairField::Second => write!(f, "set_snd({pair}, {value})"),
                },
            }
        }
    }
}
