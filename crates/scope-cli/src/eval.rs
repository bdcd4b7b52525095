//! Evaluator for ScopeLang programs
//!
//! A tree-walking interpreter that keeps names and storage apart: the
//! environment maps a name to an [`Address`], and the two stores in
//! [`Memory`] map addresses to values. `let` takes a stack slot for the
//! lifetime of its body; `pair` takes two heap cells forever.

use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

use scope_ast::ast::{BinOp, Expr, Ident, PairField};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EvalError;
use crate::store::{Address, Memory};
use crate::trace::{BindingEntry, StepEntry, TraceEmitter};

/// Runtime values in ScopeLang
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum Value {
    Num(i64),
    /// Two contiguous cells: the first component at the address, the second
    /// one cell further on.
    Pair(Address),
}

impl Value {
    pub fn is_pair(&self) -> bool {
        matches!(self, Value::Pair(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) => write!(f, "{n}"),
            Value::Pair(addr) => write!(f, "<pair@{addr}>"),
        }
    }
}

#[derive(Debug)]
struct Binding {
    name: String,
    addr: Address,
    next: Option<Rc<Binding>>,
}

/// Immutable name → address mapping.
///
/// Extending produces a new environment that shares the old one as its tail,
/// so a `let` body sees the new binding while the caller's copy is untouched.
#[derive(Debug, Clone, Default)]
pub struct Env {
    head: Option<Rc<Binding>>,
}

impl Env {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this environment with `name` bound to `addr`, shadowing any
    /// outer binding of the same name.
    pub fn extend(&self, name: &str, addr: Address) -> Env {
        Env {
            head: Some(Rc::new(Binding {
                name: name.to_string(),
                addr,
                next: self.head.clone(),
            })),
        }
    }

    /// Look up a variable, innermost binding first
    pub fn lookup(&self, name: &str) -> Option<Address> {
        let mut cur = self.head.as_deref();
        while let Some(b) = cur {
            if b.name == name {
                return Some(b.addr);
            }
            cur = b.next.as_deref();
        }
        None
    }

    /// Visible bindings, innermost first; shadowed entries are skipped.
    pub fn bindings(&self) -> Vec<(&str, Address)> {
        let mut out: Vec<(&str, Address)> = Vec::new();
        let mut cur = self.head.as_deref();
        while let Some(b) = cur {
            if !out.iter().any(|(n, _)| *n == b.name) {
                out.push((b.name.as_str(), b.addr));
            }
            cur = b.next.as_deref();
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// Options for one program run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// 0 = silent, 1 = show the program and its result, >1 = also show
    /// every evaluation step with the environment and both stores.
    pub verbosity: u8,
}

/// Owns the stores of one run and the sink that `print` writes to.
pub struct Evaluator<W: Write = io::Stdout> {
    memory: Memory,
    out: W,
    options: RunOptions,
    tracer: TraceEmitter,
    depth: usize,
}

impl Evaluator<io::Stdout> {
    pub fn new(options: RunOptions) -> Self {
        Self::with_output(options, io::stdout())
    }
}

impl<W: Write> Evaluator<W> {
    pub fn with_output(options: RunOptions, out: W) -> Self {
        Self {
            memory: Memory::new(),
            out,
            options,
            tracer: TraceEmitter::disabled(),
            depth: 0,
        }
    }

    /// Attach a JSONL step trace to this run.
    pub fn with_tracer(mut self, tracer: TraceEmitter) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Evaluate a whole program.
    ///
    /// The program must leave the stack empty and produce a number.
    pub fn run(&mut self, program: &Expr) -> Result<i64, EvalError> {
        debug!(verbosity = self.options.verbosity, "evaluating program");
        let result = self.run_inner(program);

        // Finalize the trace regardless of outcome; a program error takes
        // precedence over a trace error.
        let program_status = if result.is_ok() { "success" } else { "error" };
        let fin = self.tracer.finalize(program_status);
        if result.is_ok() {
            fin?;
        }

        debug!(
            heap_cells = self.memory.heap.next_free(),
            ok = result.is_ok(),
            "program finished"
        );
        result
    }

    fn run_inner(&mut self, program: &Expr) -> Result<i64, EvalError> {
        if self.options.verbosity >= 1 {
            writeln!(self.out, "program: {program}")?;
        }

        let value = self.eval(&Env::new(), program)?;

        if !self.memory.stack.is_empty() {
            return Err(EvalError::StackNotEmpty(self.memory.stack.depth()));
        }
        match value {
            Value::Num(n) => {
                if self.options.verbosity >= 1 {
                    writeln!(self.out, "result: {n}")?;
                }
                Ok(n)
            }
            other => Err(EvalError::NonNumericResult(other)),
        }
    }

    /// Evaluate an expression
    pub fn eval(&mut self, env: &Env, expr: &Expr) -> Result<Value, EvalError> {
        self.observe(env, expr)?;
        self.depth += 1;
        let result = self.eval_inner(env, expr);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, env: &Env, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Lit(n, _) => Ok(Value::Num(*n)),

            Expr::Var(id) => {
                let addr = lookup(env, id)?;
                self.memory.read(addr)
            }

            Expr::Binary { lhs, op, rhs, .. } => self.eval_binary(env, *op, lhs, rhs),

            // The environment is not touched: the existing cell is overwritten.
            Expr::Assign { target, value, .. } => {
                let v = self.eval(env, value)?;
                let addr = lookup(env, target)?;
                self.memory.write(addr, v);
                Ok(v)
            }

            Expr::Print { expr, .. } => {
                let v = self.eval(env, expr)?;
                let text = self.memory.render(v)?;
                writeln!(self.out, "{text}")?;
                Ok(v)
            }

            Expr::Seq { items, .. } => self.eval_seq(env, items),

            Expr::If {
                cond, then_, else_, ..
            } => {
                let c = self.eval(env, cond)?;
                if expect_num(c, "condition")? != 0 {
                    self.eval(env, then_)
                } else {
                    self.eval(env, else_)
                }
            }

            Expr::While { cond, body, .. } => self.eval_while(env, cond, body),

            Expr::Let {
                name, value, body, ..
            } => self.eval_let(env, name, value, body),

            Expr::Pair { first, second, .. } => {
                let f = self.eval(env, first)?;
                let s = self.eval(env, second)?;
                let addr = self.memory.heap.allocate(2);
                self.memory.write(addr, f);
                self.memory.write(addr + 1, s);
                Ok(Value::Pair(addr))
            }

            Expr::IsPair { expr, .. } => {
                let v = self.eval(env, expr)?;
                Ok(Value::Num(v.is_pair() as i64))
            }

            Expr::PairGet { field, expr, .. } => {
                let v = self.eval(env, expr)?;
                let addr = expect_pair(v, get_name(*field))?;
                self.memory.read(addr + field.offset())
            }

            // Mutation is in place: the pair keeps its address.
            Expr::PairSet {
                field, pair, value, ..
            } => {
                let p = self.eval(env, pair)?;
                let addr = expect_pair(p, set_name(*field))?;
                let v = self.eval(env, value)?;
                self.memory.write(addr + field.offset(), v);
                Ok(Value::Pair(addr))
            }
        }
    }

    /// Evaluate a binary operation; operands left to right.
    fn eval_binary(
        &mut self,
        env: &Env,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Value, EvalError> {
        use BinOp::*;

        let l = self.eval(env, lhs)?;
        let r = self.eval(env, rhs)?;

        match op {
            Add | Sub | Mul | Div | Rem => {
                let context = operand_context(op);
                let a = expect_num(l, context)?;
                let b = expect_num(r, context)?;
                let n = match op {
                    Add => a.wrapping_add(b),
                    Sub => a.wrapping_sub(b),
                    Mul => a.wrapping_mul(b),
                    Div | Rem if b == 0 => return Err(EvalError::DivideByZero),
                    Div => a.wrapping_div(b),
                    Rem => a.wrapping_rem(b),
                    _ => unreachable!("arithmetic op"),
                };
                Ok(Value::Num(n))
            }

            Lt | Gt => {
                let context = operand_context(op);
                let a = expect_num(l, context)?;
                let b = expect_num(r, context)?;
                let holds = if op == Lt { a < b } else { a > b };
                Ok(truth(holds))
            }

            ShallowEq => match (l, r) {
                (Value::Num(a), Value::Num(b)) => Ok(truth(a == b)),
                (Value::Pair(a), Value::Pair(b)) => Ok(truth(a == b)),
                _ => Err(EvalError::TypeMismatch { lhs: l, rhs: r }),
            },

            DeepEq => Ok(truth(self.deep_equal(l, r)?)),
        }
    }

    /// Structural equality: numbers by value, pairs component-wise.
    /// Any other combination is simply unequal.
    ///
    /// Walks an explicit worklist so long heap chains cannot exhaust the
    /// call stack. A pair of addresses already under comparison is assumed
    /// equal when met again, which settles cyclic structures.
    fn deep_equal(&self, l: Value, r: Value) -> Result<bool, EvalError> {
        let mut work = vec![(l, r)];
        let mut seen: HashSet<(Address, Address)> = HashSet::new();
        while let Some((l, r)) = work.pop() {
            match (l, r) {
                (Value::Num(a), Value::Num(b)) => {
                    if a != b {
                        return Ok(false);
                    }
                }
                (Value::Pair(a), Value::Pair(b)) if a == b => {}
                (Value::Pair(a), Value::Pair(b)) => {
                    if !seen.insert((a, b)) {
                        continue;
                    }
                    // First components are compared before second ones.
                    work.push((self.memory.read(a + 1)?, self.memory.read(b + 1)?));
                    work.push((self.memory.read(a)?, self.memory.read(b)?));
                }
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    fn eval_seq(&mut self, env: &Env, items: &[Expr]) -> Result<Value, EvalError> {
        let mut last = Value::Num(0);
        for item in items {
            last = self.eval(env, item)?;
        }
        Ok(last)
    }

    fn eval_while(&mut self, env: &Env, cond: &Expr, body: &Expr) -> Result<Value, EvalError> {
        loop {
            let c = self.eval(env, cond)?;
            if expect_num(c, "loop condition")? == 0 {
                return Ok(Value::Num(0));
            }
            self.eval(env, body)?;
        }
    }

    /// `let name = value in body`: one stack slot for exactly the duration
    /// of `body`. The slot is released even when `body` fails.
    fn eval_let(
        &mut self,
        env: &Env,
        name: &Ident,
        value: &Expr,
        body: &Expr,
    ) -> Result<Value, EvalError> {
        let v = self.eval(env, value)?;
        let addr = self.memory.stack.push();
        self.memory.write(addr, v);

        let inner = env.extend(&name.text, addr);
        let result = self.eval(&inner, body);

        let popped = self.memory.stack.pop();
        let v = result?;
        popped?;
        Ok(v)
    }

    /// Report the step about to be taken to the verbose output and the
    /// JSONL trace, whichever are enabled.
    fn observe(&mut self, env: &Env, expr: &Expr) -> Result<(), EvalError> {
        let verbose = self.options.verbosity > 1;
        if !verbose && !self.tracer.is_enabled() {
            return Ok(());
        }

        let stack = self.memory.stack.cells();
        let heap = self.memory.heap.cells();

        if verbose {
            let indent = "  ".repeat(self.depth);
            writeln!(self.out, "{indent}eval {expr}")?;
            writeln!(
                self.out,
                "{indent}  env:   {}",
                join(env.bindings().iter().map(|(n, a)| format!("{n} -> {a}")))
            )?;
            writeln!(
                self.out,
                "{indent}  stack: {}",
                join(stack.iter().map(|(i, v)| format!("{i}: {v}")))
            )?;
            writeln!(
                self.out,
                "{indent}  heap:  {}",
                join(heap.iter().map(|(i, v)| format!("{i}: {v}")))
            )?;
        }

        if self.tracer.is_enabled() {
            let seq = self.tracer.next_seq();
            let entry = StepEntry {
                seq,
                depth: self.depth,
                expr: expr.to_string(),
                env: env
                    .bindings()
                    .into_iter()
                    .map(|(name, address)| BindingEntry {
                        name: name.to_string(),
                        address,
                    })
                    .collect(),
                stack: stack.into_iter().map(Into::into).collect(),
                heap: heap.into_iter().map(Into::into).collect(),
            };
            self.tracer.emit(entry)?;
        }
        Ok(())
    }
}

/// Run a program on fresh stores, printing to stdout.
pub fn run_program(program: &Expr, options: RunOptions) -> Result<i64, EvalError> {
    Evaluator::new(options).run(program)
}

fn lookup(env: &Env, id: &Ident) -> Result<Address, EvalError> {
    env.lookup(&id.text)
        .ok_or_else(|| EvalError::UndefinedVariable(id.text.clone()))
}

fn expect_num(v: Value, context: &'static str) -> Result<i64, EvalError> {
    match v {
        Value::Num(n) => Ok(n),
        found => Err(EvalError::NonNumeric { context, found }),
    }
}

fn expect_pair(v: Value, op: &'static str) -> Result<Address, EvalError> {
    match v {
        Value::Pair(addr) => Ok(addr),
        found => Err(EvalError::NotAPair { op, found }),
    }
}

fn truth(b: bool) -> Value {
    Value::Num(b as i64)
}

fn operand_context(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "operand of `+`",
        BinOp::Sub => "operand of `-`",
        BinOp::Mul => "operand of `*`",
        BinOp::Div => "operand of `/`",
        BinOp::Rem => "operand of `%`",
        BinOp::Lt => "operand of `<`",
        BinOp::Gt => "operand of `>`",
        BinOp::ShallowEq | BinOp::DeepEq => "operand of comparison",
    }
}

fn get_name(field: PairField) -> &'static str {
    match field {
        PairField::First => "fst",
        PairField::Second => "snd",
    }
}

fn set_name(field: PairField) -> &'static str {
    match field {
        PairField::First => "set_fst",
        PairField::Second => "set_snd",
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    let parts: Vec<String> = items.collect();
    if parts.is_empty() {
        "(empty)".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scope_ast::span::Span;

    fn sp() -> Span {
        Span { start: 0, end: 0 }
    }

    fn ident(name: &str) -> Ident {
        Ident {
            text: name.to_string(),
            span: sp(),
        }
    }

    fn num(n: i64) -> Expr {
        Expr::Lit(n, sp())
    }

    fn var(name: &str) -> Expr {
        Expr::Var(ident(name))
    }

    fn bin(lhs: Expr, op: BinOp, rhs: Expr) -> Expr {
        Expr::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
            span: sp(),
        }
    }

    fn let_in(name: &str, value: Expr, body: Expr) -> Expr {
        Expr::Let {
            name: ident(name),
            value: Box::new(value),
            body: Box::new(body),
            span: sp(),
        }
    }

    fn assign(name: &str, value: Expr) -> Expr {
        Expr::Assign {
            target: ident(name),
            value: Box::new(value),
            span: sp(),
        }
    }

    fn seq(first: Expr, second: Expr) -> Expr {
        Expr::Seq {
            items: vec![first, second],
            span: sp(),
        }
    }

    fn pair(first: Expr, second: Expr) -> Expr {
        Expr::Pair {
            first: Box::new(first),
            second: Box::new(second),
            span: sp(),
        }
    }

    fn get(field: PairField, expr: Expr) -> Expr {
        Expr::PairGet {
            field,
            expr: Box::new(expr),
            span: sp(),
        }
    }

    fn evaluator() -> Evaluator<Vec<u8>> {
        Evaluator::with_output(RunOptions::default(), Vec::new())
    }

    fn eval_top(expr: &Expr) -> Result<Value, EvalError> {
        evaluator().eval(&Env::new(), expr)
    }

    #[test]
    fn test_eval_literal() {
        assert_eq!(eval_top(&num(42)).unwrap(), Value::Num(42));
    }

    #[test]
    fn test_precedence_via_tree() {
        // 1 + 2 * 3
        let e = bin(num(1), BinOp::Add, bin(num(2), BinOp::Mul, num(3)));
        assert_eq!(eval_top(&e).unwrap(), Value::Num(7));
    }

    #[test]
    fn test_truncating_division_and_remainder() {
        let e = bin(num(-7), BinOp::Div, num(2));
        assert_eq!(eval_top(&e).unwrap(), Value::Num(-3));
        let e = bin(num(-7), BinOp::Rem, num(2));
        assert_eq!(eval_top(&e).unwrap(), Value::Num(-1));
    }

    #[test]
    fn test_divide_and_remainder_by_zero() {
        for op in [BinOp::Div, BinOp::Rem] {
            let e = bin(num(10), op, num(0));
            assert!(matches!(eval_top(&e), Err(EvalError::DivideByZero)));
        }
    }

    #[test]
    fn test_overflow_wraps() {
        let e = bin(num(i64::MIN), BinOp::Div, num(-1));
        assert_eq!(eval_top(&e).unwrap(), Value::Num(i64::MIN));
        let e = bin(num(i64::MAX), BinOp::Add, num(1));
        assert_eq!(eval_top(&e).unwrap(), Value::Num(i64::MIN));
    }

    #[test]
    fn test_relational_yields_one_or_zero() {
        assert_eq!(
            eval_top(&bin(num(1), BinOp::Lt, num(2))).unwrap(),
            Value::Num(1)
        );
        assert_eq!(
            eval_top(&bin(num(1), BinOp::Gt, num(2))).unwrap(),
            Value::Num(0)
        );
    }

    #[test]
    fn test_arithmetic_on_pair_fails() {
        let e = bin(pair(num(1), num(2)), BinOp::Add, num(1));
        let err = eval_top(&e).unwrap_err();
        assert!(matches!(err, EvalError::NonNumeric { .. }));
        assert!(err.to_string().contains("operand of `+`"), "{err}");
    }

    #[test]
    fn test_undefined_variable() {
        let err = eval_top(&var("nope")).unwrap_err();
        assert!(matches!(err, EvalError::UndefinedVariable(ref n) if n == "nope"));
    }

    #[test]
    fn test_assign_to_undeclared_fails() {
        let err = eval_top(&assign("x", num(1))).unwrap_err();
        assert!(matches!(err, EvalError::UndefinedVariable(_)));
    }

    #[test]
    fn test_let_assign_read() {
        // let x = 5 in x = x + 1; x
        let e = let_in(
            "x",
            num(5),
            seq(assign("x", bin(var("x"), BinOp::Add, num(1))), var("x")),
        );
        let mut ev = evaluator();
        assert_eq!(ev.eval(&Env::new(), &e).unwrap(), Value::Num(6));
        assert!(ev.memory().stack.is_empty());
    }

    #[test]
    fn test_assignment_yields_assigned_value() {
        let e = let_in("x", num(0), assign("x", num(9)));
        assert_eq!(eval_top(&e).unwrap(), Value::Num(9));
    }

    #[test]
    fn test_let_binding_does_not_leak_to_siblings() {
        // (let x = 1 in x) + x  -> x is unbound on the right
        let e = bin(let_in("x", num(1), var("x")), BinOp::Add, var("x"));
        assert!(matches!(
            eval_top(&e),
            Err(EvalError::UndefinedVariable(_))
        ));
    }

    #[test]
    fn test_shadowing_uses_innermost_binding() {
        let e = let_in("x", num(1), let_in("x", num(2), var("x")));
        assert_eq!(eval_top(&e).unwrap(), Value::Num(2));
    }

    #[test]
    fn test_stack_popped_even_when_body_fails() {
        let e = let_in("x", num(1), bin(var("x"), BinOp::Div, num(0)));
        let mut ev = evaluator();
        assert!(ev.eval(&Env::new(), &e).is_err());
        assert!(ev.memory().stack.is_empty());
    }

    #[test]
    fn test_if_requires_number() {
        let e = Expr::If {
            cond: Box::new(pair(num(0), num(0))),
            then_: Box::new(num(1)),
            else_: Box::new(num(2)),
            span: sp(),
        };
        let err = eval_top(&e).unwrap_err();
        assert!(err.to_string().starts_with("condition must be numeric"), "{err}");
    }

    #[test]
    fn test_if_nonzero_selects_then() {
        let mk = |c| Expr::If {
            cond: Box::new(num(c)),
            then_: Box::new(num(1)),
            else_: Box::new(num(2)),
            span: sp(),
        };
        assert_eq!(eval_top(&mk(-3)).unwrap(), Value::Num(1));
        assert_eq!(eval_top(&mk(0)).unwrap(), Value::Num(2));
    }

    #[test]
    fn test_while_yields_zero() {
        // let n = 3 in let s = 0 in (while n > 0 { s = s + n; n = n - 1 }) + s * 10
        let body = seq(
            assign("s", bin(var("s"), BinOp::Add, var("n"))),
            assign("n", bin(var("n"), BinOp::Sub, num(1))),
        );
        let lp = Expr::While {
            cond: Box::new(bin(var("n"), BinOp::Gt, num(0))),
            body: Box::new(body),
            span: sp(),
        };
        let e = let_in(
            "n",
            num(3),
            let_in(
                "s",
                num(0),
                bin(lp, BinOp::Add, bin(var("s"), BinOp::Mul, num(10))),
            ),
        );
        assert_eq!(eval_top(&e).unwrap(), Value::Num(60));
    }

    #[test]
    fn test_pair_components() {
        let e = let_in(
            "p",
            pair(num(1), num(2)),
            bin(
                get(PairField::First, var("p")),
                BinOp::Add,
                get(PairField::Second, var("p")),
            ),
        );
        assert_eq!(eval_top(&e).unwrap(), Value::Num(3));
    }

    #[test]
    fn test_accessor_on_number_fails() {
        let err = eval_top(&get(PairField::Second, num(4))).unwrap_err();
        assert!(matches!(err, EvalError::NotAPair { op: "snd", .. }));
    }

    #[test]
    fn test_pair_set_checks_pair_before_value() {
        // the value expression would fail with an undefined variable, but the
        // pair check comes first
        let e = Expr::PairSet {
            field: PairField::First,
            pair: Box::new(num(1)),
            value: Box::new(var("missing")),
            span: sp(),
        };
        assert!(matches!(
            eval_top(&e),
            Err(EvalError::NotAPair { op: "set_fst", .. })
        ));
    }

    #[test]
    fn test_shallow_vs_deep_equality() {
        let shallow = bin(
            pair(num(1), num(2)),
            BinOp::ShallowEq,
            pair(num(1), num(2)),
        );
        let deep = bin(pair(num(1), num(2)), BinOp::DeepEq, pair(num(1), num(2)));
        assert_eq!(eval_top(&shallow).unwrap(), Value::Num(0));
        assert_eq!(eval_top(&deep).unwrap(), Value::Num(1));
    }

    #[test]
    fn test_shallow_equality_type_mismatch() {
        let e = bin(num(1), BinOp::ShallowEq, pair(num(1), num(2)));
        assert!(matches!(
            eval_top(&e),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_deep_equality_mixed_is_zero() {
        let e = bin(num(1), BinOp::DeepEq, pair(num(1), num(2)));
        assert_eq!(eval_top(&e).unwrap(), Value::Num(0));
    }

    #[test]
    fn test_deep_equality_nested_difference() {
        let a = pair(num(1), pair(num(2), num(3)));
        let b = pair(num(1), pair(num(2), num(4)));
        assert_eq!(
            eval_top(&bin(a, BinOp::DeepEq, b)).unwrap(),
            Value::Num(0)
        );
    }

    /// Heap list `(n.(n-1.( ... (1.last))))`.
    fn heap_list(mem: &mut Memory, n: i64, last: i64) -> Value {
        let mut tail = Value::Num(last);
        for i in 1..=n {
            let cell = mem.heap.allocate(2);
            mem.write(cell, Value::Num(i));
            mem.write(cell + 1, tail);
            tail = Value::Pair(cell);
        }
        tail
    }

    #[test]
    fn test_deep_equality_long_lists() {
        let mut ev = evaluator();
        let a = heap_list(&mut ev.memory, 100_000, 0);
        let b = heap_list(&mut ev.memory, 100_000, 0);
        let c = heap_list(&mut ev.memory, 100_000, 1);
        assert!(ev.deep_equal(a, b).unwrap());
        assert!(!ev.deep_equal(a, c).unwrap());
    }

    #[test]
    fn test_deep_equality_distinct_cycles() {
        let mut ev = evaluator();
        let mut cycle = |head: i64| {
            let cell = ev.memory.heap.allocate(2);
            ev.memory.write(cell, Value::Num(head));
            ev.memory.write(cell + 1, Value::Pair(cell));
            Value::Pair(cell)
        };
        let a = cycle(1);
        let b = cycle(1);
        let c = cycle(2);
        assert!(ev.deep_equal(a, b).unwrap());
        assert!(!ev.deep_equal(a, c).unwrap());
    }

    #[test]
    fn test_run_rejects_leftover_stack_slot() {
        let mut ev = evaluator();
        ev.memory.stack.push();
        let err = ev.run(&num(1)).unwrap_err();
        assert!(matches!(err, EvalError::StackNotEmpty(1)));
        assert!(err.is_internal());
    }

    #[test]
    fn test_is_pair_never_fails() {
        let e = Expr::IsPair {
            expr: Box::new(num(3)),
            span: sp(),
        };
        assert_eq!(eval_top(&e).unwrap(), Value::Num(0));
    }

    #[test]
    fn test_print_writes_to_output() {
        let e = seq(
            Expr::Print {
                expr: Box::new(pair(num(1), pair(num(2), num(3)))),
                span: sp(),
            },
            Expr::Print {
                expr: Box::new(num(-4)),
                span: sp(),
            },
        );
        let mut ev = evaluator();
        assert_eq!(ev.eval(&Env::new(), &e).unwrap(), Value::Num(-4));
        let out = String::from_utf8(ev.into_output()).unwrap();
        assert_eq!(out, "(1.(2.3))\n-4\n");
    }

    #[test]
    fn test_run_rejects_pair_result() {
        let mut ev = evaluator();
        let err = ev.run(&pair(num(1), num(2))).unwrap_err();
        assert!(matches!(err, EvalError::NonNumericResult(Value::Pair(_))));
    }

    #[test]
    fn test_verbosity_one_shows_program_and_result() {
        let mut ev = Evaluator::with_output(RunOptions { verbosity: 1 }, Vec::new());
        assert_eq!(ev.run(&bin(num(1), BinOp::Add, num(2))).unwrap(), 3);
        let out = String::from_utf8(ev.into_output()).unwrap();
        assert_eq!(out, "program: (1 + 2)\nresult: 3\n");
    }

    #[test]
    fn test_verbosity_two_traces_steps() {
        let mut ev = Evaluator::with_output(RunOptions { verbosity: 2 }, Vec::new());
        let e = let_in("x", num(5), var("x"));
        assert_eq!(ev.run(&e).unwrap(), 5);
        let out = String::from_utf8(ev.into_output()).unwrap();
        assert!(out.contains("eval let x = 5 in x"), "{out}");
        assert!(out.contains("env:   x -> stack[0]"), "{out}");
        assert!(out.contains("stack: 0: 5"), "{out}");
        assert!(out.contains("heap:  (empty)"), "{out}");
    }

    #[test]
    fn test_env_extend_leaves_original_untouched() {
        let base = Env::new().extend("a", Address::Stack(0));
        let ext = base.extend("b", Address::Stack(1));
        assert_eq!(base.lookup("b"), None);
        assert_eq!(ext.lookup("a"), Some(Address::Stack(0)));
        assert_eq!(ext.lookup("b"), Some(Address::Stack(1)));
        assert!(Env::new().is_empty());
    }

    #[test]
    fn test_env_bindings_skip_shadowed() {
        let env = Env::new()
            .extend("x", Address::Stack(0))
            .extend("y", Address::Stack(1))
            .extend("x", Address::Stack(2));
        assert_eq!(
            env.bindings(),
            vec![("x", Address::Stack(2)), ("y", Address::Stack(1))]
        );
    }
}
