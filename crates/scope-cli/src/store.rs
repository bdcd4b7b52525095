//! Storage regions for ScopeLang programs.
//!
//! Values live in one of two arenas. The heap only grows: `allocate` hands
//! out fresh indices and nothing is ever freed. The stack follows the lexical
//! nesting of `let`: `push` on scope entry, `pop` on scope exit. An
//! [`Address`] names a cell in exactly one of the two regions, and
//! [`Memory`] routes every read and write through that tag.

use std::collections::HashSet;
use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::EvalError;
use crate::eval::Value;

/// A cell location, tagged with the region it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "region", content = "index")]
pub enum Address {
    #[serde(rename = "heap")]
    Heap(usize),
    #[serde(rename = "stack")]
    Stack(usize),
}

impl Address {
    pub fn index(self) -> usize {
        match self {
            Address::Heap(i) | Address::Stack(i) => i,
        }
    }

    /// Same region, `k` cells further along.
    pub fn offset(self, k: usize) -> Address {
        match self {
            Address::Heap(i) => Address::Heap(i + k),
            Address::Stack(i) => Address::Stack(i + k),
        }
    }
}

impl Add<usize> for Address {
    type Output = Address;

    fn add(self, k: usize) -> Address {
        self.offset(k)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Heap(i) => write!(f, "heap[{i}]"),
            Address::Stack(i) => write!(f, "stack[{i}]"),
        }
    }
}

/// Integer-indexed cells, filled lazily by `set`.
#[derive(Debug, Default, Clone)]
pub struct Store {
    cells: Vec<Option<Value>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of `index`, or `None` if it was never written.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.cells.get(index).copied().flatten()
    }

    pub fn set(&mut self, index: usize, value: Value) {
        if index >= self.cells.len() {
            self.cells.resize(index + 1, None);
        }
        self.cells[index] = Some(value);
    }

    fn clear(&mut self, index: usize) {
        if let Some(cell) = self.cells.get_mut(index) {
            *cell = None;
        }
    }

    /// Written cells with index below `limit`, in index order.
    fn written(&self, limit: usize) -> Vec<(usize, Value)> {
        self.cells
            .iter()
            .take(limit)
            .enumerate()
            .filter_map(|(i, cell)| cell.map(|v| (i, v)))
            .collect()
    }
}

/// Bump allocator over a [`Store`]. Indices are never reused.
#[derive(Debug, Default)]
pub struct HeapStore {
    store: Store,
    next_free: usize,
}

impl HeapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `n` contiguous cells and return the address of the first.
    pub fn allocate(&mut self, n: usize) -> Address {
        let addr = Address::Heap(self.next_free);
        self.next_free += n;
        trace!(index = addr.index(), cells = n, "heap allocate");
        addr
    }

    /// Number of indices handed out so far.
    pub fn next_free(&self) -> usize {
        self.next_free
    }

    pub fn get(&self, index: usize) -> Result<Value, EvalError> {
        self.store
            .get(index)
            .ok_or(EvalError::UndefinedContents(Address::Heap(index)))
    }

    pub fn set(&mut self, index: usize, value: Value) {
        self.store.set(index, value);
    }

    pub fn cells(&self) -> Vec<(usize, Value)> {
        self.store.written(self.next_free)
    }
}

/// LIFO allocator over a [`Store`]; slots above the stack pointer are dead.
#[derive(Debug, Default)]
pub struct StackStore {
    store: Store,
    sp: usize,
}

impl StackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next slot. The slot reads as undefined until written.
    pub fn push(&mut self) -> Address {
        let addr = Address::Stack(self.sp);
        self.store.clear(self.sp);
        self.sp += 1;
        trace!(index = addr.index(), "stack push");
        addr
    }

    /// Release the most recently pushed slot.
    pub fn pop(&mut self) -> Result<(), EvalError> {
        if self.sp == 0 {
            return Err(EvalError::EmptyStack);
        }
        self.sp -= 1;
        trace!(index = self.sp, "stack pop");
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.sp
    }

    pub fn is_empty(&self) -> bool {
        self.sp == 0
    }

    pub fn get(&self, index: usize) -> Result<Value, EvalError> {
        if index >= self.sp {
            return Err(EvalError::UndefinedContents(Address::Stack(index)));
        }
        self.store
            .get(index)
            .ok_or(EvalError::UndefinedContents(Address::Stack(index)))
    }

    pub fn set(&mut self, index: usize, value: Value) {
        self.store.set(index, value);
    }

    /// Live (pushed and written) slots, bottom first.
    pub fn cells(&self) -> Vec<(usize, Value)> {
        self.store.written(self.sp)
    }
}

/// Both regions of one program run.
#[derive(Debug, Default)]
pub struct Memory {
    pub heap: HeapStore,
    pub stack: StackStore,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, addr: Address) -> Result<Value, EvalError> {
        match addr {
            Address::Heap(i) => self.heap.get(i),
            Address::Stack(i) => self.stack.get(i),
        }
    }

    pub fn write(&mut self, addr: Address, value: Value) {
        match addr {
            Address::Heap(i) => self.heap.set(i, value),
            Address::Stack(i) => self.stack.set(i, value),
        }
    }

    /// Render a value the way the `print` construct shows it: numbers in
    /// decimal, pairs as `(first.second)`. A pair already being rendered
    /// further up (a cyclic structure) shows as `...`.
    pub fn render(&self, value: Value) -> Result<String, EvalError> {
        let mut out = String::new();
        let mut open: HashSet<Address> = HashSet::new();
        let mut work = vec![Render::Value(value)];

        while let Some(step) = work.pop() {
            match step {
                Render::Value(Value::Num(n)) => out.push_str(&n.to_string()),
                Render::Value(Value::Pair(addr)) if open.contains(&addr) => out.push_str("..."),
                Render::Value(Value::Pair(addr)) => {
                    open.insert(addr);
                    out.push('(');
                    work.push(Render::Close(addr));
                    work.push(Render::Value(self.read(addr + 1)?));
                    work.push(Render::Dot);
                    work.push(Render::Value(self.read(addr)?));
                }
                Render::Dot => out.push('.'),
                Render::Close(addr) => {
                    out.push(')');
                    open.remove(&addr);
                }
            }
        }
        Ok(out)
    }
}

/// Pending work while rendering; nested pairs are walked without recursion.
enum Render {
    Value(Value),
    Dot,
    Close(Address),
}
