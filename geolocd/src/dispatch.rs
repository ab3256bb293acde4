//! Opcode dispatch table.
//!
//! Providers that expose many commands through one entry point register one
//! bound method per opcode and route requests with [`DispatchTable::dispatch`]
//! instead of a hand-written conditional chain.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use serde_json::Value;
use thiserror::Error;

/// Method bound to an opcode. Receives the target object and the decoded
/// request payload; returns whether the command succeeded.
pub type BoundMethod<T> = fn(&T, &Value) -> bool;

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Each opcode maps to exactly one method per table.
    #[error("Opcode {opcode} is already registered in the {table} table")]
    AlreadyRegistered { table: &'static str, opcode: String },
}

/// Opcode → method table for one target type.
pub struct DispatchTable<T, Op> {
    name: &'static str,
    entries: HashMap<Op, BoundMethod<T>>,
}

impl<T, Op> DispatchTable<T, Op>
where
    Op: Copy + Eq + Hash + Debug,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: HashMap::new(),
        }
    }

    /// Bind `method` to `opcode`. Fails if the opcode is already bound.
    pub fn register(&mut self, opcode: Op, method: BoundMethod<T>) -> Result<(), DispatchError> {
        if self.entries.contains_key(&opcode) {
            return Err(DispatchError::AlreadyRegistered {
                table: self.name,
                opcode: format!("{:?}", opcode),
            });
        }
        self.entries.insert(opcode, method);
        Ok(())
    }

    /// Invoke the method bound to `opcode` on `target`.
    ///
    /// Returns `false` for unregistered opcodes, otherwise the method's result.
    pub fn dispatch(&self, target: &T, opcode: Op, data: &Value) -> bool {
        match self.entries.get(&opcode) {
            Some(method) => {
                tracing::trace!(table = self.name, opcode = ?opcode, "Dispatching command");
                method(target, data)
            }
            None => {
                tracing::debug!(table = self.name, opcode = ?opcode, "Unsupported opcode");
                false
            }
        }
    }

    pub fn is_registered(&self, opcode: Op) -> bool {
        self.entries.contains_key(&opcode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unregister_all(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Op {
        Add,
        Reset,
        Missing,
    }

    #[derive(Default)]
    struct Counter {
        value: Cell<i64>,
    }

    impl Counter {
        fn add(&self, data: &Value) -> bool {
            match data.get("by").and_then(Value::as_i64) {
                Some(by) => {
                    self.value.set(self.value.get() + by);
                    true
                }
                None => false,
            }
        }

        fn reset(&self, _data: &Value) -> bool {
            self.value.set(0);
            true
        }
    }

    fn table() -> DispatchTable<Counter, Op> {
        let mut table = DispatchTable::new("counter");
        table.register(Op::Add, Counter::add).unwrap();
        table.register(Op::Reset, Counter::reset).unwrap();
        table
    }

    #[test]
    fn test_dispatch_invokes_bound_method() {
        let table = table();
        let counter = Counter::default();

        assert!(table.dispatch(&counter, Op::Add, &json!({"by": 3})));
        assert!(table.dispatch(&counter, Op::Add, &json!({"by": 4})));
        assert_eq!(counter.value.get(), 7);

        assert!(table.dispatch(&counter, Op::Reset, &Value::Null));
        assert_eq!(counter.value.get(), 0);
    }

    #[test]
    fn test_method_result_is_returned() {
        let table = table();
        let counter = Counter::default();
        assert!(!table.dispatch(&counter, Op::Add, &json!({})));
    }

    #[test]
    fn test_unsupported_opcode() {
        let table = table();
        let counter = Counter::default();
        assert!(!table.dispatch(&counter, Op::Missing, &Value::Null));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut table = table();
        let err = table.register(Op::Add, Counter::reset).unwrap_err();
        assert_eq!(
            err,
            DispatchError::AlreadyRegistered {
                table: "counter",
                opcode: "Add".to_string()
            }
        );

        // The original binding is kept.
        let counter = Counter::default();
        assert!(table.dispatch(&counter, Op::Add, &json!({"by": 1})));
        assert_eq!(counter.value.get(), 1);
    }

    #[test]
    fn test_unregister_all() {
        let mut table = table();
        assert_eq!(table.len(), 2);

        table.unregister_all();
        assert!(table.is_empty());
        assert!(!table.is_registered(Op::Add));
        assert!(!table.dispatch(&Counter::default(), Op::Reset, &Value::Null));
    }
}
