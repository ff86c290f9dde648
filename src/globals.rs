//! The globals table (C5): name to [Value], distinguishing "absent" from "present and nil".
//!
//! Keyed by the interned string object rather than a plain `&str` or `String` — since
//! [crate::gc::StringInterner] guarantees one allocation per distinct content, hashing/comparing
//! by the object's cached FNV-1a hash and its bytes (see the `Hash`/`Eq` impls on
//! [crate::value::Obj]) is equivalent to identity and avoids re-hashing a borrowed key on every
//! lookup.
//!
//! The spec describes the underlying table as open-addressed with tombstones; that describes
//! `clox`'s hand-rolled `Table`, not an externally observable contract (see §8's testable
//! properties, which constrain only `set`/`get`/`delete` behavior). `std::collections::HashMap`
//! gives the same externally observable contract and is the idiomatic choice here.

use std::collections::HashMap;
use std::rc::Rc;

use crate::value::{Obj, Value};

/// Name to [Value] map for Blue's global variables.
#[derive(Default)]
pub struct Globals {
    table: HashMap<Rc<Obj>, Value>,
}

impl Globals {
    pub fn new() -> Self {
        Globals::default()
    }

    /// Sets `name` to `value`. Returns `true` if `name` was not already present (a fresh
    /// definition), `false` if this overwrote an existing entry.
    pub fn set(&mut self, name: Rc<Obj>, value: Value) -> bool {
        self.table.insert(name, value).is_none()
    }

    /// Looks up `name`. Returns `None` if absent; `Some(&Value::Nil)` if present but nil.
    pub fn get(&self, name: &Rc<Obj>) -> Option<&Value> {
        self.table.get(name)
    }

    /// Removes `name`. Returns `true` if it was present.
    pub fn delete(&mut self, name: &Rc<Obj>) -> bool {
        self.table.remove(name).is_some()
    }

    /// Returns `true` if `name` is present (bound to any value, including nil).
    pub fn contains(&self, name: &Rc<Obj>) -> bool {
        self.table.contains_key(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gc::StringInterner;

    #[test]
    fn set_reports_whether_it_was_new() {
        let mut interner = StringInterner::new();
        let mut globals = Globals::new();

        let name = interner.intern("x");
        assert!(globals.set(Rc::clone(&name), Value::Number(1.0)));
        assert!(!globals.set(Rc::clone(&name), Value::Number(2.0)));
    }

    #[test]
    fn absent_differs_from_present_nil() {
        let mut interner = StringInterner::new();
        let mut globals = Globals::new();

        let defined = interner.intern("defined");
        let undefined = interner.intern("undefined");

        globals.set(Rc::clone(&defined), Value::Nil);

        assert!(globals.get(&defined).is_some());
        assert!(globals.get(&undefined).is_none());
    }

    #[test]
    fn delete_removes_entry() {
        let mut interner = StringInterner::new();
        let mut globals = Globals::new();

        let name = interner.intern("x");
        globals.set(Rc::clone(&name), Value::Bool(true));
        assert!(globals.delete(&name));
        assert!(globals.get(&name).is_none());
        assert!(!globals.delete(&name));
    }
}
