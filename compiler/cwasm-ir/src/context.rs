//! Lexical scopes for the two C name spaces the builder tracks: ordinary identifiers and tags.

use crate::item::LocalId;
use crate::ty::{IrRecordKind, IrTy, RecordId};
use cwasm_diagnostics::ice;
use std::collections::{BTreeMap, VecDeque};

/// What an ordinary identifier refers to.
#[derive(Debug, Clone)]
pub enum Binding {
    Typedef(IrTy),
    Local(LocalId),
    /// A static-duration object or a function, by link name.
    Global { link_name: String, ty: IrTy },
    EnumConstant(i64),
}

/// What a struct, union or enum tag refers to.
#[derive(Debug, Clone, Copy)]
pub enum Tag {
    Record(IrRecordKind, RecordId),
    Enum,
}

/// A stack of scopes, innermost first.
#[derive(Debug)]
pub struct ScopedContext<T> {
    scopes: VecDeque<BTreeMap<String, T>>,
}

impl<T> Default for ScopedContext<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ScopedContext<T> {
    /// Create a context holding only the file scope.
    pub fn new() -> Self {
        let mut scopes = VecDeque::new();
        scopes.push_front(BTreeMap::new());
        ScopedContext { scopes }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push_front(BTreeMap::new());
    }

    pub fn leave_scope(&mut self) {
        if self.scopes.len() == 1 {
            ice!("attempted to leave the file scope");
        }
        self.scopes.pop_front();
    }

    /// Whether the innermost scope is the file scope.
    pub fn is_file_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    /// Find a name, searching from the innermost scope outward.
    pub fn find(&self, name: &str) -> Option<&T> {
        self.scopes.iter().find_map(|scope| scope.get(name))
    }

    /// Find a name in the innermost scope only.
    pub fn find_local(&self, name: &str) -> Option<&T> {
        self.scopes.front().and_then(|s| s.get(name))
    }

    pub fn add(&mut self, name: &str, item: T) {
        let scope = self
            .scopes
            .front_mut()
            .unwrap_or_else(|| ice!("scoped context has no scope"));
        scope.insert(name.to_owned(), item);
    }
}

#[cfg(test)]
mod tests {
    use super::ScopedContext;
    use cwasm_macros::{assert_none, assert_some};

    #[test]
    fn test_inner_scope_shadows_outer() {
        let mut context = ScopedContext::<i32>::new();
        context.add("a", 1);
        context.enter_scope();
        assert_eq!(Some(&1), context.find("a"));
        assert_none!(context.find_local("a"));
        context.add("a", 2);
        assert_eq!(Some(&2), context.find("a"));
        context.leave_scope();
        assert_eq!(Some(&1), context.find("a"));
        assert!(context.is_file_scope());
    }

    #[test]
    fn test_names_leave_with_their_scope() {
        let mut context = ScopedContext::<i32>::new();
        context.enter_scope();
        context.add("b", 3);
        assert_some!(context.find_local("b"));
        context.leave_scope();
        assert_none!(context.find("b"));
    }

    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn test_file_scope_cannot_be_left() {
        let mut context = ScopedContext::<i32>::new();
        context.leave_scope();
    }
}
