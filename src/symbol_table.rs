// File: src/symbol_table.rs
//
// Nested lexical scope table mapping names to (scope, index) slots. Each
// function literal gets its own enclosed table; `resolve` walks outward
// until a definition is found or the chain is exhausted.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable { outer: None, store: HashMap::new(), num_definitions: 0 }
    }

    pub fn new_enclosed(outer: SymbolTable) -> Self {
        SymbolTable { outer: Some(Box::new(outer)), store: HashMap::new(), num_definitions: 0 }
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_some() { SymbolScope::Local } else { SymbolScope::Global };
        let symbol = Symbol { name: name.to_string(), scope, index: self.num_definitions };
        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    pub fn resolve(&self, name: &str) -> Option<Symbol> {
        match self.store.get(name) {
            Some(sym) => Some(sym.clone()),
            None => self.outer.as_ref().and_then(|outer| outer.resolve(name)),
        }
    }

    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    /// Unwraps the enclosing table, discarding this one. Mirrors the
    /// compiler's scope stack: the caller already holds the locals count
    /// it needs before calling this.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|b| *b)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_global_and_local() {
        let mut global = SymbolTable::new();
        let a = global.define("a");
        assert_eq!(a.scope, SymbolScope::Global);
        assert_eq!(a.index, 0);

        let mut local = SymbolTable::new_enclosed(global);
        let b = local.define("b");
        assert_eq!(b.scope, SymbolScope::Local);
        assert_eq!(b.index, 0);

        assert_eq!(local.resolve("a").unwrap().scope, SymbolScope::Global);
        assert_eq!(local.resolve("b").unwrap().scope, SymbolScope::Local);
        assert!(local.resolve("c").is_none());
    }

    #[test]
    fn nested_enclosed_scopes_resolve_outward() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut outer = SymbolTable::new_enclosed(global);
        outer.define("b");
        let mut inner = SymbolTable::new_enclosed(outer);
        inner.define("c");

        assert!(inner.resolve("a").is_some());
        assert!(inner.resolve("b").is_some());
        assert!(inner.resolve("c").is_some());
    }
}
