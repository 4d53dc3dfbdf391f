use std::{collections::HashSet, rc::Rc};

use super::ast::Sym;

/// Collapses identical identifier and literal allocations during one parse.
///
/// Interning is observationally invisible: symbols compare by content, so an
/// AST built with a fresh interner is equal to one built with a shared
/// interner.
#[derive(Default)]
pub struct Interner {
    strings: HashSet<Rc<str>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> Sym {
        if let Some(sym) = self.strings.get(s) {
            return sym.clone();
        }
        let sym: Rc<str> = s.into();
        self.strings.insert(sym.clone());
        sym
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
