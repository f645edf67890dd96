//! The grammar AST: a closed set of tagged-variant nodes (spec.md §3/§9).
//!
//! Every consumer (matcher, capture analyzer, compiler) dispatches on
//! [`Ast`] with an exhaustive `match`; adding a variant forces every
//! consumer to be revisited, which is the point.

use std::cell::Cell;
use std::collections::HashMap;

/// One entry of a `Class([…])` node: a single code point or an inclusive
/// range, in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassItem {
    Char(char),
    Range(char, char),
}

impl ClassItem {
    pub fn matches(&self, c: char) -> bool {
        match self {
            ClassItem::Char(ch) => *ch == c,
            ClassItem::Range(lo, hi) => *lo <= c && c <= *hi,
        }
    }
}

/// A grammar expression node. Terminal variants (`Literal`, `String`, `Dot`,
/// `Class`) carry a `Cell<bool>` capture mark, set by the capture analyzer
/// (C5) and read by the compiler (C6); it starts `false` and is never
/// observed by the direct matcher (C4), which ignores marks entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Dot(Cell<bool>),
    Literal(String, Cell<bool>),
    /// Atom-literal (double-quoted), distinct from the single-quoted `Literal`.
    String(String, Cell<bool>),
    Class(Vec<ClassItem>, Cell<bool>),
    Identifier(String),

    And(Box<Ast>),
    Not(Box<Ast>),

    Question(Box<Ast>),
    Star(Box<Ast>),
    Plus(Box<Ast>),

    Sequence(Vec<Ast>),
    Expression(Vec<Ast>),

    Grammar(Vec<Ast>),
    Definition(String, Box<Ast>),

    CaptureBlock(Box<Ast>),
    /// Always wraps an `Identifier`; the compiler asserts this (spec.md §9).
    CaptureNode(Box<Ast>),
    Label(String, Box<Ast>),
    Throw(String),
    List(Vec<Ast>),
}

impl Ast {
    pub fn dot() -> Ast {
        Ast::Dot(Cell::new(false))
    }

    pub fn literal(s: impl Into<String>) -> Ast {
        Ast::Literal(s.into(), Cell::new(false))
    }

    pub fn string(s: impl Into<String>) -> Ast {
        Ast::String(s.into(), Cell::new(false))
    }

    pub fn class(items: Vec<ClassItem>) -> Ast {
        Ast::Class(items, Cell::new(false))
    }

    /// True for the four terminal variants the capture analyzer marks.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Ast::Dot(_) | Ast::Literal(..) | Ast::String(..) | Ast::Class(..))
    }

    /// Reads this node's capture mark; `false` for non-terminal nodes.
    pub fn captured(&self) -> bool {
        match self {
            Ast::Dot(c) | Ast::Literal(_, c) | Ast::String(_, c) | Ast::Class(_, c) => c.get(),
            _ => false,
        }
    }

    /// Sets this node's capture mark; a no-op on non-terminal nodes.
    pub fn set_captured(&self, value: bool) {
        match self {
            Ast::Dot(c) | Ast::Literal(_, c) | Ast::String(_, c) | Ast::Class(_, c) => c.set(value),
            _ => {}
        }
    }

    /// `Expression([x])` is semantically `x`; the wrapper is preserved in
    /// the tree (spec.md §4.2) but callers that just need the single
    /// alternative can ask for it directly.
    pub fn as_single_alternative(&self) -> Option<&Ast> {
        match self {
            Ast::Expression(alts) if alts.len() == 1 => Some(&alts[0]),
            _ => None,
        }
    }
}

/// One named rule of a grammar: `name <- body`.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: String,
    pub body: Ast,
}

/// A dictionary view over a parsed `Ast::Grammar`, built once after parsing
/// so the matcher and compiler can look rules up by name in O(1) instead of
/// walking the definition list on every `Identifier` reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Grammar {
    /// Definitions in source order (later duplicate names override earlier
    /// ones in `by_name`, but all definitions are retained here).
    pub definitions: Vec<Definition>,
    by_name: HashMap<String, usize>,
}

impl Grammar {
    /// Builds a `Grammar` from a parsed `Ast::Grammar([Definition, …])` node.
    ///
    /// Duplicate names silently override (spec.md §3 invariant; §9 records
    /// this as a deliberate choice, not a bug).
    pub fn from_ast(ast: Ast) -> Option<Grammar> {
        let Ast::Grammar(nodes) = ast else {
            return None;
        };
        let mut definitions = Vec::with_capacity(nodes.len());
        let mut by_name = HashMap::new();
        for node in nodes {
            let Ast::Definition(name, body) = node else {
                return None;
            };
            let idx = definitions.len();
            by_name.insert(name.clone(), idx);
            definitions.push(Definition { name, body: *body });
        }
        Some(Grammar { definitions, by_name })
    }

    /// Looks up a rule's body by name, honoring override semantics (the
    /// last definition registered under a name wins).
    pub fn lookup(&self, name: &str) -> Option<&Ast> {
        self.by_name.get(name).map(|&idx| &self.definitions[idx].body)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_item_matches_ranges_and_chars() {
        let digit = ClassItem::Range('0', '9');
        assert!(digit.matches('5'));
        assert!(!digit.matches('a'));
        assert!(ClassItem::Char('x').matches('x'));
    }

    #[test]
    fn capture_marks_start_false_and_are_ignored_by_equality_of_value() {
        let node = Ast::literal("abc");
        assert!(!node.captured());
        node.set_captured(true);
        assert!(node.captured());
    }

    #[test]
    fn grammar_from_ast_resolves_duplicate_names_to_last_definition() {
        let grammar_ast = Ast::Grammar(vec![
            Ast::Definition("S".into(), Box::new(Ast::literal("a"))),
            Ast::Definition("S".into(), Box::new(Ast::literal("b"))),
        ]);
        let grammar = Grammar::from_ast(grammar_ast).unwrap();
        assert_eq!(grammar.lookup("S"), Some(&Ast::literal("b")));
        assert_eq!(grammar.definitions.len(), 2);
    }
}
