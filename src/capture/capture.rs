//! Capture analyzer (C5, spec.md §4.4): marks which terminal nodes must
//! emit `CAPCHAR` so the compiler only pays for capture bookkeeping where a
//! grammar actually asks for it.

use std::collections::HashSet;

use crate::ast::{Ast, Grammar};

/// Marks every terminal reachable from a capture context across the whole
/// grammar. Idempotent: running it twice leaves the same marks set.
pub fn analyze(grammar: &Grammar) {
    let mut skip = HashSet::new();
    for def in &grammar.definitions {
        collect_identifiers(&def.body, true, &mut skip);
    }

    let mut capture_blocks = Vec::new();
    for def in &grammar.definitions {
        collect_capture_blocks(&def.body, &mut capture_blocks);
    }

    for block in &capture_blocks {
        let mut referenced = HashSet::new();
        collect_identifiers(block, false, &mut referenced);
        for name in referenced {
            skip.remove(&name);
        }
    }

    let mut visited = HashSet::new();
    for block in &capture_blocks {
        mark_terminals(block, grammar, &skip, &mut visited);
    }
}

/// Walks `node`, never descending into `Not` subtrees (predicates never
/// produce captures). When `stop_at_capture_block` is set, also stops at
/// `CaptureBlock` boundaries — used for the initial whole-grammar "skip"
/// pass, which only wants identifiers referenced *outside* any capture
/// context.
fn collect_identifiers(node: &Ast, stop_at_capture_block: bool, out: &mut HashSet<String>) {
    match node {
        Ast::Not(_) => {}
        Ast::CaptureBlock(inner) => {
            if !stop_at_capture_block {
                collect_identifiers(inner, stop_at_capture_block, out);
            }
        }
        Ast::Identifier(name) => {
            out.insert(name.clone());
        }
        Ast::And(inner)
        | Ast::Question(inner)
        | Ast::Star(inner)
        | Ast::Plus(inner)
        | Ast::Label(_, inner)
        | Ast::CaptureNode(inner)
        | Ast::Definition(_, inner) => collect_identifiers(inner, stop_at_capture_block, out),
        Ast::Sequence(items) | Ast::Expression(items) | Ast::List(items) | Ast::Grammar(items) => {
            for item in items {
                collect_identifiers(item, stop_at_capture_block, out);
            }
        }
        Ast::Dot(_) | Ast::Literal(..) | Ast::String(..) | Ast::Class(..) | Ast::Throw(_) => {}
    }
}

/// Collects every `CaptureBlock` node reachable from `node`, not descending
/// into `Not` subtrees. Continues past a found block to catch nested ones.
fn collect_capture_blocks<'a>(node: &'a Ast, out: &mut Vec<&'a Ast>) {
    match node {
        Ast::Not(_) => {}
        Ast::CaptureBlock(inner) => {
            out.push(node);
            collect_capture_blocks(inner, out);
        }
        Ast::And(inner)
        | Ast::Question(inner)
        | Ast::Star(inner)
        | Ast::Plus(inner)
        | Ast::Label(_, inner)
        | Ast::CaptureNode(inner)
        | Ast::Definition(_, inner) => collect_capture_blocks(inner, out),
        Ast::Sequence(items) | Ast::Expression(items) | Ast::List(items) | Ast::Grammar(items) => {
            for item in items {
                collect_capture_blocks(item, out);
            }
        }
        Ast::Dot(_)
        | Ast::Literal(..)
        | Ast::String(..)
        | Ast::Class(..)
        | Ast::Throw(_)
        | Ast::Identifier(_) => {}
    }
}

/// Marks terminals inside `node` (never descending into `Not`), then
/// recursively follows any `Identifier` reference not in `skip` into its
/// definition and marks there too. `visited` prevents infinite recursion on
/// self/mutually-recursive rules.
fn mark_terminals(node: &Ast, grammar: &Grammar, skip: &HashSet<String>, visited: &mut HashSet<String>) {
    match node {
        Ast::Not(_) => {}
        Ast::Dot(_) | Ast::Literal(..) | Ast::String(..) | Ast::Class(..) => node.set_captured(true),
        Ast::Identifier(name) => {
            if skip.contains(name) || visited.contains(name) {
                return;
            }
            visited.insert(name.clone());
            if let Some(body) = grammar.lookup(name) {
                mark_terminals(body, grammar, skip, visited);
            }
        }
        Ast::And(inner)
        | Ast::Question(inner)
        | Ast::Star(inner)
        | Ast::Plus(inner)
        | Ast::Label(_, inner)
        | Ast::CaptureNode(inner)
        | Ast::CaptureBlock(inner)
        | Ast::Definition(_, inner) => mark_terminals(inner, grammar, skip, visited),
        Ast::Sequence(items) | Ast::Expression(items) | Ast::List(items) | Ast::Grammar(items) => {
            for item in items {
                mark_terminals(item, grammar, skip, visited);
            }
        }
        Ast::Throw(_) => {}
    }
}
