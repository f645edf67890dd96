//! Bytecode compiler (C6, spec.md §4.5): lowers a `Grammar` AST to a fixed-
//! width instruction stream plus a string table.
//!
//! Every rule compiles to a contiguous region terminated by `RETURN`. The
//! prologue's `JUMP` targets one instruction *past* the trailing `HALT` —
//! not `HALT` itself — which is what makes the worked compile examples'
//! literal offsets come out exactly right; see DESIGN.md.

use std::collections::HashMap;

use log::debug;

use crate::ast::{Ast, ClassItem, Grammar};
use crate::capture::analyze;
use crate::error::PegError;
use crate::vm::{Instr, Program};

/// Knobs the compiler honors beyond the grammar itself.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Wrap the start rule's call in `CAP_OPEN`/`CAP_CLOSE` when the
    /// grammar contains capture syntax. Turning this off only skips that
    /// outer wrap (useful for measuring bare recognition cost); it does
    /// not affect `%{…}`/`%Ident` operators compiled inside rule bodies,
    /// nor the capture analyzer, which always runs.
    pub capturing: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { capturing: true }
    }
}

/// Compiles `grammar` with `start` as the entry rule.
pub fn compile(grammar: &Grammar, start: &str, options: &CompileOptions) -> Result<Program, PegError> {
    debug!("compiling {} rule(s), start rule `{start}`", grammar.definitions.len());
    analyze(grammar);

    if grammar.lookup(start).is_none() {
        return Err(PegError::MatchUnbound(start.to_string()));
    }

    let mut emitter = Emitter {
        grammar,
        program: Program::new(),
        capture_enabled: false,
        capture_suppressed: false,
        call_patches: Vec::new(),
        rule_addr: HashMap::new(),
    };

    let call_idx = emitter.emit(Instr::Halt);
    let jump_idx = emitter.emit(Instr::Halt);
    let prologue_body_start = emitter.program.code.len();

    let wrap = grammar_has_capture_ops(grammar) && options.capturing;
    let (wrap_call_idx, start_sid) = if wrap {
        let sid = emitter.program.intern(start);
        emitter.emit(Instr::CapOpen(false, sid));
        (Some(emitter.emit(Instr::Halt)), sid)
    } else {
        (None, 0)
    };

    for def in &grammar.definitions {
        let addr = emitter.program.code.len();
        debug!("rule `{}` emitted at address {addr}", def.name);
        emitter.rule_addr.insert(def.name.clone(), addr);
        emitter.compile_node(&def.body)?;
        emitter.emit(Instr::Return);
    }

    if wrap_call_idx.is_some() {
        emitter.emit(Instr::CapClose(false, start_sid));
    }

    emitter.emit(Instr::Halt);
    let past_halt = emitter.program.code.len();
    emitter.patch(jump_idx, Instr::Jump(past_halt as i32 - jump_idx as i32));

    match wrap_call_idx {
        Some(wc) => {
            emitter.patch(call_idx, Instr::Call(prologue_body_start as i32 - call_idx as i32));
            let start_addr = *emitter
                .rule_addr
                .get(start)
                .expect("start rule was confirmed present by grammar.lookup() above, and every grammar.definitions entry is recorded in rule_addr by the emission loop");
            emitter.patch(wc, Instr::Call(start_addr as i32 - wc as i32));
        }
        None => {
            let start_addr = *emitter
                .rule_addr
                .get(start)
                .expect("start rule was confirmed present by grammar.lookup() above, and every grammar.definitions entry is recorded in rule_addr by the emission loop");
            emitter.patch(call_idx, Instr::Call(start_addr as i32 - call_idx as i32));
        }
    }

    for (name, site) in emitter.call_patches.clone() {
        let target = emitter
            .rule_addr
            .get(&name)
            .copied()
            .ok_or_else(|| PegError::MatchUnbound(name.clone()))?;
        emitter.program.code[site] = Instr::Call(target as i32 - site as i32);
    }

    Ok(emitter.program)
}

fn grammar_has_capture_ops(grammar: &Grammar) -> bool {
    grammar.definitions.iter().any(|def| node_has_capture_ops(&def.body))
}

/// Mirrors the capture analyzer's own walk (spec.md §4.4 step 1): never
/// descends into `Not`, since a capture op reachable only through a
/// predicate never actually emits a capture instruction (property 7), and
/// so must not be counted toward "the grammar contains capture syntax"
/// when deciding whether to wrap the prologue in an outer capture pair.
fn node_has_capture_ops(node: &Ast) -> bool {
    match node {
        Ast::Not(_) => false,
        Ast::CaptureBlock(_) | Ast::CaptureNode(_) => true,
        Ast::And(inner) | Ast::Question(inner) | Ast::Star(inner) | Ast::Plus(inner) => {
            node_has_capture_ops(inner)
        }
        Ast::Label(_, inner) | Ast::Definition(_, inner) => node_has_capture_ops(inner),
        Ast::Sequence(items) | Ast::Expression(items) | Ast::List(items) | Ast::Grammar(items) => {
            items.iter().any(node_has_capture_ops)
        }
        _ => false,
    }
}

struct Emitter<'g> {
    grammar: &'g Grammar,
    program: Program,
    /// Threaded per spec.md §9: true inside a `CaptureBlock`, forced false
    /// for the duration of a `Not` subtree, restored on exit.
    capture_enabled: bool,
    /// Set for the duration of compiling a `Not` subtree; once set, no
    /// `CAP_OPEN`/`CAP_CLOSE`/`CAPCHAR` may be emitted no matter what
    /// `CaptureBlock`/`CaptureNode` nodes appear underneath (spec.md §8
    /// property 7) — unlike `capture_enabled`, a nested `CaptureBlock`
    /// cannot turn this back on; it stays suppressed until the enclosing
    /// `Not` is done compiling.
    capture_suppressed: bool,
    call_patches: Vec<(String, usize)>,
    rule_addr: HashMap<String, usize>,
}

impl<'g> Emitter<'g> {
    fn emit(&mut self, instr: Instr) -> usize {
        self.program.code.push(instr);
        self.program.code.len() - 1
    }

    fn patch(&mut self, idx: usize, instr: Instr) {
        self.program.code[idx] = instr;
    }

    fn capturing_here(&self, node: &Ast) -> bool {
        !self.capture_suppressed && (self.capture_enabled || node.captured())
    }

    /// Compiles an `n`-alternative ordered choice, given a callback that
    /// compiles the `i`th alternative's body. Shared by `Expression` and
    /// `Label`'s `x / Throw(name)` desugaring.
    fn compile_ordered_choice(
        &mut self,
        n: usize,
        mut compile_alt: impl FnMut(&mut Self, usize) -> Result<(), PegError>,
    ) -> Result<(), PegError> {
        let mut commit_sites = Vec::new();
        for i in 0..n {
            if i + 1 == n {
                compile_alt(self, i)?;
            } else {
                let choice_idx = self.emit(Instr::Halt);
                compile_alt(self, i)?;
                let commit_idx = self.emit(Instr::Halt);
                let after_commit = self.program.code.len();
                self.patch(choice_idx, Instr::Choice(after_commit as i32 - choice_idx as i32));
                commit_sites.push(commit_idx);
            }
        }
        let end = self.program.code.len();
        for idx in commit_sites {
            self.patch(idx, Instr::Commit(end as i32 - idx as i32));
        }
        Ok(())
    }

    fn compile_node(&mut self, node: &Ast) -> Result<(), PegError> {
        match node {
            Ast::Dot(_) => {
                self.emit(Instr::Any);
                if self.capturing_here(node) {
                    self.emit(Instr::Capchar);
                }
            }

            Ast::Literal(s, _) => {
                for c in s.chars() {
                    self.emit(Instr::Char(c));
                    if self.capturing_here(node) {
                        self.emit(Instr::Capchar);
                    }
                }
            }

            Ast::String(s, _) => {
                let sid = self.program.intern(s);
                self.emit(Instr::Atom(sid));
                if self.capturing_here(node) {
                    self.emit(Instr::Capchar);
                }
            }

            Ast::Class(items, _) => {
                if items.len() == 1 {
                    self.emit(class_item_instr(items[0]));
                    if self.capturing_here(node) {
                        self.emit(Instr::Capchar);
                    }
                } else {
                    let capturing = self.capturing_here(node);
                    self.compile_ordered_choice(items.len(), |emitter, i| {
                        emitter.emit(class_item_instr(items[i]));
                        if capturing {
                            emitter.emit(Instr::Capchar);
                        }
                        Ok(())
                    })?;
                }
            }

            Ast::Identifier(name) => {
                let idx = self.emit(Instr::Call(0));
                self.call_patches.push((name.clone(), idx));
            }

            Ast::And(inner) => self.compile_node(&Ast::Not(Box::new(Ast::Not(inner.clone()))))?,

            Ast::Not(inner) => {
                let saved_enabled = self.capture_enabled;
                let saved_suppressed = self.capture_suppressed;
                self.capture_enabled = false;
                self.capture_suppressed = true;
                let choice_idx = self.emit(Instr::Halt);
                self.compile_node(inner)?;
                let commit_idx = self.emit(Instr::Halt);
                self.patch(commit_idx, Instr::Commit(1));
                self.emit(Instr::Fail);
                let exit = self.program.code.len();
                self.patch(choice_idx, Instr::Choice(exit as i32 - choice_idx as i32));
                self.capture_enabled = saved_enabled;
                self.capture_suppressed = saved_suppressed;
            }

            Ast::Question(inner) => {
                let choice_idx = self.emit(Instr::Halt);
                self.compile_node(inner)?;
                let commit_idx = self.emit(Instr::Halt);
                let exit = self.program.code.len();
                self.patch(choice_idx, Instr::Choice(exit as i32 - choice_idx as i32));
                self.patch(commit_idx, Instr::Commit(1));
            }

            Ast::Star(inner) => {
                let choice_idx = self.emit(Instr::Halt);
                self.compile_node(inner)?;
                let commit_idx = self.emit(Instr::Halt);
                let exit = self.program.code.len();
                self.patch(choice_idx, Instr::Choice(exit as i32 - choice_idx as i32));
                self.patch(commit_idx, Instr::Commit(choice_idx as i32 - commit_idx as i32));
            }

            Ast::Plus(inner) => {
                self.compile_node(inner)?;
                self.compile_node(&Ast::Star(inner.clone()))?;
            }

            Ast::Sequence(items) => {
                for item in items {
                    self.compile_node(item)?;
                }
            }

            Ast::Expression(alts) => {
                self.compile_ordered_choice(alts.len(), |emitter, i| emitter.compile_node(&alts[i]))?;
            }

            Ast::CaptureBlock(inner) => {
                if self.capture_suppressed {
                    // Inside a `Not` subtree: compile the body for its
                    // match/fail effect only, no capture opcodes at all.
                    self.compile_node(inner)?;
                } else {
                    self.emit(Instr::CapOpen(true, 0));
                    let saved = self.capture_enabled;
                    self.capture_enabled = true;
                    self.compile_node(inner)?;
                    self.capture_enabled = saved;
                    self.emit(Instr::CapClose(true, 0));
                }
            }

            Ast::CaptureNode(inner) => {
                let Ast::Identifier(name) = inner.as_ref() else {
                    return Err(PegError::CompileUnknown(
                        "CaptureNode must wrap an Identifier".into(),
                    ));
                };
                if self.capture_suppressed {
                    self.compile_node(inner)?;
                } else {
                    let sid = self.program.intern(name);
                    self.emit(Instr::CapOpen(false, sid));
                    self.compile_node(inner)?;
                    self.emit(Instr::CapClose(false, sid));
                }
            }

            Ast::Label(name, inner) => {
                let name = name.clone();
                self.compile_ordered_choice(2, |emitter, i| {
                    if i == 0 {
                        emitter.compile_node(inner)
                    } else {
                        emitter.compile_node(&Ast::Throw(name.clone()))
                    }
                })?;
            }

            Ast::Throw(name) => {
                let sid = self.program.intern(name);
                self.emit(Instr::Throw(sid + 2));
            }

            Ast::List(items) => {
                self.emit(Instr::Open);
                for item in items {
                    self.compile_node(item)?;
                }
                self.emit(Instr::Close);
            }

            Ast::Grammar(_) | Ast::Definition(..) => {
                return Err(PegError::CompileUnknown("structural node reached the compiler".into()))
            }
        }
        Ok(())
    }
}

fn class_item_instr(item: ClassItem) -> Instr {
    match item {
        ClassItem::Char(c) => Instr::Char(c),
        ClassItem::Range(lo, hi) => Instr::Span(lo, hi),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn compile_src(src: &str, start: &str) -> Program {
        let ast = Parser::new(src).unwrap().parse_grammar().unwrap();
        let grammar = Grammar::from_ast(ast).unwrap();
        compile(&grammar, start, &CompileOptions::default()).unwrap()
    }

    #[test]
    fn s4_ordered_choice_matches_the_worked_example_exactly() {
        let program = compile_src("S <- 'a' / 'b'", "S");
        assert_eq!(
            program.code,
            vec![
                Instr::Call(2),
                Instr::Jump(7),
                Instr::Choice(3),
                Instr::Char('a'),
                Instr::Commit(2),
                Instr::Char('b'),
                Instr::Return,
                Instr::Halt,
            ]
        );
    }

    #[test]
    fn s5_not_matches_the_worked_example_exactly() {
        let program = compile_src("S <- !'a'", "S");
        assert_eq!(
            program.code,
            vec![
                Instr::Call(2),
                Instr::Jump(7),
                Instr::Choice(4),
                Instr::Char('a'),
                Instr::Commit(1),
                Instr::Fail,
                Instr::Return,
                Instr::Halt,
            ]
        );
    }

    #[test]
    fn s6_labeled_failure_matches_the_worked_example_exactly() {
        let program = compile_src("S <- 'a'^f", "S");
        assert_eq!(
            program.code,
            vec![
                Instr::Call(2),
                Instr::Jump(7),
                Instr::Choice(3),
                Instr::Char('a'),
                Instr::Commit(2),
                Instr::Throw(2),
                Instr::Return,
                Instr::Halt,
            ]
        );
    }

    #[test]
    fn single_alternative_expression_emits_no_choice_scaffolding() {
        let program = compile_src("S <- 'a'", "S");
        assert!(!program.code.iter().any(|i| matches!(i, Instr::Choice(_) | Instr::Commit(_))));
    }

    #[test]
    fn single_entry_class_emits_no_choice_scaffolding() {
        let program = compile_src("S <- [a]", "S");
        assert!(!program.code.iter().any(|i| matches!(i, Instr::Choice(_) | Instr::Commit(_))));
        assert!(program.code.contains(&Instr::Char('a')));
    }

    #[test]
    fn call_targets_always_land_on_a_rule_body_start() {
        let program = compile_src("S <- T\nT <- 'x'", "S");
        for (i, instr) in program.code.iter().enumerate() {
            if let Instr::Call(off) = instr {
                let target = i as i32 + off;
                assert!(target >= 0);
            }
        }
    }

    #[test]
    fn capcharn_never_emitted_inside_a_not_subtree() {
        let program = compile_src("S <- %{ !'a' 'b' }", "S");
        // the Not-guarded CHAR 'a' must not be followed by CAPCHAR
        let idx = program.code.iter().position(|i| *i == Instr::Char('a')).unwrap();
        assert_ne!(program.code.get(idx + 1), Some(&Instr::Capchar));
    }

    #[test]
    fn capture_block_nested_inside_not_emits_no_capture_opcodes() {
        // `!%{ 'a' }` is valid per the Primary production; the CaptureBlock
        // must not re-enable capture emission once Not has suppressed it.
        let program = compile_src("S <- !%{ 'a' }", "S");
        assert!(!program.code.iter().any(|i| matches!(
            i,
            Instr::CapOpen(..) | Instr::CapClose(..) | Instr::Capchar
        )));
        // the predicate's CHOICE/COMMIT/FAIL scaffolding around 'a' is unaffected
        assert!(program.code.contains(&Instr::Char('a')));
    }

    #[test]
    fn capture_node_nested_inside_not_emits_no_capture_opcodes() {
        let program = compile_src("S <- !%Foo\nFoo <- 'a'", "S");
        assert!(!program.code.iter().any(|i| matches!(i, Instr::CapOpen(..) | Instr::CapClose(..))));
    }

    #[test]
    fn capture_block_outside_not_still_emits_capture_opcodes() {
        // Sanity check that the suppression is scoped to Not and does not
        // leak out and silently disable captures everywhere.
        let program = compile_src("S <- %{ 'a' }", "S");
        assert!(program.code.iter().any(|i| matches!(i, Instr::CapOpen(..))));
        assert!(program.code.iter().any(|i| matches!(i, Instr::CapClose(..))));
        assert!(program.code.contains(&Instr::Capchar));
    }

    #[test]
    fn string_table_has_no_duplicate_entries() {
        let program = compile_src("S <- \"x\" / \"x\"", "S");
        let count = program.string_table.iter().filter(|s| s.as_str() == "x").count();
        assert_eq!(count, 1);
    }
}
