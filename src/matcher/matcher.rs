//! Direct AST-walking matcher (C4, spec.md §4.3): a reference interpreter
//! that evaluates a grammar against an input string without compiling it.

use log::trace;

use crate::ast::{Ast, Grammar};
use crate::error::PegError;

/// The value produced by a successful sub-match. Terminals that consume
/// input return a scalar; composites return a list of their children's
/// non-null values; predicates and "matched but nothing to report"
/// successes return `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchValue {
    Null,
    Char(char),
    Str(String),
    List(Vec<MatchValue>),
}

/// Runs `start` from `grammar` against `input`, returning whether it
/// matched and, if so, its structured value. An unresolved `Identifier` or
/// a labeled failure is a fatal `Err`; an ordinary PEG failure is `Ok((false,
/// MatchValue::Null))`.
pub fn match_grammar(grammar: &Grammar, start: &str, input: &str) -> Result<(bool, MatchValue), PegError> {
    let body = grammar
        .lookup(start)
        .ok_or_else(|| PegError::MatchUnbound(start.to_string()))?;
    let mut m = Matcher {
        grammar,
        chars: input.chars().collect(),
        pos: 0,
    };
    m.eval(body)
}

struct Matcher<'g> {
    grammar: &'g Grammar,
    chars: Vec<char>,
    pos: usize,
}

impl<'g> Matcher<'g> {
    fn eval(&mut self, node: &Ast) -> Result<(bool, MatchValue), PegError> {
        match node {
            Ast::Dot(_) => Ok(self.consume_one()),

            Ast::Literal(s, _) | Ast::String(s, _) => Ok(self.match_literal(s)),

            Ast::Class(items, _) => {
                let Some(&c) = self.chars.get(self.pos) else {
                    return Ok((false, MatchValue::Null));
                };
                if items.iter().any(|it| it.matches(c)) {
                    self.pos += 1;
                    Ok((true, MatchValue::Char(c)))
                } else {
                    Ok((false, MatchValue::Null))
                }
            }

            Ast::Identifier(name) => {
                trace!("entering rule `{name}` at pos {}", self.pos);
                let body = self
                    .grammar
                    .lookup(name)
                    .ok_or_else(|| PegError::MatchUnbound(name.clone()))?;
                self.eval(body)
            }

            Ast::And(inner) => {
                let start = self.pos;
                let (matched, _) = self.eval(&Ast::Not(Box::new(Ast::Not(inner.clone()))))?;
                self.pos = start;
                Ok((matched, MatchValue::Null))
            }

            Ast::Not(inner) => {
                let start = self.pos;
                let (matched, _) = self.eval(inner)?;
                self.pos = start;
                Ok((!matched, MatchValue::Null))
            }

            Ast::Question(inner) => {
                let start = self.pos;
                match self.eval(inner)? {
                    (true, value) => Ok((true, value)),
                    (false, _) => {
                        self.pos = start;
                        Ok((true, MatchValue::Null))
                    }
                }
            }

            Ast::Star(inner) => {
                let mut values = Vec::new();
                loop {
                    let start = self.pos;
                    match self.eval(inner)? {
                        (true, value) => values.push(value),
                        (false, _) => {
                            self.pos = start;
                            break;
                        }
                    }
                }
                Ok((true, MatchValue::List(values)))
            }

            Ast::Plus(inner) => {
                let (matched, first) = self.eval(inner)?;
                if !matched {
                    return Ok((false, MatchValue::Null));
                }
                let (_, MatchValue::List(mut rest)) = self.eval(&Ast::Star(inner.clone()))? else {
                    unreachable!("Star always returns a List")
                };
                rest.insert(0, first);
                Ok((true, MatchValue::List(rest)))
            }

            Ast::Sequence(items) => {
                let start = self.pos;
                let mut values = Vec::new();
                for item in items {
                    match self.eval(item)? {
                        (true, MatchValue::Null) => {}
                        (true, value) => values.push(value),
                        (false, _) => {
                            self.pos = start;
                            return Ok((false, MatchValue::Null));
                        }
                    }
                }
                if values.is_empty() {
                    Ok((true, MatchValue::Null))
                } else {
                    Ok((true, MatchValue::List(values)))
                }
            }

            Ast::Expression(alts) => {
                let start = self.pos;
                for alt in alts {
                    match self.eval(alt)? {
                        (true, value) => return Ok((true, value)),
                        (false, _) => {
                            trace!("alternative failed at pos {start}, backtracking and trying next");
                            self.pos = start;
                        }
                    }
                }
                Ok((false, MatchValue::Null))
            }

            Ast::List(items) => {
                // List-structured matching is a VM/compiled-program extension
                // (spec §4.8); the direct matcher has only flat character
                // input, so a `List` node is evaluated the same as a
                // `Sequence` over that input.
                self.eval(&Ast::Sequence(items.clone()))
            }

            Ast::CaptureBlock(inner) | Ast::CaptureNode(inner) => self.eval(inner),

            Ast::Label(name, inner) => match self.eval(inner)? {
                (true, value) => Ok((true, value)),
                (false, _) => Err(PegError::LabeledFail(name.clone())),
            },

            Ast::Throw(name) => Err(PegError::LabeledFail(name.clone())),

            Ast::Grammar(_) | Ast::Definition(..) => {
                Err(PegError::CompileUnknown("structural node reached the matcher".into()))
            }
        }
    }

    fn consume_one(&mut self) -> (bool, MatchValue) {
        match self.chars.get(self.pos) {
            Some(&c) => {
                self.pos += 1;
                (true, MatchValue::Char(c))
            }
            None => (false, MatchValue::Null),
        }
    }

    /// Atomic whole-string match with restore on partial failure (spec.md
    /// §9 open question: do not advance per-character on a mismatch).
    fn match_literal(&mut self, s: &str) -> (bool, MatchValue) {
        let start = self.pos;
        for expected in s.chars() {
            match self.chars.get(self.pos) {
                Some(&c) if c == expected => self.pos += 1,
                _ => {
                    self.pos = start;
                    return (false, MatchValue::Null);
                }
            }
        }
        (true, MatchValue::Str(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn grammar(src: &str) -> Grammar {
        let ast = Parser::new(src).unwrap().parse_grammar().unwrap();
        Grammar::from_ast(ast).unwrap()
    }

    #[test]
    fn arithmetic_scenario_produces_expected_nested_value() {
        let g = grammar(
            "Add <- Mul '+' Add / Mul\nMul <- Pri '*' Mul / Pri\nPri <- '(' Add ')' / Num\nNum <- [0-9]+",
        );
        let (matched, value) = match_grammar(&g, "Add", "12+34*56").unwrap();
        assert!(matched);
        assert_eq!(
            value,
            MatchValue::List(vec![
                MatchValue::List(vec![MatchValue::Char('1'), MatchValue::Char('2')]),
                MatchValue::Str("+".into()),
                MatchValue::List(vec![
                    MatchValue::List(vec![MatchValue::Char('3'), MatchValue::Char('4')]),
                    MatchValue::Str("*".into()),
                    MatchValue::List(vec![MatchValue::Char('5'), MatchValue::Char('6')]),
                ]),
            ])
        );
    }

    #[test]
    fn predicate_does_not_consume_input() {
        let g = grammar("AtoC <- [a-c]\nNoAtoC <- !AtoC .\nEOF <- !.");
        let input: Vec<char> = "abcdef".chars().collect();
        let mut pos = 0usize;
        for _ in 0..3 {
            let (matched, _) = match_grammar(&g, "AtoC", &input[pos..].iter().collect::<String>()).unwrap();
            assert!(matched);
            pos += 1;
        }
        let (matched, _) = match_grammar(&g, "AtoC", &input[pos..].iter().collect::<String>()).unwrap();
        assert!(!matched);
        for _ in 0..3 {
            let (matched, _) = match_grammar(&g, "NoAtoC", &input[pos..].iter().collect::<String>()).unwrap();
            assert!(matched);
            pos += 1;
        }
        let (matched, value) = match_grammar(&g, "EOF", &input[pos..].iter().collect::<String>()).unwrap();
        assert!(matched);
        assert_eq!(value, MatchValue::Null);
        assert_eq!(pos, 6);
    }

    #[test]
    fn unbound_identifier_is_a_fatal_error() {
        let g = grammar("S <- Missing");
        let err = match_grammar(&g, "S", "x").unwrap_err();
        assert!(matches!(err, PegError::MatchUnbound(name) if name == "Missing"));
    }

    #[test]
    fn literal_mismatch_restores_cursor_atomically() {
        let g = grammar("S <- 'abc' / .");
        let (matched, value) = match_grammar(&g, "S", "abd").unwrap();
        assert!(matched);
        assert_eq!(value, MatchValue::Char('a'));
    }
}
