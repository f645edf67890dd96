//! End-to-end exercises of spec.md §8's canonical scenarios: source text
//! all the way through to a direct-match value or a serialized program.

use peg_toolchain::assemble::{deserialize, serialize};
use peg_toolchain::ast::Grammar;
use peg_toolchain::compiler::{compile, CompileOptions};
use peg_toolchain::matcher::{match_grammar, MatchValue};
use peg_toolchain::parser::Parser;
use peg_toolchain::vm::Instr;

fn grammar(src: &str) -> Grammar {
    let ast = Parser::new(src).unwrap().parse_grammar().unwrap();
    Grammar::from_ast(ast).unwrap()
}

#[test]
fn s1_arithmetic_end_to_end() {
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
fn s2_csv_end_to_end() {
    let g = grammar("File <- CSV*\nCSV  <- Val (',' Val)* '\\n'\nVal  <- (![,\\n] .)*");
    let (matched, value) = match_grammar(&g, "File", "Name,Num,Lang\nLink,3,pt-br\n").unwrap();
    assert!(matched);
    let MatchValue::List(rows) = value else { panic!("expected a list of rows") };
    assert_eq!(rows.len(), 2);
    for row in &rows {
        let MatchValue::List(_) = row else { panic!("expected each row to be a list") };
    }
}

#[test]
fn s3_predicate_non_consumption_end_to_end() {
    let g = grammar("AtoC <- [a-c]\nNoAtoC <- !AtoC .\nEOF <- !.");
    let input = "abcdef";

    let (m, _) = match_grammar(&g, "AtoC", &input[0..]).unwrap();
    assert!(m);
    let (m, _) = match_grammar(&g, "AtoC", &input[1..]).unwrap();
    assert!(m);
    let (m, _) = match_grammar(&g, "AtoC", &input[2..]).unwrap();
    assert!(m);
    let (m, _) = match_grammar(&g, "AtoC", &input[3..]).unwrap();
    assert!(!m);

    let (m, _) = match_grammar(&g, "NoAtoC", &input[3..]).unwrap();
    assert!(m);
    let (m, _) = match_grammar(&g, "NoAtoC", &input[4..]).unwrap();
    assert!(m);
    let (m, _) = match_grammar(&g, "NoAtoC", &input[5..]).unwrap();
    assert!(m);

    let (m, value) = match_grammar(&g, "EOF", &input[6..]).unwrap();
    assert!(m);
    assert_eq!(value, MatchValue::Null);
}

#[test]
fn compile_serialize_deserialize_round_trips_for_every_worked_scenario() {
    for (src, expected) in [
        (
            "S <- 'a' / 'b'",
            vec![
                Instr::Call(2),
                Instr::Jump(7),
                Instr::Choice(3),
                Instr::Char('a'),
                Instr::Commit(2),
                Instr::Char('b'),
                Instr::Return,
                Instr::Halt,
            ],
        ),
        (
            "S <- !'a'",
            vec![
                Instr::Call(2),
                Instr::Jump(7),
                Instr::Choice(4),
                Instr::Char('a'),
                Instr::Commit(1),
                Instr::Fail,
                Instr::Return,
                Instr::Halt,
            ],
        ),
        (
            "S <- 'a'^f",
            vec![
                Instr::Call(2),
                Instr::Jump(7),
                Instr::Choice(3),
                Instr::Char('a'),
                Instr::Commit(2),
                Instr::Throw(2),
                Instr::Return,
                Instr::Halt,
            ],
        ),
    ] {
        let g = grammar(src);
        let program = compile(&g, "S", &CompileOptions::default()).unwrap();
        assert_eq!(program.code, expected);

        let bytes = serialize(&program).unwrap();
        let back = deserialize(&bytes).unwrap();
        assert_eq!(program, back);
    }
}

#[test]
fn unresolved_start_rule_is_a_fatal_compile_error() {
    let g = grammar("S <- 'a'");
    let err = compile(&g, "Missing", &CompileOptions::default()).unwrap_err();
    assert!(err.to_string().contains("Missing"));
}
