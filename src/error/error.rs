//! Error taxonomy (spec.md §7) and source-localized error reporting (C9).

use std::fmt;

/// A `(line, column)` pair. Line numbering starts at 1; `offset` is the
/// code-point column within that line (reset to 0 at every `\n`), not a
/// whole-file offset — `Report::fmt` relies on it being line-relative to
/// place the caret under the offending character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, offset: usize) -> Self {
        Self { line, offset }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", self.line)
    }
}

/// Every way the toolchain can fail, one variant per row of spec.md §7's
/// taxonomy table.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum PegError {
    #[error("Unexpected char `{ch}`")]
    Lex { ch: char, pos: Position },

    #[error("Unterminated {what}")]
    Unterminated { what: &'static str, pos: Position },

    #[error("Missing the dash in the arrow")]
    MissingArrowDash { pos: Position },

    #[error("Expected {expected} but found {actual}")]
    ParseExpected {
        expected: String,
        actual: String,
        pos: Position,
    },

    #[error("unknown AST node reached the compiler: {0}")]
    CompileUnknown(String),

    #[error("identifier `{0}` does not resolve to any definition")]
    MatchUnbound(String),

    #[error("match failed")]
    MatchFail,

    #[error("labeled failure `{0}`")]
    LabeledFail(String),

    #[error("{0}")]
    Encoding(String),
}

impl PegError {
    /// The source position a fatal lex/parse error occurred at, if it carries one.
    pub fn position(&self) -> Option<Position> {
        match self {
            PegError::Lex { pos, .. }
            | PegError::Unterminated { pos, .. }
            | PegError::MissingArrowDash { pos }
            | PegError::ParseExpected { pos, .. } => Some(*pos),
            _ => None,
        }
    }
}

/// Decorates a [`PegError`] with the offending source line and an in-situ
/// marker, the way a compiler front-end localizes a syntax error for a human.
pub struct Report<'a> {
    pub error: &'a PegError,
    pub source: &'a str,
}

impl<'a> Report<'a> {
    pub fn new(error: &'a PegError, source: &'a str) -> Self {
        Self { error, source }
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error)?;
        let Some(pos) = self.error.position() else {
            return Ok(());
        };
        let Some(line_text) = self.source.lines().nth(pos.line.saturating_sub(1)) else {
            return Ok(());
        };
        writeln!(f, "{}: {}", pos.line, line_text)?;
        let gutter_width = pos.line.to_string().len() + 2;
        let caret_col = pos.offset.min(line_text.len());
        write!(
            f,
            "{}{}\u{1b}[31m<----- HERE!!\u{1b}[0m",
            " ".repeat(gutter_width + caret_col),
            ""
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_includes_source_line_and_marker() {
        let err = PegError::Lex {
            ch: '$',
            pos: Position::new(2, 4),
        };
        let source = "Rule1 <- 'a'\nRule2 <- $\n";
        let report = format!("{}", Report::new(&err, source));
        assert!(report.contains("Unexpected char `$`"));
        assert!(report.contains("Rule2 <- $"));
        assert!(report.contains("HERE!!"));
    }

    #[test]
    fn fatal_errors_without_position_report_message_only() {
        let err = PegError::MatchUnbound("Foo".into());
        let report = format!("{}", Report::new(&err, ""));
        assert_eq!(report, "identifier `Foo` does not resolve to any definition\n");
    }

    /// Drives a real lex error (not a hand-fabricated `Position`) on a line
    /// past the first, so the caret column is exercised against the lexer's
    /// actual per-line tracking rather than a whole-file offset.
    #[test]
    fn caret_lands_under_the_offending_character_on_a_later_line() {
        use crate::lexer::Lexer;

        let source = "Rule1 <- 'a'\nRule2 <- $\n";
        let mut lexer = Lexer::new(source);
        let err = loop {
            match lexer.advance() {
                Ok(tok) if tok.kind == crate::lexer::TokenKind::End => panic!("expected a lex error"),
                Ok(_) => continue,
                Err(e) => break e,
            }
        };

        let second_line = source.lines().nth(1).unwrap();
        let dollar_col = second_line.find('$').unwrap();

        let report = format!("{}", Report::new(&err, source));
        let marker_line = report.lines().find(|l| l.contains("HERE!!")).unwrap();
        // Strip the ANSI color escapes before measuring the caret's column.
        let visible = marker_line.replace("\u{1b}[31m", "").replace("\u{1b}[0m", "");
        let caret_col = visible.find('<').unwrap();

        let gutter_width = "2".len() + 2;
        assert_eq!(caret_col, gutter_width + dollar_col);
    }
}
