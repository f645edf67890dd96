//! Binary serializer (C7, spec.md §4.7): packs a compiled [`Program`] into
//! the fixed layout described in spec.md §3, and reads it back.
//!
//! ```text
//! u16           string_table_count
//!   repeated:   u8 length, <length> bytes ASCII
//! u16           code_count_in_32bit_words
//! repeated:     u32 big-endian instruction
//! ```

use crate::error::PegError;
use crate::vm::{Instr, Program};

/// Serializes `program`. Deterministic: identical input yields identical
/// bytes (spec.md §4.7, property 3).
pub fn serialize(program: &Program) -> Result<Vec<u8>, PegError> {
    let mut out = Vec::new();

    let string_count: u16 = program
        .string_table
        .len()
        .try_into()
        .map_err(|_| PegError::Encoding("string table exceeds u16 capacity".into()))?;
    out.extend_from_slice(&string_count.to_be_bytes());
    for s in &program.string_table {
        if !s.is_ascii() {
            return Err(PegError::Encoding(format!("string table entry {s:?} is not ASCII")));
        }
        let len: u8 = s
            .len()
            .try_into()
            .map_err(|_| PegError::Encoding(format!("string table entry {s:?} exceeds 255 bytes")))?;
        out.push(len);
        out.extend_from_slice(s.as_bytes());
    }

    let code_count: u16 = program
        .code
        .len()
        .try_into()
        .map_err(|_| PegError::Encoding("code exceeds u16 word capacity".into()))?;
    out.extend_from_slice(&code_count.to_be_bytes());
    for instr in &program.code {
        out.extend_from_slice(&instr.encode()?.to_be_bytes());
    }

    Ok(out)
}

/// Reads back a program produced by [`serialize`].
pub fn deserialize(bytes: &[u8]) -> Result<Program, PegError> {
    let mut cursor = Cursor { bytes, pos: 0 };

    let string_count = cursor.read_u16()?;
    let mut string_table = Vec::with_capacity(string_count as usize);
    for _ in 0..string_count {
        let len = cursor.read_u8()? as usize;
        let raw = cursor.read_bytes(len)?;
        let s = std::str::from_utf8(raw)
            .map_err(|_| PegError::Encoding("string table entry is not valid UTF-8".into()))?
            .to_string();
        string_table.push(s);
    }

    let code_count = cursor.read_u16()?;
    let mut code = Vec::with_capacity(code_count as usize);
    for _ in 0..code_count {
        let word = cursor.read_u32()?;
        code.push(Instr::decode(word)?);
    }

    Ok(Program { string_table, code })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], PegError> {
        let end = self.pos + n;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| PegError::Encoding("unexpected end of program data".into()))?;
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, PegError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, PegError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, PegError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Grammar;
    use crate::compiler::{compile, CompileOptions};
    use crate::parser::Parser;

    fn compiled(src: &str, start: &str) -> Program {
        let ast = Parser::new(src).unwrap().parse_grammar().unwrap();
        let grammar = Grammar::from_ast(ast).unwrap();
        compile(&grammar, start, &CompileOptions::default()).unwrap()
    }

    #[test]
    fn round_trips_a_compiled_program() {
        let program = compiled("S <- 'a' / 'b'", "S");
        let bytes = serialize(&program).unwrap();
        let back = deserialize(&bytes).unwrap();
        assert_eq!(program, back);
    }

    #[test]
    fn serialization_is_deterministic() {
        let program = compiled("S <- 'a'^f", "S");
        let a = serialize(&program).unwrap();
        let b = serialize(&program).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn layout_starts_with_string_table_count() {
        let program = compiled("S <- 'a'^f", "S");
        let bytes = serialize(&program).unwrap();
        let count = u16::from_be_bytes([bytes[0], bytes[1]]);
        assert_eq!(count as usize, program.string_table.len());
    }
}
