//! VM instruction set (C8, spec.md §4.6): encoding, mnemonics and the
//! binary layout contract. No execution engine lives here — per scope,
//! only the instruction set and its semantics are specified; a conforming
//! engine executes it elsewhere.

use crate::error::PegError;

/// Opcode ordinals are part of the binary contract and must not be
/// reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Halt = 0,
    Char = 1,
    Any = 2,
    Choice = 3,
    Commit = 4,
    Fail = 5,
    FailTwice = 6,
    PartialCommit = 7,
    BackCommit = 8,
    TestChar = 9,
    TestAny = 10,
    Jump = 11,
    Call = 12,
    Return = 13,
    Span = 14,
    Set = 15,
    Throw = 16,
    CapOpen = 17,
    CapClose = 18,
    Atom = 19,
    Open = 20,
    Close = 21,
    Capchar = 22,
    End = 23,
}

impl Opcode {
    fn from_u8(v: u8) -> Result<Opcode, PegError> {
        use Opcode::*;
        Ok(match v {
            0 => Halt,
            1 => Char,
            2 => Any,
            3 => Choice,
            4 => Commit,
            5 => Fail,
            6 => FailTwice,
            7 => PartialCommit,
            8 => BackCommit,
            9 => TestChar,
            10 => TestAny,
            11 => Jump,
            12 => Call,
            13 => Return,
            14 => Span,
            15 => Set,
            16 => Throw,
            17 => CapOpen,
            18 => CapClose,
            19 => Atom,
            20 => Open,
            21 => Close,
            22 => Capchar,
            23 => End,
            other => return Err(PegError::Encoding(format!("unknown opcode {other}"))),
        })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Halt => "HALT",
            Opcode::Char => "CHAR",
            Opcode::Any => "ANY",
            Opcode::Choice => "CHOICE",
            Opcode::Commit => "COMMIT",
            Opcode::Fail => "FAIL",
            Opcode::FailTwice => "FAIL_TWICE",
            Opcode::PartialCommit => "PARTIAL_COMMIT",
            Opcode::BackCommit => "BACK_COMMIT",
            Opcode::TestChar => "TEST_CHAR",
            Opcode::TestAny => "TEST_ANY",
            Opcode::Jump => "JUMP",
            Opcode::Call => "CALL",
            Opcode::Return => "RETURN",
            Opcode::Span => "SPAN",
            Opcode::Set => "SET",
            Opcode::Throw => "THROW",
            Opcode::CapOpen => "CAP_OPEN",
            Opcode::CapClose => "CAP_CLOSE",
            Opcode::Atom => "ATOM",
            Opcode::Open => "OPEN",
            Opcode::Close => "CLOSE",
            Opcode::Capchar => "CAPCHAR",
            Opcode::End => "END",
        }
    }
}

/// A decoded instruction. Offsets (`Choice`, `Commit`, `Jump`, `Call`,
/// `PartialCommit`, `BackCommit`, and the offset half of `TestChar`/
/// `TestAny`) are self-relative: the target address is `site_ip + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Halt,
    Char(char),
    Any,
    Choice(i32),
    Commit(i32),
    Fail,
    FailTwice(i32),
    PartialCommit(i32),
    BackCommit(i32),
    TestChar(char, i32),
    TestAny(u32, i32),
    Jump(i32),
    Call(i32),
    Return,
    Span(char, char),
    Set,
    Throw(u32),
    /// `(is_terminal, string-table index)`.
    CapOpen(bool, u32),
    CapClose(bool, u32),
    Atom(u32),
    Open,
    Close,
    Capchar,
    End,
}

const OP_SHIFT: u32 = 27;
const OPERAND27_MASK: u32 = (1 << 27) - 1;
const SIGN27_BIT: u32 = 1 << 26;
const HI_SHIFT: u32 = 16;
const HI_MASK: u32 = (1 << 11) - 1;
const LO_MASK: u32 = (1 << 16) - 1;
const SIGN16_BIT: u32 = 1 << 15;

fn sign_extend27(raw: u32) -> i32 {
    let raw = raw & OPERAND27_MASK;
    if raw & SIGN27_BIT != 0 {
        (raw as i32) - (1 << 27)
    } else {
        raw as i32
    }
}

fn sign_extend16(raw: u32) -> i32 {
    let raw = raw & LO_MASK;
    if raw & SIGN16_BIT != 0 {
        (raw as i32) - (1 << 16)
    } else {
        raw as i32
    }
}

fn encode_signed27(opcode: Opcode, value: i32) -> Result<u32, PegError> {
    if !(-(1 << 26)..(1 << 26)).contains(&value) {
        return Err(PegError::Encoding(format!(
            "operand {value} does not fit in a signed 27-bit field"
        )));
    }
    Ok(((opcode as u32) << OP_SHIFT) | ((value as u32) & OPERAND27_MASK))
}

fn encode_unsigned27(opcode: Opcode, value: u32) -> Result<u32, PegError> {
    if value > OPERAND27_MASK {
        return Err(PegError::Encoding(format!(
            "operand {value} does not fit in a 27-bit field"
        )));
    }
    Ok(((opcode as u32) << OP_SHIFT) | value)
}

fn encode_two(opcode: Opcode, hi: u32, lo: i32) -> Result<u32, PegError> {
    if hi > HI_MASK {
        return Err(PegError::Encoding(format!(
            "operand {hi} does not fit in the 11-bit field (ASCII-range grammars only)"
        )));
    }
    if !(-(1 << 15)..(1 << 15)).contains(&lo) {
        return Err(PegError::Encoding(format!(
            "operand {lo} does not fit in the 16-bit field"
        )));
    }
    Ok(((opcode as u32) << OP_SHIFT) | (hi << HI_SHIFT) | ((lo as u32) & LO_MASK))
}

fn encode_two_unsigned(opcode: Opcode, hi: u32, lo: u32) -> Result<u32, PegError> {
    if hi > HI_MASK {
        return Err(PegError::Encoding(format!(
            "operand {hi} does not fit in the 11-bit field (ASCII-range grammars only)"
        )));
    }
    if lo > LO_MASK {
        return Err(PegError::Encoding(format!("operand {lo} does not fit in the 16-bit field")));
    }
    Ok(((opcode as u32) << OP_SHIFT) | (hi << HI_SHIFT) | lo)
}

fn char_from_code(code: u32) -> Result<char, PegError> {
    char::from_u32(code).ok_or_else(|| PegError::Encoding(format!("{code} is not a valid code point")))
}

impl Instr {
    pub fn encode(self) -> Result<u32, PegError> {
        match self {
            Instr::Halt => Ok((Opcode::Halt as u32) << OP_SHIFT),
            Instr::Char(c) => encode_unsigned27(Opcode::Char, c as u32),
            Instr::Any => Ok((Opcode::Any as u32) << OP_SHIFT),
            Instr::Choice(off) => encode_signed27(Opcode::Choice, off),
            Instr::Commit(off) => encode_signed27(Opcode::Commit, off),
            Instr::Fail => Ok((Opcode::Fail as u32) << OP_SHIFT),
            Instr::FailTwice(off) => encode_signed27(Opcode::FailTwice, off),
            Instr::PartialCommit(off) => encode_signed27(Opcode::PartialCommit, off),
            Instr::BackCommit(off) => encode_signed27(Opcode::BackCommit, off),
            Instr::TestChar(c, off) => encode_two(Opcode::TestChar, c as u32, off),
            Instr::TestAny(n, off) => encode_two(Opcode::TestAny, n, off),
            Instr::Jump(off) => encode_signed27(Opcode::Jump, off),
            Instr::Call(off) => encode_signed27(Opcode::Call, off),
            Instr::Return => Ok((Opcode::Return as u32) << OP_SHIFT),
            Instr::Span(lo, hi) => encode_two_unsigned(Opcode::Span, lo as u32, hi as u32),
            Instr::Set => Ok((Opcode::Set as u32) << OP_SHIFT),
            Instr::Throw(lbl) => encode_unsigned27(Opcode::Throw, lbl),
            Instr::CapOpen(term, sid) => encode_two_unsigned(Opcode::CapOpen, term as u32, sid),
            Instr::CapClose(term, sid) => encode_two_unsigned(Opcode::CapClose, term as u32, sid),
            Instr::Atom(sid) => encode_unsigned27(Opcode::Atom, sid),
            Instr::Open => Ok((Opcode::Open as u32) << OP_SHIFT),
            Instr::Close => Ok((Opcode::Close as u32) << OP_SHIFT),
            Instr::Capchar => Ok((Opcode::Capchar as u32) << OP_SHIFT),
            Instr::End => Ok((Opcode::End as u32) << OP_SHIFT),
        }
    }

    pub fn decode(word: u32) -> Result<Instr, PegError> {
        let opcode = Opcode::from_u8((word >> OP_SHIFT) as u8 & 0x1F)?;
        let hi = (word >> HI_SHIFT) & HI_MASK;
        let lo_raw = word & LO_MASK;
        Ok(match opcode {
            Opcode::Halt => Instr::Halt,
            Opcode::Char => Instr::Char(char_from_code(word & OPERAND27_MASK)?),
            Opcode::Any => Instr::Any,
            Opcode::Choice => Instr::Choice(sign_extend27(word)),
            Opcode::Commit => Instr::Commit(sign_extend27(word)),
            Opcode::Fail => Instr::Fail,
            Opcode::FailTwice => Instr::FailTwice(sign_extend27(word)),
            Opcode::PartialCommit => Instr::PartialCommit(sign_extend27(word)),
            Opcode::BackCommit => Instr::BackCommit(sign_extend27(word)),
            Opcode::TestChar => Instr::TestChar(char_from_code(hi)?, sign_extend16(lo_raw)),
            Opcode::TestAny => Instr::TestAny(hi, sign_extend16(lo_raw)),
            Opcode::Jump => Instr::Jump(sign_extend27(word)),
            Opcode::Call => Instr::Call(sign_extend27(word)),
            Opcode::Return => Instr::Return,
            Opcode::Span => Instr::Span(char_from_code(hi)?, char_from_code(lo_raw)?),
            Opcode::Set => Instr::Set,
            Opcode::Throw => Instr::Throw(word & OPERAND27_MASK),
            Opcode::CapOpen => Instr::CapOpen(hi != 0, lo_raw),
            Opcode::CapClose => Instr::CapClose(hi != 0, lo_raw),
            Opcode::Atom => Instr::Atom(word & OPERAND27_MASK),
            Opcode::Open => Instr::Open,
            Opcode::Close => Instr::Close,
            Opcode::Capchar => Instr::Capchar,
            Opcode::End => Instr::End,
        })
    }

    fn opcode(&self) -> Opcode {
        match self {
            Instr::Halt => Opcode::Halt,
            Instr::Char(_) => Opcode::Char,
            Instr::Any => Opcode::Any,
            Instr::Choice(_) => Opcode::Choice,
            Instr::Commit(_) => Opcode::Commit,
            Instr::Fail => Opcode::Fail,
            Instr::FailTwice(_) => Opcode::FailTwice,
            Instr::PartialCommit(_) => Opcode::PartialCommit,
            Instr::BackCommit(_) => Opcode::BackCommit,
            Instr::TestChar(..) => Opcode::TestChar,
            Instr::TestAny(..) => Opcode::TestAny,
            Instr::Jump(_) => Opcode::Jump,
            Instr::Call(_) => Opcode::Call,
            Instr::Return => Opcode::Return,
            Instr::Span(..) => Opcode::Span,
            Instr::Set => Opcode::Set,
            Instr::Throw(_) => Opcode::Throw,
            Instr::CapOpen(..) => Opcode::CapOpen,
            Instr::CapClose(..) => Opcode::CapClose,
            Instr::Atom(_) => Opcode::Atom,
            Instr::Open => Opcode::Open,
            Instr::Close => Opcode::Close,
            Instr::Capchar => Opcode::Capchar,
            Instr::End => Opcode::End,
        }
    }
}

/// A compiled program: a deduplicated string table plus the instruction
/// stream. Entry point is instruction 0 (spec.md §3).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub string_table: Vec<String>,
    pub code: Vec<Instr>,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    /// Interns `s`, returning its string-table index (appending on first
    /// use; no duplicates, per spec.md §4.5).
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(idx) = self.string_table.iter().position(|existing| existing == s) {
            return idx as u32;
        }
        self.string_table.push(s.to_string());
        (self.string_table.len() - 1) as u32
    }
}

/// Pretty-prints a program, one instruction per line, with string-table
/// references resolved inline. Diagnostic tooling only — not part of the
/// VM's semantic contract.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    for (ip, instr) in program.code.iter().enumerate() {
        let mnemonic = instr.opcode().mnemonic();
        let operands = match instr {
            Instr::Char(c) => format!(" '{c}'"),
            Instr::Choice(off) | Instr::Commit(off) | Instr::FailTwice(off) | Instr::PartialCommit(off)
            | Instr::BackCommit(off) | Instr::Jump(off) | Instr::Call(off) => format!(" {off:+}"),
            Instr::TestChar(c, off) => format!(" '{c}', {off:+}"),
            Instr::TestAny(n, off) => format!(" {n}, {off:+}"),
            Instr::Span(lo, hi) => format!(" '{lo}'-'{hi}'"),
            Instr::Throw(lbl) => format!(" {lbl}"),
            Instr::CapOpen(term, sid) | Instr::CapClose(term, sid) => {
                let name = program.string_table.get(*sid as usize).map(String::as_str).unwrap_or("?");
                format!(" term={term} \"{name}\"")
            }
            Instr::Atom(sid) => {
                let name = program.string_table.get(*sid as usize).map(String::as_str).unwrap_or("?");
                format!(" \"{name}\"")
            }
            _ => String::new(),
        };
        out.push_str(&format!("{ip:4}: {mnemonic}{operands}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_signed_offset() {
        let encoded = Instr::Choice(-5).encode().unwrap();
        assert_eq!(Instr::decode(encoded).unwrap(), Instr::Choice(-5));
    }

    #[test]
    fn round_trips_a_char_operand() {
        let encoded = Instr::Char('a').encode().unwrap();
        assert_eq!(Instr::decode(encoded).unwrap(), Instr::Char('a'));
    }

    #[test]
    fn round_trips_two_operand_instruction() {
        let encoded = Instr::TestChar('x', -100).encode().unwrap();
        assert_eq!(Instr::decode(encoded).unwrap(), Instr::TestChar('x', -100));
    }

    #[test]
    fn overflowing_two_operand_field_is_an_encoding_error() {
        let err = Instr::Span('\u{800}', 'b').encode();
        assert!(err.is_err());
    }

    #[test]
    fn intern_deduplicates_strings() {
        let mut program = Program::new();
        let a = program.intern("f");
        let b = program.intern("f");
        assert_eq!(a, b);
        assert_eq!(program.string_table.len(), 1);
    }

    #[test]
    fn disassembly_resolves_string_table_reference() {
        let mut program = Program::new();
        let sid = program.intern("f");
        program.code.push(Instr::Throw(sid));
        let text = disassemble(&program);
        assert!(text.contains("THROW"));
    }
}
