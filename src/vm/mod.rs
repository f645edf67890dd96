mod vm;

pub use vm::{disassemble, Instr, Opcode, Program};
