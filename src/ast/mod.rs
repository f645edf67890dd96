mod ast;

pub use ast::{Ast, ClassItem, Definition, Grammar};
