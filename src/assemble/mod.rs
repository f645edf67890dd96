mod assemble;

pub use assemble::{deserialize, serialize};
