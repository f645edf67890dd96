mod cli;

pub use cli::{run, Args};
