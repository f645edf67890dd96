mod matcher;

pub use matcher::{match_grammar, MatchValue};
