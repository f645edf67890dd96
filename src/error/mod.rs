mod error;

pub use error::{PegError, Position, Report};
