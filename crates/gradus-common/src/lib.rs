pub mod error;
pub mod phase;

pub use error::{ActionError, Defect, Error, Result};
pub use phase::Phase;
