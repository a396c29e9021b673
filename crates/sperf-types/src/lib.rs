pub mod domain;
pub mod error;
pub mod finding;
pub mod record;
mod util;

pub use domain::*;
pub use error::{Error, Result};
pub use finding::*;
pub use record::*;
pub use util::*;
