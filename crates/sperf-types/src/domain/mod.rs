pub mod bundle;
pub mod ids;

pub use bundle::*;
pub use ids::*;
