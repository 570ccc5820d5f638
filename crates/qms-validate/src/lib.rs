pub mod checks;
pub mod types;

pub use checks::*;
pub use types::*;
