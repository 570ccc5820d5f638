pub mod action;
pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod finding;
pub mod qms;
pub mod registry;
pub mod relations;
pub mod retry;
pub mod stats;

pub use action::*;
pub use audit::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use finding::*;
pub use qms::*;
pub use registry::*;
pub use relations::*;
pub use retry::*;
pub use stats::*;
