pub mod entity;
pub mod ids;
pub mod inputs;
pub mod numbering;
pub mod rules;
pub mod status;

pub use entity::*;
pub use ids::*;
pub use inputs::*;
pub use numbering::*;
pub use rules::*;
pub use status::*;
