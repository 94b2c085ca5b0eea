pub mod manager;
pub mod position;

pub use manager::PerpPositionManager;
pub use position::{MarginHealth, PerpPosition};
