pub mod engine;
pub mod loader;

pub use engine::*;
pub use loader::*;
