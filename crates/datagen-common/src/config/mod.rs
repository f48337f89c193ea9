mod application;
mod loader;

pub use application::*;
pub use loader::deserialize_non_zero;
