//! Tool abstraction: the uniform contract every capability is called through.

pub mod builtin;
pub mod registry;
pub mod tool;

pub use registry::ToolRegistry;
pub use tool::*;
