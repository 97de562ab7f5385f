pub mod chain;
pub mod memory;
pub mod publish;
pub mod registry;

pub use memory::*;
pub use registry::*;
