//! Registra core: the registry of APIs, their resources and the ordered
//! policy chains applied to them, plus the contract used to publish the
//! assembled view on a gateway.

pub mod core;
pub mod error;
pub mod ids;
pub mod import;
pub mod models;
pub mod publisher;

pub use crate::core::*;
pub use error::*;
pub use ids::*;
pub use import::*;
pub use models::*;
pub use publisher::*;
