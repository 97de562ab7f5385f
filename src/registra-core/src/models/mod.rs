pub mod api;
pub mod metadata;
pub mod policy;
pub mod resource;
pub mod view;

pub use api::*;
pub use metadata::*;
pub use policy::*;
pub use resource::*;
pub use view::*;
