//! Request handlers served from the cache.

pub mod debug;
pub mod endpoints;
pub mod nodes;
pub mod resource;

pub use resource::Served;
