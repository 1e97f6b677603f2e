//! Runtime harness to execute services in the context of modules

mod factory;
mod heart;
mod module;
mod service;

pub use factory::*;
pub use heart::*;
pub use module::*;
pub use service::*;
