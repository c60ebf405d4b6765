//! Session module
//!
//! Session types and the session store capability.

mod model;
mod store;

pub use model::*;
pub use store::SessionStore;
