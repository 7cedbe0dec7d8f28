pub mod handlers;
pub mod hub;
pub mod store;

pub use hub::{SessionHub, SessionTimings};
pub use store::{SessionSnapshot, SessionStore};
