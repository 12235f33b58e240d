//! API handlers.

pub mod credits;
pub mod cvs;
pub mod health;
pub mod webhooks;
