//! API handlers module

pub mod chat;
pub mod context;
pub mod health;
