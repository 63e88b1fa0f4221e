//! Route handlers of the stub scoring service.

pub mod health;
pub mod resolve;
pub mod steps;
