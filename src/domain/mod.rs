//! Domain layer for the Threadloom controllers
//!
//! Resource models, the store and invoker ports, and the typed client the
//! convergence steps use to talk to the store.

pub mod client;
pub mod errors;
pub mod models;
pub mod ports;

pub use client::Client;
pub use errors::{DomainError, DomainResult};
