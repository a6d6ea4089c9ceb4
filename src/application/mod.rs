//! Application layer: the change-driven dispatcher and controller wiring.

pub mod dispatcher;
pub mod registration;
pub mod work_queue;

pub use dispatcher::{CleanupStep, Controller, ConvergenceStep, Dispatcher, Outcome, Reconciler, Watch};
pub use registration::register_controllers;
pub use work_queue::WorkQueue;
