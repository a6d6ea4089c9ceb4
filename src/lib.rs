//! Threadloom - convergence controllers for conversational threads
//!
//! Threadloom keeps threads, runs and workflows converged on their declared
//! state: every thread gets its workspaces and knowledge sets, copies of
//! projects pick up their source's tasks and tools, template projects stay
//! shareable, and finished work is garbage-collected.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): resource models, the store and invoker ports, the typed client
//! - **Application Layer** (`application`): the change-driven dispatcher and controller wiring
//! - **Service Layer** (`services`): the convergence steps and the template service
//! - **Adapters** (`adapters`): in-memory and `SQLite` resource stores
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use threadloom::adapters::memory::InMemoryResourceStore;
//! use threadloom::application::{register_controllers, Dispatcher};
//! use threadloom::domain::{ports::NullInvoker, Client};
//!
//! let client = Client::new(Arc::new(InMemoryResourceStore::new()));
//! let mut dispatcher = Dispatcher::new(client, Default::default());
//! register_controllers(&mut dispatcher, Arc::new(NullInvoker::new()), &Default::default());
//! Arc::new(dispatcher).start().await?;
//! ```

pub mod adapters;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use application::{register_controllers, Dispatcher};
pub use domain::models::{Config, Run, Thread, Workflow};
pub use domain::{Client, DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::TemplateService;
