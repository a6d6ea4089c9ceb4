pub mod ancestry;
pub mod convergence;
pub mod naming;
pub mod runs;
pub mod templates;
pub mod threads;
pub mod workflows;

pub use runs::{DeleteFinished, DeleteRunState, Resume};
pub use templates::{TemplateService, TemplateView};
pub use workflows::EnsureShared;
