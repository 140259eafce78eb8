//! Change classification and debounced saving.

pub mod policy;
pub mod scheduler;

pub use policy::{SavePolicy, DEFAULT_DEBOUNCE_MS};
pub use scheduler::{PersistenceError, PersistenceScheduler, SchedulerStatus};
