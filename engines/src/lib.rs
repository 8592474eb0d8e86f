//! Engine registry (component C): descriptors, spawn templates and
//! deployment recipes, constructed once at startup and read-only
//! thereafter (spec.md §4.C).

mod deployable;
mod engine;
mod error;
mod repository;

pub use deployable::Deployable;
pub use engine::Engine;
pub use error::EngineError;
pub use repository::EngineRepository;
