// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod analysis;
pub mod analytics;
pub mod api;
pub mod engine;
pub mod gatekeeper;
pub mod hotlines;
pub mod lexicon;
pub mod metrics;
pub mod notify;
pub mod oracle;
pub mod profile;
pub mod scorer;
pub mod store;

// ---- Re-exports for stable public API ----
// Convenient router construction: `mindhaven_engine::api::create_router` or
// `mindhaven_engine::create_router`
pub use crate::api::create_router;
pub use crate::engine::{AlertOutcome, CrisisEngine};

// Re-export notification types for easy use in bins/tests
pub use crate::notify::{AlertEvent, Notifier, NotifierMux};
