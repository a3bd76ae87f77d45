//! Core business logic abstractions

pub mod cache;
pub mod compare;
pub mod error;
pub mod fetch;
pub mod metadata;
pub mod metrics;
pub mod normalize;
pub mod series;

// Re-export main types for cleaner imports
pub use error::FetchError;
pub use fetch::FetchOrchestrator;
pub use series::{CanonicalSeries, HistoryProvider, Period, ProviderKind};
