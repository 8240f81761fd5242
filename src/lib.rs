//! Batch Studio: Concurrent Prompt-to-Image Generation
//!
//! Drives many prompts through interchangeable image providers with bounded
//! parallelism, per-card cancellation and retry, and schema-driven detection
//! of which models accept a reference image.

pub mod capability;
pub mod card;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod preflight;
pub mod provider;
pub mod reference;
pub mod scheduler;
pub mod store;
pub mod template;
