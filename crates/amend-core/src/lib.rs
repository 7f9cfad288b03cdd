//! Core types, the storage trait and the learning engine for Amend.
//!
//! Amend records user corrections to automatically generated classifications,
//! mines recurring `condition → adjustment` patterns from them, and suggests
//! those adjustments for new data.
//!
//! This crate is deliberately free of database dependencies. Storage
//! backends implement [`store::PatternStore`]; [`learner::Learner`] wires the
//! engine around one.

pub mod condition;
pub mod config;
pub mod constants;
pub mod correction;
pub mod error;
pub mod learner;
pub mod miner;
pub mod pattern;
pub mod prune;
pub mod recorder;
pub mod store;
pub mod suggest;
pub mod tracker;

pub use config::LearningConfig;
pub use error::{Error, Result, ValidationError};
pub use learner::Learner;
