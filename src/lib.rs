//! Co-parenting reflection: a phase-gated guided dialogue engine.

pub mod config;
pub mod error;
pub mod llm;
pub mod reflection;
