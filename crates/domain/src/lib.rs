//! `sa-domain` — shared types for the group-chat orchestration runtime.
//!
//! This crate has no async runtime dependency and no I/O: it is the leaf of
//! the dependency graph (message/event types, provider-agnostic tool/LLM
//! message shapes, config, error, and trace types) that every other crate
//! builds on.

pub mod capability;
pub mod config;
pub mod error;
pub mod message;
pub mod stream;
pub mod tool;
pub mod trace;
