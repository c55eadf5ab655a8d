//! Shoal Transport Layer - event stream and HTTP fetch
//!
//! This crate provides:
//! - Server-sent event stream ingestion on a background task
//! - The spawn queue between that task and the main tick
//! - Spawn payload parsing
//! - HTTP GET with bounded retry/backoff
//! - Code-image endpoint URL templating

pub mod event;
pub mod http;
pub mod sse;

pub use event::*;
pub use http::*;
pub use sse::*;
