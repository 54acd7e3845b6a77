//! Integration tests for mktdata.
//!
//! These tests drive the facade against a local mock stream server:
//! - Connection and subscription lifecycle
//! - Trade delivery to listeners
//! - Reconnection with full resubscribe

pub mod common;
