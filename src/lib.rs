//! Read-through cache guard for product records.
//!
//! Lookups are answered from a key/value cache in front of a slower record
//! store. The [`cache`] module holds the guard itself; [`infra`] provides the
//! Redis and Postgres adapters the binary wires together.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
