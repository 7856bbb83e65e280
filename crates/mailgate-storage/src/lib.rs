//! Mailgate Storage - Database and shared key-value abstraction
//!
//! This crate provides the PostgreSQL system of record and the shared
//! Redis (or in-process fallback) store used for counters and token caches.

pub mod db;
pub mod kv;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use kv::KvStore;
pub use models::*;
pub use repository::*;
