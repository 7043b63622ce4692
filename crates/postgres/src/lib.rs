//! # Postgres
//!
//! This crate provides the connection pool and schema bootstrap for the fare alert
//! service's PostgreSQL database.

/// Connection pool, connectivity check and schema bootstrap.
pub mod database;
