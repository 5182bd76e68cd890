//! Storage adapters: durable (PostgreSQL) and hot-state (in-memory).
//!
//! This module provides concrete implementations of the store ports
//! defined in [`crate::ports`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Store Adapters                            │
//! │                                                                 │
//! │   ┌──────────────────────────────────────────────────────────┐  │
//! │   │                  PostgresStore                            │  │
//! │   │   ┌──────────────┐  ┌──────────────┐  ┌──────────────┐   │  │
//! │   │   │   Porters    │  │  Job Offers  │  │  Earnings    │   │  │
//! │   │   └──────────────┘  └──────────────┘  └──────────────┘   │  │
//! │   │   ┌──────────────┐  ┌──────────────┐                     │  │
//! │   │   │ Idempotency  │  │  Location    │                     │  │
//! │   │   │   Records    │  │  Snapshots   │                     │  │
//! │   │   └──────────────┘  └──────────────┘                     │  │
//! │   └──────────────────────────────────────────────────────────┘  │
//! │                               │                                  │
//! │                               ▼                                  │
//! │   ┌──────────────────────────────────────────────────────────┐  │
//! │   │              SQLx Connection Pool (PostgreSQL)            │  │
//! │   └──────────────────────────────────────────────────────────┘  │
//! │                                                                 │
//! │   ┌──────────────────────────────────────────────────────────┐  │
//! │   │                  MemoryHotStore                            │  │
//! │   │   ┌──────────────┐  ┌──────────────┐  ┌──────────────┐   │  │
//! │   │   │ Availability │  │  Locations   │  │ Rate limits  │   │  │
//! │   │   │    (moka)    │  │    (moka)    │  │  (dashmap)   │   │  │
//! │   │   └──────────────┘  └──────────────┘  └──────────────┘   │  │
//! │   └──────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use porter_dispatch_core::store::{MemoryHotStore, PostgresStore};
//! use sqlx::postgres::PgPoolOptions;
//!
//! let pool = PgPoolOptions::new()
//!     .max_connections(10)
//!     .connect("postgres://localhost/porter_dispatch")
//!     .await?;
//!
//! let store = PostgresStore::new(pool);
//! store.run_migrations().await?;
//!
//! let hot_store = MemoryHotStore::default();
//! ```
//!
//! # Migrations
//!
//! Migrations are located in `migrations/` and run via `sqlx migrate run`.
//! See individual migration files for schema details.

mod cache;
mod postgres;

pub use cache::MemoryHotStore;
pub use postgres::PostgresStore;

// Re-export commonly used types for convenience
pub use sqlx::postgres::PgPool;
