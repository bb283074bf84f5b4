//! Embedded backend: a SQLite-backed `notifications` table behind an actor, with
//! in-process change fan-out standing in for the hosted realtime service.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database
//! - `actor.rs`: the DbActor and its handle (store + realtime)
//! - `local.rs`: fixed-identity auth for local mode

pub mod actor;
pub mod local;
pub mod models;
pub mod schema;

pub use actor::{DbActorHandle, spawn};
pub use local::LocalAuth;
pub use models::DbNotification;
pub use schema::SQLITE_INIT;
