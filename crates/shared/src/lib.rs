//! Cadence Shared - Process bootstrap and the Postgres store

pub mod bootstrap;
pub mod db;

pub use db::PgStore;
