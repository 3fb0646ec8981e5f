//! cloud-infra: facade library for Google Cloud Logging and Google Cloud
//! Storage.
//!
//! This crate wraps the two Google Cloud services the infrastructure layer
//! depends on behind small, mockable trait seams:
//!
//! - structured event logging, either locally through `tracing` or shipped
//!   to Cloud Logging (see [`logging`] and [`gcl`]);
//! - bucket and artifact management on Cloud Storage, with an audit event
//!   logged per operation (see [`gcs`]).
//!
//! # Usage
//! Construct the clients from a loaded [`config::Config`] plus an
//! [`auth::TokenProvider`], or depend on the traits in [`contract`] and
//! inject mocks in tests.

pub mod auth;
pub mod cli;
pub mod config;
pub mod contract;
pub mod extensions;
pub mod gcl;
pub mod gcs;
pub mod load_config;
pub mod logging;
pub mod timing;

pub use cli::{run, Cli, Commands};
