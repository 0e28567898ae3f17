//! Credential backend: aggregation, proof composition, the credential ledger and its HTTP API.

pub mod aggregator;
pub mod api;
pub mod artifacts;
pub mod composer;
pub mod config;
pub mod db;
pub mod errors;
pub mod keys;
pub mod ledger;
pub mod models;
pub mod state;
pub mod verifier;
