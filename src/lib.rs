pub mod admission;
pub mod api;
pub mod broker;
pub mod closer;
pub mod config;
pub mod context;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod model;
pub mod nats_engine;
pub mod persistence;
pub mod safety;
pub mod verifier;
