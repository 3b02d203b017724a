// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;

// Admission and room state
pub mod auth;
pub mod connection_manager;
pub mod ratelimit;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
pub mod tasks;
