//! Library crate for port-sweep: profile-driven concurrent TCP connect scanning.
pub mod error;
pub mod persist;
pub mod probe;
pub mod profile;
pub mod resolve;
pub mod scanner;
pub mod server;
pub mod sink;
pub mod types;
