//! vigil: PID 1 supervisor with health-gated readiness for a web service

pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod privilege;
pub mod probe;
pub mod server;
pub mod supervisor;
