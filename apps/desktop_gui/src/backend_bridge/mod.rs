//! Backend worker: owns the tokio runtime and the shop client.

pub mod commands;
pub mod runtime;
