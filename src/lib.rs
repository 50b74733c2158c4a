pub mod backend;
pub mod codec;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod reply;
pub mod resp;
pub mod server;
pub mod stats;
pub mod translator;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
