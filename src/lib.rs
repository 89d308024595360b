pub mod server;
pub mod security;
pub mod identity;
pub mod tickets;
pub mod config;
pub mod error;

