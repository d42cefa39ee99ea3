pub mod config;
pub mod error;
pub mod gate;
pub mod host;
pub mod identity;
pub mod path;
pub mod respond;
pub mod server;
