// Eigo Session - library root

pub mod client;
pub mod config;
pub mod error;
pub mod session;
