// Framework layer: process bootstrap, configuration, and the binary's entry point.

pub mod config;
pub mod server;
