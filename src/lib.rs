pub mod cli;
pub mod config;
pub mod narration;
pub mod persistence;
pub mod season;
pub mod server;
pub mod simulation;
