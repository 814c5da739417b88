pub mod callbacks;
pub mod config;
pub mod error;
pub mod events;
pub mod types;
