pub mod assets;
pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fingerprint;
pub mod frames;
pub mod layout;
pub mod logging;
pub mod refresh;
pub mod scheduler;
pub mod terminal;
pub mod text;
pub mod tools;
