pub mod board;
pub mod cli;
pub mod coordinator;
pub mod drag;
pub mod logging;
pub mod notification;
pub mod reorder;
pub mod schedule;
pub mod service;
pub mod settings;
pub mod types;
