pub mod chat;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod k8s;
pub mod store;
pub mod watch;
