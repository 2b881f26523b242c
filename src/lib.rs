pub mod broadcast;
pub mod config;
pub mod events;
pub mod fetcher;
pub mod projector;
pub mod query;
pub mod repository;
pub mod rpc;
pub mod scanner;
pub mod server;
