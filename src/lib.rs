pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod local_store;
pub mod poller;
pub mod store;
pub mod upstream;
