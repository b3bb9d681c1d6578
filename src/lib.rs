pub mod api;
pub mod community;
pub mod config;
pub mod error;
pub mod notify;
pub mod router;
pub mod server;
pub mod session;
pub mod store;

#[cfg(test)]
mod testutil;
