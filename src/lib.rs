//! # kvgate
//!
//! An HTTP gateway in front of a line-oriented key-value store.
//!
//! Each HTTP request becomes one inline command (`SET key value\r\n`) sent on
//! a fresh TCP connection. The store's tagged reply (`+`, `-`, `:`, `$`, `*`)
//! is decoded into a [`resp::Reply`] and mapped onto a JSON response.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod resp;
pub mod server;
pub mod transport;
