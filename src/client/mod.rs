//! High-level client API.
//!
//! [`TransportClient`] drives a transport engine on a tokio task;
//! [`Instance`] and [`App`] map platform resource paths onto it.

#[allow(clippy::module_inception)]
mod client;
mod instance;
#[cfg(test)]
mod testing;

pub use client::*;
pub use instance::*;
