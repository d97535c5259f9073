//! Keenetic RCI (router configuration interface) access
//!
//! Everything above this layer talks to the router through the `Rci` trait,
//! which only exposes authenticated JSON reads and writes. Session handling
//! and re-authentication stay inside the implementation.

pub mod auth;
pub mod client;

#[cfg(test)]
pub mod fake;

pub use client::RciClient;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Authenticated JSON transport to the router
#[async_trait]
pub trait Rci: Send + Sync {
    /// Authenticated GET, e.g. `/rci/show/version`
    async fn get(&self, path: &str) -> Result<Value>;

    /// Authenticated POST with a JSON body
    async fn post(&self, path: &str, body: &Value) -> Result<Value>;
}
