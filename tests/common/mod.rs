//! Common test infrastructure
//!
//! Provides the infrastructure for end-to-end tests: a server spawned on a
//! random port with temp databases and mock platform clients, plus an HTTP
//! client with one method per endpoint. Tests should only import from this
//! module, not from internal submodules.

mod client;
mod constants;
mod mock;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use server::TestServer;
