//! Test harness for end-to-end node scenarios.
//!
//! [`TestCoordinator`] doubles the coordinator RPC endpoint on a local
//! wiremock server; [`TestNode`] boots a full node (client, store, gateway,
//! router) against it.

pub mod coordinator;
pub mod node;

pub use coordinator::TestCoordinator;
pub use node::TestNode;

/// Identity every test node boots with.
pub const TEST_CLIENT_ID: &str = "1";

/// Key every test node boots with; also the keystamp/command MAC secret.
pub const TEST_CLIENT_KEY: &str = "abcdefghijklmnopqrst";
