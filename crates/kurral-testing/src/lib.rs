//! Test support for the Kurral workspace.

mod fixtures;
mod mock_mcp;

pub use fixtures::{seed_store, ArtifactFixture};
pub use mock_mcp::MockMcpServer;
