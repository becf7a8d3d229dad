//! Shared harness for the publish-pipeline integration tests.
//!
//! ```ignore
//! let server = TestServer::spawn().await;
//! let client = TestClient::new(&server.base_url);
//! let (status, body) = client.start_job(SAMPLE_AUDIO_BYTES).await;
//! ```

mod client;
mod constants;
mod fakes;
mod server;

pub use client::TestClient;
pub use constants::*;
pub use fakes::FakeChain;
pub use server::TestServer;
