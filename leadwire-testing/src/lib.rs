//! Test doubles for the leadwire seams.
//!
//! - [`InMemoryEnsemble`]: coordination service with ephemeral sequential
//!   nodes, one-shot watches and session fault injection
//! - [`ScriptedTransport`]: transport answering from canned replies
//!
//! The cross-crate integration tests live under `tests/`.

pub mod coordination;
pub mod transport;

pub use coordination::{encode_info, InMemoryClient, InMemoryConnector, InMemoryEnsemble};
pub use transport::{session_header, Reply, ScriptedTransport};

/// Installs a WARN-level subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
}
