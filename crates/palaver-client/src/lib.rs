//! # palaver-client
//!
//! The client core: session management, the message/channel reconciler, the
//! full-sync flow, and the relay bridge that feeds live events through the
//! same merge path as polling. A presentation layer drives this crate
//! through [`PalaverClient`] and observes it through [`ClientEvent`]s.

pub mod client;
pub mod convert;
pub mod events;
pub mod reconciler;
pub mod relay_bridge;
pub mod roster;
pub mod session;
pub mod settings;
pub mod state;
pub mod sync;

mod error;

pub use client::PalaverClient;
pub use error::ClientError;
pub use events::ClientEvent;
pub use reconciler::{MergeOutcome, Reconciler};
pub use session::Session;
pub use settings::AppSettings;
pub use sync::SyncReport;

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber for a client process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("palaver_client=debug,palaver_net=debug,palaver_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
