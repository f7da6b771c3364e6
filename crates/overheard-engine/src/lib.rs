//! Submission and moderation workflow for the anonymous relay.
//!
//! Inbound interactions enter through [`Engine`]; each is gated on consent,
//! interpreted against the user's [`Session`], authorised where privileged,
//! and applied to the channel registry or the submission queue. The engine
//! talks to the messaging platform only through the [`Platform`] trait.

pub mod authz;
pub mod consent;
pub mod engine;
pub mod error;
pub mod notify;
pub mod platform;
pub mod queue;
pub mod registry;
pub mod session;
pub mod ui;

use std::sync::Arc;

use overheard_db::Database;

pub use engine::Engine;
pub use error::{PlatformError, WorkflowError};
pub use platform::{MessageRef, OutgoingMessage, Platform};
pub use session::{Mode, Session};
pub use ui::Reply;

/// Run a blocking database call off the async runtime.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, WorkflowError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    let value = tokio::task::spawn_blocking(move || f(&db)).await??;
    Ok(value)
}
