use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::telegram::BotApi;

/// Pause after a failed `getUpdates` before asking again.
const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Long-poll the Bot API and hand every update to the dispatcher.
///
/// Updates queued while the bot was offline are dropped at start. The loop
/// ends when `shutdown` flips to `true`; an in-flight poll is abandoned.
pub async fn run(
    api: Arc<BotApi>,
    dispatcher: Dispatcher,
    poll_timeout_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = api.drop_pending_updates().await {
        warn!("Could not drop pending updates: {}", e);
    }

    let mut offset = 0i64;
    info!("Polling for updates");

    loop {
        let batch = tokio::select! {
            batch = api.get_updates(offset, poll_timeout_secs) => batch,
            _ = shutdown.changed() => break,
        };

        match batch {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    dispatcher.dispatch(update).await;
                }
            }
            Err(e) => {
                warn!("getUpdates failed: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }

        if *shutdown.borrow() {
            break;
        }
    }

    info!("Polling stopped");
}
