use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, trace};
use uuid::Uuid;

use overheard_types::models::UserId;

use crate::handler::HandleUpdate;
use crate::telegram::types::Update;

/// Workers with nothing to do for this long are retired.
pub const DEFAULT_IDLE: Duration = Duration::from_secs(300);

type WorkerSender = mpsc::UnboundedSender<Update>;

/// Routes updates to one worker per user.
///
/// A user's updates are handled strictly in arrival order; different users
/// are handled concurrently. Workers are spawned on demand and retire after
/// a quiet period.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// user_id -> (worker_id, sender)
    workers: RwLock<HashMap<UserId, (Uuid, WorkerSender)>>,
    handler: Arc<dyn HandleUpdate>,
    idle: Duration,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn HandleUpdate>, idle: Duration) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                workers: RwLock::new(HashMap::new()),
                handler,
                idle,
            }),
        }
    }

    /// Queue an update behind its sender's earlier updates.
    pub async fn dispatch(&self, update: Update) {
        let Some(user_id) = update.sender_id() else {
            trace!("Update {} has no private sender, skipped", update.update_id);
            return;
        };

        // Sending under the read lock keeps a retiring worker from missing it.
        let update = {
            let workers = self.inner.workers.read().await;
            match workers.get(&user_id) {
                Some((_, tx)) => match tx.send(update) {
                    Ok(()) => return,
                    Err(mpsc::error::SendError(update)) => update,
                },
                None => update,
            }
        };

        let mut workers = self.inner.workers.write().await;
        if let Some((_, tx)) = workers.get(&user_id) {
            if let Err(mpsc::error::SendError(update)) = tx.send(update) {
                // Receiver gone without unregistering; replace it.
                let tx = self.spawn_worker(&mut workers, user_id);
                let _ = tx.send(update);
            }
            return;
        }
        let tx = self.spawn_worker(&mut workers, user_id);
        let _ = tx.send(update);
    }

    fn spawn_worker(
        &self,
        workers: &mut HashMap<UserId, (Uuid, WorkerSender)>,
        user_id: UserId,
    ) -> WorkerSender {
        let worker_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        workers.insert(user_id, (worker_id, tx.clone()));
        trace!("Worker {} started", worker_id);
        tokio::spawn(run_worker(self.inner.clone(), user_id, worker_id, rx));
        tx
    }

    pub async fn active_workers(&self) -> usize {
        self.inner.workers.read().await.len()
    }
}

async fn run_worker(
    inner: Arc<DispatcherInner>,
    user_id: UserId,
    worker_id: Uuid,
    mut rx: mpsc::UnboundedReceiver<Update>,
) {
    loop {
        match tokio::time::timeout(inner.idle, rx.recv()).await {
            Ok(Some(update)) => inner.handler.handle(update).await,
            Ok(None) => break,
            Err(_) => {
                // Retire only if nothing slipped in; senders need the read
                // lock, so holding the write lock closes the window.
                let mut workers = inner.workers.write().await;
                match rx.try_recv() {
                    Ok(update) => {
                        drop(workers);
                        inner.handler.handle(update).await;
                    }
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                        if workers.get(&user_id).is_some_and(|(id, _)| *id == worker_id) {
                            workers.remove(&user_id);
                        }
                        break;
                    }
                }
            }
        }
    }
    debug!("Worker {} retired", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::telegram::types::{CallbackQuery, User};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(UserId, i64)>>,
    }

    #[async_trait]
    impl HandleUpdate for Recorder {
        async fn handle(&self, update: Update) {
            let user = update.sender_id().unwrap();
            // Earlier updates take longer, so reordering would show.
            let delay = 20u64.saturating_sub(update.update_id as u64 * 5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.seen.lock().unwrap().push((user, update.update_id));
        }
    }

    fn press(update_id: i64, user: UserId) -> Update {
        Update {
            update_id,
            message: None,
            callback_query: Some(CallbackQuery {
                id: format!("cb{}", update_id),
                from: User {
                    id: user,
                    is_bot: false,
                    username: None,
                },
                message: None,
                data: Some("menu_back".into()),
            }),
        }
    }

    #[tokio::test]
    async fn keeps_per_user_order() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new(recorder.clone(), DEFAULT_IDLE);

        for id in 0..4 {
            dispatcher.dispatch(press(id, 1)).await;
            dispatcher.dispatch(press(id, 2)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let seen = recorder.seen.lock().unwrap().clone();
        for user in [1, 2] {
            let order: Vec<i64> = seen.iter().filter(|(u, _)| *u == user).map(|(_, id)| *id).collect();
            assert_eq!(order, vec![0, 1, 2, 3]);
        }
        assert_eq!(dispatcher.active_workers().await, 2);
    }

    #[tokio::test]
    async fn idle_workers_retire_and_respawn() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new(recorder.clone(), Duration::from_millis(30));

        dispatcher.dispatch(press(9, 1)).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(dispatcher.active_workers().await, 0);

        dispatcher.dispatch(press(10, 1)).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(recorder.seen.lock().unwrap().len(), 2);
    }
}
