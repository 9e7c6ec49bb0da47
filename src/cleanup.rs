//! Delayed, cancellable deletion of sent messages.
//!
//! One worker thread sleeps until the earliest deadline. Tasks can be
//! cancelled (messages stay) or expedited (deleted on the next wake-up).
use crate::identity::Identity;
use crate::sync::lock_with_recovery;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub trait MessageDeleter: Send + 'static {
    fn delete(&self, chat: &Identity, message_id: i64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

#[derive(Debug)]
struct Pending {
    due: Instant,
    chat: Identity,
    message_ids: Vec<i64>,
}

#[derive(Debug, Default)]
struct SchedulerState {
    next_id: u64,
    pending: BTreeMap<TaskId, Pending>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<SchedulerState>,
    cv: Condvar,
}

pub struct DeletionScheduler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl DeletionScheduler {
    pub fn spawn<D: MessageDeleter>(deleter: D) -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("message-cleanup".to_string())
            .spawn(move || run_worker(&worker_shared, &deleter))
            .map_err(|err| anyhow!("spawn cleanup worker: {err}"))?;
        Ok(DeletionScheduler {
            shared,
            worker: Some(worker),
        })
    }

    pub fn schedule(&self, chat: &Identity, message_ids: Vec<i64>, delay: Duration) -> TaskId {
        let mut state = lock_with_recovery(&self.shared.state, "cleanup");
        let id = TaskId(state.next_id);
        state.next_id += 1;
        state.pending.insert(
            id,
            Pending {
                due: Instant::now() + delay,
                chat: chat.clone(),
                message_ids,
            },
        );
        self.shared.cv.notify_all();
        id
    }

    /// Drop a pending deletion. Returns false if it already ran.
    #[allow(dead_code)]
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut state = lock_with_recovery(&self.shared.state, "cleanup");
        state.pending.remove(&id).is_some()
    }

    /// Make a pending deletion due now.
    pub fn expedite(&self, id: TaskId) -> bool {
        let mut state = lock_with_recovery(&self.shared.state, "cleanup");
        let Some(task) = state.pending.get_mut(&id) else {
            return false;
        };
        task.due = Instant::now();
        self.shared.cv.notify_all();
        true
    }

    pub fn pending(&self) -> usize {
        lock_with_recovery(&self.shared.state, "cleanup").pending.len()
    }
}

impl Drop for DeletionScheduler {
    fn drop(&mut self) {
        {
            let mut state = lock_with_recovery(&self.shared.state, "cleanup");
            state.shutdown = true;
            self.shared.cv.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("cleanup worker panicked");
            }
        }
    }
}

fn run_worker<D: MessageDeleter>(shared: &Shared, deleter: &D) {
    let mut state = lock_with_recovery(&shared.state, "cleanup");
    loop {
        if state.shutdown {
            if !state.pending.is_empty() {
                tracing::debug!(
                    pending = state.pending.len(),
                    "cleanup stopping with pending deletions"
                );
            }
            return;
        }

        let now = Instant::now();
        let due_ids: Vec<TaskId> = state
            .pending
            .iter()
            .filter(|(_, task)| task.due <= now)
            .map(|(id, _)| *id)
            .collect();
        if !due_ids.is_empty() {
            let due: Vec<Pending> = due_ids
                .iter()
                .filter_map(|id| state.pending.remove(id))
                .collect();
            drop(state);
            for task in due {
                for message_id in task.message_ids {
                    if let Err(err) = deleter.delete(&task.chat, message_id) {
                        tracing::warn!(error = %err, message_id, "message deletion failed");
                    }
                }
            }
            state = lock_with_recovery(&shared.state, "cleanup");
            continue;
        }

        let next_due = state.pending.values().map(|task| task.due).min();
        state = match next_due {
            Some(due) => match shared
                .cv
                .wait_timeout(state, due.saturating_duration_since(now))
            {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            },
            None => match shared.cv.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{self, Sender};

    struct ChannelDeleter {
        tx: Mutex<Sender<(String, i64)>>,
    }

    impl MessageDeleter for ChannelDeleter {
        fn delete(&self, chat: &Identity, message_id: i64) -> Result<()> {
            self.tx
                .lock()
                .expect("deleter lock")
                .send((chat.to_string(), message_id))
                .map_err(|_| anyhow!("test receiver gone"))
        }
    }

    fn scheduler() -> (DeletionScheduler, mpsc::Receiver<(String, i64)>) {
        let (tx, rx) = mpsc::channel();
        let scheduler = DeletionScheduler::spawn(ChannelDeleter { tx: Mutex::new(tx) })
            .expect("spawn scheduler");
        (scheduler, rx)
    }

    #[test]
    fn due_messages_are_deleted() {
        let (scheduler, rx) = scheduler();
        let chat = Identity::new("7");
        scheduler.schedule(&chat, vec![10, 11], Duration::from_millis(20));
        let first = rx.recv_timeout(Duration::from_secs(5)).expect("first delete");
        let second = rx.recv_timeout(Duration::from_secs(5)).expect("second delete");
        assert_eq!(first, ("7".to_string(), 10));
        assert_eq!(second, ("7".to_string(), 11));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancelled_task_never_fires() {
        let (scheduler, rx) = scheduler();
        let chat = Identity::new("7");
        let cancelled = scheduler.schedule(&chat, vec![1], Duration::from_millis(30));
        scheduler.schedule(&chat, vec![2], Duration::from_millis(60));
        assert!(scheduler.cancel(cancelled));
        let fired = rx.recv_timeout(Duration::from_secs(5)).expect("second task");
        assert_eq!(fired.1, 2);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(!scheduler.cancel(cancelled));
    }

    #[test]
    fn expedited_task_fires_before_its_deadline() {
        let (scheduler, rx) = scheduler();
        let chat = Identity::new("7");
        let id = scheduler.schedule(&chat, vec![5], Duration::from_secs(3600));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert!(scheduler.expedite(id));
        let fired = rx.recv_timeout(Duration::from_secs(5)).expect("expedited delete");
        assert_eq!(fired.1, 5);
        assert!(!scheduler.expedite(id));
    }

    #[test]
    fn drop_stops_worker_with_pending_tasks() {
        let (scheduler, _rx) = scheduler();
        scheduler.schedule(&Identity::new("7"), vec![1], Duration::from_secs(3600));
        drop(scheduler);
    }
}
