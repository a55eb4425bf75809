//! Single transient status notification with auto-dismiss.
//!
//! Every publish bumps a generation and aborts the previous dismiss timer. A
//! timer clears the notification only if its generation is still current, so
//! an older timer can never wipe a newer status.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::StatusSection;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum Status {
    Idle,
    Pending(String),
    Success(String),
    Error(String),
}

impl Status {
    pub fn pending(message: impl Into<String>) -> Self {
        Status::Pending(message.into())
    }

    pub fn success(message: impl Into<String>) -> Self {
        Status::Success(message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Status::Error(message.into())
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self, Status::Idle)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Status::Idle => None,
            Status::Pending(m) | Status::Success(m) | Status::Error(m) => Some(m.as_str()),
        }
    }
}

struct Shared {
    generation: Mutex<u64>,
    tx: watch::Sender<Status>,
}

pub struct StatusNotifier {
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
    success_dismiss: Duration,
    error_dismiss: Duration,
}

impl StatusNotifier {
    pub fn new(cfg: &StatusSection) -> Self {
        Self::with_delays(cfg.success_dismiss(), cfg.error_dismiss())
    }

    pub fn with_delays(success_dismiss: Duration, error_dismiss: Duration) -> Self {
        let (tx, _rx) = watch::channel(Status::Idle);
        Self {
            shared: Arc::new(Shared {
                generation: Mutex::new(0),
                tx,
            }),
            timer: Mutex::new(None),
            success_dismiss,
            error_dismiss,
        }
    }

    pub fn current(&self) -> Status {
        self.shared.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.shared.tx.subscribe()
    }

    /// Replace the current notification and return it.
    ///
    /// `Success` and `Error` arm a dismiss timer; this needs a Tokio runtime,
    /// without one the notification stays until the next publish.
    pub fn publish(&self, status: Status) -> Status {
        let mut timer = self.timer.lock();
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let generation = {
            let mut current = self.shared.generation.lock();
            *current += 1;
            self.shared.tx.send_replace(status.clone());
            *current
        };
        debug!(generation, ?status, "status published");

        let delay = match &status {
            Status::Success(_) => Some(self.success_dismiss),
            Status::Error(_) => Some(self.error_dismiss),
            Status::Idle | Status::Pending(_) => None,
        };
        if let Some(delay) = delay {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let shared = Arc::clone(&self.shared);
                    *timer = Some(handle.spawn(async move {
                        tokio::time::sleep(delay).await;
                        let current = shared.generation.lock();
                        if *current == generation {
                            shared.tx.send_replace(Status::Idle);
                        }
                    }));
                }
                Err(_) => warn!(generation, "no runtime available; status will not auto-dismiss"),
            }
        }
        status
    }

    pub fn dismiss(&self) -> Status {
        self.publish(Status::Idle)
    }
}
