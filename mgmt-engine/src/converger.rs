//! Per-host quiescence tracking (§4.7): every running vertex reports active/idle; once
//! every reporter has been idle for the configured timeout, a registered callback fires
//! with `converged=true`; any further activity flips it back to `false`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mgmt_rgraph::ResourceId;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

type StateCallback = Box<dyn Fn(bool) + Send + Sync>;

pub struct Converger {
    active: Mutex<HashSet<ResourceId>>,
    timeout: Duration,
    notify: Notify,
    callback: Mutex<Option<StateCallback>>,
    converged: Mutex<bool>,
}

impl Converger {
    pub fn new(timeout: Duration) -> Self {
        Converger {
            active: Mutex::new(HashSet::new()),
            timeout,
            notify: Notify::new(),
            callback: Mutex::new(None),
            converged: Mutex::new(false),
        }
    }

    pub fn set_callback<F>(&self, f: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        *self.callback.lock() = Some(Box::new(f));
    }

    pub fn report_active(&self, id: &ResourceId) {
        let mut active = self.active.lock();
        let became_active = active.insert(id.clone());
        drop(active);
        if became_active {
            self.set_converged(false);
        }
        self.notify.notify_one();
    }

    pub fn report_idle(&self, id: &ResourceId) {
        self.active.lock().remove(id);
        self.notify.notify_one();
    }

    fn set_converged(&self, value: bool) {
        let mut converged = self.converged.lock();
        if *converged != value {
            *converged = value;
            drop(converged);
            if let Some(cb) = self.callback.lock().as_ref() {
                cb(value);
            }
        }
    }

    pub fn is_converged(&self) -> bool {
        *self.converged.lock()
    }

    /// Runs until `cancel` fires. Whenever every reporter has been idle for `timeout`,
    /// flips to converged; any `report_active` in the meantime resets the wait.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.notify.notified() => {}
            }
            if !self.active.lock().is_empty() {
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.timeout) => {
                    if self.active.lock().is_empty() {
                        self.set_converged(true);
                    }
                }
                _ = self.notify.notified() => {
                    // Something reported active again before the timeout elapsed; loop
                    // back around and wait for the next quiescence window.
                }
            }
        }
    }
}
