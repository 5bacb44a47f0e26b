use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use parking_lot::{Condvar, Mutex};

/// Shared handle used to observe a long running job from another thread.
#[derive(Clone)]
pub struct Progress(Arc<ProgressInner>);

struct ProgressInner {
    complete: AtomicU64,
    total: AtomicU64,

    notify: Condvar,
    last_complete: Mutex<u64>,
}

impl Progress {
    pub fn new() -> Self {
        Self(Arc::new(ProgressInner {
            complete: AtomicU64::new(0),
            total: AtomicU64::new(0),

            notify: Condvar::new(),
            last_complete: Mutex::new(0),
        }))
    }

    pub fn progress(&self) -> f32 {
        let total = self.0.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }

        self.0.complete.load(Ordering::Relaxed) as f32 / total as f32
    }

    pub fn complete(&self) -> bool {
        let total = self.0.total.load(Ordering::Relaxed);
        if total == 0 {
            return false;
        }

        self.0.complete.load(Ordering::Relaxed) >= total
    }

    pub fn completed(&self) -> u64 {
        self.0.complete.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.0.total.load(Ordering::Relaxed)
    }

    pub fn set_total(&self, total: u64) {
        self.0.total.store(total, Ordering::Relaxed);
    }

    /// Grows the total, used when several jobs report into one handle.
    pub fn add_total(&self, total: u64) {
        self.0.total.fetch_add(total, Ordering::Relaxed);
    }

    pub fn add_complete(&self, complete: u64) {
        self.0.complete.fetch_add(complete, Ordering::Relaxed);
        self.notify();
    }

    pub fn set_finished(&self) {
        let total = self.0.total.load(Ordering::Relaxed);
        self.0.complete.store(total, Ordering::Relaxed);
        self.notify();
    }

    // Taking the lock keeps a notify from landing between a waiter's check
    // and its wait.
    fn notify(&self) {
        let _last = self.0.last_complete.lock();
        self.0.notify.notify_all();
    }

    /// Blocks until more work is completed, returning the completed count.
    pub fn wait(&self) -> u64 {
        let mut last = self.0.last_complete.lock();
        let current = self.completed();
        if current == *last && !self.complete() {
            self.0.notify.wait(&mut last);
        }

        let current = self.completed();
        *last = current;
        current
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn reports_fraction() {
        let progress = Progress::new();
        assert_eq!(progress.progress(), 0.0);
        assert!(!progress.complete());

        progress.set_total(4);
        progress.add_complete(1);
        assert_eq!(progress.progress(), 0.25);

        progress.set_finished();
        assert!(progress.complete());
        assert_eq!(progress.completed(), 4);
    }

    #[test]
    fn wait_sees_other_thread() {
        let progress = Progress::new();
        progress.set_total(3);

        let worker = thread::spawn({
            let progress = progress.clone();
            move || (0..3).for_each(|_| progress.add_complete(1))
        });

        let mut seen = 0;
        while seen < progress.total() {
            seen = progress.wait();
        }

        worker.join().unwrap();
        assert!(progress.complete());
    }
}
