//! Per-loan critical sections and request deadlines
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::LoanError;

/// Caller-supplied point in time after which a request must not write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }
    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }
    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }
    /// Time left, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }
    pub fn check(&self) -> Result<(), LoanError> {
        if self.is_expired() {
            return Err(LoanError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Set of loan ids currently inside a mutating operation.
///
/// Waiting only happens on the same id; different loans never block each other.
#[derive(Debug, Default)]
pub struct LoanLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Holds a loan's critical section until dropped.
#[derive(Debug)]
pub struct LoanGuard<'a> {
    locks: &'a LoanLocks,
    id: String,
}

impl LoanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, id: &str, deadline: Deadline) -> Result<LoanGuard<'_>, LoanError> {
        // the set is only ever inserted into or removed from, a poisoned guard is still consistent
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        while held.contains(id) {
            debug!(loan_id = id, "waiting for loan critical section");
            held = match deadline.remaining() {
                None => self
                    .released
                    .wait(held)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(left) if left.is_zero() => return Err(LoanError::DeadlineExceeded),
                Some(left) => {
                    self.released
                        .wait_timeout(held, left)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }

        held.insert(id.to_string());
        Ok(LoanGuard {
            locks: self,
            id: id.to_string(),
        })
    }

    pub fn is_held(&self, id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

impl Drop for LoanGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.id);
        drop(held);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn guard_releases_on_drop() {
        let locks = LoanLocks::new();
        {
            let _guard = locks.acquire("loan_a", Deadline::none()).unwrap();
            assert!(locks.is_held("loan_a"));
        }
        assert!(!locks.is_held("loan_a"));
    }

    #[test]
    fn different_loans_do_not_block() {
        let locks = LoanLocks::new();
        let _a = locks.acquire("loan_a", Deadline::none()).unwrap();

        let b = locks.acquire("loan_b", Deadline::after(Duration::from_millis(50)));
        assert!(b.is_ok());
    }

    #[test]
    fn same_loan_times_out_at_deadline() {
        let locks = LoanLocks::new();
        let _a = locks.acquire("loan_a", Deadline::none()).unwrap();

        let started = Instant::now();
        let err = locks
            .acquire("loan_a", Deadline::after(Duration::from_millis(30)))
            .unwrap_err();

        assert!(matches!(err, LoanError::DeadlineExceeded));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn same_loan_is_mutually_exclusive() {
        let locks = Arc::new(LoanLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let overlaps = Arc::clone(&overlaps);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _guard = locks.acquire("loan_a", Deadline::none()).unwrap();
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(!locks.is_held("loan_a"));
    }

    #[test]
    fn expired_deadline_is_reported() {
        let deadline = Deadline::at(Instant::now() - Duration::from_millis(1));
        assert!(deadline.is_expired());
        assert!(matches!(deadline.check(), Err(LoanError::DeadlineExceeded)));
        assert!(Deadline::none().check().is_ok());
    }
}
