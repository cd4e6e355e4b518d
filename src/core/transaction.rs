//! Transactions and the `Pending` move-only handle.
//!
//! A `Pending` wraps an uncommitted operation. Dropping it without an
//! explicit `commit()` rolls the operation back; rollback on the drop path
//! logs failures instead of panicking.

use tracing::warn;

use crate::error::Result;

/// An operation staged but not yet made durable.
pub trait Transaction {
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

/// Handle to an uncommitted [`Transaction`]. Move-only: commit and rollback
/// consume the handle, and dropping an armed handle rolls back.
pub struct Pending {
    trans: Option<Box<dyn Transaction + Send>>,
}

impl Pending {
    /// An empty handle with nothing to commit.
    pub fn none() -> Self {
        Self { trans: None }
    }

    pub fn new(trans: Box<dyn Transaction + Send>) -> Self {
        Self { trans: Some(trans) }
    }

    /// True if there is an operation to commit.
    pub fn is_pending(&self) -> bool {
        self.trans.is_some()
    }

    /// Make the staged operation durable.
    pub fn commit(mut self) -> Result<()> {
        match self.trans.take() {
            Some(mut t) => t.commit(),
            None => Ok(()),
        }
    }

    /// Undo the staged operation.
    pub fn rollback(mut self) -> Result<()> {
        match self.trans.take() {
            Some(mut t) => t.rollback(),
            None => Ok(()),
        }
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if let Some(mut t) = self.trans.take() {
            if let Err(e) = t.rollback() {
                warn!("rollback failed while dropping pending transaction: {e}");
            }
        }
    }
}

/// Run several transactions as one: commit in declaration order, roll back
/// in reverse order. Used to tie a segment append to its index insert.
pub struct TransactionChain {
    parts: Vec<Box<dyn Transaction + Send>>,
}

impl TransactionChain {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    pub fn push(&mut self, t: Box<dyn Transaction + Send>) {
        self.parts.push(t);
    }

    pub fn into_pending(self) -> Pending {
        Pending::new(Box::new(self))
    }
}

impl Default for TransactionChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction for TransactionChain {
    fn commit(&mut self) -> Result<()> {
        for (n, part) in self.parts.iter_mut().enumerate() {
            if let Err(e) = part.commit() {
                // Later parts never ran: roll them back, newest first.
                for prev in self.parts[..n].iter_mut().rev() {
                    if let Err(re) = prev.rollback() {
                        warn!("rollback after failed chained commit also failed: {re}");
                    }
                }
                return Err(e);
            }
        }
        self.parts.clear();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut first_err = None;
        for part in self.parts.iter_mut().rev() {
            if let Err(e) = part.rollback() {
                if first_err.is_none() {
                    first_err = Some(e);
                } else {
                    warn!("additional rollback failure in chain: {e}");
                }
            }
        }
        self.parts.clear();
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Probe {
        committed: Arc<AtomicU32>,
        rolled_back: Arc<AtomicU32>,
    }

    impl Transaction for Probe {
        fn commit(&mut self) -> Result<()> {
            self.committed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn rollback(&mut self) -> Result<()> {
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn probe() -> (Arc<AtomicU32>, Arc<AtomicU32>, Box<Probe>) {
        let c = Arc::new(AtomicU32::new(0));
        let r = Arc::new(AtomicU32::new(0));
        let p = Box::new(Probe {
            committed: c.clone(),
            rolled_back: r.clone(),
        });
        (c, r, p)
    }

    #[test]
    fn test_commit_runs_once() {
        let (c, r, p) = probe();
        let pending = Pending::new(p);
        assert!(pending.is_pending());
        pending.commit().unwrap();
        assert_eq!(c.load(Ordering::SeqCst), 1);
        assert_eq!(r.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_rolls_back() {
        let (c, r, p) = probe();
        {
            let _pending = Pending::new(p);
        }
        assert_eq!(c.load(Ordering::SeqCst), 0);
        assert_eq!(r.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_rollback_prevents_double_rollback_on_drop() {
        let (_, r, p) = probe();
        let pending = Pending::new(p);
        pending.rollback().unwrap();
        assert_eq!(r.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_none_pending_is_inert() {
        let pending = Pending::none();
        assert!(!pending.is_pending());
        pending.commit().unwrap();
    }

    struct FailingCommit {
        rolled_back: Arc<AtomicU32>,
    }

    impl Transaction for FailingCommit {
        fn commit(&mut self) -> Result<()> {
            Err(crate::error::ArkiError::Consistency("nope".into()))
        }
        fn rollback(&mut self) -> Result<()> {
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_chain_commit_failure_rolls_back_earlier_parts() {
        let (c1, r1, p1) = probe();
        let fail_rb = Arc::new(AtomicU32::new(0));

        let mut chain = TransactionChain::new();
        chain.push(p1);
        chain.push(Box::new(FailingCommit {
            rolled_back: fail_rb.clone(),
        }));

        let err = chain.into_pending().commit().unwrap_err();
        assert!(matches!(err, crate::error::ArkiError::Consistency(_)));
        // First part committed, then was rolled back after the second failed.
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(r1.load(Ordering::SeqCst), 1);
        // The failing part itself is not rolled back by the chain.
        assert_eq!(fail_rb.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_chain_rollback_is_lifo() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        struct Ordered {
            tag: u32,
            order: Arc<std::sync::Mutex<Vec<u32>>>,
        }
        impl Transaction for Ordered {
            fn commit(&mut self) -> Result<()> {
                Ok(())
            }
            fn rollback(&mut self) -> Result<()> {
                self.order.lock().unwrap().push(self.tag);
                Ok(())
            }
        }

        let mut chain = TransactionChain::new();
        for tag in [1, 2, 3] {
            chain.push(Box::new(Ordered {
                tag,
                order: order.clone(),
            }));
        }
        chain.into_pending().rollback().unwrap();
        assert_eq!(*order.lock().unwrap(), vec![3, 2, 1]);
    }
}
