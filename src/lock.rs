//! Per-instance concurrency lock.

use std::fmt;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::descriptors::{ConcurrencyManagement, LockType};

/// The lock attached to a singleton instance.
///
/// Chosen once when the instance is created and never changed for it:
/// container-managed concurrency gets a reentrant read/write lock, bean-managed
/// concurrency a permissive lock that always succeeds immediately.
pub enum InstanceLock {
    ContainerManaged {
        lock: RwLock<()>,
        owner: Mutex<Option<WriteOwner>>,
    },
    BeanManaged,
}

/// The thread holding WRITE and how many nested holds it has taken since.
#[derive(Debug)]
pub struct WriteOwner {
    thread: ThreadId,
    depth: usize,
}

/// Scoped hold on an [`InstanceLock`]; released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub enum LockGuard<'a> {
    Read(RwLockReadGuard<'a, ()>),
    Write {
        _guard: RwLockWriteGuard<'a, ()>,
        owner: &'a Mutex<Option<WriteOwner>>,
    },
    /// A nested hold taken by the thread that already holds WRITE.
    Reentered {
        lock_type: LockType,
        owner: &'a Mutex<Option<WriteOwner>>,
    },
    Unmanaged,
}

impl InstanceLock {
    pub fn for_concurrency(management: ConcurrencyManagement) -> Self {
        match management {
            ConcurrencyManagement::Container => InstanceLock::ContainerManaged {
                lock: RwLock::new(()),
                owner: Mutex::new(None),
            },
            ConcurrencyManagement::Bean => InstanceLock::BeanManaged,
        }
    }

    /// Acquires the lock, waiting at most `timeout`.
    ///
    /// Returns `None` when the wait expires. The WRITE holder re-enters for
    /// either lock type without waiting. Read acquisitions are recursive so a
    /// nested READ call does not queue behind a waiting writer; upgrading
    /// READ to WRITE still waits and can time out. A timeout too large to
    /// represent as a deadline waits indefinitely.
    pub fn try_acquire(&self, lock_type: LockType, timeout: Duration) -> Option<LockGuard<'_>> {
        let (lock, owner) = match self {
            InstanceLock::BeanManaged => return Some(LockGuard::Unmanaged),
            InstanceLock::ContainerManaged { lock, owner } => (lock, owner),
        };

        let current = thread::current().id();
        if let Some(holder) = owner.lock().as_mut() {
            if holder.thread == current {
                holder.depth += 1;
                return Some(LockGuard::Reentered { lock_type, owner });
            }
        }

        match lock_type {
            LockType::Read => lock.try_read_recursive_for(timeout).map(LockGuard::Read),
            LockType::Write => {
                let guard = lock.try_write_for(timeout)?;
                *owner.lock() = Some(WriteOwner {
                    thread: current,
                    depth: 0,
                });
                Some(LockGuard::Write { _guard: guard, owner })
            }
        }
    }

    pub fn is_bean_managed(&self) -> bool {
        matches!(self, InstanceLock::BeanManaged)
    }

    /// True while any caller holds the lock.
    pub fn is_locked(&self) -> bool {
        match self {
            InstanceLock::ContainerManaged { lock, .. } => lock.is_locked(),
            InstanceLock::BeanManaged => false,
        }
    }

    /// Nested holds the current WRITE owner has taken on top of its own.
    pub fn reentry_depth(&self) -> usize {
        match self {
            InstanceLock::ContainerManaged { owner, .. } => owner.lock().as_ref().map_or(0, |holder| holder.depth),
            InstanceLock::BeanManaged => 0,
        }
    }
}

impl fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceLock::ContainerManaged { lock, owner } => f
                .debug_struct("ContainerManaged")
                .field("locked", &lock.is_locked())
                .field("owner", &*owner.lock())
                .finish(),
            InstanceLock::BeanManaged => f.write_str("BeanManaged"),
        }
    }
}

impl LockGuard<'_> {
    pub fn lock_type(&self) -> Option<LockType> {
        match self {
            LockGuard::Read(_) => Some(LockType::Read),
            LockGuard::Write { .. } => Some(LockType::Write),
            LockGuard::Reentered { lock_type, .. } => Some(*lock_type),
            LockGuard::Unmanaged => None,
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        match self {
            // Runs before the write guard field is released.
            LockGuard::Write { owner, .. } => *owner.lock() = None,
            LockGuard::Reentered { owner, .. } => {
                if let Some(holder) = owner.lock().as_mut() {
                    holder.depth = holder.depth.saturating_sub(1);
                }
            }
            LockGuard::Read(_) | LockGuard::Unmanaged => {}
        }
    }
}
