//! Recursive mutex
//!
//! Mutual exclusion between tasks, built on the scheduler's suspend and
//! wakeup. The owning task may acquire it again; only the matching last
//! release frees it. On release the mutex is handed directly to the first
//! waiter, so no third task can steal the lock between the release and the
//! waiter actually running.
//!
//! Mutexes serialize tasks only. Code shared with interrupt handlers uses
//! the scheduler's critical-section counter or masks interrupts instead.

use crate::sched::{Scheduler, TaskId};

const NO_OWNER: u8 = 0xff;

/// Most tasks that can wait on one mutex at a time.
pub const MAX_WAITERS: usize = 8;

pub struct Mutex {
    owner: u8,
    nesting: u32,
    waiters: [u8; MAX_WAITERS],
    head: usize,
    len: usize,
}

impl Mutex {
    /// Creates a free mutex.
    pub const fn new() -> Mutex {
        Mutex {
            owner: NO_OWNER,
            nesting: 0,
            waiters: [NO_OWNER; MAX_WAITERS],
            head: 0,
            len: 0,
        }
    }

    /// Whether some task currently owns the mutex.
    pub fn is_locked(&self) -> bool {
        self.owner != NO_OWNER
    }

    /// The owning task, if any.
    pub fn owner(&self) -> Option<TaskId> {
        if self.owner == NO_OWNER {
            None
        } else {
            Some(self.owner)
        }
    }

    /// Attempts to acquire without blocking.
    ///
    /// Succeeds iff the mutex is free or already owned by the current task.
    pub fn try_acquire<const N: usize>(&mut self, sched: &Scheduler<N>) -> bool {
        let me = sched.current();
        if self.owner != NO_OWNER && self.owner != me {
            return false;
        }
        self.owner = me;
        self.nesting += 1;
        true
    }

    /// Acquires the mutex, suspending until it is handed over.
    pub fn acquire<const N: usize>(&mut self, sched: &mut Scheduler<N>) {
        let me = sched.current();
        if self.owner != NO_OWNER && self.owner != me {
            self.enqueue(me);
            sched.suspend();
            // Resumed: release() made this task the owner before waking it
        }
        self.owner = me;
        self.nesting += 1;
    }

    /// Releases one level of ownership.
    ///
    /// Returns `true` when the mutex was fully released: handed to the
    /// first waiter, or freed when none waits. Releasing a free mutex has
    /// no effect.
    pub fn release<const N: usize>(&mut self, sched: &mut Scheduler<N>) -> bool {
        if self.owner == NO_OWNER {
            return false;
        }
        debug_assert!(self.owner == sched.current());
        if self.nesting > 1 {
            // Was recursively acquired
            self.nesting -= 1;
            return false;
        }
        self.nesting = 0;
        match self.dequeue() {
            Some(next) => {
                // Hand the lock over before the waiter runs; nobody can
                // slip in between
                self.owner = next;
                sched.wakeup(next);
            }
            None => {
                self.owner = NO_OWNER;
            }
        }
        true
    }

    fn enqueue(&mut self, id: u8) {
        debug_assert!(self.len < MAX_WAITERS);
        if self.len < MAX_WAITERS {
            self.waiters[(self.head + self.len) % MAX_WAITERS] = id;
            self.len += 1;
        }
    }

    fn dequeue(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let id = self.waiters[self.head];
        self.head = (self.head + 1) % MAX_WAITERS;
        self.len -= 1;
        Some(id)
    }
}

impl Default for Mutex {
    fn default() -> Mutex {
        Mutex::new()
    }
}
