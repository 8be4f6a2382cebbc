//! A single exclusive-access slot shared by two neighbouring agents.
//!
//! Each [`Resource`] carries its own mutex and condition variable, so
//! contention on one slot never serialises operations on another. Waiters
//! block on the condvar; release and close wake all of them and every waiter
//! re-checks the grant condition itself.
//!
//! In fair mode requesters join a FIFO queue and the slot is granted only to
//! the queue head. A waiter that gives up (timeout or close) leaves the queue
//! and wakes the others so the new head can proceed.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use ringlock_core::{AgentId, ResourceId, ResourceMisuseError};

/// Result of a single acquisition call on one [`Resource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller is now the holder.
    Acquired,
    /// The wait bound elapsed first.
    TimedOut,
    /// The resource was closed by a hard stop.
    Closed,
}

#[derive(Debug, Default)]
struct SlotState {
    holder: Option<AgentId>,
    /// FIFO of waiting agents. Only populated in fair mode.
    queue: VecDeque<AgentId>,
    closed: bool,
}

impl SlotState {
    fn grantable(&self, agent: AgentId, fair: bool) -> bool {
        self.holder.is_none() && (!fair || self.queue.front() == Some(&agent))
    }

    fn leave_queue(&mut self, agent: AgentId) {
        if let Some(pos) = self.queue.iter().position(|&a| a == agent) {
            self.queue.remove(pos);
        }
    }
}

/// One exclusive-access slot at a fixed ring position.
#[derive(Debug)]
pub struct Resource {
    id: ResourceId,
    fair: bool,
    state: Mutex<SlotState>,
    changed: Condvar,
}

// Compile-time assertion: Resource must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Resource>();
};

impl Resource {
    /// Create a free resource.
    pub fn new(id: ResourceId, fair: bool) -> Self {
        Self {
            id,
            fair,
            state: Mutex::new(SlotState::default()),
            changed: Condvar::new(),
        }
    }

    /// Ring position of this resource.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Whether requesters are served first-come-first-served.
    pub fn is_fair(&self) -> bool {
        self.fair
    }

    /// Current holder, if any.
    pub fn holder(&self) -> Option<AgentId> {
        self.state.lock().holder
    }

    /// Number of agents queued for this resource (always 0 when unfair).
    pub fn waiting(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Block until the resource is granted or closed.
    pub fn acquire(&self, agent: AgentId) -> Result<AcquireOutcome, ResourceMisuseError> {
        self.acquire_until(agent, None)
    }

    /// Wait at most `timeout` for the resource.
    ///
    /// A zero timeout is a non-blocking attempt. A timeout too large to
    /// represent as a deadline waits forever.
    pub fn try_acquire(
        &self,
        agent: AgentId,
        timeout: Duration,
    ) -> Result<AcquireOutcome, ResourceMisuseError> {
        self.acquire_until(agent, Instant::now().checked_add(timeout))
    }

    fn acquire_until(
        &self,
        agent: AgentId,
        deadline: Option<Instant>,
    ) -> Result<AcquireOutcome, ResourceMisuseError> {
        let mut st = self.state.lock();
        if st.holder == Some(agent) {
            return Err(ResourceMisuseError::AlreadyHeld {
                resource: self.id,
                agent,
            });
        }
        if self.fair {
            st.queue.push_back(agent);
        }

        loop {
            if st.closed {
                st.leave_queue(agent);
                return Ok(AcquireOutcome::Closed);
            }
            if st.grantable(agent, self.fair) {
                if self.fair {
                    st.queue.pop_front();
                }
                st.holder = Some(agent);
                return Ok(AcquireOutcome::Acquired);
            }
            match deadline {
                None => self.changed.wait(&mut st),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        st.leave_queue(agent);
                        if self.fair {
                            // The new queue head may be grantable already.
                            self.changed.notify_all();
                        }
                        return Ok(AcquireOutcome::TimedOut);
                    }
                    self.changed.wait_until(&mut st, deadline);
                }
            }
        }
    }

    /// Give the resource back.
    ///
    /// Fails without changing anything if `agent` is not the holder.
    pub fn release(&self, agent: AgentId) -> Result<(), ResourceMisuseError> {
        let mut st = self.state.lock();
        match st.holder {
            Some(holder) if holder == agent => {
                st.holder = None;
                drop(st);
                self.changed.notify_all();
                Ok(())
            }
            Some(holder) => Err(ResourceMisuseError::HeldByOther {
                resource: self.id,
                agent,
                holder,
            }),
            None => Err(ResourceMisuseError::NotHeld {
                resource: self.id,
                agent,
            }),
        }
    }

    /// Refuse all future grants and wake every waiter with `Closed`.
    ///
    /// The current holder keeps the resource until it releases it.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.changed.notify_all();
    }
}
