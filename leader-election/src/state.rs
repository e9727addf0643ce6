use std::sync::{Arc, PoisonError, RwLock};

/// Process-local leadership state. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionState {
    Standby,
    Leading,
    /// Terminal: no transition out of it is permitted.
    ShuttingDown,
}

/// Mutable election state, owned by the coordinator.
#[derive(Debug, Clone)]
pub(crate) struct SharedElectionState {
    inner: Arc<RwLock<ElectionState>>,
}

impl SharedElectionState {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ElectionState::Standby)),
        }
    }

    /// `Standby -> Leading`. Returns false (and changes nothing) from any other state.
    pub(crate) fn begin_leading(&self) -> bool {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if *state != ElectionState::Standby {
            return false;
        }
        *state = ElectionState::Leading;
        true
    }

    /// Enter the terminal state. Returns the state it replaced.
    pub(crate) fn mark_shutting_down(&self) -> ElectionState {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *state, ElectionState::ShuttingDown)
    }

    pub(crate) fn current(&self) -> ElectionState {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn handle(&self) -> ElectionHandle {
        ElectionHandle {
            state: self.clone(),
        }
    }
}

/// Read-only view of the coordinator's election state.
#[derive(Debug, Clone)]
pub struct ElectionHandle {
    state: SharedElectionState,
}

impl ElectionHandle {
    pub fn state(&self) -> ElectionState {
        self.state.current()
    }

    pub fn is_leading(&self) -> bool {
        self.state() == ElectionState::Leading
    }
}
