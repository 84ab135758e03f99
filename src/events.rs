use std::sync::{Arc, RwLock};

use crate::core_types::ActiveSet;
use crate::optimizer::solver::JumpStyle;
use crate::solution::Candidate;

/// Notifications delivered to registered listeners, carrying the affected
/// candidate and an explanatory label.
#[derive(Clone)]
pub enum PlanEvent {
    BestUpdated {
        solver: usize,
        label: String,
        candidate: Candidate,
    },
    JumpOccurred {
        solver: usize,
        style: JumpStyle,
        label: String,
        candidate: Candidate,
    },
    ActiveSetChanged {
        active: ActiveSet,
        label: String,
    },
    DeconflictionAttempted {
        solver: usize,
        label: String,
        candidate: Candidate,
    },
}

pub trait PlanListener: Send + Sync {
    fn on_event(&self, event: &PlanEvent);
}

/// Fan-out point for solver notifications.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn PlanListener>>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, listener: Arc<dyn PlanListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    pub fn emit(&self, event: PlanEvent) {
        if let Ok(listeners) = self.listeners.read() {
            for listener in listeners.iter() {
                listener.on_event(&event);
            }
        }
    }
}
