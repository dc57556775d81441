//! Destructive commands wait here for an explicit confirmation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    PruneStopped,
}

#[derive(Debug)]
struct Pending {
    action: PendingAction,
    requested_by: String,
    deadline: Instant,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed(PendingAction),
    /// The deadline passed; the action was dropped without running.
    Expired,
    Unknown,
}

/// Pending actions keyed by a short token. An action is only handed back if
/// it is confirmed before its deadline.
pub struct Confirmations {
    timeout: Duration,
    pending: Mutex<HashMap<String, Pending>>,
}

impl Confirmations {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Registers `action` and returns the token to confirm it with.
    pub fn request(&self, action: PendingAction, requested_by: &str) -> String {
        let token = Uuid::now_v7().simple().to_string()[24..].to_string();
        let now = Instant::now();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|_, p| p.deadline > now);
        pending.insert(
            token.clone(),
            Pending {
                action,
                requested_by: requested_by.to_string(),
                deadline: now + self.timeout,
            },
        );
        log::info!("{requested_by} requested {action:?}, waiting {:?} for confirmation", self.timeout);
        token
    }

    /// Consumes the pending action for `token`.
    pub fn confirm(&self, token: &str) -> ConfirmOutcome {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match pending.remove(token) {
            Some(p) if Instant::now() <= p.deadline => {
                log::info!("{:?} requested by {} confirmed", p.action, p.requested_by);
                ConfirmOutcome::Confirmed(p.action)
            }
            Some(p) => {
                log::info!(
                    "{:?} requested by {} expired before confirmation",
                    p.action,
                    p.requested_by
                );
                ConfirmOutcome::Expired
            }
            None => ConfirmOutcome::Unknown,
        }
    }
}
