// Copyright (c) James Kassemi, SC, US. All rights reserved.
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Discrete health level exposed by each collaborator of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Ok,
    Warn,
    Crit,
}

impl Default for OverallStatus {
    fn default() -> Self {
        OverallStatus::Ok
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub overall: OverallStatus,
    pub errors: Vec<String>,
}

/// Immutable snapshot returned to the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatusSnapshot {
    pub name: String,
    pub overall: OverallStatus,
    pub errors: Vec<String>,
}

impl ServiceStatusSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.overall == OverallStatus::Ok
    }
}

/// Shared handle so a component can mutate its own status from any task.
#[derive(Clone)]
pub struct ServiceStatusHandle {
    name: &'static str,
    inner: Arc<RwLock<ServiceStatus>>,
}

impl ServiceStatusHandle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(RwLock::new(ServiceStatus::default())),
        }
    }

    pub fn update<F>(&self, mutator: F)
    where
        F: FnOnce(&mut ServiceStatus),
    {
        let mut guard = self.inner.write();
        mutator(&mut guard);
    }

    pub fn set_overall(&self, status: OverallStatus) {
        self.update(|s| s.overall = status);
    }

    /// Records an error; only the newest sixteen are kept.
    pub fn push_error(&self, msg: impl Into<String>) {
        const LIMIT: usize = 16;
        self.update(|s| {
            s.errors.push(msg.into());
            if s.errors.len() > LIMIT {
                let excess = s.errors.len() - LIMIT;
                s.errors.drain(..excess);
            }
        });
    }

    /// Marks the component healthy and drops every recorded error.
    pub fn mark_ok(&self) {
        self.update(|s| {
            s.overall = OverallStatus::Ok;
            s.errors.clear();
        });
    }

    pub fn snapshot(&self) -> ServiceStatusSnapshot {
        let guard = self.inner.read();
        ServiceStatusSnapshot {
            name: self.name.to_string(),
            overall: guard.overall,
            errors: guard.errors.clone(),
        }
    }

    pub fn overall(&self) -> OverallStatus {
        self.inner.read().overall
    }
}
