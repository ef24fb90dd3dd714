//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Idle plus active connections
    total: usize,
    idle: usize,
    active: usize,
    /// Callers currently waiting for a connection
    waiting: usize,
    /// Physical connections opened over the pool's lifetime
    opened: u64,
    /// Physical connections closed over the pool's lifetime
    closed: u64,
}

impl PoolStats {
    pub fn new(idle: usize, active: usize, waiting: usize) -> Self {
        Self {
            total: idle + active,
            idle,
            active,
            waiting,
            opened: 0,
            closed: 0,
        }
    }

    pub fn with_lifetime_counts(mut self, opened: u64, closed: u64) -> Self {
        self.opened = opened;
        self.closed = closed;
        self
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn opened(&self) -> u64 {
        self.opened
    }

    pub fn closed(&self) -> u64 {
        self.closed
    }

    /// Pool utilization from 0.0 to 1.0; 0.0 for an empty pool
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.active as f64 / self.total as f64
        }
    }

    /// Whether every open connection is in use
    pub fn is_full(&self) -> bool {
        self.idle == 0 && self.total > 0
    }
}
