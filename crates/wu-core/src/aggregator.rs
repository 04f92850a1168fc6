//! Per-window, per-agent wrap-up totals.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AgentId;

/// Total wrap-up time of one agent in one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentWindowTotal {
    pub window_boundary: DateTime<Utc>,
    pub agent_id: AgentId,
    /// Whole seconds. Sub-second remainders are truncated.
    pub wrapup_seconds: i64,
}

/// Accumulates wrap-up time keyed by `(window_boundary, agent_id)`.
///
/// Entries are created on first contribution. A missing entry means zero.
/// Ordered maps keep iteration, and therefore any rendered output, stable
/// regardless of the order contributions arrived in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentAggregator {
    windows: BTreeMap<DateTime<Utc>, BTreeMap<AgentId, Duration>>,
}

impl AgentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `duration` to the agent's total for the window.
    ///
    /// Non-positive durations are ignored so totals never decrease.
    pub fn add(&mut self, window_boundary: DateTime<Utc>, agent_id: AgentId, duration: Duration) {
        if duration <= Duration::zero() {
            return;
        }
        let total = self
            .windows
            .entry(window_boundary)
            .or_default()
            .entry(agent_id)
            .or_insert_with(Duration::zero);
        *total += duration;
    }

    /// The `(agent_id, duration)` pairs recorded for a window, in agent order.
    pub fn get(&self, window_boundary: DateTime<Utc>) -> Vec<(AgentId, Duration)> {
        self.windows
            .get(&window_boundary)
            .map(|agents| agents.iter().map(|(id, d)| (*id, *d)).collect())
            .unwrap_or_default()
    }

    /// Total for a single agent in a window, zero if absent.
    pub fn total(&self, window_boundary: DateTime<Utc>, agent_id: AgentId) -> Duration {
        self.windows
            .get(&window_boundary)
            .and_then(|agents| agents.get(&agent_id))
            .copied()
            .unwrap_or_else(Duration::zero)
    }

    /// Sums `other` into `self`.
    pub fn merge(&mut self, other: Self) {
        for (boundary, agents) in other.windows {
            for (agent_id, duration) in agents {
                self.add(boundary, agent_id, duration);
            }
        }
    }

    /// Window boundaries that received time, in order.
    pub fn windows(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.windows.keys().copied()
    }

    /// Flattens into rows ordered by window then agent.
    pub fn totals(&self) -> Vec<AgentWindowTotal> {
        self.windows
            .iter()
            .flat_map(|(boundary, agents)| {
                agents.iter().map(|(agent_id, duration)| AgentWindowTotal {
                    window_boundary: *boundary,
                    agent_id: *agent_id,
                    wrapup_seconds: duration.num_seconds(),
                })
            })
            .collect()
    }

    /// Number of `(window, agent)` entries.
    pub fn len(&self) -> usize {
        self.windows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
