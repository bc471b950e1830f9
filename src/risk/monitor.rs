use super::events::{analyze_events, EventStats, SuspicionRules};
use crate::models::ChainEvent;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// External "suspicious activity" signal, polled once per decision cycle
#[async_trait]
pub trait RiskMonitor: Send + Sync + 'static {
    async fn suspicious_activity(&self) -> anyhow::Result<bool>;

    /// Feed an observed chain event; monitors that don't care ignore it
    fn observe(&self, _event: &ChainEvent) {}
}

/// Never raises the flag
#[derive(Debug, Clone, Default)]
pub struct NoRiskMonitor;

#[async_trait]
impl RiskMonitor for NoRiskMonitor {
    async fn suspicious_activity(&self) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Flags risk when the last `capacity` observed events look suspicious
pub struct EventWindowMonitor {
    events: Mutex<VecDeque<ChainEvent>>,
    capacity: usize,
    rules: SuspicionRules,
}

impl EventWindowMonitor {
    pub fn new(capacity: usize, rules: SuspicionRules) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            rules,
        }
    }

    pub fn stats(&self) -> anyhow::Result<EventStats> {
        let events = self
            .events
            .lock()
            .map_err(|e| anyhow::anyhow!("event window poisoned: {}", e))?;
        let window: Vec<ChainEvent> = events.iter().cloned().collect();
        Ok(analyze_events(&window, &self.rules))
    }
}

#[async_trait]
impl RiskMonitor for EventWindowMonitor {
    async fn suspicious_activity(&self) -> anyhow::Result<bool> {
        let stats = self.stats()?;
        for pattern in &stats.suspicious {
            tracing::warn!("  ⚠ Suspicious activity: {}", pattern.reason());
        }
        Ok(stats.is_suspicious())
    }

    fn observe(&self, event: &ChainEvent) {
        match self.events.lock() {
            Ok(mut events) => {
                events.push_back(event.clone());
                while events.len() > self.capacity {
                    events.pop_front();
                }
            }
            Err(e) => tracing::error!("Failed to record chain event: {}", e),
        }
    }
}
