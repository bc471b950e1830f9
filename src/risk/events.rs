use crate::models::ChainEvent;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Rules that mark on-chain activity as suspicious
///
/// Every limit is optional; with all of them unset nothing is ever flagged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SuspicionRules {
    pub max_event_value: Option<f64>,
    pub max_events_per_address: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SuspiciousPattern {
    OversizedValue { tx_hash: String, value: f64 },
    AddressBurst { address: String, count: usize },
}

impl SuspiciousPattern {
    pub fn reason(&self) -> String {
        match self {
            SuspiciousPattern::OversizedValue { tx_hash, value } => {
                format!("unusual transaction value {:.4} in {}", value, tx_hash)
            }
            SuspiciousPattern::AddressBurst { address, count } => {
                format!("{} events from {} in window", count, address)
            }
        }
    }
}

/// Aggregate view over a window of chain events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStats {
    pub transaction_count: usize,
    pub unique_addresses: usize,
    pub total_value: f64,
    pub suspicious: Vec<SuspiciousPattern>,
}

impl EventStats {
    pub fn is_suspicious(&self) -> bool {
        !self.suspicious.is_empty()
    }
}

impl SuspicionRules {
    /// Check a single event against the per-event limits
    pub fn check(&self, event: &ChainEvent) -> Option<SuspiciousPattern> {
        let limit = self.max_event_value?;
        let value = event.value?;
        (value > limit).then(|| SuspiciousPattern::OversizedValue {
            tx_hash: event.tx_hash.clone(),
            value,
        })
    }
}

/// Summarize `events` and collect every suspicious pattern
pub fn analyze_events(events: &[ChainEvent], rules: &SuspicionRules) -> EventStats {
    let mut addresses: HashSet<&str> = HashSet::new();
    let mut per_address: HashMap<&str, usize> = HashMap::new();
    let mut total_value = 0.0;
    let mut suspicious = Vec::new();

    for event in events {
        if let Some(from) = event.from.as_deref() {
            addresses.insert(from);
            *per_address.entry(from).or_insert(0) += 1;
        }
        if let Some(value) = event.value {
            total_value += value;
        }
        if let Some(pattern) = rules.check(event) {
            suspicious.push(pattern);
        }
    }

    if let Some(max) = rules.max_events_per_address {
        let mut bursts: Vec<_> = per_address
            .into_iter()
            .filter(|(_, count)| *count > max)
            .collect();
        // Stable order for logs and tests
        bursts.sort_by(|a, b| a.0.cmp(b.0));
        suspicious.extend(bursts.into_iter().map(|(address, count)| {
            SuspiciousPattern::AddressBurst {
                address: address.to_string(),
                count,
            }
        }));
    }

    EventStats {
        transaction_count: events.len(),
        unique_addresses: addresses.len(),
        total_value,
        suspicious,
    }
}
