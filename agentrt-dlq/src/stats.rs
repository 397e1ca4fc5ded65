//! Aggregate statistics over the current DLQ contents.

use std::collections::HashMap;

use agentrt_types::DLQItem;

/// A point-in-time summary of [`crate::DeadLetterQueue`] contents.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DlqStats {
    /// Count of items per originating event type.
    pub by_event_type: HashMap<String, usize>,
    /// Count of items per extracted error class (`timeout`, `auth`, ...).
    pub by_error_type: HashMap<String, usize>,
    /// Mean `attempts` across all items, `0.0` when the DLQ is empty.
    pub average_attempts: f64,
    /// The single longest-resident item, if any.
    pub oldest: Option<DLQItem>,
    /// Up to the 10 most recently dead-lettered items, newest first.
    pub recent: Vec<DLQItem>,
}

pub(crate) fn compute(items: impl Iterator<Item = DLQItem>) -> DlqStats {
    let mut by_event_type = HashMap::new();
    let mut by_error_type = HashMap::new();
    let mut total_attempts: u64 = 0;
    let mut count = 0usize;
    let mut oldest: Option<DLQItem> = None;
    let mut all: Vec<DLQItem> = Vec::new();

    for item in items {
        *by_event_type.entry(item.event.event_type.clone()).or_insert(0) += 1;
        for tag in item.tags.iter().filter_map(|t| t.strip_prefix("error:")) {
            *by_error_type.entry(tag.to_string()).or_insert(0) += 1;
        }
        total_attempts += u64::from(item.attempts);
        count += 1;
        if oldest.as_ref().is_none_or(|o| item.dlq_timestamp < o.dlq_timestamp) {
            oldest = Some(item.clone());
        }
        all.push(item);
    }

    all.sort_by(|a, b| b.dlq_timestamp.cmp(&a.dlq_timestamp));
    all.truncate(10);

    DlqStats {
        by_event_type,
        by_error_type,
        average_attempts: if count == 0 { 0.0 } else { total_attempts as f64 / count as f64 },
        oldest,
        recent: all,
    }
}
