use serde::Serialize;
use std::collections::HashMap;

use crate::store::UsageRecord;

/// Visit count for one destination domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteVisits {
    pub url: String,
    pub visits: u64,
}

/// Aggregated usage served at `/metrics` and printed at shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub bandwidth_usage: String,
    pub top_sites: Vec<SiteVisits>,
}

/// Number of entries kept in `top_sites`.
const TOP_SITES: usize = 2;

/// Aggregate the usage log into bandwidth and top-destination summaries.
///
/// One visit is counted per record, regardless of byte volume. Ties in the
/// visit ordering keep the order in which each domain first appeared in the
/// log, so counts are accumulated in a first-seen vector rather than an
/// unordered map.
pub fn process_stats(records: &[UsageRecord]) -> Stats {
    let mut total_bytes: u64 = 0;
    let mut visits: Vec<SiteVisits> = Vec::new();
    let mut first_seen: HashMap<&str, usize> = HashMap::new();

    for record in records {
        total_bytes += record.bytes_processed;
        match first_seen.get(record.domain_name.as_str()) {
            Some(&i) => visits[i].visits += 1,
            None => {
                first_seen.insert(record.domain_name.as_str(), visits.len());
                visits.push(SiteVisits {
                    url: record.domain_name.clone(),
                    visits: 1,
                });
            }
        }
    }

    let bandwidth_usage = format!("{:.2}MB", total_bytes as f64 / (1024.0 * 1024.0));

    // Stable sort: equal counts keep first-seen order
    visits.sort_by(|a, b| b.visits.cmp(&a.visits));
    visits.truncate(TOP_SITES);

    Stats {
        bandwidth_usage,
        top_sites: visits,
    }
}
