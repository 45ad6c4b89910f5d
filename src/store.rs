use std::sync::Mutex;

/// One finalized measurement of bytes relayed to a client for a single
/// connection, keyed by destination domain. Created at most once per relayed
/// connection, when the upstream→client stream ends; never mutated after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub domain_name: String,
    pub bytes_processed: u64,
}

/// Append-only usage log consulted by the stats aggregator.
///
/// Appends and reads happen concurrently from every connection task, so
/// implementations must serialize the two against each other.
pub trait LogStore: Send + Sync {
    /// Append a record. Insertion order is the canonical visit order.
    fn save(&self, record: UsageRecord);

    /// Snapshot copy of the full ordered sequence. Callers get an owned
    /// vector; appends racing with the read never show up in it.
    fn get_logs(&self) -> Vec<UsageRecord>;
}

/// Process-lifetime store with no size cap and no persistence.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    logs: Mutex<Vec<UsageRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for InMemoryStore {
    fn save(&self, record: UsageRecord) {
        self.logs.lock().unwrap().push(record);
    }

    fn get_logs(&self) -> Vec<UsageRecord> {
        self.logs.lock().unwrap().clone()
    }
}
