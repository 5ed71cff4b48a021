//! Bounded per-category call history

use parking_lot::Mutex;
use unimoghub_common::RingBuffer;
use unimoghub_domain::{MetricCategory, MetricRecord};

/// Query and mutation histories, oldest records evicted first
#[derive(Debug)]
pub struct MetricsHistory {
    queries: Mutex<RingBuffer<MetricRecord>>,
    mutations: Mutex<RingBuffer<MetricRecord>>,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            queries: Mutex::new(RingBuffer::new(capacity)),
            mutations: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    fn bucket(&self, category: MetricCategory) -> &Mutex<RingBuffer<MetricRecord>> {
        match category {
            MetricCategory::Query => &self.queries,
            MetricCategory::Mutation => &self.mutations,
        }
    }

    /// Append a record and publish it through the `metrics` facade
    pub fn record(&self, category: MetricCategory, record: MetricRecord) {
        let outcome = if record.success { "success" } else { "failure" };
        metrics::counter!(
            "unimoghub_requests_total",
            "category" => category.as_str(),
            "operation" => record.operation.clone(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("unimoghub_request_latency_ms", "category" => category.as_str())
            .record(record.latency_ms as f64);
        if record.retry_count > 0 {
            metrics::counter!("unimoghub_request_retries_total", "category" => category.as_str())
                .increment(u64::from(record.retry_count));
        }

        self.bucket(category).lock().push(record);
    }

    /// History of one category, oldest first
    pub fn get(&self, category: MetricCategory) -> Vec<MetricRecord> {
        self.bucket(category).lock().to_vec()
    }

    /// Every category's history, queries first
    pub fn all(&self) -> Vec<MetricRecord> {
        MetricCategory::ALL.iter().flat_map(|category| self.get(*category)).collect()
    }

    pub fn clear(&self) {
        for category in MetricCategory::ALL {
            self.bucket(category).lock().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(resource: &str, timestamp_ms: i64) -> MetricRecord {
        MetricRecord {
            resource: resource.to_string(),
            operation: "select".to_string(),
            latency_ms: 3,
            success: true,
            retry_count: 0,
            timestamp_ms,
            error_kind: None,
        }
    }

    /// Validates `MetricsHistory` eviction at capacity.
    ///
    /// Assertions:
    /// - Confirms the oldest record is evicted first
    /// - Confirms categories are kept apart
    #[test]
    fn test_history_evicts_oldest_per_category() {
        let history = MetricsHistory::new(2);
        history.record(MetricCategory::Query, record("profiles", 1));
        history.record(MetricCategory::Query, record("groups", 2));
        history.record(MetricCategory::Query, record("vehicles", 3));
        history.record(MetricCategory::Mutation, record("articles", 4));

        let queries = history.get(MetricCategory::Query);
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].resource, "groups");
        assert_eq!(queries[1].resource, "vehicles");
        assert_eq!(history.get(MetricCategory::Mutation).len(), 1);
        assert_eq!(history.all().len(), 3);

        history.clear();
        assert!(history.all().is_empty());
    }
}
