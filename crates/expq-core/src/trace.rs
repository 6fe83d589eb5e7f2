//! Stage Trace: per-stage hashes and latency for one request
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Record of one executed stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTrace {
    pub id: String,
    pub out_hash: String,
    pub deterministic: bool,
    pub latency_ms: u64,
}

/// Ordered stage records. The pipeline id is the stage prefixes joined by arrows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTrace {
    pub stages: Vec<StageTrace>,
}

impl PipelineTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing a stage
    pub fn start(&self) -> Instant {
        Instant::now()
    }

    /// Close a stage, hashing its serialized output
    pub fn record(&mut self, id: &str, output: &[u8], deterministic: bool, started: Instant) {
        self.stages.push(StageTrace {
            id: id.to_string(),
            out_hash: hash_bytes(output),
            deterministic,
            latency_ms: started.elapsed().as_millis() as u64,
        });
    }

    /// Close a stage whose output is a serializable value
    pub fn record_value<T: Serialize>(
        &mut self,
        id: &str,
        output: &T,
        deterministic: bool,
        started: Instant,
    ) {
        let bytes = serde_json::to_vec(output).unwrap_or_default();
        self.record(id, &bytes, deterministic, started);
    }

    pub fn pipeline_id(&self) -> String {
        self.stages
            .iter()
            .map(|s| s.id.split('.').next().unwrap_or("?"))
            .collect::<Vec<_>>()
            .join("→")
    }
}

pub fn hash_bytes(data: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_records_in_order() {
        let mut trace = PipelineTrace::new();
        let t = trace.start();
        trace.record("preparse.v1", b"{}", true, t);
        let t = trace.start();
        trace.record_value("hints.llm.v1", &serde_json::json!({"a": 1}), false, t);

        assert_eq!(trace.stages.len(), 2);
        assert_eq!(trace.pipeline_id(), "preparse→hints");
        assert!(trace.stages[0].out_hash.starts_with("blake3:"));
        assert!(!trace.stages[1].deterministic);
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
    }
}
