use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ValueRecord;

/// Most items a key-value batch write accepts.
pub const KV_MAX_BATCH: usize = 25;

/// Keeps the last occurrence of every logical key, preserving the input
/// order of the survivors. Mirrors upsert-on-conflict: the later write wins.
pub fn dedup_by_logical_key(records: Vec<ValueRecord>) -> Vec<ValueRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut kept: Vec<ValueRecord> = records
        .into_iter()
        .rev()
        .filter(|record| seen.insert(record.logical_key()))
        .collect();
    kept.reverse();
    kept
}

/// Deduplicated records split into backend-sized chunks. Each chunk is an
/// independent unit of failure.
#[derive(Clone, Debug)]
pub struct BatchPlan {
    chunks: Vec<Vec<ValueRecord>>,
    records: usize,
}

impl BatchPlan {
    pub fn new(records: Vec<ValueRecord>, max_chunk: usize) -> Self {
        let unique = dedup_by_logical_key(records);
        let total = unique.len();
        let chunks = unique
            .chunks(max_chunk.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        Self {
            chunks,
            records: total,
        }
    }

    pub fn chunks(&self) -> &[Vec<ValueRecord>] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<Vec<ValueRecord>> {
        self.chunks
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn summary(&self) -> WriteSummary {
        WriteSummary {
            records: self.records,
            chunks: self.chunks.len(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    pub records: usize,
    pub chunks: usize,
}
