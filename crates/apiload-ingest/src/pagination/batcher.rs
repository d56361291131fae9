//! Fan-in of completed pages into commit batches
//!
//! Pages arrive in completion order, which is not page order. The
//! accumulator groups them into fixed-size batches and flushes the remainder
//! when the last expected page arrives.

use serde_json::{Map, Value};

/// Records fetched for one page
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub page: u32,
    pub records: Vec<Map<String, Value>>,
    /// Record count reported by the API for this page
    pub reported_records: u64,
    /// The fetch failed and the page was replaced by an empty one
    pub failed: bool,
}

impl PageResult {
    pub fn new(page: u32, records: Vec<Map<String, Value>>, reported_records: u64) -> Self {
        Self {
            page,
            records,
            reported_records,
            failed: false,
        }
    }

    /// Placeholder for a page whose fetch failed
    pub fn empty(page: u32) -> Self {
        Self {
            page,
            records: Vec::new(),
            reported_records: 0,
            failed: true,
        }
    }
}

/// Pages committed together
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 1-based flush order within the run
    pub ordinal: u64,
    pub pages: Vec<PageResult>,
}

impl Batch {
    /// Only the batch holding page 1 may replace the destination table
    pub fn contains_first_page(&self) -> bool {
        self.pages.iter().any(|p| p.page == 1)
    }

    pub fn page_numbers(&self) -> Vec<u32> {
        self.pages.iter().map(|p| p.page).collect()
    }

    pub fn record_count(&self) -> usize {
        self.pages.iter().map(|p| p.records.len()).sum()
    }

    /// Records in page completion order
    pub fn into_records(self) -> Vec<Value> {
        self.pages
            .into_iter()
            .flat_map(|p| p.records)
            .map(Value::Object)
            .collect()
    }
}

/// Rolling buffer that turns a stream of pages into batches
#[derive(Debug)]
pub struct BatchAccumulator {
    batch_size: usize,
    total_pages: usize,
    received: usize,
    flushed: u64,
    buffer: Vec<PageResult>,
}

impl BatchAccumulator {
    pub fn new(batch_size: usize, total_pages: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            total_pages,
            received: 0,
            flushed: 0,
            buffer: Vec::with_capacity(batch_size),
        }
    }

    /// Add a completed page; returns a batch once the buffer is full or the
    /// final expected page has arrived
    pub fn push(&mut self, page: PageResult) -> Option<Batch> {
        self.received += 1;
        self.buffer.push(page);

        if self.buffer.len() >= self.batch_size || self.received >= self.total_pages {
            self.flush()
        } else {
            None
        }
    }

    /// Flush whatever is buffered (used when the page stream ends early)
    pub fn finish(&mut self) -> Option<Batch> {
        self.flush()
    }

    fn flush(&mut self) -> Option<Batch> {
        if self.buffer.is_empty() {
            return None;
        }
        self.flushed += 1;
        Some(Batch {
            ordinal: self.flushed,
            pages: std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size)),
        })
    }
}
