//! Bounded ring buffer of probe results, with a cached summary.
//!
//! Mirrors `cping.protocols.Host`'s `raw_results`/`results`/`results_summary`
//! trio: a `collections.deque(maxlen=...)` of dict-like records, a visible
//! view that drops hidden placeholders, and an `lru_cache`'d summary that's
//! invalidated on every append. The receiver thread correlates replies by
//! scanning for a matching `info` token and mutating the record in place —
//! here that's `update_by_info`/`unhide`, since results aren't individually
//! shared references the way Python's dict objects are.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Lower bound on the number of results kept, matching the Python original's
/// `RESULTS_LENGTH_MINIMUM`.
pub const RESULTS_LENGTH_MINIMUM: usize = 50;

/// A single probe outcome. `latency` is in seconds; `-1.0` means timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub latency: f64,
    pub error: bool,
    pub hidden: bool,
    /// Correlation token (an ICMP sequence number, typically) used to find
    /// this result again from the receiver thread. `None` for protocols that
    /// don't need cross-thread correlation (e.g. TCP).
    pub info: Option<u16>,
}

impl ProbeResult {
    pub fn new(latency: f64, error: bool, hidden: bool, info: Option<u16>) -> Self {
        Self {
            latency,
            error,
            hidden,
            info,
        }
    }
}

/// Summary statistics over the visible (non-hidden) results, in milliseconds.
/// Fields are `None` when there aren't enough results to compute them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub min: Option<f64>,
    pub avg: Option<f64>,
    pub max: Option<f64>,
    pub stdev: Option<f64>,
    pub loss: Option<f64>,
}

struct Inner {
    capacity: usize,
    raw: VecDeque<ProbeResult>,
    summary_cache: Option<Summary>,
}

/// A bounded, thread-safe history of probe results for a single host.
pub struct ResultStore {
    inner: Mutex<Inner>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::with_capacity(RESULTS_LENGTH_MINIMUM)
    }

    /// Builds a store with an arbitrary initial capacity, bypassing the
    /// usual minimum — intended for tests exercising eviction directly.
    /// Prefer `new()` plus `set_capacity` for anything host-facing, since
    /// that's the path that enforces `RESULTS_LENGTH_MINIMUM`.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                capacity,
                raw: VecDeque::with_capacity(capacity),
                summary_cache: None,
            }),
        }
    }

    /// Appends a result, evicting the oldest entry if at capacity. Returns the
    /// index it was stored at, which stays valid for this call only — use
    /// `update_by_info`/`unhide`/`latency_of` for later lookups, since the
    /// ring buffer shifts as it fills.
    pub fn append(&self, result: ProbeResult) {
        let mut inner = self.inner.lock();
        if inner.raw.len() == inner.capacity {
            inner.raw.pop_front();
        }
        inner.raw.push_back(result);
        inner.summary_cache = None;
    }

    /// Finds the most recently appended result whose `info` matches `info`
    /// and overwrites its latency. If `latency` exceeds `late_after` seconds,
    /// the match is marked as an error (a late reply) instead of updated
    /// outright, matching the receiver's late-reply handling.
    ///
    /// Returns `true` if a match was found.
    pub fn update_by_info(&self, info: u16, latency: f64, late_after: f64) -> bool {
        let mut inner = self.inner.lock();
        let found = inner
            .raw
            .iter_mut()
            .rev()
            .find(|result| result.info == Some(info));

        match found {
            Some(result) => {
                result.latency = latency;
                if latency > late_after {
                    result.error = true;
                }
                inner.summary_cache = None;
                true
            }
            None => false,
        }
    }

    /// Clears the `hidden` flag on the most recent result matching `info`.
    pub fn unhide(&self, info: u16) {
        let mut inner = self.inner.lock();
        if let Some(result) = inner
            .raw
            .iter_mut()
            .rev()
            .find(|result| result.info == Some(info))
        {
            result.hidden = false;
            inner.summary_cache = None;
        }
    }

    /// Returns the current latency of the most recent result matching `info`,
    /// if any — used by a prober to pick up what the receiver wrote.
    pub fn latency_of(&self, info: u16) -> Option<f64> {
        self.inner
            .lock()
            .raw
            .iter()
            .rev()
            .find(|result| result.info == Some(info))
            .map(|result| result.latency)
    }

    /// All non-hidden results, oldest first.
    pub fn results(&self) -> Vec<ProbeResult> {
        self.inner
            .lock()
            .raw
            .iter()
            .filter(|result| !result.hidden)
            .cloned()
            .collect()
    }

    /// Summary statistics, recomputed on first access after a change and
    /// cached thereafter.
    pub fn summary(&self) -> Summary {
        let mut inner = self.inner.lock();
        if let Some(cached) = inner.summary_cache {
            return cached;
        }

        let summary = compute_summary(&inner.raw);
        inner.summary_cache = Some(summary);
        summary
    }

    /// Changes the maximum number of results kept. Shrinking keeps the
    /// newest entries, matching `collections.deque(old, maxlen=new)`.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(RESULTS_LENGTH_MINIMUM);
        let mut inner = self.inner.lock();
        if inner.capacity == capacity {
            return;
        }

        if inner.raw.len() > capacity {
            let drop = inner.raw.len() - capacity;
            inner.raw.drain(..drop);
        }
        inner.capacity = capacity;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compute_summary(raw: &VecDeque<ProbeResult>) -> Summary {
    let visible: Vec<&ProbeResult> = raw.iter().filter(|result| !result.hidden).collect();
    let successes: Vec<f64> = visible
        .iter()
        .map(|result| result.latency)
        .filter(|latency| *latency >= 0.0)
        .collect();

    if successes.is_empty() {
        return Summary::default();
    }

    let min = successes.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = successes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let avg = successes.iter().sum::<f64>() / successes.len() as f64;
    let loss = 1.0 - (successes.len() as f64 / visible.len() as f64);

    let stdev = if successes.len() > 1 {
        let variance = successes.iter().map(|v| (v - avg).powi(2)).sum::<f64>()
            / (successes.len() - 1) as f64;
        Some(variance.sqrt() * 1000.0)
    } else {
        None
    };

    Summary {
        min: Some(min * 1000.0),
        avg: Some(avg * 1000.0),
        max: Some(max * 1000.0),
        stdev,
        loss: Some(loss),
    }
}
