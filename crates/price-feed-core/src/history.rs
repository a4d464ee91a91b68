use std::collections::VecDeque;

use crate::candle::Tick;

/// Rolling buffer of raw ticks, oldest first.
///
/// Only [`HistoryBuffer::trim`] removes entries.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBuffer {
    ticks: VecDeque<Tick>,
    window_ms: i64,
    margin_ms: i64,
}

impl HistoryBuffer {
    pub fn new(window_ms: i64, margin_ms: i64) -> Self {
        Self {
            ticks: VecDeque::new(),
            window_ms,
            margin_ms,
        }
    }

    /// Rebuild a buffer from persisted ticks, keeping their stored order.
    pub fn from_ticks(ticks: Vec<Tick>, window_ms: i64, margin_ms: i64) -> Self {
        Self {
            ticks: ticks.into(),
            window_ms,
            margin_ms,
        }
    }

    pub fn append(&mut self, tick: Tick) {
        self.ticks.push_back(tick);
    }

    /// Oldest timestamp that survives a trim at `now_ms`.
    pub fn cutoff(&self, now_ms: i64) -> i64 {
        now_ms - (self.window_ms + self.margin_ms)
    }

    /// Drop every tick older than the window plus margin. Returns the number removed.
    ///
    /// Relies on timestamp order: stops at the first tick inside the window.
    pub fn trim(&mut self, now_ms: i64) -> usize {
        let cutoff = self.cutoff(now_ms);
        let mut removed = 0;
        while self.ticks.front().is_some_and(|t| t.timestamp < cutoff) {
            self.ticks.pop_front();
            removed += 1;
        }
        removed
    }

    /// Ticks with `from <= timestamp <= to`; absent bounds are open.
    pub fn range(&self, from: Option<i64>, to: Option<i64>) -> Vec<Tick> {
        self.ticks
            .iter()
            .filter(|t| from.is_none_or(|f| t.timestamp >= f))
            .filter(|t| to.is_none_or(|end| t.timestamp <= end))
            .copied()
            .collect()
    }

    pub fn since(&self, cutoff: i64) -> Vec<Tick> {
        self.range(Some(cutoff), None)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tick> {
        self.ticks.iter()
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Tick> {
        self.ticks.iter().copied().collect()
    }
}
