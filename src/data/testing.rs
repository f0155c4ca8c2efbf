//! Scripted collaborators for exercising the gap-fill path without a network.

use {
    crate::{
        data::CandleProvider,
        domain::{Candle, Range, SeriesKey},
        utils::Timestamp,
    },
    anyhow::{Result, bail},
    async_trait::async_trait,
    std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Serves closed candles for every bucket in `[onboard, now)` and records each call.
pub struct ScriptedExchange {
    key: SeriesKey,
    onboard: Timestamp,
    now: Timestamp,
    limit: usize,
    fail_on_call: Option<usize>,
    calls: AtomicUsize,
    requested: Mutex<Vec<Range>>,
}

impl ScriptedExchange {
    pub fn new(key: SeriesKey, onboard: Timestamp, now: Timestamp, limit: usize) -> Self {
        Self {
            key,
            onboard,
            now,
            limit,
            fail_on_call: None,
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Makes the `call`-th fetch (1-based) fail.
    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<Range> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn candle_at(key: &SeriesKey, time: Timestamp) -> Candle {
        let price = 100.0 + (time / 60_000 % 50) as f64;
        Candle::new(key.clone(), time, price, price + 1.0, price - 1.0, price + 0.5, 10.0)
            .with_trades(3)
    }
}

#[async_trait]
impl CandleProvider for ScriptedExchange {
    fn page_limit(&self) -> usize {
        self.limit
    }

    async fn fetch(&self, key: &SeriesKey, range: Range, limit: usize) -> Result<Vec<Candle>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(range);
        }
        if self.fail_on_call == Some(call) {
            bail!("scripted outage on call {call}");
        }
        if key != &self.key {
            return Ok(Vec::new());
        }

        let mut page = Vec::new();
        let mut time = key.align_up(range.from.max(self.onboard));
        while time < range.to && time < self.now && page.len() < limit.min(self.limit) {
            page.push(Self::candle_at(key, time));
            time = key.step(time, 1);
        }
        Ok(page)
    }

    async fn first_candle_time(&self, key: &SeriesKey) -> Result<Option<Timestamp>> {
        Ok((key == &self.key).then_some(self.onboard))
    }
}
