use {
    crate::{
        config::DF,
        data::{CandleProvider, CandleStore},
        domain::{Candle, Gap, Range, SeriesKey},
        error::EngineError,
        trace_time,
        utils::{Timestamp, format_duration},
    },
    itertools::Itertools,
    std::{collections::HashSet, iter, sync::Arc},
    strum_macros::Display,
};

/// Walks every bucket start in `range` and groups the ones missing from
/// `present` into runs of consecutive buckets.
///
/// The first bucket is the first aligned time at or after `range.from`.
pub fn find_missing_ranges(key: &SeriesKey, present: &[Timestamp], range: Range) -> Vec<Gap> {
    let present: HashSet<Timestamp> = present.iter().copied().collect();

    iter::successors(Some(key.align_up(range.from)), |&bucket| {
        let next = key.step(bucket, 1);
        (next > bucket).then_some(next)
    })
    .take_while(|&bucket| bucket < range.to)
    .filter(|bucket| !present.contains(bucket))
    .map(|bucket| Gap {
        first: bucket,
        last: bucket,
    })
    .coalesce(|run, next| {
        if key.step(run.last, 1) == next.first {
            Ok(Gap {
                first: run.first,
                last: next.last,
            })
        } else {
            Err((run, next))
        }
    })
    .collect()
}

/// Progress of one fill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FillStage {
    Diffing,
    Backfilling,
    Persisting,
    Ready,
}

/// What a completed fill produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FilledSeries {
    /// Every stored candle in the requested range, ascending.
    pub candles: Vec<Candle>,
    /// Gaps found before backfilling.
    pub gaps: Vec<Gap>,
    pub fetch_calls: usize,
    /// Rows newly written to the store.
    pub persisted: u64,
}

#[derive(Default)]
struct FillTally {
    fetch_calls: usize,
    persisted: u64,
}

/// Reads the cache, fetches only what is missing, persists it, then returns the full range.
#[derive(Clone)]
pub struct GapFillEngine {
    store: Arc<dyn CandleStore>,
    provider: Arc<dyn CandleProvider>,
}

impl GapFillEngine {
    pub fn new(store: Arc<dyn CandleStore>, provider: Arc<dyn CandleProvider>) -> Self {
        Self { store, provider }
    }

    pub fn store(&self) -> &Arc<dyn CandleStore> {
        &self.store
    }

    fn enter(&self, key: &SeriesKey, stage: FillStage) {
        if DF.log_gap_fill {
            log::debug!("{}: {}", key, stage);
        }
    }

    /// Fills `[range.from, range.to)` for `key`.
    ///
    /// Gaps are backfilled in order. If a fetch fails, whatever that gap had
    /// already received is still persisted, and the request stops with
    /// [`EngineError::FetchFailed`] naming the range that was left unfilled.
    pub async fn fill(&self, key: &SeriesKey, range: Range) -> Result<FilledSeries, EngineError> {
        let range = range.validated()?;
        let mut tally = FillTally::default();

        self.enter(key, FillStage::Diffing);
        let present = self.store.read_times(key, range).await?;
        let gaps = find_missing_ranges(key, &present, range);

        if !gaps.is_empty() {
            self.enter(key, FillStage::Backfilling);
            if DF.log_gap_fill {
                let missing: i64 = gaps.iter().map(|g| g.bucket_count(key)).sum();
                log::info!(
                    "{}: {} gap(s), {} bucket(s) missing in {}",
                    key,
                    gaps.len(),
                    missing,
                    range
                );
            }
        }

        for gap in &gaps {
            self.backfill_gap(key, gap, &mut tally).await?;
        }

        self.enter(key, FillStage::Ready);
        let candles = trace_time!("read filled range", 5000, {
            self.store.read_range(key, range).await?
        });

        Ok(FilledSeries {
            candles,
            gaps,
            fetch_calls: tally.fetch_calls,
            persisted: tally.persisted,
        })
    }

    /// Pages through one gap and persists the result in one transaction.
    async fn backfill_gap(
        &self,
        key: &SeriesKey,
        gap: &Gap,
        tally: &mut FillTally,
    ) -> Result<(), EngineError> {
        let window = gap.as_range(key);
        let limit = self.provider.page_limit().max(1);
        let mut fetched: Vec<Candle> = Vec::new();
        let mut failure = None;
        let mut cursor = window.from;

        while cursor < window.to {
            let page_range = Range::ordered(cursor, window.to);
            tally.fetch_calls += 1;

            let page = match self.provider.fetch(key, page_range, limit).await {
                Ok(page) => page,
                Err(e) => {
                    log::warn!("{}: fetch failed for {}: {:#}", key, page_range, e);
                    failure = Some(EngineError::FetchFailed {
                        series_key: key.to_string(),
                        range: page_range,
                        message: format!("{e:#}"),
                    });
                    break;
                }
            };

            let exhausted = page.len() < limit;
            let Some(last_time) = page.last().map(|c| c.time) else {
                break;
            };

            fetched.extend(
                page.into_iter()
                    .filter(|c| window.contains(c.time))
                    .map(|mut c| {
                        c.series_key = key.clone();
                        c
                    }),
            );

            let next = key.step(last_time, 1);
            if next <= cursor {
                break;
            }
            cursor = next;
            if exhausted {
                break;
            }
        }

        if DF.log_gap_fill {
            log::info!(
                "{}: gap of {} ({}) returned {} candle(s)",
                key,
                format_duration(window.to - window.from),
                window,
                fetched.len()
            );
        }

        if !fetched.is_empty() {
            self.enter(key, FillStage::Persisting);
            tally.persisted += self.store.insert_batch(key, &fetched).await?;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
