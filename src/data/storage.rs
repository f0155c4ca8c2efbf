use {
    crate::{
        config::PERSISTENCE,
        domain::{Candle, Range, SeriesKey},
        error::EngineError,
        utils::Timestamp,
    },
    async_trait::async_trait,
    sqlx::{
        ConnectOptions, Pool, QueryBuilder, Row, Sqlite,
        sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    },
    std::{
        collections::{BTreeMap, HashMap},
        str::FromStr,
        time::Duration,
    },
    tokio::sync::RwLock,
};

/// Append-only candle cache keyed by `(series key, bucket time)`.
#[async_trait]
pub trait CandleStore: Send + Sync {
    async fn initialize(&self) -> Result<(), EngineError>;

    /// Candles with `range.from <= time < range.to`, ascending by time.
    async fn read_range(&self, key: &SeriesKey, range: Range) -> Result<Vec<Candle>, EngineError>;

    /// Times present in `range`, ascending.
    async fn read_times(
        &self,
        key: &SeriesKey,
        range: Range,
    ) -> Result<Vec<Timestamp>, EngineError> {
        let candles = self.read_range(key, range).await?;
        Ok(candles.into_iter().map(|c| c.time).collect())
    }

    /// Inserts all of `candles` atomically, ignoring times already stored.
    /// Returns how many rows were new.
    async fn insert_batch(&self, key: &SeriesKey, candles: &[Candle]) -> Result<u64, EngineError>;
}

pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

impl SqliteStorage {
    pub async fn new(db_path: &str) -> Result<Self, EngineError> {
        let connection_options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(PERSISTENCE.busy_timeout_sec))
            .synchronous(SqliteSynchronous::Normal)
            .log_slow_statements(log::LevelFilter::Warn, Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(PERSISTENCE.max_connections)
            .connect_with(connection_options)
            .await?;

        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection that never expires,
    /// since the data lives only as long as that connection.
    pub async fn in_memory() -> Result<Self, EngineError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl CandleStore for SqliteStorage {
    async fn initialize(&self) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                series_key TEXT NOT NULL,
                time INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                closed INTEGER NOT NULL,
                trades INTEGER NOT NULL,
                PRIMARY KEY (series_key, time)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn read_range(&self, key: &SeriesKey, range: Range) -> Result<Vec<Candle>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT time, open, high, low, close, volume, closed, trades
            FROM candles
            WHERE series_key = ? AND time >= ? AND time < ?
            ORDER BY time ASC
            "#,
        )
        .bind(key.to_string())
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            candles.push(Candle {
                time: row.try_get("time")?,
                open: row.try_get("open")?,
                high: row.try_get("high")?,
                low: row.try_get("low")?,
                close: row.try_get("close")?,
                volume: row.try_get("volume")?,
                closed: row.try_get("closed")?,
                trades: row.try_get::<i64, _>("trades")?.max(0) as u64,
                series_key: key.clone(),
            });
        }
        Ok(candles)
    }

    async fn read_times(
        &self,
        key: &SeriesKey,
        range: Range,
    ) -> Result<Vec<Timestamp>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT time FROM candles
            WHERE series_key = ? AND time >= ? AND time < ?
            ORDER BY time ASC
            "#,
        )
        .bind(key.to_string())
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("time").map_err(EngineError::from))
            .collect()
    }

    async fn insert_batch(&self, key: &SeriesKey, candles: &[Candle]) -> Result<u64, EngineError> {
        if candles.is_empty() {
            return Ok(0);
        }

        let series_key = key.to_string();
        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in candles.chunks(PERSISTENCE.insert_chunk) {
            let mut query_builder = QueryBuilder::<Sqlite>::new(
                "INSERT OR IGNORE INTO candles (series_key, time, open, high, low, close, volume, closed, trades) ",
            );

            query_builder.push_values(chunk, |mut b, c| {
                b.push_bind(series_key.as_str())
                    .push_bind(c.time)
                    .push_bind(c.open)
                    .push_bind(c.high)
                    .push_bind(c.low)
                    .push_bind(c.close)
                    .push_bind(c.volume)
                    .push_bind(c.closed)
                    .push_bind(c.trades as i64);
            });

            inserted += query_builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

/// Store backed by a map, used for tests and as a throwaway cache.
#[derive(Default)]
pub struct MemoryStorage {
    series: RwLock<HashMap<SeriesKey, BTreeMap<Timestamp, Candle>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, key: &SeriesKey) -> usize {
        self.series.read().await.get(key).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl CandleStore for MemoryStorage {
    async fn initialize(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn read_range(&self, key: &SeriesKey, range: Range) -> Result<Vec<Candle>, EngineError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let series = self.series.read().await;
        Ok(series
            .get(key)
            .map(|candles| {
                candles
                    .range(range.from..range.to)
                    .map(|(_, c)| c.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_batch(&self, key: &SeriesKey, candles: &[Candle]) -> Result<u64, EngineError> {
        let mut series = self.series.write().await;
        let stored = series.entry(key.clone()).or_default();
        let mut inserted = 0;
        for candle in candles {
            if !stored.contains_key(&candle.time) {
                let mut candle = candle.clone();
                candle.series_key = key.clone();
                stored.insert(candle.time, candle);
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
