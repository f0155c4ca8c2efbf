//! Local candle store configuration

pub struct PersistenceConfig {
    /// Default SQLite file holding the candle cache.
    pub db_path: &'static str,
    pub busy_timeout_sec: u64,
    pub max_connections: u32,
    /// Rows per INSERT statement; 9 binds each keeps us under SQLite's 32k parameter cap.
    pub insert_chunk: usize,
}

pub const PERSISTENCE: PersistenceConfig = PersistenceConfig {
    db_path: "candles.sqlite",
    busy_timeout_sec: 60,
    max_connections: 5,
    insert_chunk: 3000,
};
