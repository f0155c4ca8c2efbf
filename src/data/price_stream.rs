use {
    crate::{
        config::{BINANCE, DF},
        data::bn_kline::interval_code,
        domain::{Candle, SeriesKey},
    },
    anyhow::Result,
    futures::StreamExt,
    serde::Deserialize,
    std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, Ordering},
            mpsc::Sender,
        },
        thread,
        time::Duration,
    },
    tokio::{runtime::Runtime, time::sleep},
    tokio_tungstenite::{connect_async, tungstenite::Message},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    Disconnected,
}

#[derive(Deserialize)]
struct KlineEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "k")]
    kline: StreamKline,
}

#[derive(Deserialize)]
struct StreamKline {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "n")]
    trades: u64,
    #[serde(rename = "x")]
    is_closed: bool,
}

/// Turns one kline stream message into a candle for `key`.
/// Anything that is not a well-formed kline event yields `None`.
pub fn parse_kline_message(text: &str, key: &SeriesKey) -> Option<Candle> {
    let event: KlineEvent = serde_json::from_str(text).ok()?;
    if event.event_type != "kline" {
        return None;
    }
    let k = event.kline;
    let candle = Candle {
        time: k.open_time,
        open: k.open.parse().ok()?,
        high: k.high.parse().ok()?,
        low: k.low.parse().ok()?,
        close: k.close.parse().ok()?,
        volume: k.volume.parse().ok()?,
        closed: k.is_closed,
        trades: k.trades,
        series_key: key.clone(),
    };
    Some(candle)
}

fn stream_url(key: &SeriesKey) -> Result<String> {
    Ok(format!(
        "{}{}@kline_{}",
        BINANCE.stream.base_url,
        key.instrument.to_lowercase(),
        interval_code(key)?
    ))
}

/// Live kline updates for one series, pushed into an mpsc channel.
/// Runs on its own thread and reconnects with exponential backoff.
pub struct LiveCandleFeed {
    key: SeriesKey,
    status: Arc<Mutex<ConnectionStatus>>,
    stopped: Arc<AtomicBool>,
}

impl LiveCandleFeed {
    pub fn spawn(key: SeriesKey, candle_tx: Sender<Candle>) -> Result<Self> {
        let url = stream_url(&key)?;
        let rt = Runtime::new()?;

        let feed = Self {
            key: key.clone(),
            status: Arc::new(Mutex::new(ConnectionStatus::Connecting)),
            stopped: Arc::new(AtomicBool::new(false)),
        };
        let status = feed.status.clone();
        let stopped = feed.stopped.clone();

        thread::spawn(move || {
            rt.block_on(run_stream_with_reconnect(key, url, status, stopped, candle_tx));
        });

        Ok(feed)
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn status(&self) -> ConnectionStatus {
        read_status(&self.status)
    }

    /// Asks the feed to stop after the next message or reconnect attempt.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl Drop for LiveCandleFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_status(status: &Mutex<ConnectionStatus>, value: ConnectionStatus) {
    if let Ok(mut guard) = status.lock() {
        *guard = value;
    }
}

fn read_status(status: &Mutex<ConnectionStatus>) -> ConnectionStatus {
    status
        .lock()
        .map(|s| *s)
        .unwrap_or(ConnectionStatus::Disconnected)
}

/// Reconnect delay that doubles per failed attempt, capped at `max`.
/// A completed handshake starts the sequence over.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    initial: u64,
    max: u64,
    current: u64,
}

impl Backoff {
    fn new(initial: u64, max: u64) -> Self {
        Self {
            initial,
            max,
            current: initial.min(max),
        }
    }

    fn reset(&mut self) {
        self.current = self.initial.min(self.max);
    }

    /// Delay to wait now; the following one is doubled.
    fn next_delay(&mut self) -> u64 {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

async fn run_stream_with_reconnect(
    key: SeriesKey,
    url: String,
    status: Arc<Mutex<ConnectionStatus>>,
    stopped: Arc<AtomicBool>,
    candle_tx: Sender<Candle>,
) {
    let mut backoff = Backoff::new(
        BINANCE.stream.initial_backoff_sec,
        BINANCE.stream.max_backoff_sec,
    );

    while !stopped.load(Ordering::SeqCst) {
        set_status(&status, ConnectionStatus::Connecting);
        if DF.log_live_stream {
            log::info!("Connecting live stream for {}...", key);
        }

        let outcome = run_stream(&key, &url, &status, &stopped, &candle_tx).await;
        if read_status(&status) == ConnectionStatus::Connected {
            backoff.reset();
        }
        let delay = backoff.next_delay();

        match outcome {
            Ok(StreamEnd::ReceiverGone) => break,
            Ok(StreamEnd::Closed) => {
                log::warn!("WebSocket for {} closed normally. Reconnecting...", key);
            }
            Err(e) => {
                log::error!(
                    "WebSocket for {} failed: {}. Retrying in {}s...",
                    key,
                    e,
                    delay
                );
            }
        }

        set_status(&status, ConnectionStatus::Disconnected);
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        sleep(Duration::from_secs(delay)).await;
    }

    set_status(&status, ConnectionStatus::Disconnected);
}

enum StreamEnd {
    Closed,
    ReceiverGone,
}

async fn run_stream(
    key: &SeriesKey,
    url: &str,
    status: &Mutex<ConnectionStatus>,
    stopped: &AtomicBool,
    candle_tx: &Sender<Candle>,
) -> Result<StreamEnd> {
    let (ws_stream, _) = connect_async(url).await?;
    set_status(status, ConnectionStatus::Connected);

    let (_write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        if stopped.load(Ordering::SeqCst) {
            return Ok(StreamEnd::ReceiverGone);
        }
        match msg? {
            Message::Text(text) => match parse_kline_message(&text, key) {
                Some(candle) => {
                    if DF.log_live_stream {
                        log::info!(
                            "[kline-tick] {} {} -> {:.6} closed={}",
                            key,
                            candle.time,
                            candle.close,
                            candle.closed
                        );
                    }
                    if candle_tx.send(candle).is_err() {
                        return Ok(StreamEnd::ReceiverGone);
                    }
                }
                None => log::warn!("⚠️ Failed to parse WebSocket kline message"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    Ok(StreamEnd::Closed)
}
