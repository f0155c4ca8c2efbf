use {
    bandscope::{
        Cli,
        config::BINANCE,
        data::{BinanceProvider, GlobalRateLimiter, SqliteStorage},
        run,
    },
    clap::Parser,
    std::{panic, sync::Arc},
    tokio::runtime::Runtime,
};

fn main() -> anyhow::Result<()> {
    panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        log::error!("CRITICAL PANIC:\n{}\nStack Trace:\n{}", info, backtrace);
    }));

    let (global_level, my_code_level) = if cfg!(debug_assertions) {
        (log::LevelFilter::Warn, log::LevelFilter::Info)
    } else {
        (log::LevelFilter::Error, log::LevelFilter::Info)
    };

    let mut builder = env_logger::Builder::new();

    builder
        .filter(None, global_level)
        .filter(Some("bandscope"), my_code_level)
        .parse_default_env()
        .init();

    let args = Cli::parse();
    let rt = Runtime::new()?;

    let store = rt.block_on(SqliteStorage::new(&args.db_path))?;
    let limiter = GlobalRateLimiter::new(BINANCE.limits.minute_weight_budget);
    let provider = BinanceProvider::new(limiter);

    run(args, &rt, Arc::new(store), Arc::new(provider))
}
