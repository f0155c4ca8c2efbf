//! Configuration module for the bandscope application.

mod analysis;
mod binance;
mod debug;
mod persistence;
mod planner;

// Re-export commonly used items
pub use analysis::{ANALYSIS, AnalysisConfig};
pub use binance::BINANCE;
pub use debug::DF;
pub use persistence::PERSISTENCE;
pub use planner::PLANNER;
