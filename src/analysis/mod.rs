// Incremental indicators: ring buffer primitives up to the batch analyzer
mod analyzer;
mod band_calculator;
mod band_phase;
mod ring_buffer;
mod rolling_average;
mod rolling_std_dev;

pub use analyzer::{
    Analysis, AnalysisRows, Analyzer, AnalyzerState, BandPoint, PhasePoint, PreviewRow, TimeValue,
};
pub use band_calculator::{BandCalculator, Bands};
pub use band_phase::{BandPhaseTracker, BandResult, BandRow, Phase};
pub use ring_buffer::{RingBuffer, RingBufferState};
pub use rolling_average::{AverageMode, RollingAverage};
pub use rolling_std_dev::RollingStdDev;
