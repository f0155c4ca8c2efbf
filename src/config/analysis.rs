//! Indicator parameters.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisConfig {
    /// Rolling window of the band average and deviation.
    pub band_period: usize,
    /// Band half-width in standard deviations.
    pub band_multiplier: f64,
    pub volume_period: usize,
    /// Volatility score below which a squeeze is called.
    pub squeeze_threshold: f64,
}

pub const ANALYSIS: AnalysisConfig = AnalysisConfig {
    band_period: 18,
    band_multiplier: 2.0,
    volume_period: 200,
    squeeze_threshold: 0.2,
};

impl Default for AnalysisConfig {
    fn default() -> Self {
        ANALYSIS
    }
}
