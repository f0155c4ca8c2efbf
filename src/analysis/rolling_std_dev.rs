use {
    crate::analysis::RingBuffer,
    serde::{Deserialize, Serialize},
};

/// Population standard deviation of the last `period` values around a caller-supplied mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingStdDev {
    window: RingBuffer<f64>,
}

impl RollingStdDev {
    pub fn new(period: usize) -> Self {
        Self {
            window: RingBuffer::new(period),
        }
    }

    /// Pushes `value` and returns the deviation. Empty slots count toward the
    /// period, so a window that is still filling reports less than its spread.
    pub fn next(&mut self, value: f64, mean: f64) -> f64 {
        self.window.push(value);
        Self::deviation(&self.window, mean)
    }

    /// What `next` would return, leaving the window untouched.
    pub fn moment_value(&mut self, value: f64, mean: f64) -> f64 {
        self.window
            .with_pushed(value, |window| Self::deviation(window, mean))
    }

    fn deviation(window: &RingBuffer<f64>, mean: f64) -> f64 {
        let squares: f64 = window.iter().map(|x| (x - mean) * (x - mean)).sum();
        (squares / window.capacity() as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrs::statistics::Statistics;

    #[test]
    fn matches_population_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mean = values.iter().mean();
        let mut sd = RollingStdDev::new(values.len());
        let mut last = 0.0;
        for v in values {
            last = sd.next(v, mean);
        }
        assert!((last - 2.0).abs() < 1e-12);
        assert!((last - values.iter().population_std_dev()).abs() < 1e-12);
    }

    #[test]
    fn slides_with_the_window() {
        let series = [1.0, 3.0, 8.0, 2.0, 6.0, 4.0];
        let period = 3;
        let mut sd = RollingStdDev::new(period);
        for (i, v) in series.iter().enumerate() {
            if i + 1 < period {
                sd.next(*v, 0.0);
                continue;
            }
            let window = &series[i + 1 - period..=i];
            let mean = window.iter().mean();
            let got = sd.next(*v, mean);
            assert!((got - window.iter().population_std_dev()).abs() < 1e-9);
        }
    }

    #[test]
    fn partial_window_divides_by_period() {
        let mut sd = RollingStdDev::new(4);
        assert!((sd.next(13.0, 11.5) - 0.75).abs() < 1e-12);
        let two = sd.next(14.0, 12.5);
        assert!((two - (2.5_f64 / 4.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn moment_value_is_side_effect_free() {
        let mut sd = RollingStdDev::new(2);
        sd.next(1.0, 2.0);
        sd.next(3.0, 2.0);
        let before = sd.clone();
        assert_eq!(sd.moment_value(5.0, 4.0), 1.0);
        assert_eq!(sd, before);
    }
}
