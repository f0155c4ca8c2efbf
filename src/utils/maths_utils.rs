use argminmax::ArgMinMax;

/// Replaces a non-finite value with zero.
#[inline]
pub fn nz(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Smallest and largest finite values, or `None` if there are none.
pub fn finite_min_max<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<(f64, f64)> {
    let finite: Vec<f64> = values.into_iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let (min_index, max_index) = finite.as_slice().argminmax();
    Some((finite[min_index], finite[max_index]))
}
