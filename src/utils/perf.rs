/// Evaluates `$block`, warning when it takes longer than `$budget_micros`.
/// With `DF.log_performance` off this is just the block.
#[macro_export]
macro_rules! trace_time {
    ($label:expr, $budget_micros:expr, $block:block) => {{
        if $crate::config::DF.log_performance {
            let started = $crate::utils::AppInstant::now();
            let value = $block;
            let spent = started.elapsed();
            if spent.as_micros() > $budget_micros {
                log::warn!(
                    "slow: '{}' took {:?} (budget {}µs)",
                    $label,
                    spent,
                    $budget_micros
                );
            }
            value
        } else {
            $block
        }
    }};
}
