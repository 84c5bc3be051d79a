//! Column-wise indicator helpers.
//!
//! Every helper returns one value per input position, `None` until enough
//! history exists. Values at index `t` only ever read inputs at `t` or earlier.
//! Moving averages, MACD and deviations are streamed through `ta` indicators;
//! a missing value resets the indicator.

use crate::domain::errors::PipelineError;
use ta::errors::TaError;
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, SimpleMovingAverage,
    StandardDeviation,
};
use ta::{Next, Reset};

/// MACD line, signal line and histogram
pub type MacdColumns = (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>);

fn indicator_error(parameter: &str, err: TaError) -> PipelineError {
    PipelineError::invalid_config(parameter, format!("{:?}", err))
}

/// Feeds values through `indicator`, emitting once `warmup` consecutive values were seen.
fn stream<I>(values: &[Option<f64>], mut indicator: I, warmup: usize) -> Vec<Option<f64>>
where
    I: Next<f64, Output = f64> + Reset,
{
    let mut run = 0;
    values
        .iter()
        .map(|v| match v {
            Some(x) => {
                run += 1;
                let out = indicator.next(*x);
                (run >= warmup).then_some(out)
            }
            None => {
                indicator.reset();
                run = 0;
                None
            }
        })
        .collect()
}

/// Value `lag` positions back.
pub fn lag(values: &[Option<f64>], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| if t >= lag { values[t - lag] } else { None })
        .collect()
}

pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Result<Vec<Option<f64>>, PipelineError> {
    let window = window.max(1);
    let sma = SimpleMovingAverage::new(window).map_err(|e| indicator_error("sma window", e))?;
    Ok(stream(values, sma, window))
}

/// Sample standard deviation (n - 1 denominator) over the window; 0 for a one-row window.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Result<Vec<Option<f64>>, PipelineError> {
    let window = window.max(1);
    let sd = StandardDeviation::new(window).map_err(|e| indicator_error("std window", e))?;
    // ta reports the population deviation
    let correction = if window > 1 {
        (window as f64 / (window - 1) as f64).sqrt()
    } else {
        0.0
    };
    Ok(stream(values, sd, window)
        .into_iter()
        .map(|s| s.map(|s| if s.is_finite() { s * correction } else { 0.0 }))
        .collect())
}

/// Exponential moving average with `alpha = 2 / (span + 1)`, seeded with the
/// first present value.
pub fn ema(values: &[Option<f64>], span: usize) -> Result<Vec<Option<f64>>, PipelineError> {
    let ema = ExponentialMovingAverage::new(span.max(1)).map_err(|e| indicator_error("ema span", e))?;
    Ok(stream(values, ema, 1))
}

/// MACD of `values` with EMA spans `fast`/`slow` and a `signal` EMA of the line.
pub fn macd(
    values: &[Option<f64>],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<MacdColumns, PipelineError> {
    let mut indicator = MovingAverageConvergenceDivergence::new(fast, slow, signal)
        .map_err(|e| indicator_error("macd periods", e))?;
    let mut line = Vec::with_capacity(values.len());
    let mut signal_line = Vec::with_capacity(values.len());
    let mut histogram = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Some(x) => {
                let out = indicator.next(*x);
                line.push(Some(out.macd));
                signal_line.push(Some(out.signal));
                histogram.push(Some(out.histogram));
            }
            None => {
                indicator.reset();
                line.push(None);
                signal_line.push(None);
                histogram.push(None);
            }
        }
    }
    Ok((line, signal_line, histogram))
}

/// Difference from the previous value.
pub fn diff(values: &[Option<f64>]) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| match (t.checked_sub(1).and_then(|p| values[p]), values[t]) {
            (Some(prev), Some(cur)) => Some(cur - prev),
            _ => None,
        })
        .collect()
}

/// `numerator / denominator`, or `neutral` when the denominator is zero.
pub fn safe_ratio(numerator: f64, denominator: f64, neutral: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        neutral
    } else {
        numerator / denominator
    }
}

/// Relative change from the previous value; 0 when the previous value is 0.
pub fn pct_change(values: &[Option<f64>]) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| match (t.checked_sub(1).and_then(|p| values[p]), values[t]) {
            (Some(prev), Some(cur)) => Some(safe_ratio(cur - prev, prev, 0.0)),
            _ => None,
        })
        .collect()
}

/// Relative strength index over `period` rows using simple means of gains and
/// losses rather than Wilder smoothing. 50 when there is no loss and no gain.
pub fn rsi(values: &[Option<f64>], period: usize) -> Result<Vec<Option<f64>>, PipelineError> {
    let delta = diff(values);
    let gains: Vec<Option<f64>> = delta.iter().map(|d| d.map(|d| d.max(0.0))).collect();
    let losses: Vec<Option<f64>> = delta.iter().map(|d| d.map(|d| (-d).max(0.0))).collect();
    Ok(rolling_mean(&gains, period)?
        .into_iter()
        .zip(rolling_mean(&losses, period)?)
        .map(|(gain, loss)| match (gain, loss) {
            (Some(g), Some(l)) if l == 0.0 && g == 0.0 => Some(50.0),
            (Some(_), Some(l)) if l == 0.0 => Some(100.0),
            (Some(g), Some(l)) => Some(100.0 - 100.0 / (1.0 + g / l)),
            _ => None,
        })
        .collect())
}

pub fn present(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().map(|v| Some(*v)).collect()
}
