//! Technical-indicator features over OHLCV bars.

use super::indicators::{
    diff, ema, lag, macd, pct_change, present, rolling_mean, rolling_std, rsi, safe_ratio,
};
use super::{FeatureColumns, assemble, check_layout, latest_row, shift_forward};
use crate::domain::errors::PipelineError;
use crate::domain::market::{PriceBar, PriceField};
use crate::domain::ml::Dataset;

const STAGE: &str = "price features";

pub const SMA_WINDOWS: [usize; 4] = [5, 10, 20, 50];
pub const LAGS: [usize; 5] = [1, 2, 3, 5, 7];
pub const ROLLING_WINDOWS: [usize; 3] = [5, 10, 20];
pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_WINDOW: usize = 20;
pub const BOLLINGER_WIDTH: f64 = 2.0;
pub const VOLUME_WINDOW: usize = 20;
pub const VOLATILITY_WINDOW: usize = 20;

/// Builds the indicator set over bars sorted by timestamp and forecasts
/// `target` `horizon` bars ahead. The target column itself is not a feature.
#[derive(Debug, Clone)]
pub struct PriceFeatureBuilder {
    target: PriceField,
    horizon: usize,
    min_rows: usize,
    layout: Option<Vec<String>>,
    sma_windows: Option<[usize; 4]>,
}

fn zip_map(
    a: &[Option<f64>],
    b: &[Option<f64>],
    f: impl Fn(f64, f64) -> f64,
) -> Vec<Option<f64>> {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some(f(*x, *y)),
            _ => None,
        })
        .collect()
}

fn field(bars: &[PriceBar], f: impl Fn(&PriceBar) -> f64) -> Vec<Option<f64>> {
    present(&bars.iter().map(f).collect::<Vec<f64>>())
}

fn percent(values: Vec<Option<f64>>) -> Vec<Option<f64>> {
    values.into_iter().map(|v| v.map(|v| v * 100.0)).collect()
}

/// SMA window lengths for a history of `n` bars. Short histories shrink the
/// short windows to a third of the data; the 50-bar window only shrinks below 50 bars.
pub fn sma_windows(n: usize) -> [usize; 4] {
    let max_window = (n / 3).min(50).max(1);
    let long = if n >= 50 { 50 } else { max_window };
    [
        SMA_WINDOWS[0].min(max_window),
        SMA_WINDOWS[1].min(max_window),
        SMA_WINDOWS[2].min(max_window),
        long,
    ]
}

/// Every indicator column, computed from bars at or before each index, with
/// the given SMA window lengths for `sma_5` .. `sma_50`.
pub fn indicator_columns(bars: &[PriceBar], windows: &[usize; 4]) -> Result<FeatureColumns, PipelineError> {
    let n = bars.len();
    let open = field(bars, |b| b.open);
    let high = field(bars, |b| b.high);
    let low = field(bars, |b| b.low);
    let close = field(bars, |b| b.close);
    let volume = field(bars, |b| b.volume);

    let mut columns: FeatureColumns = Vec::new();
    columns.push(("open".to_string(), open.clone()));
    columns.push(("high".to_string(), high.clone()));
    columns.push(("low".to_string(), low.clone()));
    columns.push(("close".to_string(), close.clone()));
    columns.push(("volume".to_string(), volume.clone()));

    for (name, window) in SMA_WINDOWS.iter().zip(windows) {
        columns.push((format!("sma_{}", name), rolling_mean(&close, *window)?));
    }

    let (macd_line, macd_signal, macd_hist) = macd(&close, MACD_FAST, MACD_SLOW, MACD_SIGNAL)?;
    columns.push(("ema_12".to_string(), ema(&close, MACD_FAST)?));
    columns.push(("ema_26".to_string(), ema(&close, MACD_SLOW)?));
    columns.push(("macd".to_string(), macd_line));
    columns.push(("macd_signal".to_string(), macd_signal));
    columns.push(("macd_histogram".to_string(), macd_hist));

    columns.push(("rsi".to_string(), rsi(&close, RSI_PERIOD)?));

    let bb_middle = rolling_mean(&close, BOLLINGER_WINDOW)?;
    let bb_std = rolling_std(&close, BOLLINGER_WINDOW)?;
    let bb_upper = zip_map(&bb_middle, &bb_std, |m, s| m + BOLLINGER_WIDTH * s);
    let bb_lower = zip_map(&bb_middle, &bb_std, |m, s| m - BOLLINGER_WIDTH * s);
    let bb_width = zip_map(&bb_upper, &bb_lower, |u, l| u - l);
    let bb_position: Vec<Option<f64>> = (0..n)
        .map(|t| match (close[t], bb_upper[t], bb_lower[t]) {
            (Some(c), Some(u), Some(l)) => Some(safe_ratio(c - l, u - l, 0.5)),
            _ => None,
        })
        .collect();
    columns.push(("bb_middle".to_string(), bb_middle));
    columns.push(("bb_upper".to_string(), bb_upper));
    columns.push(("bb_lower".to_string(), bb_lower));
    columns.push(("bb_width".to_string(), bb_width));
    columns.push(("bb_position".to_string(), bb_position));

    columns.push(("price_change".to_string(), diff(&close)));
    columns.push(("price_change_pct".to_string(), percent(pct_change(&close))));
    columns.push((
        "high_low_pct".to_string(),
        (0..n)
            .map(|t| match (high[t], low[t], close[t]) {
                (Some(h), Some(l), Some(c)) => Some(safe_ratio(h - l, c, 0.0) * 100.0),
                _ => None,
            })
            .collect(),
    ));
    columns.push((
        "open_close_pct".to_string(),
        zip_map(&close, &open, |c, o| safe_ratio(c - o, o, 0.0) * 100.0),
    ));

    let volume_sma = rolling_mean(&volume, VOLUME_WINDOW)?;
    columns.push((
        "volume_ratio".to_string(),
        zip_map(&volume, &volume_sma, |v, s| safe_ratio(v, s, 0.0)),
    ));
    columns.push(("volume_sma_20".to_string(), volume_sma));
    columns.push(("volatility".to_string(), rolling_std(&close, VOLATILITY_WINDOW)?));
    columns.push((
        "price_position".to_string(),
        (0..n)
            .map(|t| match (close[t], low[t], high[t]) {
                (Some(c), Some(lo), Some(hi)) => Some(safe_ratio(c - lo, hi - lo, 0.5)),
                _ => None,
            })
            .collect(),
    ));

    for l in LAGS {
        columns.push((format!("close_lag_{}", l), lag(&close, l)));
        columns.push((format!("volume_lag_{}", l), lag(&volume, l)));
    }
    for w in ROLLING_WINDOWS {
        columns.push((format!("close_rolling_mean_{}", w), rolling_mean(&close, w)?));
        columns.push((format!("close_rolling_std_{}", w), rolling_std(&close, w)?));
        columns.push((format!("volume_rolling_mean_{}", w), rolling_mean(&volume, w)?));
    }
    Ok(columns)
}

impl PriceFeatureBuilder {
    pub fn new(target: PriceField, horizon: usize, min_rows: usize) -> Result<Self, PipelineError> {
        if horizon == 0 {
            return Err(PipelineError::invalid_config("horizon", "must be at least 1"));
        }
        Ok(Self {
            target,
            horizon,
            min_rows,
            layout: None,
            sma_windows: None,
        })
    }

    pub fn layout(&self) -> Option<&[String]> {
        self.layout.as_deref()
    }

    /// SMA window lengths fixed by the first `build`.
    pub fn sma_window_lengths(&self) -> Option<[usize; 4]> {
        self.sma_windows
    }

    fn check_order(bars: &[PriceBar]) -> Result<(), PipelineError> {
        match bars.windows(2).position(|w| w[1].timestamp < w[0].timestamp) {
            Some(idx) => Err(PipelineError::InvalidData {
                column: "timestamp".to_string(),
                reason: format!("bars are not sorted by time at row {}", idx + 1),
            }),
            None => Ok(()),
        }
    }

    fn feature_columns(&self, bars: &[PriceBar], windows: &[usize; 4]) -> Result<FeatureColumns, PipelineError> {
        let mut columns = indicator_columns(bars, windows)?;
        columns.retain(|(name, _)| name != self.target.as_str());
        Ok(columns)
    }

    /// Builds the training dataset. The first call fixes the feature layout
    /// and the SMA window lengths; later calls and inference reuse both.
    pub fn build(&mut self, bars: &[PriceBar]) -> Result<Dataset, PipelineError> {
        Self::check_order(bars)?;
        let windows = self.sma_windows.unwrap_or_else(|| sma_windows(bars.len()));
        let columns = self.feature_columns(bars, &windows)?;
        let names: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
        match &self.layout {
            Some(fixed) => check_layout(STAGE, fixed, &names)?,
            None => self.layout = Some(names),
        }
        self.sma_windows = Some(windows);
        let target = field(bars, |b| self.target.value(b));
        assemble(STAGE, &columns, &shift_forward(&target, self.horizon), self.min_rows)
    }

    /// Feature vector of the most recent bar in the fixed layout.
    pub fn build_inference_features(&self, bars: &[PriceBar]) -> Result<Vec<f64>, PipelineError> {
        let (layout, windows) = match (&self.layout, &self.sma_windows) {
            (Some(layout), Some(windows)) => (layout, windows),
            _ => {
                return Err(PipelineError::NotTrained {
                    name: STAGE.to_string(),
                });
            }
        };
        Self::check_order(bars)?;
        latest_row(STAGE, layout, &self.feature_columns(bars, windows)?)
    }
}
