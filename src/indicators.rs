//! Thin contract over the 13 named technical indicators used by the scoring
//! stage. Ground truth: `original_source/tests/unit/indicators/*.py`
//! (warmup counts, degenerate values); library calls generalized from
//! `signals/momentum.rs`, `signals/trend.rs`, `signals/volatility.rs`.

use std::ops::Index;

use rust_ti::other_indicators::single::average_true_range;
use rust_ti::{candle_indicators, momentum_indicators, standard_indicators, ConstantModelType, DeviationModel};

use crate::domain::PriceBar;
use crate::error::DomainError;

/// Positional-index wrapper over a numeric sequence, matching the vendor
/// `pd.Series` ergonomics the original indicators were written against.
#[derive(Debug, Clone)]
pub struct Series(pub Vec<f64>);

impl Series {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Index<usize> for Series {
    type Output = f64;
    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}

impl From<Vec<f64>> for Series {
    fn from(v: Vec<f64>) -> Self {
        Series(v)
    }
}

fn insufficient(detail: impl Into<String>) -> DomainError {
    DomainError::InsufficientData {
        ticker: "*".to_string(),
        source_name: "indicators".to_string(),
        detail: detail.into(),
    }
}

fn closes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close.to_string().parse().unwrap_or(f64::NAN)).collect()
}

fn highs(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.high.to_string().parse().unwrap_or(f64::NAN)).collect()
}

fn lows(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.low.to_string().parse().unwrap_or(f64::NAN)).collect()
}

fn volumes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume as f64).collect()
}

/// Left-pads a shorter "valid region" result with NaN so the output aligns
/// 1:1 with the input length, matching the vendor warmup convention.
fn pad_front(values: Vec<f64>, total_len: usize) -> Vec<f64> {
    let missing = total_len.saturating_sub(values.len());
    let mut out = vec![f64::NAN; missing];
    out.extend(values);
    out
}

/// Most recent non-NaN value, i.e. the signal the scoring stage consumes.
pub fn latest_signal(series: &[f64]) -> Option<f64> {
    series.iter().rev().find(|v| !v.is_nan()).copied()
}

pub const RSI_PERIOD: usize = 14;

/// Wilder's RSI. Warmup `RSI_PERIOD`; all-gains -> 100, all-losses -> 0.
pub fn rsi(close: &[f64]) -> Result<Vec<f64>, DomainError> {
    if close.len() < RSI_PERIOD + 1 {
        return Err(insufficient(format!(
            "rsi requires at least {} closes, got {}",
            RSI_PERIOD + 1,
            close.len()
        )));
    }
    let values = standard_indicators::bulk::rsi(close);
    Ok(pad_front(values, close.len()))
}

pub const STOCH_RSI_PERIOD: usize = 14;

/// Stochastic oscillator of the RSI series; RSI-flat windows degrade to 50.
pub fn stoch_rsi(close: &[f64]) -> Result<Vec<f64>, DomainError> {
    let rsi_values = rsi(close)?;
    let n = rsi_values.len();
    if n < STOCH_RSI_PERIOD {
        return Err(insufficient("stoch_rsi requires a full RSI warmup window"));
    }
    let mut out = vec![f64::NAN; n];
    for end in STOCH_RSI_PERIOD..=n {
        let window = &rsi_values[end - STOCH_RSI_PERIOD..end];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let lo = window.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let last = window[window.len() - 1];
        let value = if (hi - lo).abs() < f64::EPSILON {
            50.0
        } else {
            (last - lo) / (hi - lo) * 100.0
        };
        out[end - 1] = value;
    }
    Ok(out)
}

pub const WILLIAMS_R_PERIOD: usize = 14;

/// Williams %R. Zero high-low range over the window degrades to -50.
pub fn williams_r(high: &[f64], low: &[f64], close: &[f64]) -> Result<Vec<f64>, DomainError> {
    let n = close.len();
    if n < WILLIAMS_R_PERIOD {
        return Err(insufficient("williams_r requires a full period window"));
    }
    let mut out = vec![f64::NAN; n];
    for end in WILLIAMS_R_PERIOD..=n {
        let start = end - WILLIAMS_R_PERIOD;
        let hi = high[start..end].iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let lo = low[start..end].iter().cloned().fold(f64::INFINITY, f64::min);
        let value = if (hi - lo).abs() < f64::EPSILON {
            -50.0
        } else {
            (hi - close[end - 1]) / (hi - lo) * -100.0
        };
        out[end - 1] = value;
    }
    Ok(out)
}

pub const ADX_PERIOD: usize = 14;

/// Average Directional Index via Wilder's smoothing of +DI/-DI.
pub fn adx(high: &[f64], low: &[f64], close: &[f64]) -> Result<Vec<f64>, DomainError> {
    let n = close.len();
    if n < ADX_PERIOD * 2 {
        return Err(insufficient(format!(
            "adx requires at least {} bars, got {}",
            ADX_PERIOD * 2,
            n
        )));
    }

    let mut tr = vec![0.0; n];
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];
        plus_dm[i] = if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 };
        minus_dm[i] = if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 };
        tr[i] = (high[i] - low[i])
            .max((high[i] - close[i - 1]).abs())
            .max((low[i] - close[i - 1]).abs());
    }

    let wilder_smooth = |values: &[f64]| -> Vec<f64> {
        let mut smoothed = vec![f64::NAN; n];
        let seed: f64 = values[1..=ADX_PERIOD].iter().sum();
        smoothed[ADX_PERIOD] = seed;
        for i in (ADX_PERIOD + 1)..n {
            smoothed[i] = smoothed[i - 1] - (smoothed[i - 1] / ADX_PERIOD as f64) + values[i];
        }
        smoothed
    };

    let tr_smooth = wilder_smooth(&tr);
    let plus_smooth = wilder_smooth(&plus_dm);
    let minus_smooth = wilder_smooth(&minus_dm);

    let mut dx = vec![f64::NAN; n];
    for i in ADX_PERIOD..n {
        if tr_smooth[i].abs() < f64::EPSILON {
            dx[i] = 0.0;
            continue;
        }
        let plus_di = 100.0 * plus_smooth[i] / tr_smooth[i];
        let minus_di = 100.0 * minus_smooth[i] / tr_smooth[i];
        let sum = plus_di + minus_di;
        dx[i] = if sum.abs() < f64::EPSILON {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / sum
        };
    }

    let mut out = vec![f64::NAN; n];
    let adx_start = ADX_PERIOD * 2 - 1;
    if adx_start < n {
        let seed: f64 = dx[ADX_PERIOD..adx_start + 1].iter().sum::<f64>() / ADX_PERIOD as f64;
        out[adx_start] = seed;
        for i in (adx_start + 1)..n {
            out[i] = (out[i - 1] * (ADX_PERIOD as f64 - 1.0) + dx[i]) / ADX_PERIOD as f64;
        }
    }
    Ok(out)
}

pub const ROC_PERIOD: usize = 10;

/// Rate of change: `(close - close[n-period]) / close[n-period] * 100`.
pub fn roc(close: &[f64]) -> Result<Vec<f64>, DomainError> {
    if close.len() < ROC_PERIOD + 1 {
        return Err(insufficient("roc requires at least period+1 closes"));
    }
    let mut out = vec![f64::NAN; close.len()];
    for i in ROC_PERIOD..close.len() {
        let base = close[i - ROC_PERIOD];
        out[i] = if base.abs() < f64::EPSILON {
            f64::NAN
        } else {
            (close[i] - base) / base * 100.0
        };
    }
    Ok(out)
}

pub const SUPERTREND_PERIOD: usize = 10;
pub const SUPERTREND_MULTIPLIER: f64 = 3.0;

/// Supertrend line; the signal is `1.0` (price above line, bullish) or
/// `-1.0` (price below, bearish) rather than the raw line value.
pub fn supertrend(high: &[f64], low: &[f64], close: &[f64]) -> Result<Vec<f64>, DomainError> {
    let n = close.len();
    if n < SUPERTREND_PERIOD {
        return Err(insufficient("supertrend requires at least period bars"));
    }
    let line = candle_indicators::bulk::supertrend(
        high,
        low,
        close,
        ConstantModelType::SimpleMovingAverage,
        SUPERTREND_MULTIPLIER,
        SUPERTREND_PERIOD,
    );
    let padded = pad_front(line, n);
    Ok(close
        .iter()
        .zip(padded.iter())
        .map(|(&c, &s)| if s.is_nan() { f64::NAN } else if c >= s { 1.0 } else { -1.0 })
        .collect())
}

pub const ATR_PERIOD: usize = 14;

/// Average True Range normalized by close, expressed as a percentage.
pub fn atr_percent(high: &[f64], low: &[f64], close: &[f64]) -> Result<Vec<f64>, DomainError> {
    let n = close.len();
    if n < ATR_PERIOD {
        return Err(insufficient("atr_percent requires at least period bars"));
    }
    let mut out = vec![f64::NAN; n];
    for end in ATR_PERIOD..=n {
        let start = end - ATR_PERIOD;
        let atr = average_true_range(
            &close[start..end],
            &high[start..end],
            &low[start..end],
            ConstantModelType::SimpleMovingAverage,
        );
        let last_close = close[end - 1];
        out[end - 1] = if last_close.abs() < f64::EPSILON { 0.0 } else { atr / last_close * 100.0 };
    }
    Ok(out)
}

pub const BB_PERIOD: usize = 20;
pub const BB_NUM_STD: f64 = 2.0;

/// Bollinger Band width as a fraction of the middle band; zero stddev -> 0.
pub fn bb_width(close: &[f64]) -> Result<Vec<f64>, DomainError> {
    let n = close.len();
    if n < BB_PERIOD {
        return Err(insufficient("bb_width requires at least period closes"));
    }
    let bands = candle_indicators::bulk::moving_constant_bands(
        close,
        ConstantModelType::SimpleMovingAverage,
        DeviationModel::StandardDeviation,
        BB_NUM_STD,
        BB_PERIOD,
    );
    let widths: Vec<f64> = bands
        .iter()
        .map(|&(lower, middle, upper)| if middle.abs() < f64::EPSILON { 0.0 } else { (upper - lower) / middle })
        .collect();
    Ok(pad_front(widths, n))
}

pub const KELTNER_PERIOD: usize = 20;
pub const KELTNER_MULTIPLIER: f64 = 2.0;

/// Keltner Channel width as a fraction of the middle (EMA) line.
pub fn keltner_width(high: &[f64], low: &[f64], close: &[f64]) -> Result<Vec<f64>, DomainError> {
    let n = close.len();
    if n < KELTNER_PERIOD {
        return Err(insufficient("keltner_width requires at least period bars"));
    }
    let channel = candle_indicators::bulk::keltner_channel(
        high,
        low,
        close,
        ConstantModelType::ExponentialMovingAverage,
        ConstantModelType::SimpleMovingAverage,
        KELTNER_MULTIPLIER,
        KELTNER_PERIOD,
    );
    let widths: Vec<f64> = channel
        .iter()
        .map(|&(lower, middle, upper)| if middle.abs() < f64::EPSILON { 0.0 } else { (upper - lower) / middle })
        .collect();
    Ok(pad_front(widths, n))
}

pub const OBV_SLOPE_PERIOD: usize = 5;

/// On-balance volume, reduced to its linear-regression slope over a
/// trailing window (signed trend strength rather than the raw cumulant).
pub fn obv_trend(close: &[f64], volume: &[f64]) -> Result<Vec<f64>, DomainError> {
    if close.len() < OBV_SLOPE_PERIOD + 1 {
        return Err(insufficient("obv_trend requires at least slope_period+1 bars"));
    }
    let obv = momentum_indicators::bulk::on_balance_volume(close, volume, 0.0);
    Ok(pad_front(linear_slope_series(&obv, OBV_SLOPE_PERIOD), close.len()))
}

pub const RELATIVE_VOLUME_PERIOD: usize = 20;

/// Current volume divided by the trailing average; zero average yields NaN.
pub fn relative_volume(volume: &[f64]) -> Result<Vec<f64>, DomainError> {
    let n = volume.len();
    if n < RELATIVE_VOLUME_PERIOD + 1 {
        return Err(insufficient("relative_volume requires at least period+1 bars"));
    }
    let mut out = vec![f64::NAN; n];
    for i in RELATIVE_VOLUME_PERIOD..n {
        let window = &volume[i - RELATIVE_VOLUME_PERIOD..i];
        let avg: f64 = window.iter().sum::<f64>() / RELATIVE_VOLUME_PERIOD as f64;
        out[i] = if avg.abs() < f64::EPSILON { f64::NAN } else { volume[i] / avg };
    }
    Ok(out)
}

pub const AD_SLOPE_PERIOD: usize = 5;

/// Accumulation/Distribution line, reduced to its trailing slope.
pub fn ad_trend(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Result<Vec<f64>, DomainError> {
    let n = close.len();
    if n < AD_SLOPE_PERIOD + 1 {
        return Err(insufficient("ad_trend requires at least slope_period+1 bars"));
    }
    let mut ad = vec![0.0; n];
    let mut cumulative = 0.0;
    for i in 0..n {
        let range = high[i] - low[i];
        let mfm = if range.abs() < f64::EPSILON {
            0.0
        } else {
            ((close[i] - low[i]) - (high[i] - close[i])) / range
        };
        cumulative += mfm * volume[i];
        ad[i] = cumulative;
    }
    Ok(pad_front(linear_slope_series(&ad, AD_SLOPE_PERIOD), n))
}

pub const SMA_SHORT_PERIOD: usize = 20;
pub const SMA_LONG_PERIOD: usize = 50;

/// `(short_sma - long_sma) / long_sma`, clamped to `[-1, 1]` — the
/// composite alignment score `determine_direction` consumes directly.
pub fn sma_alignment(close: &[f64]) -> Result<Vec<f64>, DomainError> {
    let n = close.len();
    if n < SMA_LONG_PERIOD {
        return Err(insufficient("sma_alignment requires at least the long-SMA period"));
    }
    let mut out = vec![f64::NAN; n];
    for i in (SMA_LONG_PERIOD - 1)..n {
        let short_sma: f64 =
            close[i + 1 - SMA_SHORT_PERIOD..=i].iter().sum::<f64>() / SMA_SHORT_PERIOD as f64;
        let long_sma: f64 =
            close[i + 1 - SMA_LONG_PERIOD..=i].iter().sum::<f64>() / SMA_LONG_PERIOD as f64;
        out[i] = if long_sma.abs() < f64::EPSILON {
            0.0
        } else {
            ((short_sma - long_sma) / long_sma).clamp(-1.0, 1.0)
        };
    }
    Ok(out)
}

pub const VWAP_PERIOD: usize = 20;

/// `(close - vwap) / vwap` over a rolling typical-price VWAP window.
pub fn vwap_deviation(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Result<Vec<f64>, DomainError> {
    let n = close.len();
    if n < VWAP_PERIOD {
        return Err(insufficient("vwap_deviation requires at least period bars"));
    }
    let mut out = vec![f64::NAN; n];
    for end in VWAP_PERIOD..=n {
        let start = end - VWAP_PERIOD;
        let mut pv_sum = 0.0;
        let mut v_sum = 0.0;
        for i in start..end {
            let typical = (high[i] + low[i] + close[i]) / 3.0;
            pv_sum += typical * volume[i];
            v_sum += volume[i];
        }
        let vwap = if v_sum.abs() < f64::EPSILON { close[end - 1] } else { pv_sum / v_sum };
        out[end - 1] = if vwap.abs() < f64::EPSILON { 0.0 } else { (close[end - 1] - vwap) / vwap };
    }
    Ok(out)
}

/// Ordinary-least-squares slope of `y` against `0..period` over each
/// trailing window; used to reduce OBV/AD cumulants to a signed trend.
fn linear_slope_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if n < period {
        return out;
    }
    let xs: Vec<f64> = (0..period).map(|i| i as f64).collect();
    let x_mean = xs.iter().sum::<f64>() / period as f64;
    let denom: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    for end in period..=n {
        let window = &values[end - period..end];
        let y_mean = window.iter().sum::<f64>() / period as f64;
        let numer: f64 = xs
            .iter()
            .zip(window.iter())
            .map(|(x, y)| (x - x_mean) * (y - y_mean))
            .sum();
        out[end - 1] = if denom.abs() < f64::EPSILON { 0.0 } else { numer / denom };
    }
    out
}

/// Runs every indicator over a bar slice and collects the most recent
/// non-NaN value of each, keyed by indicator name — the map the scoring
/// stage consumes. Indicators that fail their minimum-data check are
/// simply absent from the map rather than failing the whole scan.
pub fn compute_all(bars: &[PriceBar]) -> std::collections::HashMap<String, f64> {
    let close = closes(bars);
    let high = highs(bars);
    let low = lows(bars);
    let volume = volumes(bars);

    let mut signals = std::collections::HashMap::new();
    let mut insert = |name: &str, result: Result<Vec<f64>, DomainError>| {
        if let Ok(series) = result {
            if let Some(value) = latest_signal(&series) {
                signals.insert(name.to_string(), value);
            }
        }
    };

    insert("rsi", rsi(&close));
    insert("stoch_rsi", stoch_rsi(&close));
    insert("williams_r", williams_r(&high, &low, &close));
    insert("adx", adx(&high, &low, &close));
    insert("roc", roc(&close));
    insert("supertrend", supertrend(&high, &low, &close));
    insert("atr_percent", atr_percent(&high, &low, &close));
    insert("bb_width", bb_width(&close));
    insert("keltner_width", keltner_width(&high, &low, &close));
    insert("obv_trend", obv_trend(&close, &volume));
    insert("relative_volume", relative_volume(&volume));
    insert("ad_trend", ad_trend(&high, &low, &close, &volume));
    insert("sma_alignment", sma_alignment(&close));
    insert("vwap_deviation", vwap_deviation(&high, &low, &close, &volume));

    signals
}
