use analysis_core::Bar;
use statrs::statistics::Statistics;

/// Return val if it is finite, otherwise return default.
#[inline]
pub fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

/// Return val if it is finite, otherwise NaN — for indicators where an
/// undefined value must propagate as NaN rather than fall back to a
/// placeholder (e.g. correlation/beta with zero-variance input).
#[inline]
pub fn nan_or(val: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        f64::NAN
    }
}

/// Simple Moving Average. Output is aligned to the input: `result[i]` is the
/// average of the window ending at `data[i + period - 1]`.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(finite_or(sum / period as f64, 0.0));
    }
    result
}

/// Exponential Moving Average, seeded with SMA(period) at index `period - 1`.
/// Output is aligned to the input the same way `sma` is: `result[0]`
/// corresponds to the window ending at `data[period - 1]`.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut result = Vec::with_capacity(data.len() - period + 1);

    let sma_seed: f64 = finite_or(data[..period].iter().sum::<f64>() / period as f64, 0.0);
    result.push(sma_seed);

    for i in period..data.len() {
        let prev_ema = *result.last().unwrap();
        let ema_val = (data[i] - prev_ema) * multiplier + prev_ema;
        result.push(finite_or(ema_val, prev_ema));
    }

    result
}

/// Relative Strength Index, Wilder-smoothed.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let mut gains = Vec::new();
    let mut losses = Vec::new();

    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut rsi_values = Vec::with_capacity(data.len() - period);

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;

        let rs = if avg_loss == 0.0 {
            100.0
        } else {
            avg_gain / avg_loss
        };

        let rsi = 100.0 - (100.0 / (1.0 + rs));
        rsi_values.push(finite_or(rsi, 50.0));
    }

    rsi_values
}

/// MACD (Moving Average Convergence Divergence)
pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(data: &[f64], fast_period: usize, slow_period: usize, signal_period: usize) -> MacdResult {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || slow_period < fast_period {
        return MacdResult {
            macd_line: vec![],
            signal_line: vec![],
            histogram: vec![],
        };
    }

    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);

    let offset = slow_period - fast_period;
    let mut macd_line = Vec::new();
    if offset < ema_fast.len() {
        for i in offset..ema_fast.len() {
            macd_line.push(ema_fast[i] - ema_slow[i - offset]);
        }
    }

    let signal_line = ema(&macd_line, signal_period);

    let mut histogram = Vec::new();
    let hist_offset = macd_line.len().saturating_sub(signal_line.len());
    for i in 0..signal_line.len() {
        histogram.push(macd_line[i + hist_offset] - signal_line[i]);
    }

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

/// Bollinger Bands
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    if period == 0 || data.len() < period {
        return BollingerBands {
            upper: vec![],
            middle: vec![],
            lower: vec![],
        };
    }

    let middle = sma(data, period);
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for i in period - 1..data.len() {
        let slice = &data[i + 1 - period..=i];
        let mean = middle[i + 1 - period];
        let variance: f64 = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();

        upper.push(finite_or(mean + std_dev * std, mean));
        lower.push(finite_or(mean - std_dev * std, mean));
    }

    BollingerBands { upper, middle, lower }
}

/// Average True Range, Wilder-smoothed.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return vec![];
    }

    let mut true_ranges = Vec::new();
    for i in 1..bars.len() {
        let high_low = bars[i].high - bars[i].low;
        let high_close = (bars[i].high - bars[i - 1].close).abs();
        let low_close = (bars[i].low - bars[i - 1].close).abs();
        true_ranges.push(high_low.max(high_close).max(low_close));
    }

    let mut atr_values = Vec::new();
    let mut atr = finite_or(true_ranges[..period].iter().sum::<f64>() / period as f64, 0.0);
    atr_values.push(atr);

    for tr in &true_ranges[period..] {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
        atr_values.push(finite_or(atr, 0.0));
    }

    atr_values
}

/// Stochastic Oscillator
pub struct StochasticResult {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> StochasticResult {
    if k_period == 0 || bars.len() < k_period {
        return StochasticResult { k: vec![], d: vec![] };
    }

    let mut k_values = Vec::new();
    for i in k_period - 1..bars.len() {
        let slice = &bars[i + 1 - k_period..=i];
        let highest = slice.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let lowest = slice.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);

        let k = if highest == lowest {
            50.0
        } else {
            100.0 * (bars[i].close - lowest) / (highest - lowest)
        };

        k_values.push(finite_or(k, 50.0));
    }

    let d_values = sma(&k_values, d_period);
    StochasticResult { k: k_values, d: d_values }
}

/// Average Directional Index (ADX) — measures trend strength (0-100)
pub struct AdxResult {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

pub fn adx(bars: &[Bar], period: usize) -> AdxResult {
    if period == 0 || bars.len() < period * 2 + 1 {
        return AdxResult {
            adx: vec![],
            plus_di: vec![],
            minus_di: vec![],
        };
    }

    let mut plus_dm = Vec::with_capacity(bars.len() - 1);
    let mut minus_dm = Vec::with_capacity(bars.len() - 1);
    let mut true_range = Vec::with_capacity(bars.len() - 1);

    for i in 1..bars.len() {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dm.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });

        let hl = bars[i].high - bars[i].low;
        let hc = (bars[i].high - bars[i - 1].close).abs();
        let lc = (bars[i].low - bars[i - 1].close).abs();
        true_range.push(hl.max(hc).max(lc));
    }

    let mut smoothed_plus_dm = plus_dm[..period].iter().sum::<f64>();
    let mut smoothed_minus_dm = minus_dm[..period].iter().sum::<f64>();
    let mut smoothed_tr = true_range[..period].iter().sum::<f64>();

    let mut plus_di_values = Vec::new();
    let mut minus_di_values = Vec::new();
    let mut dx_values = Vec::new();

    for i in period..plus_dm.len() {
        smoothed_plus_dm = smoothed_plus_dm - smoothed_plus_dm / period as f64 + plus_dm[i];
        smoothed_minus_dm = smoothed_minus_dm - smoothed_minus_dm / period as f64 + minus_dm[i];
        smoothed_tr = smoothed_tr - smoothed_tr / period as f64 + true_range[i];

        let pdi = if smoothed_tr > 0.0 { 100.0 * smoothed_plus_dm / smoothed_tr } else { 0.0 };
        let mdi = if smoothed_tr > 0.0 { 100.0 * smoothed_minus_dm / smoothed_tr } else { 0.0 };

        plus_di_values.push(pdi);
        minus_di_values.push(mdi);

        let di_sum = pdi + mdi;
        let dx = if di_sum > 0.0 { 100.0 * (pdi - mdi).abs() / di_sum } else { 0.0 };
        dx_values.push(dx);
    }

    if dx_values.len() < period {
        return AdxResult {
            adx: vec![],
            plus_di: plus_di_values,
            minus_di: minus_di_values,
        };
    }

    let mut adx_values = Vec::new();
    let mut adx_val = finite_or(dx_values[..period].iter().sum::<f64>() / period as f64, 0.0);
    adx_values.push(adx_val);

    for dx in &dx_values[period..] {
        adx_val = (adx_val * (period - 1) as f64 + dx) / period as f64;
        adx_values.push(finite_or(adx_val, 0.0));
    }

    AdxResult {
        adx: adx_values,
        plus_di: plus_di_values,
        minus_di: minus_di_values,
    }
}

/// Annualized rolling volatility (stddev of simple daily returns × sqrt(252)).
/// NaN when the window has fewer than 2 returns.
pub fn volatility(closes: &[f64], period: usize) -> Vec<f64> {
    if period < 2 || closes.len() < period + 1 {
        return vec![];
    }

    let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
    let mut out = Vec::with_capacity(returns.len() - period + 1);

    for i in period - 1..returns.len() {
        let window = &returns[i + 1 - period..=i];
        let std = window.to_vec().std_dev();
        out.push(nan_or(std * (252.0_f64).sqrt()));
    }

    out
}

/// Pearson correlation between two equal-length return series over a rolling
/// window. NaN where either series has zero variance in the window.
pub fn correlation(a_closes: &[f64], b_closes: &[f64], period: usize) -> Vec<f64> {
    let n = a_closes.len().min(b_closes.len());
    if period < 2 || n < period + 1 {
        return vec![];
    }

    let a_rets: Vec<f64> = a_closes[a_closes.len() - n..].windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
    let b_rets: Vec<f64> = b_closes[b_closes.len() - n..].windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();

    let mut out = Vec::new();
    for i in period - 1..a_rets.len() {
        let aw = &a_rets[i + 1 - period..=i];
        let bw = &b_rets[i + 1 - period..=i];
        let a_mean = aw.iter().sum::<f64>() / period as f64;
        let b_mean = bw.iter().sum::<f64>() / period as f64;

        let mut cov = 0.0;
        let mut a_var = 0.0;
        let mut b_var = 0.0;
        for j in 0..period {
            let da = aw[j] - a_mean;
            let db = bw[j] - b_mean;
            cov += da * db;
            a_var += da * da;
            b_var += db * db;
        }

        let denom = (a_var * b_var).sqrt();
        out.push(nan_or(if denom > 0.0 { cov / denom } else { f64::NAN }));
    }

    out
}

/// Beta of `closes` against `benchmark_closes`: cov(r, r_bench) / var(r_bench),
/// computed over daily returns across the whole overlapping history.
pub fn beta(closes: &[f64], benchmark_closes: &[f64]) -> f64 {
    let n = closes.len().min(benchmark_closes.len());
    if n < 3 {
        return f64::NAN;
    }

    let rets: Vec<f64> = closes[closes.len() - n..].windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
    let bench_rets: Vec<f64> = benchmark_closes[benchmark_closes.len() - n..]
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();

    let r_mean = rets.iter().sum::<f64>() / rets.len() as f64;
    let b_mean = bench_rets.iter().sum::<f64>() / bench_rets.len() as f64;

    let mut cov = 0.0;
    let mut var = 0.0;
    for i in 0..rets.len() {
        let dr = rets[i] - r_mean;
        let db = bench_rets[i] - b_mean;
        cov += dr * db;
        var += db * db;
    }

    nan_or(if var > 0.0 { cov / var } else { f64::NAN })
}
