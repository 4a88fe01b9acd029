#[cfg(test)]
mod tests {
    use super::super::indicators::*;
    use analysis_core::Bar;
    use chrono::Utc;

    fn sample_prices() -> Vec<f64> {
        vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ]
    }

    fn sample_bars() -> Vec<Bar> {
        let prices = vec![
            (100.0, 102.0, 99.0, 101.0),
            (101.0, 103.0, 100.0, 102.0),
            (102.0, 104.0, 101.0, 103.0),
            (103.0, 105.0, 102.0, 104.0),
            (104.0, 106.0, 103.0, 105.0),
            (105.0, 107.0, 104.0, 106.0),
            (106.0, 108.0, 105.0, 107.0),
            (107.0, 109.0, 106.0, 108.0),
            (108.0, 110.0, 107.0, 109.0),
            (109.0, 111.0, 108.0, 110.0),
            (110.0, 112.0, 109.0, 111.0),
            (111.0, 113.0, 110.0, 112.0),
            (112.0, 114.0, 111.0, 113.0),
            (113.0, 115.0, 112.0, 114.0),
            (114.0, 116.0, 113.0, 115.0),
        ];

        prices
            .into_iter()
            .enumerate()
            .map(|(i, (open, high, low, close))| Bar {
                timestamp: Utc::now() - chrono::Duration::days(15 - i as i64),
                open,
                high,
                low,
                close,
                volume: 1_000_000.0,
                vwap: None,
            })
            .collect()
    }

    #[test]
    fn test_sma_basic() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&data, 3);

        assert_eq!(result.len(), 3);
        assert!((result[0] - 2.0).abs() < 0.001);
        assert!((result[1] - 3.0).abs() < 0.001);
        assert!((result[2] - 4.0).abs() < 0.001);
    }

    #[test]
    fn test_sma_insufficient_data() {
        let data = vec![1.0, 2.0];
        assert_eq!(sma(&data, 5).len(), 0);
    }

    #[test]
    fn test_sma_real_prices() {
        let prices = sample_prices();
        let result = sma(&prices, 5);

        assert!(!result.is_empty());
        let expected_first = (44.34 + 44.09 + 44.15 + 43.61 + 44.33) / 5.0;
        assert!((result[0] - expected_first).abs() < 0.01);
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let data = vec![22.0, 24.0, 23.0, 25.0, 26.0];
        let result = ema(&data, 3);

        // output aligned like sma: one value per window starting at index period-1
        assert_eq!(result.len(), data.len() - 3 + 1);
        let first_sma = (22.0 + 24.0 + 23.0) / 3.0;
        assert!((result[0] - first_sma).abs() < 0.01);
    }

    #[test]
    fn test_ema_insufficient_data() {
        let data: Vec<f64> = vec![1.0, 2.0];
        assert_eq!(ema(&data, 5).len(), 0);
    }

    #[test]
    fn test_ema_increases_with_uptrend() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let result = ema(&data, 3);

        for i in 1..result.len() {
            assert!(result[i] > result[i - 1]);
        }
    }

    #[test]
    fn test_rsi_basic() {
        let prices = sample_prices();
        let result = rsi(&prices, 14);

        assert!(!result.is_empty());
        for &value in &result {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let data = vec![1.0, 2.0, 3.0];
        assert_eq!(rsi(&data, 14).len(), 0);
    }

    #[test]
    fn test_rsi_overbought_in_uptrend() {
        let mut uptrend = vec![100.0];
        for i in 1..20 {
            uptrend.push(100.0 + i as f64);
        }

        let result = rsi(&uptrend, 14);
        assert!(result.last().unwrap() > &70.0);
    }

    #[test]
    fn test_macd_basic() {
        let prices = sample_prices();
        let result = macd(&prices, 12, 26, 9);
        // 20 prices is short for a 26-period slow EMA; exercise the empty-result path.
        assert!(result.macd_line.is_empty());
        assert_eq!(result.histogram.len(), result.signal_line.len());
    }

    #[test]
    fn test_macd_histogram_matches_difference() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.3).collect();
        let result = macd(&prices, 12, 26, 9);

        assert!(!result.macd_line.is_empty());
        let offset = result.macd_line.len() - result.signal_line.len();
        for (i, &hist) in result.histogram.iter().enumerate() {
            let expected = result.macd_line[i + offset] - result.signal_line[i];
            assert!((hist - expected).abs() < 0.001);
        }
    }

    #[test]
    fn test_bollinger_bands_basic() {
        let prices = sample_prices();
        let result = bollinger_bands(&prices, 10, 2.0);

        assert_eq!(result.upper.len(), result.middle.len());
        assert_eq!(result.middle.len(), result.lower.len());
        for i in 0..result.upper.len() {
            assert!(result.upper[i] > result.middle[i]);
            assert!(result.middle[i] > result.lower[i]);
        }
    }

    #[test]
    fn test_bollinger_bands_narrow_on_flat_prices() {
        let prices = vec![100.0; 20];
        let result = bollinger_bands(&prices, 10, 2.0);

        for i in 0..result.upper.len() {
            assert!(result.upper[i] - result.lower[i] < 1.0);
        }
    }

    #[test]
    fn test_atr_basic() {
        let bars = sample_bars();
        let result = atr(&bars, 14);

        assert!(!result.is_empty());
        for &value in &result {
            assert!(value > 0.0);
        }
    }

    #[test]
    fn test_atr_insufficient_data() {
        let bars = sample_bars()[..5].to_vec();
        assert_eq!(atr(&bars, 14).len(), 0);
    }

    #[test]
    fn test_atr_increases_with_volatility() {
        let bars = sample_bars();
        let normal_atr = atr(&bars, 5);

        let mut volatile_bars = sample_bars();
        for bar in &mut volatile_bars {
            bar.high += 10.0;
            bar.low -= 10.0;
        }
        let volatile_atr = atr(&volatile_bars, 5);

        assert!(volatile_atr[0] > normal_atr[0]);
    }

    #[test]
    fn test_stochastic_basic() {
        let bars = sample_bars();
        let result = stochastic(&bars, 14, 3);

        assert!(!result.k.is_empty());
        assert!(!result.d.is_empty());
        for &value in &result.k {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_stochastic_insufficient_data() {
        let bars = sample_bars()[..5].to_vec();
        assert_eq!(stochastic(&bars, 14, 3).k.len(), 0);
    }

    #[test]
    fn test_adx_basic() {
        let bars: Vec<Bar> = (0..40)
            .map(|i| Bar {
                timestamp: Utc::now() - chrono::Duration::days(40 - i),
                open: 100.0 + i as f64,
                high: 102.0 + i as f64,
                low: 99.0 + i as f64,
                close: 101.0 + i as f64,
                volume: 1_000_000.0,
                vwap: None,
            })
            .collect();

        let result = adx(&bars, 14);
        assert!(!result.adx.is_empty());
        for &value in &result.adx {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_volatility_zero_for_constant_prices() {
        let prices = vec![100.0; 30];
        let result = volatility(&prices, 10);

        assert!(!result.is_empty());
        for &v in &result {
            assert!(v.abs() < 1e-9);
        }
    }

    #[test]
    fn test_correlation_perfectly_correlated_series() {
        let a: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let b: Vec<f64> = (0..30).map(|i| 50.0 + i as f64 * 2.0).collect();

        let result = correlation(&a, &b, 10);
        assert!(!result.is_empty());
        for &c in &result {
            assert!((c - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_beta_of_series_against_itself_is_one() {
        let prices: Vec<f64> = sample_prices();
        let b = beta(&prices, &prices);
        assert!((b - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_beta_nan_on_insufficient_data() {
        let prices = vec![100.0, 101.0];
        assert!(beta(&prices, &prices).is_nan());
    }
}
