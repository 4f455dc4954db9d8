//! Periodogram band-power ratios.

use crate::error::{BeatError, BeatResult};
use log::warn;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// One-sided power spectral density.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Periodogram {
    pub freqs: Vec<f64>,
    pub power: Vec<f64>,
}

/// Fraction of spectral power in `[0, f_low)`, `[f_low, f_med)` and
/// `[f_med, f_high)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralRatios {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

impl SpectralRatios {
    fn flatline() -> Self {
        Self {
            low: 1.0,
            mid: 0.0,
            high: 0.0,
        }
    }
}

/// Constant-detrended, boxcar-windowed periodogram scaled as a density (V²/Hz).
pub fn periodogram(signal: &[f64], fs: f64) -> Periodogram {
    let n = signal.len();
    if n == 0 {
        return Periodogram::default();
    }
    let mean = signal.iter().sum::<f64>() / n as f64;
    let mut buffer: Vec<f64> = signal.iter().map(|x| x - mean).collect();

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut spectrum = fft.make_output_vec();
    if let Err(e) = fft.process(&mut buffer, &mut spectrum) {
        warn!("periodogram FFT failed: {}", e);
        return Periodogram::default();
    }

    let scale = 1.0 / (fs * n as f64);
    let nyquist_bin = if n % 2 == 0 { Some(n / 2) } else { None };
    let power = spectrum
        .iter()
        .enumerate()
        .map(|(k, c)| {
            let p = c.norm_sqr() * scale;
            if k == 0 || Some(k) == nyquist_bin {
                p
            } else {
                2.0 * p
            }
        })
        .collect();
    let freqs = (0..spectrum.len())
        .map(|k| k as f64 * fs / n as f64)
        .collect();
    Periodogram { freqs, power }
}

/// Band-power ratios over three bands split at `f_low`, `f_med` and `f_high`.
///
/// Each band boundary is the first frequency bin strictly above the edge.
/// When the spectrum ends before an edge, the missing bands take the remainder
/// of a unit total. A flat signal gives `(1, 0, 0)`. Edges must be ordered.
pub fn spectral_ratios(
    signal: &[f64],
    fs: f64,
    f_low: f64,
    f_med: f64,
    f_high: f64,
) -> BeatResult<SpectralRatios> {
    if !(fs > 0.0 && 0.0 <= f_low && f_low <= f_med && f_med <= f_high) {
        return Err(BeatError::invalid(format!(
            "band edges must satisfy 0 <= f_low <= f_med <= f_high, got ({}, {}, {})",
            f_low, f_med, f_high
        )));
    }
    let pg = periodogram(signal, fs);
    let above = |edge: f64| pg.freqs.iter().position(|&f| f > edge);
    let band = |from: usize, to: usize| pg.power[from..to].iter().sum::<f64>();

    let (a1, a2, a3) = match above(f_low) {
        None => (1.0, 0.0, 0.0),
        Some(i_low) => {
            let a1 = band(0, i_low);
            match above(f_med) {
                None => (a1, 1.0 - a1, 0.0),
                Some(i_med) => {
                    let a2 = band(i_low, i_med);
                    let a3 = match above(f_high) {
                        Some(i_high) => band(i_med, i_high),
                        None => 1.0 - a1 - a2,
                    };
                    (a1, a2, a3)
                }
            }
        }
    };

    let total = a1 + a2 + a3;
    if total == 0.0 {
        return Ok(SpectralRatios::flatline());
    }
    Ok(SpectralRatios {
        low: a1 / total,
        mid: a2 / total,
        high: a3 / total,
    })
}
