//! Beat segmentation around detected QRS locations.
//!
//! Each beat gets a window that reaches `prop_left` of the previous RR
//! interval to the left and `1 - prop_left` of the next RR interval to the
//! right. Intervals outside the physiological band are replaced by the mean of
//! the in-band intervals. Beats whose window would cross the signal edges are
//! dropped silently.

use crate::error::{BeatError, BeatResult};
use crate::signal::{RRSeries, SignalRef};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Accepted RR band in samples, exclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RrLimits {
    pub low: usize,
    pub high: usize,
}

impl Default for RrLimits {
    /// 200 bpm and 30 bpm at 360 Hz.
    fn default() -> Self {
        Self {
            low: 108,
            high: 720,
        }
    }
}

impl RrLimits {
    pub fn new(low: usize, high: usize) -> Self {
        Self { low, high }
    }

    /// Band for a heart-rate range at sampling frequency `fs`.
    pub fn from_bpm(fs: f64, max_bpm: f64, min_bpm: f64) -> Self {
        Self {
            low: (60.0 * fs / max_bpm).round() as usize,
            high: (60.0 * fs / min_bpm).round() as usize,
        }
    }

    pub fn contains(&self, rr: f64) -> bool {
        (self.low as f64) < rr && rr < (self.high as f64)
    }

    fn validate(&self) -> BeatResult<()> {
        if self.low == 0 || self.low >= self.high {
            return Err(BeatError::invalid(format!(
                "rr limits must satisfy 0 < low < high, got ({}, {})",
                self.low, self.high
            )));
        }
        Ok(())
    }
}

/// Which channels of a multi-channel signal end up in each segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelMode {
    #[default]
    All,
    FirstOnly,
}

/// Windowing parameters shared by both extraction modes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatWindowConfig {
    /// Fraction of the window that lies left of the beat index.
    pub prop_left: f64,
    pub rr_limits: RrLimits,
    /// Fixed window width in samples. Bypasses RR-adaptive sizing.
    pub fixed_width: Option<usize>,
    pub channel_mode: ChannelMode,
}

impl Default for BeatWindowConfig {
    fn default() -> Self {
        Self {
            prop_left: 0.3,
            rr_limits: RrLimits::default(),
            fixed_width: None,
            channel_mode: ChannelMode::All,
        }
    }
}

impl BeatWindowConfig {
    pub fn validate(&self) -> BeatResult<()> {
        if !(self.prop_left > 0.0 && self.prop_left < 1.0) {
            return Err(BeatError::invalid(format!(
                "prop_left must lie in (0, 1), got {}",
                self.prop_left
            )));
        }
        if self.fixed_width == Some(0) {
            return Err(BeatError::invalid("fixed_width must be positive"));
        }
        if self.fixed_width.is_none() {
            self.rr_limits.validate()?;
        }
        Ok(())
    }
}

/// Owned copy of one beat window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatSegment {
    /// Absolute index of the first frame in the source signal.
    pub start: usize,
    /// Channels per frame; 1 for one-dimensional segments.
    pub channels: usize,
    /// Frame-major samples, same layout as the source.
    pub data: Vec<f64>,
}

impl BeatSegment {
    /// Length in frames.
    pub fn len(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exclusive end index in the source signal.
    pub fn end(&self) -> usize {
        self.start + self.len()
    }

    pub fn channel(&self, ch: usize) -> Vec<f64> {
        if ch >= self.channels {
            return Vec::new();
        }
        self.data
            .iter()
            .skip(ch)
            .step_by(self.channels)
            .copied()
            .collect()
    }
}

/// Extracted beats and each beat's center relative to its segment start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedBeats {
    pub segments: Vec<BeatSegment>,
    pub centers: Vec<usize>,
}

impl ExtractedBeats {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BeatSegment, usize)> {
        self.segments.iter().zip(self.centers.iter().copied())
    }

    /// Absolute beat indices of the emitted segments.
    pub fn beat_indices(&self) -> Vec<usize> {
        self.iter().map(|(seg, center)| seg.start + center).collect()
    }

    fn push(&mut self, segment: BeatSegment, center: usize) {
        self.segments.push(segment);
        self.centers.push(center);
    }
}

/// Beat classes used by the MIT-BIH style annotation symbols.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeatType {
    Normal,
    Lbbb,
    Rbbb,
    Ventricular,
    Other(String),
}

impl BeatType {
    pub fn from_symbol(symbol: &str) -> Self {
        match symbol {
            "N" => BeatType::Normal,
            "L" => BeatType::Lbbb,
            "R" => BeatType::Rbbb,
            "V" => BeatType::Ventricular,
            other => BeatType::Other(other.to_string()),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            BeatType::Normal => "N",
            BeatType::Lbbb => "L",
            BeatType::Rbbb => "R",
            BeatType::Ventricular => "V",
            BeatType::Other(s) => s,
        }
    }
}

impl FromStr for BeatType {
    type Err = BeatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(BeatError::invalid("empty beat symbol"));
        }
        Ok(BeatType::from_symbol(trimmed))
    }
}

impl fmt::Display for BeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Extract every beat whose window fits inside the signal.
pub fn extract_beats<'a>(
    signal: impl Into<SignalRef<'a>>,
    beat_inds: &[usize],
    cfg: &BeatWindowConfig,
) -> BeatResult<ExtractedBeats> {
    extract_selected(signal.into(), beat_inds, cfg, |_| true)
}

/// Extract only the beats labelled `wanted`. Every beat, whatever its label,
/// still contributes to the RR context of its neighbours.
pub fn extract_beats_by_type<'a, L: PartialEq>(
    signal: impl Into<SignalRef<'a>>,
    beat_inds: &[usize],
    beat_types: &[L],
    wanted: &L,
    cfg: &BeatWindowConfig,
) -> BeatResult<ExtractedBeats> {
    if beat_types.len() != beat_inds.len() {
        return Err(BeatError::invalid(format!(
            "{} beat labels for {} beat indices",
            beat_types.len(),
            beat_inds.len()
        )));
    }
    extract_selected(signal.into(), beat_inds, cfg, |i| beat_types[i] == *wanted)
}

fn validate_indices(beat_inds: &[usize]) -> BeatResult<()> {
    if beat_inds.len() < 2 {
        return Err(BeatError::invalid(format!(
            "at least 2 beat indices are needed, got {}",
            beat_inds.len()
        )));
    }
    if let Some(pos) = beat_inds.windows(2).position(|w| w[1] <= w[0]) {
        return Err(BeatError::invalid(format!(
            "beat indices must be strictly increasing ({} then {} at position {})",
            beat_inds[pos],
            beat_inds[pos + 1],
            pos + 1
        )));
    }
    Ok(())
}

/// Mean of the intervals strictly inside `limits`.
pub fn mean_rr(rr: &[usize], limits: RrLimits) -> BeatResult<f64> {
    let (sum, count) = rr
        .iter()
        .map(|&r| r as f64)
        .filter(|&r| limits.contains(r))
        .fold((0.0, 0usize), |(sum, count), r| (sum + r, count + 1));
    if count == 0 {
        return Err(BeatError::InsufficientData {
            low: limits.low,
            high: limits.high,
        });
    }
    Ok(sum / count as f64)
}

enum WindowSizer {
    Fixed {
        left: usize,
        right: usize,
    },
    Adaptive {
        prop_left: f64,
        limits: RrLimits,
        mean_rr: f64,
    },
}

impl WindowSizer {
    fn new(rr: &[usize], cfg: &BeatWindowConfig) -> BeatResult<Self> {
        match cfg.fixed_width {
            Some(width) => {
                let left = (width as f64 * cfg.prop_left).floor() as usize;
                Ok(WindowSizer::Fixed {
                    left,
                    right: width - left,
                })
            }
            None => {
                let mean_rr = mean_rr(rr, cfg.rr_limits)?;
                debug!("mean in-band RR: {:.2} samples", mean_rr);
                Ok(WindowSizer::Adaptive {
                    prop_left: cfg.prop_left,
                    limits: cfg.rr_limits,
                    mean_rr,
                })
            }
        }
    }

    /// `(len_left, len_right)` for the beat at position `i`.
    fn window(&self, rr: &[usize], i: usize) -> (usize, usize) {
        match *self {
            WindowSizer::Fixed { left, right } => (left, right),
            WindowSizer::Adaptive {
                prop_left,
                limits,
                mean_rr,
            } => {
                let constrain = |r: usize| {
                    let r = r as f64;
                    if limits.contains(r) {
                        r
                    } else {
                        mean_rr
                    }
                };
                let rr_prev = constrain(rr[i.saturating_sub(1)]);
                let rr_next = constrain(rr[i.min(rr.len() - 1)]);
                let len_left = (rr_prev * prop_left).floor() as usize;
                let len_right = (rr_next * (1.0 - prop_left)).floor() as usize;
                (len_left, len_right)
            }
        }
    }
}

fn extract_selected<F>(
    signal: SignalRef<'_>,
    beat_inds: &[usize],
    cfg: &BeatWindowConfig,
    mut selected: F,
) -> BeatResult<ExtractedBeats>
where
    F: FnMut(usize) -> bool,
{
    validate_indices(beat_inds)?;
    cfg.validate()?;

    let rr = RRSeries::from_indices(beat_inds).rr;
    let sizer = WindowSizer::new(&rr, cfg)?;
    let sig_len = signal.len();
    let first_only = signal.channels() > 1 && cfg.channel_mode == ChannelMode::FirstOnly;
    let out_channels = if first_only { 1 } else { signal.channels() };

    let mut out = ExtractedBeats::default();
    for (i, &beat) in beat_inds.iter().enumerate() {
        if !selected(i) {
            continue;
        }
        let (len_left, len_right) = sizer.window(&rr, i);

        // The last sample is never part of a window.
        if beat < len_left || beat + len_right >= sig_len {
            debug!(
                "skipping beat {} at sample {}: window [-{}, +{}) crosses signal of {} samples",
                i, beat, len_left, len_right, sig_len
            );
            continue;
        }
        if len_right == 0 {
            debug!("skipping beat {} at sample {}: empty right window", i, beat);
            continue;
        }

        let start = beat - len_left;
        let data = signal.copy_frames(start, beat + len_right, first_only);
        out.push(
            BeatSegment {
                start,
                channels: out_channels,
                data,
            },
            len_left,
        );
    }

    debug!(
        "extracted {} of {} beats from {} samples",
        out.len(),
        beat_inds.len(),
        sig_len
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::MultiChannelSeries;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn ramp(len: usize) -> Vec<f64> {
        (0..len).map(|i| i as f64).collect()
    }

    #[test]
    fn skips_beats_near_the_edges() {
        let sig = ramp(1000);
        let inds = [5, 300, 600, 995];
        let cfg = BeatWindowConfig::default();
        let beats = extract_beats(&sig, &inds, &cfg).unwrap();

        let left = |rr: usize| (rr as f64 * 0.3).floor() as usize;
        let right = |rr: usize| (rr as f64 * (1.0 - 0.3)).floor() as usize;
        assert!(5 < left(295));
        assert!(995 + right(395) > 999);

        assert_eq!(beats.len(), 2);
        assert_eq!(beats.beat_indices(), vec![300, 600]);
        assert_eq!(beats.centers, vec![left(295), left(300)]);
        assert_eq!(beats.segments[0].start, 300 - left(295));
        assert_eq!(beats.segments[0].len(), left(295) + right(300));
        assert_eq!(beats.segments[1].len(), left(300) + right(395));
        // Copied straight from the source.
        assert_eq!(beats.segments[0].data[beats.centers[0]], 300.0);
    }

    #[test]
    fn out_of_band_intervals_use_mean_rr() {
        let sig = ramp(2000);
        let inds = [0, 50, 1000, 1500];
        let cfg = BeatWindowConfig {
            prop_left: 0.25,
            ..Default::default()
        };
        assert_eq!(mean_rr(&[50, 950, 500], cfg.rr_limits).unwrap(), 500.0);

        let beats = extract_beats(&sig, &inds, &cfg).unwrap();
        // 950 would give a 237 sample left side; the mean gives 125.
        assert_eq!(beats.beat_indices(), vec![1000, 1500]);
        assert_eq!(beats.centers, vec![125, 125]);
        assert_eq!(beats.segments[0].start, 875);
        assert_eq!(beats.segments[0].len(), 500);
        assert_eq!(beats.segments[1].end(), 1875);
    }

    #[test]
    fn first_and_last_beats_reuse_neighbouring_interval() {
        let sig = ramp(2000);
        let inds = [400, 800, 1200];
        let cfg = BeatWindowConfig {
            prop_left: 0.5,
            ..Default::default()
        };
        let beats = extract_beats(&sig, &inds, &cfg).unwrap();
        assert_eq!(beats.len(), 3);
        assert_eq!(beats.segments[0].start, 200);
        assert_eq!(beats.segments[2].end(), 1400);
    }

    #[test]
    fn fixed_width_ignores_rr() {
        let sig = ramp(3000);
        let inds = [300, 420, 1100, 1300, 2000, 2150];
        let labels = ["N"; 6];
        let cfg = BeatWindowConfig {
            prop_left: 0.25,
            fixed_width: Some(200),
            ..Default::default()
        };
        let beats = extract_beats_by_type(&sig, &inds, &labels, &"N", &cfg).unwrap();
        assert_eq!(beats.len(), inds.len());
        for (seg, center) in beats.iter() {
            assert_eq!(seg.len(), 200);
            assert_eq!(center, 50);
        }
    }

    #[test]
    fn fixed_width_does_not_need_in_band_intervals() {
        let sig = ramp(500);
        let inds = [100, 150, 200];
        let labels = [BeatType::Normal, BeatType::Normal, BeatType::Normal];
        let adaptive = BeatWindowConfig::default();
        assert!(matches!(
            extract_beats_by_type(&sig, &inds, &labels, &BeatType::Normal, &adaptive),
            Err(BeatError::InsufficientData { low: 108, high: 720 })
        ));
        let fixed = BeatWindowConfig {
            fixed_width: Some(40),
            ..adaptive
        };
        let beats =
            extract_beats_by_type(&sig, &inds, &labels, &BeatType::Normal, &fixed).unwrap();
        assert_eq!(beats.len(), 3);
    }

    #[test]
    fn labels_select_but_do_not_change_windows() {
        let sig = ramp(4000);
        let inds = [200, 520, 700, 1100, 1400, 1650, 2100, 2400, 2500, 2900, 3300];
        let labels: Vec<BeatType> = "N V N N L N V N R N N"
            .split(' ')
            .map(BeatType::from_symbol)
            .collect();
        let cfg = BeatWindowConfig::default();

        let all = extract_beats(&sig, &inds, &cfg).unwrap();
        let normal =
            extract_beats_by_type(&sig, &inds, &labels, &BeatType::Normal, &cfg).unwrap();
        let ventricular =
            extract_beats_by_type(&sig, &inds, &labels, &BeatType::Ventricular, &cfg).unwrap();

        for beat in normal.beat_indices() {
            let pos = inds.iter().position(|&b| b == beat).unwrap();
            assert_eq!(labels[pos], BeatType::Normal);
        }
        assert_eq!(ventricular.beat_indices(), vec![520, 2100]);

        for subset in [&normal, &ventricular] {
            for (seg, center) in subset.iter() {
                let k = all
                    .segments
                    .iter()
                    .position(|s| s.start == seg.start)
                    .expect("window present in unfiltered extraction");
                assert_eq!(&all.segments[k], seg);
                assert_eq!(all.centers[k], center);
            }
        }
        assert_eq!(normal.len() + ventricular.len() + 2, all.len());
    }

    #[test]
    fn multi_channel_segments_keep_layout() {
        let ch0 = ramp(1500);
        let ch1: Vec<f64> = ch0.iter().map(|v| -v).collect();
        let ms = MultiChannelSeries::from_channels(360.0, vec!["MLII".into(), "V1".into()], &[
            ch0, ch1,
        ]);
        let inds = [300, 600, 900, 1200];
        let labels = ['N', 'N', 'V', 'N'];

        let cfg = BeatWindowConfig::default();
        let both = extract_beats_by_type(&ms, &inds, &labels, &'N', &cfg).unwrap();
        assert_eq!(both.segments[0].channels, 2);
        let seg = &both.segments[0];
        assert_eq!(seg.data.len(), seg.len() * 2);
        assert_eq!(seg.channel(0)[both.centers[0]], 300.0);
        assert_eq!(seg.channel(1)[both.centers[0]], -300.0);

        let first = BeatWindowConfig {
            channel_mode: ChannelMode::FirstOnly,
            ..cfg
        };
        let single = extract_beats_by_type(&ms, &inds, &labels, &'N', &first).unwrap();
        assert_eq!(single.len(), both.len());
        for (a, b) in single.segments.iter().zip(both.segments.iter()) {
            assert_eq!(a.channels, 1);
            assert_eq!(a.data, b.channel(0));
        }
    }

    #[test]
    fn rejects_malformed_input() {
        let sig = ramp(1000);
        let cfg = BeatWindowConfig::default();
        let invalid = |r: BeatResult<ExtractedBeats>| matches!(r, Err(BeatError::InvalidInput(_)));

        assert!(invalid(extract_beats(&sig, &[100], &cfg)));
        assert!(invalid(extract_beats(&sig, &[100, 100, 400], &cfg)));
        assert!(invalid(extract_beats(&sig, &[400, 100], &cfg)));
        for prop_left in [0.0, 1.0, -0.2, f64::NAN] {
            let bad = BeatWindowConfig { prop_left, ..cfg };
            assert!(invalid(extract_beats(&sig, &[100, 400], &bad)));
        }
        let bad_limits = BeatWindowConfig {
            rr_limits: RrLimits::new(720, 108),
            ..cfg
        };
        assert!(invalid(extract_beats(&sig, &[100, 400], &bad_limits)));
        let zero_width = BeatWindowConfig {
            fixed_width: Some(0),
            ..cfg
        };
        assert!(invalid(extract_beats(&sig, &[100, 400], &zero_width)));
        assert!(invalid(extract_beats_by_type(
            &sig,
            &[100, 400],
            &["N"],
            &"N",
            &cfg
        )));
    }

    #[test]
    fn no_in_band_interval_is_insufficient_data() {
        let sig = ramp(1000);
        let err = extract_beats(&sig, &[0, 50, 100, 900], &BeatWindowConfig::default())
            .unwrap_err();
        assert_eq!(err, BeatError::InsufficientData { low: 108, high: 720 });
    }

    #[test]
    fn limits_from_heart_rate() {
        assert_eq!(RrLimits::from_bpm(360.0, 200.0, 30.0), RrLimits::default());
        assert_eq!(RrLimits::from_bpm(360.0, 200.0, 40.0).high, 540);
    }

    #[test]
    fn parses_beat_symbols() {
        assert_eq!("V".parse::<BeatType>().unwrap(), BeatType::Ventricular);
        assert_eq!(BeatType::from_symbol("A").to_string(), "A");
        assert!("  ".parse::<BeatType>().is_err());
    }

    #[test]
    fn random_inputs_hold_segment_invariants() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let sig_len = rng.gen_range(50..5000);
            let sig: Vec<f64> = (0..sig_len).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let n = rng.gen_range(2..30);
            let mut inds = Vec::with_capacity(n);
            let mut pos = rng.gen_range(0..200);
            for _ in 0..n {
                inds.push(pos);
                pos += rng.gen_range(1..800);
            }
            let cfg = BeatWindowConfig {
                prop_left: rng.gen_range(0.05..0.95),
                ..Default::default()
            };
            let beats = match extract_beats(&sig, &inds, &cfg) {
                Ok(beats) => beats,
                Err(BeatError::InsufficientData { .. }) => continue,
                Err(e) => panic!("unexpected error {}", e),
            };
            assert_eq!(beats.segments.len(), beats.centers.len());
            assert!(beats.len() <= inds.len());
            for (seg, center) in beats.iter() {
                assert!(center < seg.len());
                assert!(seg.end() <= sig_len);
                assert_eq!(seg.data.as_slice(), &sig[seg.start..seg.end()]);
            }
            assert_eq!(extract_beats(&sig, &inds, &cfg).unwrap(), beats);
        }
    }
}
