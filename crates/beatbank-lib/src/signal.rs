use serde::{Deserialize, Serialize};

/// Single-channel uniformly sampled signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Multi-channel signal stored frame by frame: sample `t` of channel `c`
/// lives at `data[t * channels + c]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiChannelSeries {
    pub fs: f64,
    pub channels: usize,
    /// One name per channel (lead names such as `MLII`, `V1`).
    pub names: Vec<String>,
    pub data: Vec<f64>,
}

impl MultiChannelSeries {
    /// Interleave per-channel sample vectors. Channels are truncated to the
    /// shortest one.
    pub fn from_channels(fs: f64, names: Vec<String>, channels: &[Vec<f64>]) -> Self {
        let n_channels = channels.len();
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        let mut data = Vec::with_capacity(frames * n_channels);
        for t in 0..frames {
            for ch in channels {
                data.push(ch[t]);
            }
        }
        Self {
            fs,
            channels: n_channels,
            names,
            data,
        }
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Copy one channel out as a `TimeSeries`.
    pub fn channel(&self, ch: usize) -> Option<TimeSeries> {
        if ch >= self.channels {
            return None;
        }
        let data = self
            .data
            .iter()
            .skip(ch)
            .step_by(self.channels)
            .copied()
            .collect();
        Some(TimeSeries { fs: self.fs, data })
    }

    pub fn channel_name(&self, ch: usize) -> String {
        self.names
            .get(ch)
            .cloned()
            .unwrap_or_else(|| format!("ch{}", ch))
    }
}

/// Borrowed view handed to the beat extractor.
#[derive(Debug, Clone, Copy)]
pub enum SignalRef<'a> {
    Single(&'a [f64]),
    Multi { data: &'a [f64], channels: usize },
}

impl<'a> SignalRef<'a> {
    pub fn channels(&self) -> usize {
        match self {
            SignalRef::Single(_) => 1,
            SignalRef::Multi { channels, .. } => *channels,
        }
    }

    /// Length in frames.
    pub fn len(&self) -> usize {
        match self {
            SignalRef::Single(data) => data.len(),
            SignalRef::Multi { data, channels } => {
                if *channels == 0 {
                    0
                } else {
                    data.len() / channels
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy frames `start..end`. With `first_only` a multi-channel view yields
    /// channel 0 alone.
    pub(crate) fn copy_frames(&self, start: usize, end: usize, first_only: bool) -> Vec<f64> {
        match self {
            SignalRef::Single(data) => data[start..end].to_vec(),
            SignalRef::Multi { data, channels } => {
                let frames = &data[start * channels..end * channels];
                if first_only {
                    frames.iter().step_by(*channels).copied().collect()
                } else {
                    frames.to_vec()
                }
            }
        }
    }
}

impl<'a> From<&'a [f64]> for SignalRef<'a> {
    fn from(data: &'a [f64]) -> Self {
        SignalRef::Single(data)
    }
}

impl<'a> From<&'a Vec<f64>> for SignalRef<'a> {
    fn from(data: &'a Vec<f64>) -> Self {
        SignalRef::Single(data.as_slice())
    }
}

impl<'a> From<&'a TimeSeries> for SignalRef<'a> {
    fn from(ts: &'a TimeSeries) -> Self {
        SignalRef::Single(&ts.data)
    }
}

impl<'a> From<&'a MultiChannelSeries> for SignalRef<'a> {
    fn from(ms: &'a MultiChannelSeries) -> Self {
        if ms.channels == 1 {
            SignalRef::Single(&ms.data)
        } else {
            SignalRef::Multi {
                data: &ms.data,
                channels: ms.channels,
            }
        }
    }
}

/// Point events on a timeline (e.g., R-peaks indices)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }
}

/// Annotated beats: sample index and annotation symbol, in parallel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledEvents {
    pub indices: Vec<usize>,
    pub symbols: Vec<String>,
}

/// Keep or remove annotations by symbol.
#[derive(Debug, Clone, Copy)]
pub enum AnnotationFilter<'a> {
    Keep(&'a [&'a str]),
    Remove(&'a [&'a str]),
}

impl<'a> AnnotationFilter<'a> {
    pub fn accepts(&self, symbol: &str) -> bool {
        match self {
            AnnotationFilter::Keep(keep) => keep.contains(&symbol),
            AnnotationFilter::Remove(remove) => !remove.contains(&symbol),
        }
    }
}

impl LabeledEvents {
    pub fn push(&mut self, index: usize, symbol: impl Into<String>) {
        self.indices.push(index);
        self.symbols.push(symbol.into());
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn filtered(&self, filter: AnnotationFilter<'_>) -> Self {
        let mut out = Self::default();
        for (&idx, sym) in self.indices.iter().zip(&self.symbols) {
            if filter.accepts(sym) {
                out.push(idx, sym.clone());
            }
        }
        out
    }

    pub fn events(&self) -> Events {
        Events::from_indices(self.indices.clone())
    }
}

/// RR intervals in samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<usize>,
}

impl RRSeries {
    /// Consecutive differences; expects strictly increasing indices.
    pub fn from_indices(indices: &[usize]) -> Self {
        let rr = indices.windows(2).map(|w| w[1] - w[0]).collect();
        Self { rr }
    }
}
