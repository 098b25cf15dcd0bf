use ndarray::{Array1, ArrayView1};

use super::error::AlignmentError;

/// Piecewise-linear map from one clock domain to another.
///
/// Built from simultaneous readings of both clocks (typically the scan frame times as seen
/// by two acquisition computers). Queries between readings interpolate, queries outside of
/// them extrapolate along the first or last segment.
#[derive(Debug, Clone)]
pub struct ClockAligner {
    source: Vec<f64>,
    target: Vec<f64>,
}

impl ClockAligner {
    /// Fit the map `source_times -> target_times`.
    ///
    /// Arrays of different length are truncated to the shorter one. Unsorted source times
    /// are sorted together with their targets.
    pub fn new(
        source_times: ArrayView1<'_, f64>,
        target_times: ArrayView1<'_, f64>,
    ) -> Result<Self, AlignmentError> {
        let n_samples = source_times.len().min(target_times.len());
        if source_times.len() != target_times.len() {
            spdlog::warn!(
                "Clock readings differ in length ({} vs {}); dropping the last {} samples of the longer clock",
                source_times.len(),
                target_times.len(),
                source_times.len().abs_diff(target_times.len())
            );
        }
        if n_samples < 2 {
            let (clock, len) = if source_times.len() < target_times.len() {
                ("source", source_times.len())
            } else {
                ("target", target_times.len())
            };
            return Err(AlignmentError::TooFewSamples { clock, len });
        }

        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n_samples);
        for (index, (s, t)) in source_times
            .iter()
            .zip(target_times.iter())
            .take(n_samples)
            .enumerate()
        {
            if !s.is_finite() {
                return Err(AlignmentError::NonFinite {
                    clock: "source",
                    index,
                });
            }
            if !t.is_finite() {
                return Err(AlignmentError::NonFinite {
                    clock: "target",
                    index,
                });
            }
            pairs.push((*s, *t));
        }

        if pairs.windows(2).any(|w| w[1].0 < w[0].0) {
            spdlog::warn!("Source clock readings are not monotonic; sorting them before alignment");
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        }

        let (source, target) = pairs.into_iter().unzip();
        Ok(Self { source, target })
    }

    /// Number of readings used for the fit
    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Map a single source-clock time into the target clock
    pub fn map(&self, time: f64) -> f64 {
        let last = self.source.len() - 1;
        // Index of the segment [lo, lo + 1] used for this time
        let upper = self.source.partition_point(|&s| s <= time);
        let lo = upper.clamp(1, last) - 1;
        let (x0, x1) = (self.source[lo], self.source[lo + 1]);
        let (y0, y1) = (self.target[lo], self.target[lo + 1]);
        if x1 == x0 {
            return y0;
        }
        y0 + (time - x0) * (y1 - y0) / (x1 - x0)
    }

    /// Map every time in `times` into the target clock
    pub fn align(&self, times: ArrayView1<'_, f64>) -> Array1<f64> {
        times.mapv(|t| self.map(t))
    }
}

/// One-shot alignment: fit `reference_times -> reference_samples` and evaluate at `query_times`.
pub fn align(
    reference_times: ArrayView1<'_, f64>,
    reference_samples: ArrayView1<'_, f64>,
    query_times: ArrayView1<'_, f64>,
) -> Result<Array1<f64>, AlignmentError> {
    Ok(ClockAligner::new(reference_times, reference_samples)?.align(query_times))
}
