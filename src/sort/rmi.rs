//! Two-layer learned CDF model (a recursive model index with one root and a
//! row of linear leaves).
//!
//! The root maps an encoded key to a leaf index; the selected leaf maps the
//! key to a normalized rank in `[0, 1]`. Leaves are fitted so the piecewise
//! function is continuous across leaf boundaries and covers `[0, 1]` even
//! when many leaves receive no training data.

use std::fmt;

use super::key::Embedding;

/// Affine map from an encoded key to a position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinearModel {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearModel {
    #[inline(always)]
    pub fn eval(&self, key: u64) -> f64 {
        self.slope * key as f64 + self.intercept
    }

    /// Line through `lo` and `hi`. A zero or negative key span yields a
    /// flat line at `lo.y`.
    fn interpolate(lo: TrainingPoint, hi: TrainingPoint) -> Self {
        let dx = hi.key as f64 - lo.key as f64;
        if dx <= 0.0 {
            return LinearModel {
                slope: 0.0,
                intercept: lo.y,
            };
        }
        let slope = (hi.y - lo.y) / dx;
        LinearModel {
            slope,
            intercept: lo.y - slope * lo.key as f64,
        }
    }

    fn flat(y: f64) -> Self {
        LinearModel {
            slope: 0.0,
            intercept: y,
        }
    }
}

/// One training sample: an encoded key and its normalized rank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingPoint {
    pub key: u64,
    pub y: f64,
}

/// Model hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmiParams {
    /// Scatter fan-out used by the in-memory sort.
    pub fanout: usize,
    /// Fraction of the input drawn as training sample, in `(0, 1]`.
    pub sampling_rate: f64,
    /// Segment size at or below which the in-memory sort uses insertion sort.
    pub threshold: usize,
    pub num_leaf_models: usize,
}

impl RmiParams {
    pub const DEFAULT_FANOUT: usize = 1_000;
    pub const DEFAULT_SAMPLING_RATE: f64 = 0.1;
    pub const DEFAULT_THRESHOLD: usize = 100;
    pub const DEFAULT_NUM_LEAF_MODELS: usize = 1_000;
    /// Lower bound on the training sample size.
    pub const MIN_SORTING_SIZE: usize = 10_000;

    pub fn new(sampling_rate: f64, fanout: usize, threshold: usize) -> Self {
        RmiParams {
            fanout,
            sampling_rate,
            threshold,
            num_leaf_models: Self::DEFAULT_NUM_LEAF_MODELS,
        }
    }

    /// Replace out-of-range values with their defaults for an input of
    /// `input_size` elements. Returns the corrections applied.
    pub fn sanitize(&mut self, input_size: usize) -> Vec<ParamCorrection> {
        let mut corrections = Vec::new();

        if self.fanout == 0 || self.fanout >= input_size {
            corrections.push(ParamCorrection::Fanout {
                given: self.fanout,
                used: Self::DEFAULT_FANOUT,
            });
            self.fanout = Self::DEFAULT_FANOUT;
        }

        if !(self.sampling_rate > 0.0 && self.sampling_rate <= 1.0) {
            corrections.push(ParamCorrection::SamplingRate {
                given: self.sampling_rate,
                used: Self::DEFAULT_SAMPLING_RATE,
            });
            self.sampling_rate = Self::DEFAULT_SAMPLING_RATE;
        }

        if self.threshold == 0
            || self.threshold >= input_size
            || self.threshold >= input_size / self.fanout
        {
            corrections.push(ParamCorrection::Threshold {
                given: self.threshold,
                used: Self::DEFAULT_THRESHOLD,
            });
            self.threshold = Self::DEFAULT_THRESHOLD;
        }

        if self.num_leaf_models == 0 {
            corrections.push(ParamCorrection::NumLeafModels {
                given: 0,
                used: Self::DEFAULT_NUM_LEAF_MODELS,
            });
            self.num_leaf_models = Self::DEFAULT_NUM_LEAF_MODELS;
        }

        corrections
    }
}

impl Default for RmiParams {
    fn default() -> Self {
        RmiParams {
            fanout: Self::DEFAULT_FANOUT,
            sampling_rate: Self::DEFAULT_SAMPLING_RATE,
            threshold: Self::DEFAULT_THRESHOLD,
            num_leaf_models: Self::DEFAULT_NUM_LEAF_MODELS,
        }
    }
}

/// A hyperparameter that training replaced with its default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamCorrection {
    Fanout { given: usize, used: usize },
    SamplingRate { given: f64, used: f64 },
    Threshold { given: usize, used: usize },
    NumLeafModels { given: usize, used: usize },
}

impl fmt::Display for ParamCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamCorrection::Fanout { given, used } => {
                write!(f, "invalid fanout {}, using default ({})", given, used)
            }
            ParamCorrection::SamplingRate { given, used } => {
                write!(f, "invalid sampling rate {}, using default ({})", given, used)
            }
            ParamCorrection::Threshold { given, used } => {
                write!(f, "invalid threshold {}, using default ({})", given, used)
            }
            ParamCorrection::NumLeafModels { given, used } => {
                write!(
                    f,
                    "invalid number of leaf models {}, using default ({})",
                    given, used
                )
            }
        }
    }
}

/// Outcome of a training call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainReport {
    pub corrections: Vec<ParamCorrection>,
    /// Number of elements actually drawn into the training sample.
    pub sample_size: usize,
}

impl TrainReport {
    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty()
    }
}

/// Two-layer learned CDF model.
///
/// The sample borrows records from the buffer the model was trained on, so
/// the model cannot outlive that buffer.
#[derive(Debug, Clone)]
pub struct CdfModel<'a> {
    trained: bool,
    root: LinearModel,
    leaves: Vec<LinearModel>,
    sample: Vec<Embedding<'a>>,
    params: RmiParams,
}

impl<'a> CdfModel<'a> {
    pub fn new(params: RmiParams) -> Self {
        CdfModel {
            trained: false,
            root: LinearModel::default(),
            leaves: Vec::new(),
            sample: Vec::new(),
            params,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn params(&self) -> &RmiParams {
        &self.params
    }

    pub fn root(&self) -> &LinearModel {
        &self.root
    }

    pub fn leaves(&self) -> &[LinearModel] {
        &self.leaves
    }

    /// Sorted training sample.
    pub fn sample(&self) -> &[Embedding<'a>] {
        &self.sample
    }

    /// Fit the model on `data`. Training happens once; later calls are
    /// no-ops that return an empty report.
    pub fn train(&mut self, data: &[Embedding<'a>]) -> TrainReport {
        if self.trained {
            return TrainReport {
                corrections: Vec::new(),
                sample_size: self.sample.len(),
            };
        }

        let input_size = data.len();
        let corrections = self.params.sanitize(input_size);
        let num_leaves = self.params.num_leaf_models;

        self.sample = draw_sample(data, self.params.sampling_rate);
        self.sample.sort_by(|a, b| a.cmp_key(b));

        // Root: min key -> 0, max key -> 1, stretched over the leaf row.
        let n = self.sample.len();
        let points: Vec<TrainingPoint> = self
            .sample
            .iter()
            .enumerate()
            .map(|(i, e)| TrainingPoint {
                key: e.converted_key,
                y: i as f64 / n as f64,
            })
            .collect();

        self.root = match (points.first(), points.last()) {
            (Some(&min), Some(&max)) => {
                let fit = LinearModel::interpolate(
                    TrainingPoint { key: min.key, y: 0.0 },
                    TrainingPoint { key: max.key, y: 1.0 },
                );
                let stretch = (num_leaves - 1) as f64;
                LinearModel {
                    slope: fit.slope * stretch,
                    intercept: fit.intercept * stretch,
                }
            }
            _ => LinearModel::default(),
        };

        let mut buckets: Vec<Vec<TrainingPoint>> = vec![Vec::new(); num_leaves];
        for p in points {
            buckets[self.leaf_index(p.key)].push(p);
        }

        self.leaves = fit_leaves(&mut buckets);
        self.trained = true;

        TrainReport {
            corrections,
            sample_size: n,
        }
    }

    /// Leaf selected by the root for `key`.
    #[inline]
    pub fn leaf_index(&self, key: u64) -> usize {
        let last = self.params.num_leaf_models.saturating_sub(1) as i64;
        // `as` saturates and maps NaN to 0.
        (self.root.eval(key) as i64).clamp(0, last) as usize
    }

    /// Predicted position of `key` in `[0, scale - 1]`.
    #[inline]
    pub fn predict(&self, key: u64, scale: usize) -> usize {
        if scale == 0 || self.leaves.is_empty() {
            return 0;
        }
        let leaf = &self.leaves[self.leaf_index(key)];
        let scaled = scale as f64 * leaf.eval(key);
        (scaled as i64).clamp(0, scale as i64 - 1) as usize
    }
}

/// Draw roughly `max(rate * n, MIN_SORTING_SIZE)` evenly strided elements.
fn draw_sample<'a>(data: &[Embedding<'a>], sampling_rate: f64) -> Vec<Embedding<'a>> {
    let n = data.len();
    let wanted = ((sampling_rate * n as f64) as usize).max(RmiParams::MIN_SORTING_SIZE);
    let sample_size = n.min(wanted);
    if sample_size == 0 {
        return Vec::new();
    }
    let stride = (n / sample_size).max(1);
    data.iter().step_by(stride).copied().collect()
}

/// Fit one linear model per leaf in increasing index order.
///
/// Empty leaves push a synthetic point so the next leaf always finds its
/// lower anchor one step back.
pub(crate) fn fit_leaves(buckets: &mut [Vec<TrainingPoint>]) -> Vec<LinearModel> {
    let num_leaves = buckets.len();
    let mut leaves = Vec::with_capacity(num_leaves);

    for idx in 0..num_leaves {
        let model = if idx == 0 {
            let cur = &mut buckets[0];
            if cur.len() < 2 {
                cur.push(TrainingPoint { key: 0, y: 0.0 });
                LinearModel::flat(0.0)
            } else {
                let min = cur[0];
                let max = cur[cur.len() - 1];
                LinearModel::interpolate(TrainingPoint { key: min.key, y: 0.0 }, max)
            }
        } else {
            let (before, rest) = buckets.split_at_mut(idx);
            let prev = before[idx - 1][before[idx - 1].len() - 1];
            let cur = &mut rest[0];
            let is_last = idx == num_leaves - 1;

            match (cur.last().copied(), is_last) {
                (None, true) => LinearModel::flat(1.0),
                (Some(max), true) => {
                    LinearModel::interpolate(prev, TrainingPoint { key: max.key, y: 1.0 })
                }
                (None, false) => {
                    cur.push(prev);
                    LinearModel::flat(prev.y)
                }
                (Some(max), false) => LinearModel::interpolate(prev, max),
            }
        };
        leaves.push(model);
    }

    leaves
}

impl fmt::Display for CdfModel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[0][0]: slope={:.2e}; intercept={:.2e};",
            self.root.slope, self.root.intercept
        )?;
        for (idx, leaf) in self.leaves.iter().enumerate() {
            writeln!(
                f,
                "[{}][1]: slope={:.2e}; intercept={:.2e};",
                idx, leaf.slope, leaf.intercept
            )?;
        }
        write!(f, "-----------------------------")
    }
}
