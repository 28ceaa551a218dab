//! Statistical authorship analysis of a sealed epoch chain.
//!
//! A pure function of the finalized chain: edit timing and shape are
//! scored against patterns typical of human composition, producing a
//! probability-like score in `[0, 1]`. Two hard anomalies short-circuit
//! the whole analysis (an edit storm inside a single epoch, or a single
//! oversized paste). Everything else is a weighted sum of component
//! scores, each itself in `[0, 1]`.

use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics};

use crate::chain::Epoch;
use crate::delta::{flatten_ops, DeltaOp};

// =============================================================================
// Constants
// =============================================================================

/// Operations per epoch above which the chain is treated as an edit storm.
pub const MAX_OPS_PER_EPOCH: usize = 200;

/// Characters in a single insert above which it is treated as a paste.
pub const MAX_INSERT_RUN: usize = 100;

/// Gap separating micro-bursts within an epoch, in seconds.
const BURST_GAP_SECONDS: f64 = 2.0;

/// Typical human typing speed, chars per second.
const SPEED_MEAN_CPS: f64 = 5.0;
const SPEED_SIGMA_CPS: f64 = 3.0;

/// Fixed score for the edit-storm short-circuit.
const SCORE_EDIT_STORM: f64 = 0.05;

/// Fixed score for the large-paste short-circuit.
const SCORE_LARGE_PASTE: f64 = 0.10;

/// Neutral component score when there is not enough data to judge.
const NEUTRAL: f64 = 0.5;

const WEIGHT_MICRO_BURSTS: f64 = 0.15;
const WEIGHT_REVISION: f64 = 0.15;
const WEIGHT_MOMENTUM: f64 = 0.10;
const WEIGHT_SEMANTIC: f64 = 0.10;
const WEIGHT_CONSISTENCY: f64 = 0.05;
const WEIGHT_BURST_VARIANCE: f64 = 0.15;
const WEIGHT_PAUSE_RATIO: f64 = 0.10;
const WEIGHT_EDIT_ENTROPY: f64 = 0.10;
const WEIGHT_SPEED: f64 = 0.10;

// =============================================================================
// Report types
// =============================================================================

/// Per-component scores, each in `[0, 1]`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScores {
    pub micro_bursts: f64,
    pub revision_coherence: f64,
    pub momentum: f64,
    pub semantic_coherence: f64,
    pub cross_epoch_consistency: f64,
    pub burst_variance_ratio: f64,
    pub pause_ratio: f64,
    pub edit_type_entropy: f64,
    pub typing_speed: f64,
    /// Set only when a short-circuit anomaly fired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_reason: Option<String>,
}

/// Raw chain measurements backing the component scores.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMetrics {
    pub epoch_count: usize,
    pub total_ops: usize,
    pub inserted_chars: usize,
    pub deleted_chars: u64,
    pub total_duration: f64,
    pub mean_chars_per_sec: f64,
    /// 10th/25th/50th/75th/90th percentiles of per-epoch char rates.
    pub rate_percentiles: [f64; 5],
    /// Epoch numbers whose duration is a >3-sigma outlier.
    pub duration_outliers: Vec<u64>,
}

/// Result of analyzing a sealed chain.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorshipReport {
    pub human_score: f64,
    pub details: ComponentScores,
    pub metrics: ChainMetrics,
}

// =============================================================================
// Preprocessing
// =============================================================================

struct EpochSample {
    epoch_number: u64,
    duration: f64,
    ops: Vec<DeltaOp>,
    inserted_chars: usize,
}

impl EpochSample {
    fn char_rate(&self) -> f64 {
        if self.duration > 0.0 {
            self.inserted_chars as f64 / self.duration
        } else {
            0.0
        }
    }
}

fn sample_epoch(epoch: &Epoch) -> EpochSample {
    let ops = flatten_ops(&epoch.deltas);
    let inserted_chars = ops.iter().map(DeltaOp::insert_len).sum();
    EpochSample {
        epoch_number: epoch.epoch_number,
        duration: epoch.epoch_duration,
        ops,
        inserted_chars,
    }
}

// =============================================================================
// Entry point
// =============================================================================

/// Analyzes the sealed chain. Genesis is skipped; an empty chain yields a
/// neutral report.
pub fn analyze(epochs: &[Epoch]) -> AuthorshipReport {
    let samples: Vec<EpochSample> = epochs
        .iter()
        .filter(|e| e.epoch_number > 0)
        .map(sample_epoch)
        .collect();

    if samples.is_empty() {
        return AuthorshipReport {
            human_score: NEUTRAL,
            ..AuthorshipReport::default()
        };
    }

    // Hard anomalies first; they bypass all component scoring.
    if samples.iter().any(|s| s.ops.len() > MAX_OPS_PER_EPOCH) {
        return short_circuit(SCORE_EDIT_STORM, "Edit storm detected.");
    }
    let oversized_insert = samples.iter().any(|s| {
        s.ops
            .iter()
            .any(|op| matches!(op, DeltaOp::Insert(text) if text.chars().count() > MAX_INSERT_RUN))
    });
    if oversized_insert {
        return short_circuit(SCORE_LARGE_PASTE, "Large paste detected.");
    }

    let details = ComponentScores {
        micro_bursts: micro_bursts_score(&samples),
        revision_coherence: revision_coherence_score(&samples),
        momentum: momentum_score(&samples),
        semantic_coherence: semantic_coherence_score(&samples),
        cross_epoch_consistency: cross_epoch_consistency_score(&samples),
        burst_variance_ratio: burst_variance_score(&samples),
        pause_ratio: pause_ratio_score(&samples),
        edit_type_entropy: edit_type_entropy_score(&samples),
        typing_speed: typing_speed_score(&samples),
        anomaly_reason: None,
    };

    let human_score = (WEIGHT_MICRO_BURSTS * details.micro_bursts
        + WEIGHT_REVISION * details.revision_coherence
        + WEIGHT_MOMENTUM * details.momentum
        + WEIGHT_SEMANTIC * details.semantic_coherence
        + WEIGHT_CONSISTENCY * details.cross_epoch_consistency
        + WEIGHT_BURST_VARIANCE * details.burst_variance_ratio
        + WEIGHT_PAUSE_RATIO * details.pause_ratio
        + WEIGHT_EDIT_ENTROPY * details.edit_type_entropy
        + WEIGHT_SPEED * details.typing_speed)
        .clamp(0.0, 1.0);

    AuthorshipReport {
        human_score,
        details,
        metrics: compute_metrics(&samples),
    }
}

fn short_circuit(score: f64, reason: &str) -> AuthorshipReport {
    AuthorshipReport {
        human_score: score,
        details: ComponentScores {
            anomaly_reason: Some(reason.to_string()),
            ..ComponentScores::default()
        },
        metrics: ChainMetrics::default(),
    }
}

// =============================================================================
// Scalar transforms
// =============================================================================

fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn gaussian(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    (-0.5 * z * z).exp()
}

/// 1.0 inside `[lo, hi]`, Gaussian falloff outside.
fn band_score(x: f64, lo: f64, hi: f64, sigma: f64) -> f64 {
    if (lo..=hi).contains(&x) {
        1.0
    } else if x < lo {
        gaussian(x, lo, sigma)
    } else {
        gaussian(x, hi, sigma)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    if m <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt() / m)
}

fn segment_means(values: &[f64], segments: usize) -> Vec<f64> {
    if values.is_empty() || segments == 0 {
        return Vec::new();
    }
    let chunk = values.len().div_ceil(segments);
    values
        .chunks(chunk)
        .filter_map(|c| mean(c))
        .collect()
}

// =============================================================================
// Components
// =============================================================================

/// Micro-bursts: variation of typing rate across bursts of activity.
///
/// Per-operation timing is estimated by proportional position inside the
/// epoch's duration; a gap wider than two seconds splits bursts. Human
/// typing shows moderate rate variation across bursts (CV near 0.3).
fn micro_bursts_score(samples: &[EpochSample]) -> f64 {
    let mut rates = Vec::new();

    for sample in samples {
        let n = sample.ops.len();
        if n == 0 || sample.duration <= 0.0 {
            continue;
        }
        let slot = sample.duration / n as f64;
        if slot > BURST_GAP_SECONDS {
            // Every operation sits in its own burst.
            for op in &sample.ops {
                let chars = op.insert_len();
                if chars > 0 {
                    rates.push(chars as f64 / slot);
                }
            }
        } else if sample.inserted_chars > 0 {
            // The whole epoch forms one burst.
            rates.push(sample.inserted_chars as f64 / sample.duration);
        }
    }

    match coefficient_of_variation(&rates) {
        Some(cv) => logistic(-4.0 * (cv - 0.3) + 2.0),
        None => NEUTRAL,
    }
}

/// Revision coherence: do deletions look like human corrections?
///
/// Deletes are classified by length (≤3 typo, ≤20 word, >20 sentence);
/// human revision is dominated by typo fixes, often followed immediately
/// by replacement text, with only occasional sentence-scale rewrites.
fn revision_coherence_score(samples: &[EpochSample]) -> f64 {
    let mut typo = 0usize;
    let mut sentence = 0usize;
    let mut deletes = 0usize;
    let mut immediate = 0usize;

    for sample in samples {
        for (idx, op) in sample.ops.iter().enumerate() {
            if let DeltaOp::Delete(n) = op {
                deletes += 1;
                match n {
                    0..=3 => typo += 1,
                    4..=20 => {}
                    _ => sentence += 1,
                }
                if matches!(sample.ops.get(idx + 1), Some(DeltaOp::Insert(_))) {
                    immediate += 1;
                }
            }
        }
    }

    if deletes == 0 {
        return NEUTRAL;
    }

    let typo_ratio = typo as f64 / deletes as f64;
    let immediate_ratio = immediate as f64 / deletes as f64;
    let sentence_ratio = sentence as f64 / deletes as f64;

    let a = logistic(2.0 - 8.0 * (typo_ratio - 0.6).abs());
    let b = logistic(2.0 - 8.0 * (immediate_ratio - 0.3).abs());
    let c = gaussian(sentence_ratio, 0.1, 0.15);
    (a + b + c) / 3.0
}

/// Momentum: warmup at the start, fatigue across the session, gradual
/// recovery after pauses.
fn momentum_score(samples: &[EpochSample]) -> f64 {
    let rates: Vec<f64> = samples.iter().map(EpochSample::char_rate).collect();

    let warmup = if rates.len() >= 5 {
        let hits = (1..5).filter(|&i| rates[i] >= 0.9 * rates[i - 1]).count();
        hits as f64 / 4.0
    } else {
        NEUTRAL
    };

    let fatigue = if rates.len() >= 10 {
        let segments = segment_means(&rates, 5);
        if segments.len() < 2 {
            NEUTRAL
        } else {
            let declines = segments.windows(2).filter(|w| w[1] < w[0]).count();
            declines as f64 / (segments.len() - 1) as f64
        }
    } else {
        NEUTRAL
    };

    let recovery = recovery_score(&rates);

    (warmup + fatigue + recovery) / 3.0
}

/// After each pause (an epoch with no inserted text), the following three
/// epochs should return to speed gradually: at least one below 0.8x the
/// pre-pause rate, with the third above 0.7x.
fn recovery_score(rates: &[f64]) -> f64 {
    let mut evaluated = 0usize;
    let mut satisfied = 0usize;

    for i in 0..rates.len() {
        if rates[i] > 0.0 {
            continue;
        }
        if i == 0 || i + 3 >= rates.len() {
            continue;
        }
        let pre_pause = rates[i - 1];
        if pre_pause <= 0.0 {
            continue;
        }

        evaluated += 1;
        let window = &rates[i + 1..=i + 3];
        let gradual = window.iter().any(|r| *r < 0.8 * pre_pause);
        let recovered = rates[i + 3] > 0.7 * pre_pause;
        if gradual && recovered {
            satisfied += 1;
        }
    }

    if evaluated == 0 {
        NEUTRAL
    } else {
        satisfied as f64 / evaluated as f64
    }
}

/// Semantic coherence of the inserted text: sentence-length variation,
/// punctuation diversity and capitalization patterns.
fn semantic_coherence_score(samples: &[EpochSample]) -> f64 {
    let text: String = samples
        .iter()
        .flat_map(|s| s.ops.iter())
        .filter_map(|op| match op {
            DeltaOp::Insert(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();

    if text.trim().is_empty() {
        return NEUTRAL;
    }

    let sentences: Vec<&str> = text
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let lengths: Vec<f64> = sentences
        .iter()
        .map(|s| s.split_whitespace().count() as f64)
        .filter(|n| *n > 0.0)
        .collect();
    let a = match coefficient_of_variation(&lengths) {
        Some(cv) => band_score(cv, 0.4, 0.8, 0.2),
        None => NEUTRAL,
    };

    let categories: [&str; 4] = [".!?", ",;:", "'\"", "()-"];
    let present = categories
        .iter()
        .filter(|cat| text.chars().any(|c| cat.contains(c)))
        .count();
    let b = present as f64 / categories.len() as f64;

    let c = capitalization_score(&text, &sentences);

    (a + b + c) / 3.0
}

fn capitalization_score(text: &str, sentences: &[&str]) -> f64 {
    if sentences.is_empty() {
        return NEUTRAL;
    }

    let capitalized_sentences = sentences
        .iter()
        .filter(|s| s.chars().next().is_some_and(char::is_uppercase))
        .count();
    let sentence_cap_fraction = capitalized_sentences as f64 / sentences.len() as f64;

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return NEUTRAL;
    }
    let capitalized_words = words
        .iter()
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
        .count();
    let mid_caps = capitalized_words.saturating_sub(capitalized_sentences);
    let mid_cap_ratio = mid_caps as f64 / words.len() as f64;

    if sentence_cap_fraction > 0.7 && (0.10..=0.40).contains(&mid_cap_ratio) {
        1.0
    } else if sentence_cap_fraction > 0.7 {
        0.6
    } else {
        0.3
    }
}

/// Cross-epoch consistency: per-epoch chars/op, delete ratio and ops/sec
/// should vary moderately (bell around CV 0.2-0.6), with a bonus for a
/// plausible speed evolution over long chains.
fn cross_epoch_consistency_score(samples: &[EpochSample]) -> f64 {
    let mut chars_per_op = Vec::new();
    let mut delete_ratio = Vec::new();
    let mut ops_per_sec = Vec::new();

    for sample in samples {
        let ops = sample.ops.len();
        if ops == 0 {
            continue;
        }
        chars_per_op.push(sample.inserted_chars as f64 / ops as f64);
        let deletes = sample
            .ops
            .iter()
            .filter(|op| matches!(op, DeltaOp::Delete(_)))
            .count();
        delete_ratio.push(deletes as f64 / ops as f64);
        if sample.duration > 0.0 {
            ops_per_sec.push(ops as f64 / sample.duration);
        }
    }

    let mut scores = Vec::new();
    for metric in [&chars_per_op, &delete_ratio, &ops_per_sec] {
        if let Some(cv) = coefficient_of_variation(metric) {
            scores.push(band_score(cv, 0.2, 0.6, 0.2));
        }
    }
    let consistency = mean(&scores).unwrap_or(NEUTRAL);

    if samples.len() >= 15 {
        let thirds = segment_means(&ops_per_sec, 3);
        let evolution = if thirds.len() == 3
            && thirds[1] >= 0.9 * thirds[0]
            && thirds[2] <= 1.1 * thirds[1]
        {
            1.0
        } else {
            0.3
        };
        0.8 * consistency + 0.2 * evolution
    } else {
        consistency
    }
}

/// Legacy: variation of per-epoch character rates.
fn burst_variance_score(samples: &[EpochSample]) -> f64 {
    let rates: Vec<f64> = samples
        .iter()
        .map(EpochSample::char_rate)
        .filter(|r| *r > 0.0)
        .collect();
    match coefficient_of_variation(&rates) {
        Some(cv) => logistic(2.0 - 4.0 * (cv - 0.5).abs()),
        None => NEUTRAL,
    }
}

/// Legacy: fraction of epochs with no inserted text. Humans pause, but
/// not most of the time.
fn pause_ratio_score(samples: &[EpochSample]) -> f64 {
    let pauses = samples.iter().filter(|s| s.inserted_chars == 0).count();
    let ratio = pauses as f64 / samples.len() as f64;
    gaussian(ratio, 0.15, 0.15)
}

/// Legacy: Shannon entropy of the insert/delete/retain distribution,
/// normalized by log2(3).
fn edit_type_entropy_score(samples: &[EpochSample]) -> f64 {
    let mut counts = [0usize; 3];
    for op in samples.iter().flat_map(|s| s.ops.iter()) {
        match op {
            DeltaOp::Insert(_) => counts[0] += 1,
            DeltaOp::Delete(_) => counts[1] += 1,
            DeltaOp::Retain(_) => counts[2] += 1,
        }
    }
    let total: usize = counts.iter().sum();
    if total == 0 {
        return NEUTRAL;
    }

    let mut entropy = 0.0;
    for count in counts {
        if count > 0 {
            let p = count as f64 / total as f64;
            entropy -= p * p.log2();
        }
    }
    let normalized = entropy / 3f64.log2();
    gaussian(normalized, 0.5, 0.25)
}

/// Legacy: overall typing speed against the human baseline.
fn typing_speed_score(samples: &[EpochSample]) -> f64 {
    let total_chars: usize = samples.iter().map(|s| s.inserted_chars).sum();
    let total_duration: f64 = samples.iter().map(|s| s.duration).sum();
    if total_duration <= 0.0 {
        return NEUTRAL;
    }
    gaussian(
        total_chars as f64 / total_duration,
        SPEED_MEAN_CPS,
        SPEED_SIGMA_CPS,
    )
}

// =============================================================================
// Metrics
// =============================================================================

fn compute_metrics(samples: &[EpochSample]) -> ChainMetrics {
    let total_ops = samples.iter().map(|s| s.ops.len()).sum();
    let inserted_chars: usize = samples.iter().map(|s| s.inserted_chars).sum();
    let deleted_chars: u64 = samples
        .iter()
        .flat_map(|s| s.ops.iter())
        .map(|op| match op {
            DeltaOp::Delete(n) => *n,
            _ => 0,
        })
        .sum();
    let total_duration: f64 = samples.iter().map(|s| s.duration).sum();
    let mean_chars_per_sec = if total_duration > 0.0 {
        inserted_chars as f64 / total_duration
    } else {
        0.0
    };

    let rates: Vec<f64> = samples.iter().map(EpochSample::char_rate).collect();
    let rate_percentiles = if rates.len() >= 2 {
        let mut data = Data::new(rates);
        [
            data.percentile(10),
            data.percentile(25),
            data.percentile(50),
            data.percentile(75),
            data.percentile(90),
        ]
    } else {
        [0.0; 5]
    };

    ChainMetrics {
        epoch_count: samples.len(),
        total_ops,
        inserted_chars,
        deleted_chars,
        total_duration,
        mean_chars_per_sec,
        rate_percentiles,
        duration_outliers: duration_outliers(samples),
    }
}

/// Epochs whose duration deviates from the mean by more than three
/// standard deviations; long stalls and implausibly fast seals both
/// surface here.
fn duration_outliers(samples: &[EpochSample]) -> Vec<u64> {
    let durations: Vec<f64> = samples.iter().map(|s| s.duration).collect();
    let Some(m) = mean(&durations) else {
        return Vec::new();
    };
    if durations.len() < 5 {
        return Vec::new();
    }
    let variance =
        durations.iter().map(|d| (d - m) * (d - m)).sum::<f64>() / durations.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev <= 0.0 {
        return Vec::new();
    }

    samples
        .iter()
        .filter(|s| ((s.duration - m) / std_dev).abs() > 3.0)
        .map(|s| s.epoch_number)
        .collect()
}
