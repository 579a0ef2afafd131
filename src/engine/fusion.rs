//! Condition fusion.
//!
//! Folds the independent extractor signals for one listing into a single
//! [`ConditionAssessment`] via confidence-weighted voting. Corroborating
//! signals push confidence up, disagreement two or more bands wide marks
//! the assessment as conflicted and resolves pessimistically.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{ConditionAssessment, ConditionSignal, Grade};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Confidence boost per additional signal agreeing with the winner.
const CORROBORATION_BONUS: f64 = 0.15;

/// Band distance at which two signals count as contradictory.
const CONFLICT_BANDS: u8 = 2;

// ---------------------------------------------------------------------------
// Fusion
// ---------------------------------------------------------------------------

/// Fuse extractor signals into one assessment.
///
/// The winning grade is the band with the largest summed confidence,
/// an exact tie breaking toward the worse band.
/// Fused confidence is the winner's share of total weight, boosted for
/// corroboration, and never exceeds the best contributing signal's own
/// confidence. No signals at all yields the unknown assessment.
pub fn fuse(signals: Vec<ConditionSignal>) -> ConditionAssessment {
    let signals: Vec<ConditionSignal> = signals
        .into_iter()
        .filter(|s| {
            let informative = s.grade != Grade::Unknown && s.confidence > 0.0;
            if !informative {
                debug!(source = %s.source, "dropping uninformative signal");
            }
            informative
        })
        .collect();

    if signals.is_empty() {
        return ConditionAssessment::unknown();
    }

    let mut weight_by_grade: HashMap<Grade, f64> = HashMap::new();
    for signal in &signals {
        *weight_by_grade.entry(signal.grade).or_insert(0.0) += signal.confidence;
    }
    let total_weight: f64 = signals.iter().map(|s| s.confidence).sum();

    // Contending bands, heaviest first. Built from the worse end of the
    // ladder so that an exact weight tie resolves toward the worse band,
    // deterministically.
    let mut contenders: Vec<(Grade, f64)> = Grade::BANDS
        .iter()
        .rev()
        .filter_map(|g| weight_by_grade.get(g).map(|w| (*g, *w)))
        .collect();
    contenders.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let conflicted = signals.iter().enumerate().any(|(i, a)| {
        signals[i + 1..]
            .iter()
            .any(|b| a.grade.distance(&b.grade).is_some_and(|d| d >= CONFLICT_BANDS))
    });

    let grade = if conflicted && contenders.len() >= 2 {
        // Contradictory evidence resolves to the worse of the two
        // heaviest contenders.
        let (first, second) = (contenders[0].0, contenders[1].0);
        if second.is_worse_than(&first) {
            second
        } else {
            first
        }
    } else {
        contenders[0].0
    };

    let grade_weight = weight_by_grade.get(&grade).copied().unwrap_or(0.0);
    let agreeing = signals.iter().filter(|s| s.grade == grade).count();

    let base = grade_weight / total_weight;
    let boosted = base * (1.0 + CORROBORATION_BONUS * agreeing.saturating_sub(1) as f64);
    let cap = signals.iter().map(|s| s.confidence).fold(0.0, f64::max);
    let confidence = boosted.min(cap).clamp(0.0, 1.0);

    debug!(
        ?grade,
        confidence,
        conflicted,
        signal_count = signals.len(),
        "signals fused",
    );

    ConditionAssessment {
        grade,
        confidence,
        signals,
        conflicted,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
