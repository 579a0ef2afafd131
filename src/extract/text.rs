//! Text condition extractor.
//!
//! Scans listing title and description against a bilingual lexicon of
//! condition-indicating phrases. Japanese marketplace sellers describe
//! condition in fairly stereotyped vocabulary, which makes a phrase
//! table more reliable than anything fancier. Multiple matches combine
//! by confidence-weighted majority toward one grade.

use async_trait::async_trait;
use tracing::debug;

use super::SignalExtractor;
use crate::types::{ConditionSignal, Grade, Listing, SignalSource};

// ---------------------------------------------------------------------------
// Lexicon
// ---------------------------------------------------------------------------

struct LexiconEntry {
    phrase: &'static str,
    grade: Grade,
    confidence: f64,
}

const fn entry(phrase: &'static str, grade: Grade, confidence: f64) -> LexiconEntry {
    LexiconEntry {
        phrase,
        grade,
        confidence,
    }
}

/// Condition phrases with per-phrase base confidence. Longer phrases
/// come before their substrings so やや傷あり wins over 傷あり and
/// "near mint" wins over "mint".
const LEXICON: &[LexiconEntry] = &[
    // Japanese
    entry("完全美品", Grade::NearMint, 0.85),
    entry("ほぼ新品", Grade::NearMint, 0.75),
    entry("極美品", Grade::NearMint, 0.75),
    entry("未使用", Grade::Mint, 0.85),
    entry("新品", Grade::Mint, 0.85),
    entry("美品", Grade::NearMint, 0.75),
    entry("良品", Grade::Excellent, 0.65),
    entry("並品", Grade::Good, 0.55),
    entry("やや傷あり", Grade::LightPlayed, 0.65),
    entry("傷あり", Grade::Played, 0.70),
    entry("重度使用", Grade::HeavilyPlayed, 0.75),
    entry("破損", Grade::Poor, 0.80),
    entry("損傷", Grade::Poor, 0.80),
    entry("ジャンク", Grade::Poor, 0.80),
    // English
    entry("gem mint", Grade::Mint, 0.85),
    entry("pack fresh", Grade::Mint, 0.80),
    entry("near mint", Grade::NearMint, 0.75),
    entry("nm", Grade::NearMint, 0.70),
    entry("mint", Grade::Mint, 0.80),
    entry("excellent", Grade::Excellent, 0.65),
    entry("good condition", Grade::Good, 0.55),
    entry("lightly played", Grade::LightPlayed, 0.65),
    entry("lp", Grade::LightPlayed, 0.60),
    entry("moderately played", Grade::Played, 0.65),
    entry("mp", Grade::Played, 0.60),
    entry("heavily played", Grade::HeavilyPlayed, 0.75),
    entry("played", Grade::Played, 0.60),
    entry("damaged", Grade::Poor, 0.80),
    entry("poor", Grade::Poor, 0.75),
    entry("junk", Grade::Poor, 0.75),
];

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        TextExtractor
    }

    /// Single-word ASCII phrases match whole tokens only, so "played"
    /// does not fire on "displayed". Multi-word and Japanese phrases
    /// match as substrings (Japanese text has no token boundaries).
    fn phrase_matches(text: &str, tokens: &[&str], phrase: &str) -> bool {
        if phrase.is_ascii() && !phrase.contains(' ') {
            tokens.contains(&phrase)
        } else {
            text.contains(phrase)
        }
    }

    /// All lexicon entries found in the text, suppressing entries whose
    /// phrase is contained in an already-matched longer phrase.
    fn matched_entries(text: &str) -> Vec<&'static LexiconEntry> {
        let tokens: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut matched: Vec<&'static LexiconEntry> = Vec::new();
        for candidate in LEXICON {
            if !Self::phrase_matches(text, &tokens, candidate.phrase) {
                continue;
            }
            if matched.iter().any(|m| m.phrase.contains(candidate.phrase)) {
                continue;
            }
            matched.push(candidate);
        }
        matched
    }

    /// Confidence-weighted majority vote across matched phrases. An
    /// exact tie resolves to the worse grade.
    fn combine(matches: &[&'static LexiconEntry]) -> Option<(Grade, f64, String)> {
        if matches.is_empty() {
            return None;
        }

        let total_weight: f64 = matches.iter().map(|m| m.confidence).sum();
        let mut winner = matches[0].grade;
        let mut winner_weight = 0.0;
        // Worse bands scan first, so an exact weight tie stays with the
        // worse band.
        for band in Grade::BANDS.iter().rev() {
            let weight: f64 = matches
                .iter()
                .filter(|m| m.grade == *band)
                .map(|m| m.confidence)
                .sum();
            if weight > winner_weight {
                winner = *band;
                winner_weight = weight;
            }
        }

        let winning: Vec<_> = matches.iter().filter(|m| m.grade == winner).collect();
        let mean_confidence =
            winning.iter().map(|m| m.confidence).sum::<f64>() / winning.len() as f64;
        let share = winner_weight / total_weight;
        let confidence = mean_confidence * share;

        let phrases: Vec<&str> = matches.iter().map(|m| m.phrase).collect();
        Some((winner, confidence, phrases.join(", ")))
    }
}

#[async_trait]
impl SignalExtractor for TextExtractor {
    async fn observe(&self, listing: &Listing) -> Option<ConditionSignal> {
        let text = format!("{} {}", listing.title, listing.description).to_lowercase();
        let matches = Self::matched_entries(&text);
        let (grade, confidence, phrases) = Self::combine(&matches)?;

        debug!(
            listing_id = %listing.id,
            grade = %grade,
            confidence,
            phrases = %phrases,
            "text condition phrases matched",
        );

        Some(ConditionSignal::new(
            SignalSource::Text,
            grade,
            confidence,
            format!("matched: {phrases}"),
        ))
    }

    fn source(&self) -> SignalSource {
        SignalSource::Text
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
