use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    ops::RangeInclusive,
};

use crate::models::proposals::Proposal;

pub mod patterns;
pub mod sentiment;

pub use patterns::Category;
use patterns::CategoryPatterns;
use sentiment::{LexiconPolarity, PolarityEstimator};

pub const DEFAULT_THRESHOLD: f64 = 0.25;

/// Polarity magnitude above which the text counts as emotionally charged.
const SENTIMENT_POLARITY_THRESHOLD: f64 = 0.3;
const SENTIMENT_BONUS: f64 = 0.15;

const STRUCTURAL_SIGNAL_BONUS: f64 = 0.05;
const STRUCTURAL_BONUS_CAP: f64 = 0.10;
/// Character counts outside this range are unusual for a proposal.
const NORMAL_LENGTH: RangeInclusive<usize> = 50..=3000;
/// Enumerated lines needed before a text reads as a list of demands.
const MIN_ENUMERATED_LINES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Pattern,
    Sentiment,
    Structural,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Pattern => "pattern",
            DetectionMethod::Sentiment => "sentiment",
            DetectionMethod::Structural => "structural",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heuristic activism score for one proposal text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivistScore {
    /// `base_score + sentiment_bonus + structural_bonus`, clamped to `[0, 1]`.
    pub score: f64,
    pub base_score: f64,
    pub sentiment_bonus: f64,
    pub structural_bonus: f64,
    pub polarity: f64,
    pub triggered_categories: BTreeSet<Category>,
    pub detection_methods: BTreeSet<DetectionMethod>,
}

impl ActivistScore {
    /// `pattern|sentiment|structural`, contributing methods only.
    pub fn methods_label(&self) -> String {
        self.detection_methods
            .iter()
            .map(DetectionMethod::as_str)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// e.g. `multi_method_2[emergency+financial]`, or `no_detection`.
    pub fn summary(&self) -> String {
        let mut summary = match self.detection_methods.len() {
            0 => "no_detection".to_string(),
            1 => self.methods_label(),
            n => format!("multi_method_{n}"),
        };
        if !self.triggered_categories.is_empty() {
            let categories = self
                .triggered_categories
                .iter()
                .map(Category::as_str)
                .collect::<Vec<_>>()
                .join("+");
            summary.push_str(&format!("[{categories}]"));
        }
        summary
    }
}

/// Rule-based activist proposal detector.
///
/// Pattern tables and structural regexes are compiled once in [`new`]; scoring
/// is a pure function of the text.
///
/// [`new`]: ActivistClassifier::new
pub struct ActivistClassifier {
    categories: Vec<CategoryPatterns>,
    weights: BTreeMap<Category, f64>,
    threshold: f64,
    estimator: Box<dyn PolarityEstimator>,
    enumerated_line: Regex,
    parameter_value: Regex,
    call_to_action: Regex,
}

impl ActivistClassifier {
    /// Categories missing from `weights` weigh 1.0.
    pub fn new(weights: &BTreeMap<Category, f64>, threshold: f64) -> Result<Self> {
        Self::with_estimator(weights, threshold, Box::new(LexiconPolarity))
    }

    pub fn with_estimator(
        weights: &BTreeMap<Category, f64>,
        threshold: f64,
        estimator: Box<dyn PolarityEstimator>,
    ) -> Result<Self> {
        let weights = Category::ALL
            .into_iter()
            .map(|c| (c, weights.get(&c).copied().unwrap_or(1.0)))
            .collect();

        Ok(Self {
            categories: patterns::compile_all()?,
            weights,
            threshold,
            estimator,
            enumerated_line: Regex::new(r"(?m)^\s*(\d{1,2}[.)]|[-*•])\s+\S")?,
            parameter_value: Regex::new(r"\d+(\.\d+)?\s*%|\$\s?\d")?,
            call_to_action: Regex::new(
                r"(?i)\b(we (propose|demand|call on|urge)|vote (yes|for|against)|must|should|urge)\b",
            )?,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_activist(&self, score: &ActivistScore) -> bool {
        score.score >= self.threshold
    }

    pub fn score_proposal(&self, proposal: &Proposal) -> ActivistScore {
        self.score(&proposal.title, &proposal.body)
    }

    pub fn score(&self, title: &str, body: &str) -> ActivistScore {
        let text = format!("{}\n{}", title.trim(), body.trim());
        let text = text.trim();
        if text.is_empty() {
            return ActivistScore::default();
        }

        let mut result = ActivistScore::default();

        let total_weight: f64 = self.weights.values().sum();
        let mut fired_weight = 0.0;
        for category in &self.categories {
            if category.count_matches(text) > 0 {
                result.triggered_categories.insert(category.category);
                fired_weight += self.weights.get(&category.category).copied().unwrap_or(0.0);
            }
        }
        if total_weight > 0.0 {
            result.base_score = fired_weight / total_weight;
        }
        if !result.triggered_categories.is_empty() {
            result.detection_methods.insert(DetectionMethod::Pattern);
        }

        result.polarity = self.estimator.polarity(text);
        if result.polarity.abs() > SENTIMENT_POLARITY_THRESHOLD {
            result.sentiment_bonus = SENTIMENT_BONUS;
            result.detection_methods.insert(DetectionMethod::Sentiment);
        }

        result.structural_bonus = self.structural_bonus(text);
        if result.structural_bonus > 0.0 {
            result.detection_methods.insert(DetectionMethod::Structural);
        }

        result.score = (result.base_score + result.sentiment_bonus + result.structural_bonus)
            .clamp(0.0, 1.0);
        result
    }

    fn structural_bonus(&self, text: &str) -> f64 {
        let signals = [
            !NORMAL_LENGTH.contains(&text.chars().count()),
            self.enumerated_line.find_iter(text).count() >= MIN_ENUMERATED_LINES
                || self.parameter_value.is_match(text),
            self.call_to_action.is_match(text),
        ];
        let fired = signals.iter().filter(|s| **s).count() as f64;
        (fired * STRUCTURAL_SIGNAL_BONUS).min(STRUCTURAL_BONUS_CAP)
    }
}
