use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Estimates the polarity of a text in `[-1.0, 1.0]`; 0.0 is neutral.
pub trait PolarityEstimator: Send + Sync {
    fn polarity(&self, text: &str) -> f64;
}

/// Opinion words only. Words that trigger a pattern category stay out so the
/// two signals do not count the same evidence twice.
static LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        // negative
        ("abuse", -0.6),
        ("awful", -1.0),
        ("bad", -0.7),
        ("broken", -0.4),
        ("corrupt", -0.5),
        ("dangerous", -0.6),
        ("disaster", -0.8),
        ("exploit", -0.5),
        ("exploited", -0.5),
        ("fail", -0.5),
        ("failed", -0.5),
        ("failure", -0.3),
        ("fraud", -0.8),
        ("hacked", -0.5),
        ("harmful", -0.7),
        ("incompetent", -0.7),
        ("insolvent", -0.6),
        ("irresponsible", -0.6),
        ("loss", -0.3),
        ("losses", -0.3),
        ("mismanagement", -0.6),
        ("negligent", -0.6),
        ("outrageous", -0.7),
        ("poor", -0.4),
        ("reckless", -0.6),
        ("risky", -0.4),
        ("stolen", -0.6),
        ("terrible", -1.0),
        ("unacceptable", -0.8),
        ("unfair", -0.5),
        ("worst", -1.0),
        ("wrong", -0.5),
        // positive
        ("amazing", 0.6),
        ("best", 1.0),
        ("better", 0.5),
        ("excellent", 1.0),
        ("exciting", 0.3),
        ("fair", 0.7),
        ("grateful", 0.6),
        ("great", 0.8),
        ("good", 0.7),
        ("happy", 0.8),
        ("healthy", 0.5),
        ("innovative", 0.5),
        ("strong", 0.43),
        ("successful", 0.75),
        ("thrilled", 0.6),
        ("wonderful", 1.0),
    ])
});

static INTENSIFIERS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("absolutely", 1.5),
        ("deeply", 1.3),
        ("extremely", 1.5),
        ("highly", 1.3),
        ("incredibly", 1.5),
        ("really", 1.3),
        ("totally", 1.3),
        ("very", 1.3),
    ])
});

const NEGATIONS: [&str; 9] = [
    "not", "no", "never", "don't", "doesn't", "isn't", "won't", "cannot", "can't",
];

/// Negation flips and dampens the following opinion word.
const NEGATION_FACTOR: f64 = -0.5;

/// Word-lexicon polarity: the mean polarity of the opinion words found,
/// adjusted by a directly preceding intensifier or a negation one or two
/// words earlier.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconPolarity;

impl PolarityEstimator for LexiconPolarity {
    fn polarity(&self, text: &str) -> f64 {
        let tokens: Vec<String> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut scores = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            let Some(&base) = LEXICON.get(token.as_str()) else {
                continue;
            };

            let mut value = base;
            if let Some(&factor) = i
                .checked_sub(1)
                .and_then(|j| INTENSIFIERS.get(tokens[j].as_str()))
            {
                value = (value * factor).clamp(-1.0, 1.0);
            }

            let negated = tokens[i.saturating_sub(2)..i]
                .iter()
                .any(|t| NEGATIONS.contains(&t.as_str()));
            if negated {
                value *= NEGATION_FACTOR;
            }

            scores.push(value);
        }

        if scores.is_empty() {
            return 0.0;
        }
        (scores.iter().sum::<f64>() / scores.len() as f64).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_text_has_zero_polarity() {
        assert_eq!(LexiconPolarity.polarity("Schedule the quarterly sync call"), 0.0);
        assert_eq!(LexiconPolarity.polarity(""), 0.0);
    }

    #[test]
    fn category_trigger_words_are_neutral() {
        assert_eq!(LexiconPolarity.polarity("Emergency proposal for the crisis"), 0.0);
    }

    #[test]
    fn opinion_words_are_averaged() {
        let p = LexiconPolarity.polarity("A good plan with a bad rollout");
        assert!(p.abs() < 1e-9, "got {p}");
        let p = LexiconPolarity.polarity("This is terrible and reckless");
        assert!((p - (-0.8)).abs() < 1e-9, "got {p}");
    }

    #[test]
    fn intensifier_strengthens_and_negation_flips() {
        let plain = LexiconPolarity.polarity("a good idea");
        let strong = LexiconPolarity.polarity("a very good idea");
        assert!(strong > plain);

        let negated = LexiconPolarity.polarity("this is not good");
        assert!(negated < 0.0);
        assert!((negated - (-0.35)).abs() < 1e-9);
    }

    #[test]
    fn polarity_stays_in_bounds() {
        let p = LexiconPolarity.polarity("absolutely awful, extremely terrible, worst ever");
        assert!((-1.0..=1.0).contains(&p));
    }
}
