//! Keyword scoring rules.
//!
//! A rule counts the distinct trigger phrases found as raw substrings of an
//! already lower-cased message. Scores accumulate in whole percentage points
//! and are capped at 100, so a score equal to a threshold compares equal.

/// Convert a weight in [0, 1] to whole percentage points.
fn to_points(weight: f64) -> u32 {
    (weight.clamp(0.0, 1.0) * 100.0).round() as u32
}

#[derive(Debug, Clone)]
pub struct KeywordRule {
    keywords: Vec<String>,
    weight: u32,
    markers: Vec<String>,
    boost: u32,
}

impl KeywordRule {
    /// Duplicate phrases are counted once.
    pub fn new(keywords: &[String], weight: f64) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(keywords.len());
        for k in keywords {
            let k = k.to_lowercase();
            if !k.is_empty() && !unique.contains(&k) {
                unique.push(k);
            }
        }
        Self {
            keywords: unique,
            weight: to_points(weight),
            markers: vec![],
            boost: 0,
        }
    }

    /// Add a fixed boost for each marker present (at most once per marker).
    pub fn with_boost(mut self, markers: &[String], boost: f64) -> Self {
        self.markers = markers.iter().filter(|m| !m.is_empty()).cloned().collect();
        self.boost = to_points(boost);
        self
    }

    /// Trigger phrases present in `lowered`.
    pub fn hits<'a>(&'a self, lowered: &str) -> Vec<&'a str> {
        self.keywords
            .iter()
            .filter(|k| lowered.contains(k.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Score in [0, 1] for a lower-cased message.
    pub fn score(&self, lowered: &str) -> f64 {
        let hits = self.hits(lowered).len() as u32;
        let boosts = self
            .markers
            .iter()
            .filter(|m| lowered.contains(m.as_str()))
            .count() as u32;
        let points = hits
            .saturating_mul(self.weight)
            .saturating_add(boosts.saturating_mul(self.boost))
            .min(100);
        f64::from(points) / 100.0
    }
}
