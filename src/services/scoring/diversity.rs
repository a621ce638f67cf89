use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::models::TemplateRecommendation;

/// Jitter ceiling for randomized tie-breaking (1% of the score)
pub const DIVERSITY_FACTOR: f64 = 0.01;

/// Style families used to spread recommendations across looks
///
/// First matching keyword wins; templates matching nothing land in "general".
const STYLE_FAMILIES: [(&str, &[&str]); 5] = [
    ("modern", &["modern", "futuristic", "tech"]),
    ("vintage", &["vintage", "retro", "classic"]),
    ("vibrant", &["colorful", "vibrant", "bright"]),
    ("dramatic", &["dark", "moody", "dramatic"]),
    ("minimal", &["minimal", "clean", "simple"]),
];

const GENERAL_FAMILY: &str = "general";

/// Re-ranks scored candidates so a single style family cannot dominate,
/// with randomized tie-breaking.
///
/// The random source is seedable so tests can assert exact orderings.
pub struct DiversitySelector {
    diversity_factor: f64,
    rng: Mutex<StdRng>,
}

impl Default for DiversitySelector {
    fn default() -> Self {
        Self::new(DIVERSITY_FACTOR)
    }
}

impl DiversitySelector {
    pub fn new(diversity_factor: f64) -> Self {
        Self {
            diversity_factor,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Fixed-seed constructor for deterministic ordering in tests
    pub fn with_seed(diversity_factor: f64, seed: u64) -> Self {
        Self {
            diversity_factor,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Selects up to `max_results` candidates, spreading across style families
    ///
    /// Small candidate sets skip family diversification entirely. Larger sets
    /// contribute the best not-yet-used candidate from each family (in
    /// first-seen order), then fill remaining slots from the score-sorted
    /// leftovers. The jitter tie-break runs on every output path, so returned
    /// scores are never byte-identical to the stored base values.
    pub fn select(
        &self,
        recommendations: Vec<TemplateRecommendation>,
        max_results: usize,
    ) -> Vec<TemplateRecommendation> {
        if recommendations.len() <= max_results {
            return self.jitter_and_sort(recommendations);
        }

        let mut diverse: Vec<TemplateRecommendation> = Vec::with_capacity(max_results);
        let mut used: Vec<String> = Vec::new();

        for (_, members) in group_by_family(&recommendations) {
            if diverse.len() >= max_results {
                break;
            }

            let best = members
                .iter()
                .filter(|r| !used.contains(&r.template_id))
                .max_by(|a, b| {
                    a.compatibility_score
                        .partial_cmp(&b.compatibility_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

            if let Some(best) = best {
                used.push(best.template_id.clone());
                diverse.push((*best).clone());
            }
        }

        let remaining_slots = max_results - diverse.len();
        if remaining_slots > 0 {
            let mut leftovers: Vec<&TemplateRecommendation> = recommendations
                .iter()
                .filter(|r| !used.contains(&r.template_id))
                .collect();
            leftovers.sort_by(|a, b| {
                b.compatibility_score
                    .partial_cmp(&a.compatibility_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            diverse.extend(leftovers.into_iter().take(remaining_slots).cloned());
        }

        self.jitter_and_sort(diverse)
    }

    /// Multiplies every score by `1 + random(0, diversity_factor)` and
    /// re-sorts descending; the jittered scores are kept in the output
    fn jitter_and_sort(
        &self,
        recommendations: Vec<TemplateRecommendation>,
    ) -> Vec<TemplateRecommendation> {
        let mut jittered: Vec<TemplateRecommendation> = recommendations
            .into_iter()
            .map(|mut rec| {
                rec.compatibility_score *= 1.0 + self.random_factor();
                rec
            })
            .collect();

        jittered.sort_by(|a, b| {
            b.compatibility_score
                .partial_cmp(&a.compatibility_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        jittered
    }

    /// Sorts by jittered score but keeps the original scores in the output
    ///
    /// Used on the recommendation path, where the stored compatibility score
    /// must survive into the response while near-ties still shuffle.
    pub fn jitter_sort_keeping_scores(
        &self,
        recommendations: Vec<TemplateRecommendation>,
    ) -> Vec<TemplateRecommendation> {
        let mut keyed: Vec<(f64, TemplateRecommendation)> = recommendations
            .into_iter()
            .map(|rec| (rec.compatibility_score * (1.0 + self.random_factor()), rec))
            .collect();

        keyed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        keyed.into_iter().map(|(_, rec)| rec).collect()
    }

    fn random_factor(&self) -> f64 {
        let mut rng = self.rng.lock().expect("diversity rng poisoned");
        rng.gen::<f64>() * self.diversity_factor
    }
}

/// Determines the style family for a recommendation from its tags
pub fn style_family(recommendation: &TemplateRecommendation) -> &'static str {
    let tags: Vec<String> = recommendation
        .metadata
        .tags
        .iter()
        .map(|t| t.to_lowercase())
        .collect();

    for (family, keywords) in &STYLE_FAMILIES {
        if tags.iter().any(|t| keywords.contains(&t.as_str())) {
            return family;
        }
    }

    GENERAL_FAMILY
}

/// Groups recommendations by family, preserving family first-seen order
fn group_by_family(
    recommendations: &[TemplateRecommendation],
) -> Vec<(&'static str, Vec<&TemplateRecommendation>)> {
    let mut groups: Vec<(&'static str, Vec<&TemplateRecommendation>)> = Vec::new();

    for rec in recommendations {
        let family = style_family(rec);
        match groups.iter_mut().find(|(name, _)| *name == family) {
            Some((_, members)) => members.push(rec),
            None => groups.push((family, vec![rec])),
        }
    }

    groups
}
