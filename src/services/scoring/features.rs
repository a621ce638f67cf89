use crate::models::{Asset, ScoreBreakdown, UserPreferences};
use crate::models::user_context::EnergyPreference;

/// Neutral score used whenever a dimension has nothing to compare
const NEUTRAL_SCORE: f64 = 0.5;

/// BPM difference at which tempo compatibility reaches zero
const BPM_TOLERANCE: f64 = 60.0;

const ENERGY_LEVELS: [&str; 3] = ["low-energy", "moderate-energy", "high-energy"];

const STYLE_KEYWORDS: [&str; 12] = [
    "modern",
    "vintage",
    "retro",
    "futuristic",
    "minimalist",
    "colorful",
    "dark",
    "bright",
    "abstract",
    "realistic",
    "artistic",
    "commercial",
];

const MOOD_KEYWORDS: [&str; 11] = [
    "happy",
    "sad",
    "energetic",
    "calm",
    "intense",
    "peaceful",
    "aggressive",
    "romantic",
    "mysterious",
    "uplifting",
    "dramatic",
];

/// Genre families granting partial credit when the exact genre is absent
const GENRE_FAMILIES: [(&str, &[&str]); 6] = [
    ("pop", &["electronic", "dance", "synth"]),
    ("rock", &["alternative", "indie", "punk"]),
    ("hip-hop", &["rap", "urban", "r&b"]),
    ("electronic", &["edm", "techno", "house", "dance"]),
    ("jazz", &["blues", "soul", "funk"]),
    ("classical", &["orchestral", "symphonic"]),
];

/// Computes the five raw compatibility sub-scores for a (song, template) pair
/// and applies the user's preference adjustments.
///
/// Pure and infallible: missing metadata yields the neutral 0.5 per dimension,
/// and every returned sub-score is clamped to [0, 1].
pub fn compute_breakdown(
    song: &Asset,
    template: &Asset,
    preferences: Option<&UserPreferences>,
) -> ScoreBreakdown {
    let breakdown = ScoreBreakdown {
        tempo_score: tempo_compatibility(song, template),
        genre_score: genre_compatibility(song, template),
        energy_score: energy_compatibility(song, template),
        style_score: style_compatibility(song, template),
        mood_score: mood_compatibility(song, template),
    };

    apply_preferences(breakdown, preferences)
}

/// Tempo: best match across the template's `<N>bpm` tag hints
fn tempo_compatibility(song: &Asset, template: &Asset) -> f64 {
    let song_bpm = match song.song_metadata.as_ref().and_then(|m| m.bpm) {
        Some(bpm) => bpm,
        None => return NEUTRAL_SCORE,
    };

    let mut max_compatibility: f64 = 0.0;
    let mut saw_hint = false;

    for tag in &template.tags {
        if let Some(template_bpm) = parse_bpm_hint(tag) {
            saw_hint = true;
            let difference = (song_bpm - template_bpm).abs();
            let compatibility = (1.0 - difference / BPM_TOLERANCE).max(0.0);
            max_compatibility = max_compatibility.max(compatibility);
        }
    }

    // No usable hints, or every hint too far off: stay neutral
    if !saw_hint || max_compatibility == 0.0 {
        return NEUTRAL_SCORE;
    }

    max_compatibility
}

/// Extracts the numeric BPM from tags shaped like "120bpm"
fn parse_bpm_hint(tag: &str) -> Option<f64> {
    let lower = tag.to_lowercase();
    let pos = lower.find("bpm")?;
    let digits: String = lower[..pos]
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse::<f64>().ok()
}

/// Genre: exact tag match, then genre-family partial credit
fn genre_compatibility(song: &Asset, template: &Asset) -> f64 {
    let song_genre = match song.song_metadata.as_ref().and_then(|m| m.genre.as_ref()) {
        Some(genre) => genre.to_lowercase(),
        None => return NEUTRAL_SCORE,
    };

    let template_tags: Vec<String> = template.tags.iter().map(|t| t.to_lowercase()).collect();

    if template_tags.iter().any(|t| *t == song_genre) {
        return 1.0;
    }

    let related = GENRE_FAMILIES
        .iter()
        .find(|(genre, _)| *genre == song_genre)
        .map(|(_, related)| *related)
        .unwrap_or(&[]);

    for related_genre in related {
        if template_tags.iter().any(|t| t == related_genre) {
            return 0.7;
        }
    }

    0.3
}

/// Energy: equal levels 1.0, adjacent 0.6, opposite extremes 0.2
fn energy_compatibility(song: &Asset, template: &Asset) -> f64 {
    let song_level = energy_level(&song.tags);
    let template_level = energy_level(&template.tags);

    if song_level == template_level {
        return 1.0;
    }

    if song_level.abs_diff(template_level) == 1 {
        0.6
    } else {
        0.2
    }
}

/// Maps energy tags to an ordinal level; absent tags default to moderate
fn energy_level(tags: &[String]) -> usize {
    tags.iter()
        .filter_map(|tag| {
            ENERGY_LEVELS
                .iter()
                .position(|level| tag.eq_ignore_ascii_case(level))
        })
        .next()
        .unwrap_or(1)
}

/// Style: Jaccard similarity over the style keyword vocabulary
fn style_compatibility(song: &Asset, template: &Asset) -> f64 {
    let song_styles = matched_keywords(&song.tags, &STYLE_KEYWORDS);
    let template_styles = matched_keywords(&template.tags, &STYLE_KEYWORDS);

    if song_styles.is_empty() || template_styles.is_empty() {
        return NEUTRAL_SCORE;
    }

    let intersection = song_styles
        .iter()
        .filter(|s| template_styles.contains(*s))
        .count();
    let union = song_styles.len() + template_styles.len() - intersection;

    intersection as f64 / union as f64
}

/// Mood: overlap ratio over the mood vocabulary, 0.3 when disjoint
fn mood_compatibility(song: &Asset, template: &Asset) -> f64 {
    let song_moods = matched_keywords(&song.tags, &MOOD_KEYWORDS);
    let template_moods = matched_keywords(&template.tags, &MOOD_KEYWORDS);

    if song_moods.is_empty() || template_moods.is_empty() {
        return NEUTRAL_SCORE;
    }

    let intersection = song_moods
        .iter()
        .filter(|m| template_moods.contains(*m))
        .count();

    if intersection > 0 {
        intersection as f64 / song_moods.len().max(template_moods.len()) as f64
    } else {
        0.3
    }
}

/// Collects the distinct lowercase tags present in a keyword vocabulary
fn matched_keywords(tags: &[String], vocabulary: &[&str]) -> Vec<String> {
    let mut matched: Vec<String> = Vec::new();
    for tag in tags {
        let lower = tag.to_lowercase();
        if vocabulary.contains(&lower.as_str()) && !matched.contains(&lower) {
            matched.push(lower);
        }
    }
    matched
}

/// Applies user-preference multipliers, then clamps every sub-score to [0, 1]
fn apply_preferences(
    mut breakdown: ScoreBreakdown,
    preferences: Option<&UserPreferences>,
) -> ScoreBreakdown {
    if let Some(prefs) = preferences {
        if let Some(energy) = prefs.energy_preference {
            let boost = match energy {
                EnergyPreference::High => 1.1,
                EnergyPreference::Low => 0.9,
                EnergyPreference::Moderate => 1.0,
            };
            breakdown.energy_score *= boost;
        }

        if prefs
            .genre_preferences
            .as_ref()
            .is_some_and(|genres| !genres.is_empty())
        {
            breakdown.genre_score *= 1.05;
        }
    }

    breakdown.tempo_score = breakdown.tempo_score.clamp(0.0, 1.0);
    breakdown.genre_score = breakdown.genre_score.clamp(0.0, 1.0);
    breakdown.energy_score = breakdown.energy_score.clamp(0.0, 1.0);
    breakdown.style_score = breakdown.style_score.clamp(0.0, 1.0);
    breakdown.mood_score = breakdown.mood_score.clamp(0.0, 1.0);

    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SongMetadata;

    fn song(bpm: Option<f64>, genre: Option<&str>, tags: Vec<&str>) -> Asset {
        Asset {
            address: "G.POP.TEN.001".to_string(),
            name: "Test Song".to_string(),
            tags: tags.into_iter().map(String::from).collect(),
            description: None,
            created_at: None,
            components: vec![],
            song_metadata: Some(SongMetadata {
                bpm,
                genre: genre.map(String::from),
            }),
        }
    }

    fn template(tags: Vec<&str>) -> Asset {
        Asset {
            address: "C.001.001.001".to_string(),
            name: "Test Template".to_string(),
            tags: tags.into_iter().map(String::from).collect(),
            description: None,
            created_at: None,
            components: vec![],
            song_metadata: None,
        }
    }

    #[test]
    fn test_tempo_exact_match() {
        let score = tempo_compatibility(&song(Some(120.0), None, vec![]), &template(vec!["120bpm"]));
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_tempo_partial_match() {
        // 30 BPM off with a 60 BPM tolerance: half credit
        let score = tempo_compatibility(&song(Some(120.0), None, vec![]), &template(vec!["150bpm"]));
        assert!((score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_tempo_takes_best_hint() {
        let score = tempo_compatibility(
            &song(Some(120.0), None, vec![]),
            &template(vec!["90bpm", "125bpm"]),
        );
        assert!((score - (1.0 - 5.0 / 60.0)).abs() < 1e-12);
    }

    #[test]
    fn test_tempo_no_bpm_is_neutral() {
        let score = tempo_compatibility(&song(None, None, vec![]), &template(vec!["120bpm"]));
        assert_eq!(score, 0.5);
    }

    #[test]
    fn test_tempo_no_hints_is_neutral() {
        let score = tempo_compatibility(
            &song(Some(120.0), None, vec![]),
            &template(vec!["modern", "fast-tempo"]),
        );
        assert_eq!(score, 0.5);
    }

    #[test]
    fn test_tempo_hint_out_of_tolerance_is_neutral() {
        // Hint exists but compatibility bottoms out at zero: fall back to neutral
        let score = tempo_compatibility(&song(Some(60.0), None, vec![]), &template(vec!["180bpm"]));
        assert_eq!(score, 0.5);
    }

    #[test]
    fn test_parse_bpm_hint() {
        assert_eq!(parse_bpm_hint("120bpm"), Some(120.0));
        assert_eq!(parse_bpm_hint("tempo-95bpm"), Some(95.0));
        assert_eq!(parse_bpm_hint("fast-tempo"), None);
        assert_eq!(parse_bpm_hint("bpm"), None);
    }

    #[test]
    fn test_genre_exact_match() {
        let score = genre_compatibility(
            &song(None, Some("Pop"), vec![]),
            &template(vec!["POP", "modern"]),
        );
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_genre_family_match() {
        let score = genre_compatibility(
            &song(None, Some("pop"), vec![]),
            &template(vec!["electronic"]),
        );
        assert_eq!(score, 0.7);
    }

    #[test]
    fn test_genre_no_match() {
        let score = genre_compatibility(&song(None, Some("pop"), vec![]), &template(vec!["metal"]));
        assert_eq!(score, 0.3);
    }

    #[test]
    fn test_genre_missing_is_neutral() {
        let score = genre_compatibility(&song(None, None, vec![]), &template(vec!["pop"]));
        assert_eq!(score, 0.5);
    }

    #[test]
    fn test_energy_equal_levels() {
        let score = energy_compatibility(
            &song(None, None, vec!["high-energy"]),
            &template(vec!["high-energy"]),
        );
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_energy_adjacent_levels() {
        let score = energy_compatibility(
            &song(None, None, vec!["high-energy"]),
            &template(vec!["moderate-energy"]),
        );
        assert_eq!(score, 0.6);
    }

    #[test]
    fn test_energy_opposite_levels() {
        let score = energy_compatibility(
            &song(None, None, vec!["high-energy"]),
            &template(vec!["low-energy"]),
        );
        assert_eq!(score, 0.2);
    }

    #[test]
    fn test_energy_defaults_to_moderate() {
        // Untagged sides both default to moderate and match
        let score = energy_compatibility(&song(None, None, vec![]), &template(vec![]));
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_style_jaccard() {
        let score = style_compatibility(
            &song(None, None, vec!["modern", "dark"]),
            &template(vec!["modern", "bright"]),
        );
        // intersection {modern} = 1, union {modern, dark, bright} = 3
        assert!((score - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_style_identical_sets() {
        let score = style_compatibility(
            &song(None, None, vec!["modern"]),
            &template(vec!["modern"]),
        );
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_style_empty_side_is_neutral() {
        let score = style_compatibility(&song(None, None, vec![]), &template(vec!["modern"]));
        assert_eq!(score, 0.5);
    }

    #[test]
    fn test_mood_overlap_ratio() {
        let score = mood_compatibility(
            &song(None, None, vec!["happy", "energetic"]),
            &template(vec!["happy", "calm", "intense"]),
        );
        // intersection 1, max(2, 3) = 3
        assert!((score - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_mood_disjoint_sets() {
        let score = mood_compatibility(
            &song(None, None, vec!["happy"]),
            &template(vec!["sad"]),
        );
        assert_eq!(score, 0.3);
    }

    #[test]
    fn test_mood_empty_side_is_neutral() {
        let score = mood_compatibility(&song(None, None, vec!["happy"]), &template(vec![]));
        assert_eq!(score, 0.5);
    }

    #[test]
    fn test_preferences_high_energy_boost() {
        let breakdown = ScoreBreakdown {
            energy_score: 0.6,
            ..Default::default()
        };
        let prefs = UserPreferences {
            energy_preference: Some(EnergyPreference::High),
            ..Default::default()
        };
        let adjusted = apply_preferences(breakdown, Some(&prefs));
        assert!((adjusted.energy_score - 0.66).abs() < 1e-12);
    }

    #[test]
    fn test_preferences_low_energy_dampen() {
        let breakdown = ScoreBreakdown {
            energy_score: 1.0,
            ..Default::default()
        };
        let prefs = UserPreferences {
            energy_preference: Some(EnergyPreference::Low),
            ..Default::default()
        };
        let adjusted = apply_preferences(breakdown, Some(&prefs));
        assert!((adjusted.energy_score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_preferences_clamp_to_one() {
        let breakdown = ScoreBreakdown {
            energy_score: 1.0,
            genre_score: 1.0,
            ..Default::default()
        };
        let prefs = UserPreferences {
            energy_preference: Some(EnergyPreference::High),
            genre_preferences: Some(vec!["pop".to_string()]),
            ..Default::default()
        };
        let adjusted = apply_preferences(breakdown, Some(&prefs));
        assert_eq!(adjusted.energy_score, 1.0);
        assert_eq!(adjusted.genre_score, 1.0);
    }

    #[test]
    fn test_full_breakdown_scenario_a() {
        // bpm=120, genre=pop, high-energy modern song against a matching template
        let song = song(Some(120.0), Some("pop"), vec!["high-energy", "modern"]);
        let template = template(vec!["120bpm", "pop", "high-energy", "modern"]);

        let breakdown = compute_breakdown(&song, &template, None);
        assert_eq!(breakdown.tempo_score, 1.0);
        assert_eq!(breakdown.genre_score, 1.0);
        assert_eq!(breakdown.energy_score, 1.0);
        assert_eq!(breakdown.style_score, 1.0);
        // Neither side carries mood tags
        assert_eq!(breakdown.mood_score, 0.5);
    }

    #[test]
    fn test_full_breakdown_scenario_b_all_neutral() {
        // Song with no metadata at all: every dimension defaults
        let bare_song = Asset {
            address: "G.UNK.UNK.001".to_string(),
            name: "Bare".to_string(),
            tags: vec![],
            description: None,
            created_at: None,
            components: vec![],
            song_metadata: None,
        };
        let template = template(vec!["arbitrary", "tags"]);

        let breakdown = compute_breakdown(&bare_song, &template, None);
        assert_eq!(breakdown.tempo_score, 0.5);
        assert_eq!(breakdown.genre_score, 0.5);
        // Both sides default to moderate energy
        assert_eq!(breakdown.energy_score, 1.0);
        assert_eq!(breakdown.style_score, 0.5);
        assert_eq!(breakdown.mood_score, 0.5);
    }

    #[test]
    fn test_breakdown_always_in_range() {
        let songs = [
            song(Some(1.0), Some("pop"), vec!["high-energy", "modern", "happy"]),
            song(Some(300.0), Some("unknown-genre"), vec!["low-energy"]),
            song(None, None, vec![]),
        ];
        let templates = [
            template(vec!["999bpm", "metal", "low-energy", "dark", "sad"]),
            template(vec![]),
            template(vec!["1bpm", "pop"]),
        ];

        for song in &songs {
            for template in &templates {
                let b = compute_breakdown(song, template, None);
                for score in [
                    b.tempo_score,
                    b.genre_score,
                    b.energy_score,
                    b.style_score,
                    b.mood_score,
                ] {
                    assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
                }
            }
        }
    }
}
