use crate::walker::SwatchControl;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which rule satisfied a color spec. Diagnostic only; selection never
/// depends on it beyond "some rule fired".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    ExactCode,
    ExactSecondary,
    ContainsTitle,
    Synonym,
}

/// Canonical color family -> synonyms that count as that family when they
/// appear in a swatch title. Injectable so per-site vocabulary stays out of
/// the matcher itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SynonymTable {
    families: HashMap<String, Vec<String>>,
}

impl SynonymTable {
    pub fn new(families: HashMap<String, Vec<String>>) -> Self {
        Self { families }
    }

    pub fn synonyms_for(&self, family: &str) -> Option<&[String]> {
        self.families.get(family).map(|v| v.as_slice())
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        let mut families = HashMap::new();
        families.insert(
            "navy blue".to_string(),
            vec!["navy", "midnight", "marine", "dark blue"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        families.insert(
            "red".to_string(),
            vec!["crimson", "scarlet", "bordeaux", "burgundy"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        families.insert(
            "green".to_string(),
            vec!["olive", "forest", "sage", "khaki"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        families.insert(
            "grey".to_string(),
            vec!["gray", "charcoal", "anthracite", "slate"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        Self { families }
    }
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'ç' => 'c',
        'ñ' => 'n',
        _ => c,
    }
}

/// Lower-case, fold Latin accents, collapse whitespace. Safe for code
/// comparison since digits and punctuation survive.
pub fn normalize(s: &str) -> String {
    let lowered: String = s
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(fold_diacritic)
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title-matching normalization: like `normalize` but punctuation and digits
/// become separators, so "Classic Red (CR)" and "classic red cr" compare equal.
pub fn normalize_title(s: &str) -> String {
    let folded: String = s
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(fold_diacritic)
        .map(|c| {
            if c.is_alphabetic() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct ColorMatcher {
    synonyms: SynonymTable,
}

impl ColorMatcher {
    pub fn new(synonyms: SynonymTable) -> Self {
        Self { synonyms }
    }

    /// First rule that satisfies `spec` against this control, if any.
    /// `spec` must already be normalized via `normalize`.
    pub fn match_rule(&self, spec: &str, control: &SwatchControl) -> Option<MatchRule> {
        if spec.is_empty() {
            return None;
        }

        if !control.machine_code.is_empty() && spec == normalize(&control.machine_code) {
            return Some(MatchRule::ExactCode);
        }

        if !control.secondary_code_text.is_empty()
            && spec == normalize(&control.secondary_code_text)
        {
            return Some(MatchRule::ExactSecondary);
        }

        let title = normalize_title(&control.display_title);
        let spec_title = normalize_title(spec);
        if !spec_title.is_empty() && title.contains(&spec_title) {
            return Some(MatchRule::ContainsTitle);
        }

        if let Some(syns) = self.synonyms.synonyms_for(&spec_title) {
            for syn in syns {
                let syn = normalize_title(syn);
                if !syn.is_empty() && title.contains(&syn) {
                    return Some(MatchRule::Synonym);
                }
            }
        }

        None
    }

    pub fn matches(&self, spec: &str, control: &SwatchControl) -> bool {
        self.match_rule(spec, control).is_some()
    }

    /// Orders swatches to click against the caller's wanted list.
    ///
    /// Empty `wanted` selects every control in page order. Otherwise, each
    /// spec (in caller order) picks the first control in page order that
    /// satisfies any rule; a control already selected by an earlier spec is
    /// not selected twice. Specs with no match come back separately and must
    /// be reported, not raised.
    pub fn select_targets(
        &self,
        controls: &[SwatchControl],
        wanted: &[String],
    ) -> (Vec<usize>, Vec<String>) {
        let wanted_norm: Vec<String> = wanted
            .iter()
            .map(|w| normalize(w))
            .filter(|w| !w.is_empty())
            .collect();

        if wanted_norm.is_empty() {
            return ((0..controls.len()).collect(), vec![]);
        }

        let mut selected: Vec<usize> = Vec::new();
        let mut unmatched: Vec<String> = Vec::new();

        for w in &wanted_norm {
            let hit = controls
                .iter()
                .enumerate()
                .find(|(_, c)| self.matches(w, c));
            match hit {
                Some((idx, _)) => {
                    if !selected.contains(&idx) {
                        selected.push(idx);
                    }
                }
                None => unmatched.push(w.clone()),
            }
        }

        (selected, unmatched)
    }
}

impl Default for ColorMatcher {
    fn default() -> Self {
        Self::new(SynonymTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(code: &str, title: &str) -> SwatchControl {
        SwatchControl {
            page_index: 0,
            display_title: title.to_string(),
            machine_code: code.to_string(),
            secondary_code_text: String::new(),
        }
    }

    #[test]
    fn normalize_collapses_and_folds() {
        assert_eq!(normalize("  Bleu   Mariné "), "bleu marine");
        assert_eq!(normalize("CR"), "cr");
    }

    #[test]
    fn title_normalization_drops_punctuation_and_digits() {
        assert_eq!(normalize_title("Classic Red (CR) 2024"), "classic red cr");
    }

    #[test]
    fn exact_code_beats_title() {
        let m = ColorMatcher::default();
        let c = control("CR", "Classic Red (CR)");
        assert_eq!(m.match_rule("cr", &c), Some(MatchRule::ExactCode));
    }

    #[test]
    fn secondary_code_matches() {
        let m = ColorMatcher::default();
        let mut c = control("", "Classic Red");
        c.secondary_code_text = "CR".to_string();
        assert_eq!(m.match_rule("cr", &c), Some(MatchRule::ExactSecondary));
    }

    #[test]
    fn title_containment() {
        let m = ColorMatcher::default();
        let c = control("FN", "French Navy");
        assert_eq!(
            m.match_rule("french navy", &c),
            Some(MatchRule::ContainsTitle)
        );
        assert_eq!(m.match_rule("navy", &c), Some(MatchRule::ContainsTitle));
    }

    #[test]
    fn synonym_cluster_matches_family() {
        let m = ColorMatcher::default();
        let c = control("MD", "Midnight Dream");
        assert_eq!(m.match_rule("navy blue", &c), Some(MatchRule::Synonym));
    }

    #[test]
    fn no_match_without_synonym_or_substring() {
        let m = ColorMatcher::default();
        let c = control("FN", "French Navy");
        assert_eq!(m.match_rule("yellow", &c), None);
    }

    #[test]
    fn custom_synonym_table_is_injectable() {
        let mut families = HashMap::new();
        families.insert("sun".to_string(), vec!["lemon".to_string()]);
        let m = ColorMatcher::new(SynonymTable::new(families));
        let c = control("LM", "Lemon Twist");
        assert_eq!(m.match_rule("sun", &c), Some(MatchRule::Synonym));
        // Default families are gone in a custom table.
        assert_eq!(m.match_rule("navy blue", &control("MD", "Midnight")), None);
    }

    #[test]
    fn selection_follows_caller_order_and_dedupes() {
        // Scenario: ["CR", "Classic Red"] both hit the same swatch; it must
        // be selected exactly once.
        let m = ColorMatcher::default();
        let controls = vec![
            control("CR", "Classic Red (CR)"),
            control("FN", "French Navy"),
        ];
        let (selected, unmatched) = m.select_targets(
            &controls,
            &["CR".to_string(), "Classic Red".to_string()],
        );
        assert_eq!(selected, vec![0]);
        assert!(unmatched.is_empty());
    }

    #[test]
    fn caller_order_wins_over_page_order() {
        let m = ColorMatcher::default();
        let controls = vec![
            control("CR", "Classic Red"),
            control("FN", "French Navy"),
        ];
        let (selected, _) = m.select_targets(
            &controls,
            &["french navy".to_string(), "classic red".to_string()],
        );
        assert_eq!(selected, vec![1, 0]);
    }

    #[test]
    fn unmatched_spec_is_reported_not_fatal() {
        let m = ColorMatcher::default();
        let controls = vec![control("CR", "Classic Red")];
        let (selected, unmatched) =
            m.select_targets(&controls, &["magenta".to_string(), "CR".to_string()]);
        assert_eq!(selected, vec![0]);
        assert_eq!(unmatched, vec!["magenta".to_string()]);
    }

    #[test]
    fn empty_wanted_selects_everything() {
        let m = ColorMatcher::default();
        let controls = vec![
            control("CR", "Classic Red"),
            control("FN", "French Navy"),
            control("OG", "Olive Green"),
        ];
        let (selected, unmatched) = m.select_targets(&controls, &[]);
        assert_eq!(selected, vec![0, 1, 2]);
        assert!(unmatched.is_empty());
    }

    #[test]
    fn blank_specs_are_ignored() {
        let m = ColorMatcher::default();
        let controls = vec![control("CR", "Classic Red")];
        // Whitespace-only specs normalize away and must not force select-all
        // semantics onto a list that had real entries.
        let (selected, unmatched) =
            m.select_targets(&controls, &["   ".to_string(), "CR".to_string()]);
        assert_eq!(selected, vec![0]);
        assert!(unmatched.is_empty());
    }
}
