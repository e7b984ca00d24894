//! Prefix-indexed keyword lookup
//!
//! Keywords are normalized once at load time and kept in two sorted tables:
//! whole keywords and individual words. Prefix lookups are a binary search
//! plus a scan over the matching range. Substring and token-overlap tiers
//! only run when the higher tiers have not already filled the result limit,
//! because their scores can never outrank a higher tier.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use super::entry::{Dataset, KeywordEntry};
use super::normalize::Normalizer;
use crate::PictogramId;
use crate::errors::DatasetError;

const EXACT_SCORE: u32 = 1000;
const PREFIX_SCORE: u32 = 800;
const WORD_PREFIX_SCORE: u32 = 600;
const SUBSTRING_SCORE: u32 = 400;
const TOKEN_OVERLAP_SCORE: u32 = 100;
/// Largest length penalty inside a tier; keeps tier score ranges disjoint
const MAX_PENALTY: u32 = 99;
const MAX_SHARED_TOKENS: u32 = 19;

/// How a keyword matched the query, strongest last
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchKind {
    TokenOverlap,
    Substring,
    WordPrefix,
    Prefix,
    Exact,
}

/// One ranked query result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordHit {
    pub pictogram_id: PictogramId,
    pub score: u32,
    pub kind: MatchKind,
    /// The keyword (as loaded) that produced the score
    pub keyword: String,
}

/// Read-only keyword index for a single locale
#[derive(Debug)]
pub struct KeywordIndex {
    locale: String,
    version: Option<String>,
    normalizer: Normalizer,
    entries: Vec<KeywordEntry>,
    /// Normalized keyword per entry, aligned with `entries`
    normalized: Vec<String>,
    /// Entry indices sorted by normalized keyword
    sorted_keys: Vec<usize>,
    /// (word, entry index) sorted by word
    words: Vec<(String, usize)>,
    by_pictogram: HashMap<PictogramId, Vec<usize>>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: u32,
    kind: MatchKind,
    entry: usize,
}

impl KeywordIndex {
    /// Load and index a dataset file for `locale`
    pub fn load(path: &Path, locale: &str) -> Result<Self, DatasetError> {
        let start = Instant::now();
        let dataset = Dataset::read(path, locale)?;
        let index = Self::from_dataset(dataset)?;

        info!(
            "Keyword index for '{}' loaded from {}: {} keywords, {} pictograms in {:.2}s",
            index.locale,
            path.display(),
            index.entries.len(),
            index.by_pictogram.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(index)
    }

    pub fn from_dataset(dataset: Dataset) -> Result<Self, DatasetError> {
        Self::from_entries(&dataset.locale, dataset.version, dataset.entries)
    }

    pub fn from_entries(
        locale: &str,
        version: Option<String>,
        entries: Vec<KeywordEntry>,
    ) -> Result<Self, DatasetError> {
        let normalizer = Normalizer::for_locale(locale);

        let mut normalized = Vec::with_capacity(entries.len());
        for entry in &entries {
            let form = normalizer.normalize(&entry.keyword);
            if form.is_empty() {
                return Err(DatasetError::EmptyKeyword {
                    pictogram_id: entry.pictogram_id,
                });
            }
            normalized.push(form);
        }

        let mut sorted_keys: Vec<usize> = (0..entries.len()).collect();
        sorted_keys.sort_by(|&a, &b| {
            normalized[a]
                .cmp(&normalized[b])
                .then(entries[a].pictogram_id.cmp(&entries[b].pictogram_id))
        });

        let mut words = Vec::new();
        for (idx, form) in normalized.iter().enumerate() {
            for word in form.split(' ') {
                words.push((word.to_string(), idx));
            }
        }
        words.sort();

        let mut by_pictogram: HashMap<PictogramId, Vec<usize>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            by_pictogram.entry(entry.pictogram_id).or_default().push(idx);
        }

        Ok(Self {
            locale: locale.to_string(),
            version,
            normalizer,
            entries,
            normalized,
            sorted_keys,
            words,
            by_pictogram,
        })
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pictogram_count(&self) -> usize {
        self.by_pictogram.len()
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// All keywords (synonyms) for a pictogram in load order
    pub fn keywords_for(&self, pictogram_id: PictogramId) -> Vec<&str> {
        self.by_pictogram
            .get(&pictogram_id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| self.entries[i].keyword.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ranked pictograms for `text`: descending score, ascending id on ties,
    /// one hit per pictogram, never more than `limit`
    pub fn query(&self, text: &str, limit: usize) -> Vec<KeywordHit> {
        if limit == 0 {
            return Vec::new();
        }
        let query = self.normalizer.normalize(text);
        if query.is_empty() {
            return Vec::new();
        }

        let mut best: HashMap<PictogramId, Candidate> = HashMap::new();

        self.collect_prefix(&query, &mut best);

        if best.len() < limit && !query.contains(' ') {
            self.collect_word_prefix(&query, &mut best);
        }

        if best.len() < limit && query.chars().count() >= 2 {
            self.collect_substring(&query, &mut best);
        }

        if best.len() < limit {
            self.collect_token_overlap(&query, &mut best);
        }

        let mut hits: Vec<KeywordHit> = best
            .into_iter()
            .map(|(pictogram_id, candidate)| KeywordHit {
                pictogram_id,
                score: candidate.score,
                kind: candidate.kind,
                keyword: self.entries[candidate.entry].keyword.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.pictogram_id.cmp(&b.pictogram_id))
        });
        hits.truncate(limit);

        debug!(
            "Keyword query '{}' ({}): {} hits",
            query,
            self.locale,
            hits.len()
        );
        hits
    }

    fn collect_prefix(&self, query: &str, best: &mut HashMap<PictogramId, Candidate>) {
        let start = self
            .sorted_keys
            .partition_point(|&i| self.normalized[i].as_str() < query);

        for &idx in &self.sorted_keys[start..] {
            let form = &self.normalized[idx];
            if !form.starts_with(query) {
                break;
            }
            let candidate = if form.len() == query.len() {
                Candidate {
                    score: EXACT_SCORE,
                    kind: MatchKind::Exact,
                    entry: idx,
                }
            } else {
                Candidate {
                    score: PREFIX_SCORE - penalty(form, query),
                    kind: MatchKind::Prefix,
                    entry: idx,
                }
            };
            self.offer(best, candidate);
        }
    }

    fn collect_word_prefix(&self, query: &str, best: &mut HashMap<PictogramId, Candidate>) {
        let start = self
            .words
            .partition_point(|(word, _)| word.as_str() < query);

        for (word, idx) in &self.words[start..] {
            if !word.starts_with(query) {
                break;
            }
            self.offer(
                best,
                Candidate {
                    score: WORD_PREFIX_SCORE - penalty(word, query),
                    kind: MatchKind::WordPrefix,
                    entry: *idx,
                },
            );
        }
    }

    fn collect_substring(&self, query: &str, best: &mut HashMap<PictogramId, Candidate>) {
        for &idx in &self.sorted_keys {
            let form = &self.normalized[idx];
            if form.len() > query.len() && form.contains(query) {
                self.offer(
                    best,
                    Candidate {
                        score: SUBSTRING_SCORE - penalty(form, query),
                        kind: MatchKind::Substring,
                        entry: idx,
                    },
                );
            }
        }
    }

    fn collect_token_overlap(&self, query: &str, best: &mut HashMap<PictogramId, Candidate>) {
        let mut tokens: Vec<&str> = query.split(' ').collect();
        tokens.sort_unstable();
        tokens.dedup();

        let mut shared: HashMap<usize, u32> = HashMap::new();
        for token in tokens {
            let start = self.words.partition_point(|(word, _)| word.as_str() < token);
            let mut last_entry = None;
            for (word, idx) in &self.words[start..] {
                if word != token {
                    break;
                }
                // a keyword repeating the same word counts once
                if last_entry != Some(*idx) {
                    *shared.entry(*idx).or_default() += 1;
                    last_entry = Some(*idx);
                }
            }
        }

        let mut matched: Vec<(usize, u32)> = shared.into_iter().collect();
        matched.sort_unstable();
        for (idx, count) in matched {
            self.offer(
                best,
                Candidate {
                    score: TOKEN_OVERLAP_SCORE + 10 * count.min(MAX_SHARED_TOKENS),
                    kind: MatchKind::TokenOverlap,
                    entry: idx,
                },
            );
        }
    }

    fn offer(&self, best: &mut HashMap<PictogramId, Candidate>, candidate: Candidate) {
        let pictogram_id = self.entries[candidate.entry].pictogram_id;
        match best.get_mut(&pictogram_id) {
            Some(current) => {
                let better = candidate.score > current.score
                    || (candidate.score == current.score
                        && self.normalized[candidate.entry] < self.normalized[current.entry]);
                if better {
                    *current = candidate;
                }
            }
            None => {
                best.insert(pictogram_id, candidate);
            }
        }
    }
}

/// Length penalty for the unmatched remainder of `form`
fn penalty(form: &str, query: &str) -> u32 {
    let extra = form.chars().count().saturating_sub(query.chars().count());
    (extra as u32).clamp(1, MAX_PENALTY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(keyword: &str, pictogram_id: PictogramId) -> KeywordEntry {
        KeywordEntry {
            keyword: keyword.to_string(),
            pictogram_id,
            locale: "sv".to_string(),
        }
    }

    fn index(entries: Vec<KeywordEntry>) -> KeywordIndex {
        KeywordIndex::from_entries("sv", None, entries).unwrap()
    }

    fn ids(hits: &[KeywordHit]) -> Vec<PictogramId> {
        hits.iter().map(|h| h.pictogram_id).collect()
    }

    #[test]
    fn test_exact_outranks_prefix_of_longer_word() {
        let index = index(vec![entry("hundring", 102), entry("hund", 101)]);
        let hits = index.query("hund", 10);

        assert_eq!(ids(&hits), vec![101, 102]);
        assert_eq!(hits[0].kind, MatchKind::Exact);
        assert_eq!(hits[1].kind, MatchKind::Prefix);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_tiers_order_prefix_word_substring_token() {
        let index = index(vec![
            entry("borsta tänderna", 1),
            entry("tandborste", 2),
            entry("tvätta tänder", 3),
            entry("äta frukost", 4),
            entry("frukost i skolan", 5),
        ]);

        // prefix beats word-prefix
        let hits = index.query("tä", 10);
        assert_eq!(hits[0].kind, MatchKind::WordPrefix);
        assert_eq!(ids(&hits), vec![3, 1]);

        // substring tier for mid-word matches
        let hits = index.query("borste", 10);
        assert_eq!(ids(&hits), vec![2]);
        assert_eq!(hits[0].kind, MatchKind::Substring);

        // multi-token query falls back to token overlap
        let hits = index.query("frukost skolan", 10);
        assert_eq!(hits[0].pictogram_id, 5);
        assert_eq!(hits[0].kind, MatchKind::TokenOverlap);
        assert!(ids(&hits).contains(&4));
    }

    #[test]
    fn test_deduplicates_synonyms_keeping_best() {
        let index = index(vec![entry("katt", 7), entry("kattunge", 7), entry("katter", 8)]);
        let hits = index.query("katt", 10);
        assert_eq!(ids(&hits), vec![7, 8]);
        assert_eq!(hits[0].keyword, "katt");
        assert_eq!(index.keywords_for(7), vec!["katt", "kattunge"]);
    }

    #[test]
    fn test_ties_break_on_ascending_id() {
        let index = index(vec![entry("bil", 30), entry("bil", 10), entry("bil", 20)]);
        assert_eq!(ids(&index.query("BIL", 10)), vec![10, 20, 30]);
    }

    #[test]
    fn test_limit_and_blank_queries() {
        let index = index(vec![entry("sol", 1), entry("sola", 2), entry("solen", 3)]);
        assert_eq!(index.query("sol", 2).len(), 2);
        assert!(index.query("sol", 0).is_empty());
        assert!(index.query("   ", 5).is_empty());
        assert!(index.query("xyz", 5).is_empty());
    }

    #[test]
    fn test_empty_keyword_rejected() {
        let err = KeywordIndex::from_entries("sv", None, vec![entry("!!", 9)]).unwrap_err();
        assert!(matches!(err, DatasetError::EmptyKeyword { pictogram_id: 9 }));
    }

    #[test]
    fn test_query_is_deterministic() {
        let index = index(vec![
            entry("spela boll", 4),
            entry("spela", 3),
            entry("spel", 2),
            entry("leka", 1),
        ]);
        let first = index.query("spel", 10);
        for _ in 0..5 {
            assert_eq!(index.query("spel", 10), first);
        }
    }

    proptest! {
        #[test]
        fn test_query_invariants(
            keywords in prop::collection::vec(("[a-d]{1,6}( [a-d]{1,4})?", 1u32..40), 1..60),
            query in "[a-d]{1,3}( [a-d]{1,2})?",
            limit in 1usize..15,
        ) {
            let entries = keywords
                .into_iter()
                .map(|(keyword, id)| entry(&keyword, id))
                .collect();
            let index = index(entries);
            let hits = index.query(&query, limit);

            prop_assert!(hits.len() <= limit);
            let mut seen = std::collections::HashSet::new();
            for hit in &hits {
                prop_assert!(seen.insert(hit.pictogram_id));
            }
            for pair in hits.windows(2) {
                prop_assert!(
                    pair[0].score > pair[1].score
                        || (pair[0].score == pair[1].score
                            && pair[0].pictogram_id < pair[1].pictogram_id)
                );
            }
        }
    }
}
