use std::collections::HashMap;

use fst::Automaton;
use fst::automaton::Str;
use fst::{IntoStreamer, Map, MapBuilder, Streamer};
use icu::collator::{Collator, options::CollatorOptions};
use icu::locale::locale;
use rayon::prelude::*;

use crate::error::LoadError;
use crate::normalize::normalize;

/// A dictionary key whose normalised form starts with the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    pub normalized: &'a str,
    pub original: &'a str,
}

/// Stored keys that share one normalised form, in source order.
struct Group {
    normalized: String,
    originals: Vec<String>,
}

/// Prefix lookup over normalised keys, answering in Turkish collation order.
///
/// Groups are ranked once by the `tr` collator; the `fst` maps each
/// normalised key to its rank, so a prefix query only has to find the lowest
/// rank among the keys the automaton visits.
pub struct PrefixIndex {
    map: Map<Vec<u8>>,
    groups: Vec<Group>,
}

impl PrefixIndex {
    pub fn build<'a, I>(words: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let words: Vec<&str> = words.into_iter().collect();
        let normalized: Vec<String> = words.par_iter().map(|word| normalize(word)).collect();

        let mut slots: HashMap<&str, usize> = HashMap::with_capacity(words.len());
        let mut groups: Vec<Group> = Vec::new();
        for (word, key) in words.iter().zip(normalized.iter()) {
            match slots.get(key.as_str()) {
                Some(&slot) => groups[slot].originals.push((*word).to_string()),
                None => {
                    slots.insert(key.as_str(), groups.len());
                    groups.push(Group {
                        normalized: key.clone(),
                        originals: vec![(*word).to_string()],
                    });
                }
            }
        }

        let collator = Collator::try_new(locale!("tr").into(), CollatorOptions::default())
            .map_err(|err| LoadError::Collation(err.to_string()))?;
        // Stable: groups the collator considers equal keep source order.
        groups.sort_by(|a, b| collator.compare(&a.normalized, &b.normalized));

        let mut keyed: Vec<(&[u8], u64)> = groups
            .iter()
            .enumerate()
            .map(|(rank, group)| (group.normalized.as_bytes(), rank as u64))
            .collect();
        keyed.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut builder = MapBuilder::memory();
        for (key, rank) in keyed {
            builder.insert(key, rank)?;
        }
        let map = Map::new(builder.into_inner()?)?;
        Ok(Self { map, groups })
    }

    /// Number of distinct normalised keys.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// First key in collation order whose normalised form starts with
    /// `normalized_query`.
    pub fn best_match(&self, normalized_query: &str) -> Option<Match<'_>> {
        let automaton = Str::new(normalized_query).starts_with();
        let mut stream = self.map.search(automaton).into_stream();
        let mut best: Option<u64> = None;
        while let Some((_, rank)) = stream.next() {
            if best.is_none_or(|current| rank < current) {
                best = Some(rank);
                if rank == 0 {
                    break;
                }
            }
        }
        best.map(|rank| self.match_at(rank as usize))
    }

    /// Up to `limit` matches for `normalized_prefix`, in collation order.
    pub fn matches(&self, normalized_prefix: &str, limit: usize) -> Vec<Match<'_>> {
        let automaton = Str::new(normalized_prefix).starts_with();
        let mut stream = self.map.search(automaton).into_stream();
        let mut ranks = Vec::new();
        while let Some((_, rank)) = stream.next() {
            ranks.push(rank);
        }
        ranks.sort_unstable();
        ranks
            .into_iter()
            .take(limit)
            .map(|rank| self.match_at(rank as usize))
            .collect()
    }

    /// Every stored key that folds to `normalized`, in source order.
    pub fn originals(&self, normalized: &str) -> &[String] {
        self.map
            .get(normalized)
            .map(|rank| self.groups[rank as usize].originals.as_slice())
            .unwrap_or(&[])
    }

    fn match_at(&self, rank: usize) -> Match<'_> {
        let group = &self.groups[rank];
        Match {
            normalized: group.normalized.as_str(),
            original: group.originals[0].as_str(),
        }
    }
}
