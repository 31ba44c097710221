//! Enumeration of the words allowed in a slot, given its partial fill and
//! filtering rules. This is what builds each slot's initial option list and
//! recomputes it when a per-slot filter is attached.

use std::collections::HashSet;

use regex::Regex;

use crate::words::WordList;
use crate::{GlyphId, WordId};

/// Optional per-slot restrictions layered over the global minimum score.
#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    /// Overrides the global minimum score for this slot.
    pub min_score: Option<u16>,

    /// Matched against the normalized form of each candidate.
    pub pattern: Option<Regex>,
}

/// Enumerate the candidate `WordId`s for a slot whose cells are prefilled as
/// given. A fully prefilled slot resolves to exactly one id, adding a hidden
/// entry if the letters spell no known word; otherwise candidates come from
/// the matching length bucket in its natural order. Words in `allowed` are
/// exempt from score, regex, and hidden filtering, but never from the
/// prefill.
#[must_use]
pub fn slot_options(
    word_list: &mut WordList,
    prefill: &[Option<GlyphId>],
    min_score: u16,
    filter: Option<&SlotFilter>,
    allowed: Option<&HashSet<WordId>>,
) -> Vec<WordId> {
    let length = prefill.len();

    if prefill.iter().all(Option::is_some) {
        let normalized: String = prefill
            .iter()
            .map(|glyph| word_list.glyphs[glyph.unwrap_or_default()])
            .collect();
        let (found_length, word_id) = word_list.lookup_or_add_hidden(&normalized);
        debug_assert_eq!(found_length, length);
        return vec![word_id];
    }

    let min_score = filter
        .and_then(|filter| filter.min_score)
        .unwrap_or(min_score);
    let pattern = filter.and_then(|filter| filter.pattern.as_ref());

    let Some(bucket) = word_list.words.get(length) else {
        return vec![];
    };

    bucket
        .iter()
        .enumerate()
        .filter(|(word_id, word)| {
            let matches_prefill = prefill
                .iter()
                .enumerate()
                .all(|(cell_idx, glyph)| glyph.map_or(true, |g| word.glyphs[cell_idx] == g));
            if !matches_prefill {
                return false;
            }
            if allowed.map_or(false, |allowed| allowed.contains(word_id)) {
                return true;
            }
            !word.hidden
                && word.score >= min_score
                && pattern.map_or(true, |pattern| pattern.is_match(&word.normalized))
        })
        .map(|(word_id, _)| word_id)
        .collect()
}
