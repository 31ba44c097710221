//! Duplicate tracking: words sharing a length-W glyph window are "substring
//! dupes" of each other, and arbitrary extra pairs can be declared on top.
//! The search uses this to keep a chosen word's dupes out of every other
//! slot.

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;

use crate::{GlobalWordId, GlyphId, WordId};

type WindowKey = SmallVec<[GlyphId; 8]>;

/// Index from length-W glyph windows to the words containing them, plus a
/// symmetric map of explicitly-declared pairs. Populated incrementally as
/// words are added to the list.
#[derive(Debug, Default)]
pub struct DupeIndex {
    window: usize,
    groups: HashMap<WindowKey, Vec<GlobalWordId>>,
    extra_pairs: HashMap<GlobalWordId, HashSet<GlobalWordId>>,
}

impl DupeIndex {
    /// A window size of 0 disables substring duplicate detection; explicit
    /// pairs and the word itself are still reported.
    #[must_use]
    pub fn new(window: usize) -> DupeIndex {
        DupeIndex {
            window,
            groups: HashMap::new(),
            extra_pairs: HashMap::new(),
        }
    }

    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Drop all indexed words and pairs, keeping the window size.
    pub fn reset(&mut self) {
        self.groups.clear();
        self.extra_pairs.clear();
    }

    /// Record a newly added word under each of its glyph windows.
    pub fn add_word(&mut self, global_id: GlobalWordId, glyphs: &[GlyphId]) {
        if self.window == 0 || glyphs.len() < self.window {
            return;
        }
        for window in glyphs.windows(self.window) {
            self.groups
                .entry(WindowKey::from_slice(window))
                .or_default()
                .push(global_id);
        }
    }

    /// Declare two words duplicates regardless of their letters.
    pub fn add_dupe_pair(&mut self, a: GlobalWordId, b: GlobalWordId) {
        self.extra_pairs.entry(a).or_default().insert(b);
        self.extra_pairs.entry(b).or_default().insert(a);
    }

    /// Withdraw an explicitly-declared pair. Substring dupes are unaffected.
    pub fn remove_dupe_pair(&mut self, a: GlobalWordId, b: GlobalWordId) {
        if let Some(mates) = self.extra_pairs.get_mut(&a) {
            mates.remove(&b);
        }
        if let Some(mates) = self.extra_pairs.get_mut(&b) {
            mates.remove(&a);
        }
    }

    /// Everything that can't coexist with the given word, bucketed by length
    /// so callers can probe only the slots whose length matches: the word
    /// itself, all words sharing any glyph window with it, and explicit-pair
    /// mates.
    #[must_use]
    pub fn get_dupes(
        &self,
        global_id: GlobalWordId,
        glyphs: &[GlyphId],
    ) -> HashMap<usize, HashSet<WordId>> {
        let mut dupes_by_length: HashMap<usize, HashSet<WordId>> = HashMap::new();
        let mut record = |(length, word_id): GlobalWordId| {
            dupes_by_length.entry(length).or_default().insert(word_id);
        };

        record(global_id);

        if self.window > 0 && glyphs.len() >= self.window {
            for window in glyphs.windows(self.window) {
                if let Some(group) = self.groups.get(window) {
                    for &mate in group {
                        record(mate);
                    }
                }
            }
        }

        if let Some(mates) = self.extra_pairs.get(&global_id) {
            for &mate in mates {
                record(mate);
            }
        }

        dupes_by_length
    }
}

#[cfg(test)]
mod tests {
    use crate::words::{WordList, WordListSourceConfig};

    fn word_list_with_window(entries: &[&str], window: usize) -> WordList {
        WordList::new(
            vec![WordListSourceConfig::Memory {
                id: "mem".into(),
                enabled: true,
                entries: entries.iter().map(|&w| (w.to_string(), 50)).collect(),
            }],
            None,
            Some(window),
        )
    }

    #[test]
    fn test_shared_window_makes_dupes() {
        let word_list = word_list_with_window(&["stone", "tones", "plank"], 4);
        let stone = word_list.word_id_by_string["stone"];
        let tones = word_list.word_id_by_string["tones"];
        let plank = word_list.word_id_by_string["plank"];

        let dupes = word_list
            .dupe_index
            .get_dupes(stone, &word_list.words[stone.0][stone.1].glyphs);
        assert!(dupes[&5].contains(&stone.1), "word is its own dupe");
        assert!(dupes[&5].contains(&tones.1), "shared 'tone' window");
        assert!(!dupes[&5].contains(&plank.1));
    }

    #[test]
    fn test_dupes_are_bucketed_by_length() {
        let word_list = word_list_with_window(&["rule", "ruler"], 4);
        let rule = word_list.word_id_by_string["rule"];
        let ruler = word_list.word_id_by_string["ruler"];

        let dupes = word_list
            .dupe_index
            .get_dupes(rule, &word_list.words[rule.0][rule.1].glyphs);
        assert!(dupes[&4].contains(&rule.1));
        assert!(dupes[&5].contains(&ruler.1));
    }

    #[test]
    fn test_zero_window_disables_substring_dupes() {
        let word_list = word_list_with_window(&["stone", "tones"], 0);
        let stone = word_list.word_id_by_string["stone"];
        let tones = word_list.word_id_by_string["tones"];

        let dupes = word_list
            .dupe_index
            .get_dupes(stone, &word_list.words[stone.0][stone.1].glyphs);
        assert!(dupes[&5].contains(&stone.1));
        assert!(!dupes[&5].contains(&tones.1));
    }

    #[test]
    fn test_explicit_pairs_add_and_remove() {
        let mut word_list = word_list_with_window(&["cat", "dog"], 4);
        let cat = word_list.word_id_by_string["cat"];
        let dog = word_list.word_id_by_string["dog"];

        word_list.dupe_index.add_dupe_pair(cat, dog);
        let glyphs = word_list.words[cat.0][cat.1].glyphs.clone();
        assert!(word_list.dupe_index.get_dupes(cat, &glyphs)[&3].contains(&dog.1));

        word_list.dupe_index.remove_dupe_pair(cat, dog);
        let dupes = word_list.dupe_index.get_dupes(cat, &glyphs);
        assert!(!dupes[&3].contains(&dog.1));
    }
}
