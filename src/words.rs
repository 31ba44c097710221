//! The word store: characters interned to dense glyph ids, words bucketed by
//! length with scores, and ingestion from an ordered list of sources with
//! per-source error accumulation.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::fs;
use std::path::PathBuf;

use log::debug;
use smallvec::SmallVec;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::dupes::DupeIndex;
use crate::{GlobalWordId, GlyphId, WordId, MAX_GLYPH_COUNT, MAX_SLOT_LENGTH};

/// Stop recording parse errors for a source after this many.
pub const MAX_SOURCE_ERRORS: usize = 100;

/// Score given to entries whose line doesn't specify one.
pub const DEFAULT_WORD_SCORE: u16 = 50;

/// For each cell of a slot, a count per glyph id of how many candidate words
/// place that glyph in that cell. This is the structure that makes the
/// propagator's support check constant-time.
pub type GlyphCountsByCell = Vec<SmallVec<[u32; MAX_GLYPH_COUNT]>>;

/// Fixed letter-point values, with 3 for anything outside the table.
fn letter_points(ch: char) -> u16 {
    match ch {
        'a' | 'e' | 'i' | 'l' | 'n' | 'o' | 'r' | 's' | 't' | 'u' => 1,
        'd' | 'g' => 2,
        'b' | 'c' | 'm' | 'p' => 3,
        'f' | 'h' | 'v' | 'w' | 'y' => 4,
        'k' => 5,
        'j' | 'x' => 8,
        'q' | 'z' => 10,
        _ => 3,
    }
}

/// Lowercase, compose to NFC, and drop whitespace. An entry that normalizes
/// to the empty string is unusable and gets skipped at ingestion.
#[must_use]
pub fn normalize_word(canonical: &str) -> String {
    canonical
        .nfc()
        .flat_map(char::to_lowercase)
        .filter(|ch| !ch.is_whitespace())
        .collect()
}

/// A single word in the list.
pub struct Word {
    /// The display form as it appeared in the source.
    pub canonical: String,

    /// The normalized form; unique across the whole list.
    pub normalized: String,

    /// One glyph id per char of `normalized`.
    pub glyphs: SmallVec<[GlyphId; MAX_SLOT_LENGTH]>,

    /// Word quality, 0-100 with 50 nominal.
    pub score: u16,

    /// Sum of the letter-point values of the word's chars.
    pub letter_score: u16,

    /// Hidden words have ids so they can fill pre-populated slots, but are
    /// invisible to option enumeration.
    pub hidden: bool,

    /// Index of the source that contributed this word, if any.
    pub source_index: Option<usize>,
}

impl Debug for Word {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Word")
            .field("normalized", &self.normalized)
            .field("score", &self.score)
            .field("hidden", &self.hidden)
            .finish()
    }
}

/// A problem found while ingesting one source. Accumulated per source id, up
/// to `MAX_SOURCE_ERRORS`; never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WordListError {
    #[error("line {line}: invalid score {score:?}")]
    InvalidScore { line: usize, score: String },

    #[error("unable to read word list: {0}")]
    Unreadable(String),
}

/// One provider of word-list entries. Sources are consulted in order; the
/// first source in which a normalized string appears owns it.
#[derive(Debug, Clone)]
pub enum WordListSourceConfig {
    Memory {
        id: String,
        enabled: bool,
        entries: Vec<(String, u16)>,
    },
    FileContents {
        id: String,
        enabled: bool,
        contents: String,
    },
    File {
        id: String,
        enabled: bool,
        path: PathBuf,
    },
}

impl WordListSourceConfig {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            WordListSourceConfig::Memory { id, .. }
            | WordListSourceConfig::FileContents { id, .. }
            | WordListSourceConfig::File { id, .. } => id,
        }
    }

    #[must_use]
    fn enabled(&self) -> bool {
        match self {
            WordListSourceConfig::Memory { enabled, .. }
            | WordListSourceConfig::FileContents { enabled, .. }
            | WordListSourceConfig::File { enabled, .. } => *enabled,
        }
    }
}

/// The word store. Glyph ids are dense from 0 and shared by every structure
/// that talks about letters; `words` is bucketed by glyph length, so a
/// `WordId` is only meaningful together with a length.
pub struct WordList {
    /// Mapping from glyph id to the char it represents.
    pub glyphs: Vec<char>,

    glyph_ids_by_char: HashMap<char, GlyphId>,

    /// Words bucketed by length: `words[len]` holds every word of that
    /// glyph-length, hidden entries included.
    pub words: Vec<Vec<Word>>,

    /// O(1) lookup from normalized string to id.
    pub word_id_by_string: HashMap<String, GlobalWordId>,

    /// Substring/explicit-pair duplicate tracking, maintained as words are
    /// added.
    pub dupe_index: DupeIndex,

    /// Entries longer than this are ignored at ingestion.
    max_length: usize,

    source_errors: HashMap<String, Vec<WordListError>>,
}

impl Debug for WordList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordList")
            .field("glyphs", &self.glyphs.len())
            .field("words", &self.word_id_by_string.len())
            .finish()
    }
}

impl WordList {
    /// Build a word list from the given sources. `max_length` bounds the
    /// entries kept (`MAX_SLOT_LENGTH` if unspecified); `shared_window` is
    /// the dupe-index window size, where `None` or 0 disables substring
    /// duplicate detection.
    #[must_use]
    pub fn new(
        sources: Vec<WordListSourceConfig>,
        max_length: Option<usize>,
        shared_window: Option<usize>,
    ) -> WordList {
        let mut word_list = WordList {
            glyphs: Vec::with_capacity(26),
            glyph_ids_by_char: HashMap::with_capacity(26),
            words: vec![],
            word_id_by_string: HashMap::new(),
            dupe_index: DupeIndex::new(shared_window.unwrap_or(0)),
            max_length: max_length.unwrap_or(MAX_SLOT_LENGTH),
            source_errors: HashMap::new(),
        };
        word_list.replace_list(sources);
        word_list
    }

    /// Map a char to its glyph id, assigning the next id on first sight.
    pub fn intern(&mut self, ch: char) -> GlyphId {
        if let Some(&id) = self.glyph_ids_by_char.get(&ch) {
            return id;
        }
        let id = self.glyphs.len();
        self.glyphs.push(ch);
        self.glyph_ids_by_char.insert(ch, id);
        id
    }

    /// Add a word to the appropriate bucket and register it everywhere it
    /// needs to be known. The caller must pass a non-empty normalized form
    /// that isn't in the list yet.
    pub fn add_word(
        &mut self,
        normalized: &str,
        canonical: &str,
        score: u16,
        source_index: Option<usize>,
        hidden: bool,
    ) -> GlobalWordId {
        let glyphs: SmallVec<[GlyphId; MAX_SLOT_LENGTH]> =
            normalized.chars().map(|ch| self.intern(ch)).collect();
        let length = glyphs.len();
        let letter_score = normalized.chars().map(letter_points).sum();

        if self.words.len() < length + 1 {
            self.words.resize_with(length + 1, Vec::new);
        }

        let word_id: WordId = self.words[length].len();
        self.dupe_index.add_word((length, word_id), &glyphs);
        self.words[length].push(Word {
            canonical: canonical.to_string(),
            normalized: normalized.to_string(),
            glyphs,
            score,
            letter_score,
            hidden,
            source_index,
        });
        self.word_id_by_string
            .insert(normalized.to_string(), (length, word_id));

        (length, word_id)
    }

    /// Look up a normalized string, adding it as a hidden zero-score entry if
    /// it isn't present. This is how fully pre-filled slots that spell no
    /// known word get an id.
    pub fn lookup_or_add_hidden(&mut self, normalized: &str) -> GlobalWordId {
        if let Some(&global_id) = self.word_id_by_string.get(normalized) {
            return global_id;
        }
        self.add_word(normalized, normalized, 0, None, true)
    }

    /// Throw away the current contents and re-ingest from `sources`, in
    /// order. The first source where a normalized string appears owns it;
    /// later occurrences are skipped.
    pub fn replace_list(&mut self, sources: Vec<WordListSourceConfig>) {
        self.words.clear();
        self.word_id_by_string.clear();
        self.source_errors.clear();
        self.dupe_index.reset();

        for (source_index, source) in sources.iter().enumerate() {
            if !source.enabled() {
                continue;
            }
            let mut errors = vec![];
            let entries = self.read_source(source, &mut errors);
            let mut added = 0usize;

            for (canonical, score) in entries {
                let normalized = normalize_word(&canonical);
                if normalized.is_empty() || normalized.chars().count() > self.max_length {
                    continue;
                }
                if self.word_id_by_string.contains_key(&normalized) {
                    continue;
                }
                self.add_word(&normalized, &canonical, score, Some(source_index), false);
                added += 1;
            }

            debug!(
                "word list source {:?}: {} words added, {} errors",
                source.id(),
                added,
                errors.len()
            );
            self.source_errors.insert(source.id().to_string(), errors);
        }
    }

    /// Parse errors recorded for each source during the last ingestion,
    /// keyed by source id.
    #[must_use]
    pub fn get_source_errors(&self) -> &HashMap<String, Vec<WordListError>> {
        &self.source_errors
    }

    fn read_source(
        &self,
        source: &WordListSourceConfig,
        errors: &mut Vec<WordListError>,
    ) -> Vec<(String, u16)> {
        match source {
            WordListSourceConfig::Memory { entries, .. } => entries.clone(),
            WordListSourceConfig::FileContents { contents, .. } => {
                parse_word_list_text(contents, errors)
            }
            WordListSourceConfig::File { path, .. } => match fs::read_to_string(path) {
                Ok(contents) => parse_word_list_text(&contents, errors),
                Err(cause) => {
                    errors.push(WordListError::Unreadable(cause.to_string()));
                    vec![]
                }
            },
        }
    }

    /// Build the per-cell glyph counts for a slot of the given length whose
    /// candidates are `options`.
    #[must_use]
    pub fn glyph_counts_by_cell(&self, length: usize, options: &[WordId]) -> GlyphCountsByCell {
        let mut counts: GlyphCountsByCell = (0..length)
            .map(|_| SmallVec::from_elem(0, self.glyphs.len()))
            .collect();

        for &word_id in options {
            let word = &self.words[length][word_id];
            for (cell_idx, &glyph) in word.glyphs.iter().enumerate() {
                counts[cell_idx][glyph] += 1;
            }
        }

        counts
    }
}

/// Parse word-list text: one entry per line, `canonical` or
/// `canonical;score`. Recording stops after `MAX_SOURCE_ERRORS` problems.
fn parse_word_list_text(contents: &str, errors: &mut Vec<WordListError>) -> Vec<(String, u16)> {
    let mut entries = vec![];

    for (line_idx, raw_line) in contents.lines().enumerate() {
        if errors.len() >= MAX_SOURCE_ERRORS {
            break;
        }
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(';') {
            None => entries.push((line.to_string(), DEFAULT_WORD_SCORE)),
            Some((canonical, score_str)) => match score_str.trim().parse::<u16>() {
                Ok(score) => entries.push((canonical.to_string(), score)),
                Err(_) => errors.push(WordListError::InvalidScore {
                    line: line_idx + 1,
                    score: score_str.trim().to_string(),
                }),
            },
        }
    }

    entries
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub const BUNDLED_WORDS: &str = include_str!("../resources/words.txt");

    /// The word list most tests run against: the bundled dictionary capped to
    /// the given length, with a dupe window of 4.
    pub fn bundled_word_list(max_length: usize) -> WordList {
        WordList::new(
            vec![WordListSourceConfig::FileContents {
                id: "bundled".into(),
                enabled: true,
                contents: BUNDLED_WORDS.into(),
            }],
            Some(max_length),
            Some(4),
        )
    }

    fn memory_source(entries: &[(&str, u16)]) -> WordListSourceConfig {
        WordListSourceConfig::Memory {
            id: "mem".into(),
            enabled: true,
            entries: entries
                .iter()
                .map(|&(word, score)| (word.to_string(), score))
                .collect(),
        }
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_word("Creme Brulee"), "cremebrulee");
        assert_eq!(normalize_word("  \t "), "");
        assert_eq!(normalize_word("CAFE\u{301}"), "caf\u{e9}");
    }

    #[test]
    fn test_glyph_ids_are_dense_and_stable() {
        let mut word_list = WordList::new(vec![], None, None);
        let a = word_list.intern('a');
        let b = word_list.intern('b');
        assert_eq!((a, b), (0, 1));
        assert_eq!(word_list.intern('a'), 0);
        assert_eq!(word_list.glyphs, vec!['a', 'b']);
    }

    #[test]
    fn test_letter_scores() {
        let word_list = WordList::new(
            vec![memory_source(&[("quiz", 50), ("seat", 50)])],
            None,
            None,
        );
        let (len, id) = word_list.word_id_by_string["quiz"];
        assert_eq!(word_list.words[len][id].letter_score, 10 + 1 + 1 + 10);
        let (len, id) = word_list.word_id_by_string["seat"];
        assert_eq!(word_list.words[len][id].letter_score, 4);
    }

    #[test]
    fn test_first_source_owns_duplicates() {
        let word_list = WordList::new(
            vec![
                memory_source(&[("pear", 70)]),
                WordListSourceConfig::Memory {
                    id: "second".into(),
                    enabled: true,
                    entries: vec![("PEAR".into(), 10), ("plum".into(), 60)],
                },
            ],
            None,
            None,
        );
        let (len, id) = word_list.word_id_by_string["pear"];
        assert_eq!(word_list.words[len][id].score, 70);
        assert_eq!(word_list.words[len][id].source_index, Some(0));
        assert_eq!(word_list.word_id_by_string["plum"].0, 4);
    }

    #[test]
    fn test_disabled_sources_are_skipped() {
        let word_list = WordList::new(
            vec![WordListSourceConfig::Memory {
                id: "off".into(),
                enabled: false,
                entries: vec![("pear".into(), 50)],
            }],
            None,
            None,
        );
        assert!(word_list.word_id_by_string.is_empty());
    }

    #[test]
    fn test_score_parsing_and_error_cap() {
        let mut contents = String::from("ok;80\nbare\nbad;x\n");
        for _ in 0..150 {
            contents.push_str("worse;nope\n");
        }
        let word_list = WordList::new(
            vec![WordListSourceConfig::FileContents {
                id: "0".into(),
                enabled: true,
                contents,
            }],
            None,
            None,
        );

        let (len, id) = word_list.word_id_by_string["ok"];
        assert_eq!(word_list.words[len][id].score, 80);
        let (len, id) = word_list.word_id_by_string["bare"];
        assert_eq!(word_list.words[len][id].score, DEFAULT_WORD_SCORE);

        let errors = &word_list.get_source_errors()["0"];
        assert_eq!(errors.len(), MAX_SOURCE_ERRORS);
        assert_eq!(
            errors[0],
            WordListError::InvalidScore {
                line: 3,
                score: "x".into()
            }
        );
    }

    #[test]
    fn test_unreadable_file_source() {
        let word_list = WordList::new(
            vec![WordListSourceConfig::File {
                id: "missing".into(),
                enabled: true,
                path: "/nonexistent/words.txt".into(),
            }],
            None,
            None,
        );
        assert!(matches!(
            word_list.get_source_errors()["missing"][0],
            WordListError::Unreadable(_)
        ));
    }

    #[test]
    fn test_lookup_or_add_hidden() {
        let mut word_list = WordList::new(vec![memory_source(&[("pear", 50)])], None, None);
        let existing = word_list.lookup_or_add_hidden("pear");
        assert_eq!(existing, word_list.word_id_by_string["pear"]);

        let added = word_list.lookup_or_add_hidden("zzyzx");
        let word = &word_list.words[added.0][added.1];
        assert!(word.hidden);
        assert_eq!(word.score, 0);
        assert_eq!(word_list.lookup_or_add_hidden("zzyzx"), added);
    }

    #[test]
    fn test_glyph_counts_by_cell() {
        let word_list = WordList::new(
            vec![memory_source(&[("cat", 50), ("cot", 50), ("dog", 50)])],
            None,
            None,
        );
        let options: Vec<WordId> = (0..word_list.words[3].len()).collect();
        let counts = word_list.glyph_counts_by_cell(3, &options);

        let c = word_list.word_id_by_string["cat"];
        let glyph_c = word_list.words[c.0][c.1].glyphs[0];
        assert_eq!(counts[0][glyph_c], 2);
        let total: u32 = counts[1].iter().sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_bundled_list_parses_cleanly() {
        let word_list = bundled_word_list(MAX_SLOT_LENGTH);
        assert!(word_list.get_source_errors()["bundled"].is_empty());
        assert!(word_list.word_id_by_string.len() > 3000);
        // Scores carried through: the bundled list demotes a few entries.
        let (len, id) = word_list.word_id_by_string["tutu"];
        assert_eq!(word_list.words[len][id].score, 20);
    }
}
