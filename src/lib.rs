//! Crossword grid filling. A `WordList` holds scored entries bucketed by
//! length, a `GridConfig` turns a template string into slots and crossings,
//! and `find_fill` searches for an assignment of a word to every slot such
//! that crossing slots agree on their shared letter, no word repeats, and
//! every choice meets the configured minimum score.

pub mod dupes;
pub mod grid;
pub mod options;
pub mod propagate;
pub mod search;
pub mod words;

/// The expected maximum number of distinct characters appearing in a grid.
pub const MAX_GLYPH_COUNT: usize = 256;

/// The expected maximum number of slots appearing in a grid.
pub const MAX_SLOT_COUNT: usize = 256;

/// The expected maximum length for a single slot.
pub const MAX_SLOT_LENGTH: usize = 21;

/// When enabled (via the `check_invariants` feature), internal consistency
/// violations panic instead of silently corrupting the search state.
pub const CHECK_INVARIANTS: bool = cfg!(feature = "check_invariants");

/// An identifier for a single interned character, indexing `WordList::glyphs`.
pub type GlyphId = usize;

/// An identifier for a slot, indexing `GridConfig::slot_configs`.
pub type SlotId = usize;

/// An identifier for a word within the bucket for its length.
pub type WordId = usize;

/// A word identifier that is unique across buckets: (length, id in bucket).
pub type GlobalWordId = (usize, WordId);

/// An identifier for a crossing between two slots, dense from 0.
pub type CrossingId = usize;

pub use grid::{render_grid, Choice, Direction, GridConfig, GridError, SlotConfig};
pub use options::SlotFilter;
pub use search::{find_fill, find_fill_from, FillFailure, FillSuccess, Statistics};
pub use words::{WordList, WordListSourceConfig};
