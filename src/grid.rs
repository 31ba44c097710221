//! Static grid configuration: template parsing, slot extraction, the
//! crossing table, per-slot initial option lists, and rendering of results.

use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::debug;
use smallvec::SmallVec;
use thiserror::Error;

use crate::options::{slot_options, SlotFilter};
use crate::words::WordList;
use crate::{CrossingId, GlyphId, SlotId, WordId, MAX_SLOT_LENGTH};

/// Seed used for the search PRNG when the caller doesn't provide one.
pub const DEFAULT_SEED: u64 = 0;

/// Zero-indexed (x, y) coords for a cell, where y = 0 is the top row.
pub type GridCoord = (usize, usize);

/// Direction a slot runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Across,
    Down,
}

/// One shared cell between two slots: the other slot's id, where within that
/// slot the shared cell sits, and the dense id of the crossing itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crossing {
    pub other_slot_id: SlotId,
    pub other_slot_cell: usize,
    pub crossing_id: CrossingId,
}

/// The parts of a slot that never change during filling.
pub struct SlotConfig {
    pub id: SlotId,
    pub start_cell: GridCoord,
    pub direction: Direction,
    pub length: usize,

    /// One entry per cell: the crossing at that cell, if any.
    pub crossings: SmallVec<[Option<Crossing>; MAX_SLOT_LENGTH]>,
}

impl Debug for SlotConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotConfig")
            .field("id", &self.id)
            .field("start_cell", &self.start_cell)
            .field("direction", &self.direction)
            .field("length", &self.length)
            .finish()
    }
}

impl SlotConfig {
    /// The grid coordinate of the cell at `cell_idx`.
    #[must_use]
    pub fn cell_loc(&self, cell_idx: usize) -> GridCoord {
        match self.direction {
            Direction::Across => (self.start_cell.0 + cell_idx, self.start_cell.1),
            Direction::Down => (self.start_cell.0, self.start_cell.1 + cell_idx),
        }
    }

    /// If every cell of this slot is prefilled, the glyphs spelled out;
    /// otherwise `None`.
    #[must_use]
    pub fn complete_fill(
        &self,
        fill: &[Option<GlyphId>],
        width: usize,
    ) -> Option<SmallVec<[GlyphId; MAX_SLOT_LENGTH]>> {
        (0..self.length)
            .map(|cell_idx| {
                let (x, y) = self.cell_loc(cell_idx);
                fill[y * width + x]
            })
            .collect()
    }
}

/// Problems that prevent a template from becoming a `GridConfig` at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("grid template has no rows")]
    EmptyGrid,

    #[error("row {row} has a different width than the first row")]
    UnevenRows { row: usize },
}

/// Everything about a grid that is static during filling. Owns the word
/// list, since building option lists for fully prefilled slots can append
/// hidden entries to it.
pub struct GridConfig {
    pub width: usize,
    pub height: usize,

    /// Row-major prefilled glyphs; `None` for empty and blocked cells alike.
    pub fill: Vec<Option<GlyphId>>,

    /// Row-major block map. Blocked cells belong to no slot.
    pub blocks: Vec<bool>,

    pub slot_configs: Vec<SlotConfig>,

    /// Initial candidate list per slot, in bucket order.
    pub slot_options: Vec<Vec<WordId>>,

    /// Number of distinct crossings; crossing ids are dense below this.
    pub crossing_count: usize,

    pub word_list: WordList,
    pub min_score: u16,

    /// Base seed for the search PRNG; each retry XORs in its retry number.
    pub seed: u64,

    /// Cooperative cancellation flag, polled by the search loop.
    pub abort: Option<Arc<AtomicBool>>,
}

impl Debug for GridConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridConfig")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("slots", &self.slot_configs.len())
            .field("crossings", &self.crossing_count)
            .finish()
    }
}

impl GridConfig {
    /// Parse a template (`#` block, `.` empty, any other char a prefilled
    /// letter; see the crate docs for the format) and build the full static
    /// configuration against the given word list.
    pub fn from_template(
        mut word_list: WordList,
        template: &str,
        min_score: u16,
    ) -> Result<GridConfig, GridError> {
        let rows: Vec<&str> = template
            .lines()
            .map(str::trim)
            .skip_while(|line| line.is_empty())
            .collect();
        let rows: &[&str] = {
            let last_nonempty = rows.iter().rposition(|line| !line.is_empty());
            match last_nonempty {
                None => return Err(GridError::EmptyGrid),
                Some(last) => &rows[..=last],
            }
        };

        let width = rows[0].chars().count();
        let height = rows.len();
        if width == 0 {
            return Err(GridError::EmptyGrid);
        }

        let mut fill: Vec<Option<GlyphId>> = Vec::with_capacity(width * height);
        let mut blocks: Vec<bool> = Vec::with_capacity(width * height);
        for (row_idx, row) in rows.iter().enumerate() {
            if row.chars().count() != width {
                return Err(GridError::UnevenRows { row: row_idx });
            }
            for ch in row.chars() {
                blocks.push(ch == '#');
                fill.push(match ch {
                    '#' | '.' => None,
                    ch => Some(word_list.intern(ch)),
                });
            }
        }

        let mut slot_configs = extract_slots(&blocks, width, height);
        let crossing_count = link_crossings(&mut slot_configs, width);

        let slot_options: Vec<Vec<WordId>> = slot_configs
            .iter()
            .map(|slot_config| {
                let prefill = slot_prefill(slot_config, &fill, width);
                slot_options(&mut word_list, &prefill, min_score, None, None)
            })
            .collect();

        debug!(
            "grid config built: {}x{}, {} slots, {} crossings",
            width,
            height,
            slot_configs.len(),
            crossing_count
        );

        Ok(GridConfig {
            width,
            height,
            fill,
            blocks,
            slot_configs,
            slot_options,
            crossing_count,
            word_list,
            min_score,
            seed: DEFAULT_SEED,
            abort: None,
        })
    }

    /// Attach (or clear) a per-slot filter and recompute that slot's initial
    /// option list through it.
    pub fn set_slot_filter(&mut self, slot_id: SlotId, filter: Option<&SlotFilter>) {
        let prefill = slot_prefill(&self.slot_configs[slot_id], &self.fill, self.width);
        self.slot_options[slot_id] =
            slot_options(&mut self.word_list, &prefill, self.min_score, filter, None);
    }
}

/// The per-cell prefill of a slot, pulled out of the flat fill array.
fn slot_prefill(
    slot_config: &SlotConfig,
    fill: &[Option<GlyphId>],
    width: usize,
) -> Vec<Option<GlyphId>> {
    (0..slot_config.length)
        .map(|cell_idx| {
            let (x, y) = slot_config.cell_loc(cell_idx);
            fill[y * width + x]
        })
        .collect()
}

/// Scan rows left-to-right and then columns top-to-bottom, turning each
/// maximal unblocked run of length at least 2 into a slot. Across slots get
/// the low ids, in row-major order; down slots follow in column-major order.
fn extract_slots(blocks: &[bool], width: usize, height: usize) -> Vec<SlotConfig> {
    let mut slot_configs: Vec<SlotConfig> = vec![];

    let mut push_run = |start: GridCoord, length: usize, direction: Direction| {
        if length < 2 {
            return;
        }
        let id = slot_configs.len();
        slot_configs.push(SlotConfig {
            id,
            start_cell: start,
            direction,
            length,
            crossings: SmallVec::new(),
        });
    };

    for y in 0..height {
        let mut run_start = 0;
        for x in 0..=width {
            if x == width || blocks[y * width + x] {
                push_run((run_start, y), x - run_start, Direction::Across);
                run_start = x + 1;
            }
        }
    }
    for x in 0..width {
        let mut run_start = 0;
        for y in 0..=height {
            if y == height || blocks[y * width + x] {
                push_run((x, run_start), y - run_start, Direction::Down);
                run_start = y + 1;
            }
        }
    }

    slot_configs
}

/// Fill in each slot's crossing entries and allocate dense crossing ids, in
/// the order crossings are first seen walking slots by id.
fn link_crossings(slot_configs: &mut [SlotConfig], width: usize) -> usize {
    // cell index -> (slot id, cell index within slot), at most one per
    // direction.
    let mut slots_by_cell: Vec<SmallVec<[(SlotId, usize); 2]>> = vec![];
    for slot_config in slot_configs.iter() {
        for cell_idx in 0..slot_config.length {
            let (x, y) = slot_config.cell_loc(cell_idx);
            let flat = y * width + x;
            if slots_by_cell.len() < flat + 1 {
                slots_by_cell.resize_with(flat + 1, SmallVec::new);
            }
            slots_by_cell[flat].push((slot_config.id, cell_idx));
        }
    }

    let mut crossing_ids: std::collections::HashMap<(SlotId, SlotId), CrossingId> =
        std::collections::HashMap::new();

    for slot_id in 0..slot_configs.len() {
        let length = slot_configs[slot_id].length;
        let mut crossings: SmallVec<[Option<Crossing>; MAX_SLOT_LENGTH]> = SmallVec::new();

        for cell_idx in 0..length {
            let (x, y) = slot_configs[slot_id].cell_loc(cell_idx);
            let mates = &slots_by_cell[y * width + x];
            debug_assert!(mates.len() <= 2, "more than two slots through one cell");

            let mate = mates
                .iter()
                .find(|&&(other_slot_id, _)| other_slot_id != slot_id);
            crossings.push(mate.map(|&(other_slot_id, other_slot_cell)| {
                let key = (slot_id.min(other_slot_id), slot_id.max(other_slot_id));
                let next_id = crossing_ids.len();
                let crossing_id = *crossing_ids.entry(key).or_insert(next_id);
                Crossing {
                    other_slot_id,
                    other_slot_cell,
                    crossing_id,
                }
            }));
        }

        slot_configs[slot_id].crossings = crossings;
    }

    crossing_ids.len()
}

/// A slot assignment made during filling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub slot_id: SlotId,
    pub word_id: WordId,
}

/// Overlay the chosen words onto the grid's fill and produce the text form:
/// `#` for blocks, `.` for cells no choice covers.
#[must_use]
pub fn render_grid(config: &GridConfig, choices: &[Choice]) -> String {
    let mut cells: Vec<char> = config
        .blocks
        .iter()
        .zip(&config.fill)
        .map(|(&block, glyph)| {
            if block {
                '#'
            } else {
                glyph.map_or('.', |glyph| config.word_list.glyphs[glyph])
            }
        })
        .collect();

    for &Choice { slot_id, word_id } in choices {
        let slot_config = &config.slot_configs[slot_id];
        let word = &config.word_list.words[slot_config.length][word_id];
        for (cell_idx, &glyph) in word.glyphs.iter().enumerate() {
            let (x, y) = slot_config.cell_loc(cell_idx);
            cells[y * config.width + x] = config.word_list.glyphs[glyph];
        }
    }

    cells
        .chunks(config.width)
        .map(|row| row.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}
