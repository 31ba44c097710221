//! The propagator: given a tentative change (or nothing, for the initial
//! pass), drive the grid to arc consistency by eliminating words that no
//! longer have support in a crossing slot, plus duplicate-word propagation
//! from slots that are down to a single candidate. A slot is consistent when
//! every remaining candidate has, in each crossing cell, at least one mate in
//! the crossing slot carrying the same glyph; the support check is a
//! constant-time glyph-count lookup.

use std::cmp::Reverse;
use std::collections::HashMap;

use bit_set::BitSet;
use float_ord::FloatOrd;

use crate::grid::{Crossing, GridConfig, SlotConfig};
use crate::words::{GlyphCountsByCell, WordList};
use crate::{CrossingId, SlotId, WordId, CHECK_INVARIANTS};

/// Words eliminated from one slot during a single propagation call: a dense
/// membership bitmap for O(1) add/contains plus the ordered list of ids for
/// O(k) iteration and reset.
#[derive(Debug)]
pub struct EliminationSet {
    eliminated: BitSet,
    ids: Vec<WordId>,
}

impl EliminationSet {
    /// Build one set per slot, sized for the slot's whole length bucket (a
    /// set must be indexable by any WordId of that length, not just current
    /// options).
    #[must_use]
    pub fn build_all(slot_configs: &[SlotConfig], word_list: &WordList) -> Vec<EliminationSet> {
        slot_configs
            .iter()
            .map(|slot_config| {
                // A slot longer than every known word has no bucket at all.
                let bucket_size = word_list
                    .words
                    .get(slot_config.length)
                    .map_or(0, Vec::len);
                EliminationSet::new(bucket_size)
            })
            .collect()
    }

    #[must_use]
    pub fn new(size: usize) -> EliminationSet {
        EliminationSet {
            eliminated: BitSet::with_capacity(size),
            ids: Vec::with_capacity(size),
        }
    }

    pub fn add(&mut self, word_id: WordId) {
        if self.eliminated.insert(word_id) {
            self.ids.push(word_id);
        }
    }

    #[must_use]
    pub fn contains(&self, word_id: WordId) -> bool {
        self.eliminated.contains(word_id)
    }

    /// The ids eliminated so far, in insertion order.
    #[must_use]
    pub fn ids(&self) -> &[WordId] {
        &self.ids
    }

    /// Restore to empty without giving back the allocation.
    pub fn reset(&mut self) {
        self.eliminated.clear();
        self.ids.clear();
    }
}

/// How the caller exposes pre-existing search state to a propagation call.
pub trait PropagationContext {
    /// Was this word already unavailable before this call?
    fn is_eliminated(&self, slot_id: SlotId, word_id: WordId) -> bool;

    /// The live glyph counts for a slot entering this call. Only fetched
    /// when a slot is first touched; the propagator mutates its own copy.
    fn glyph_counts(&self, slot_id: SlotId) -> GlyphCountsByCell;

    /// The slot's single remaining option, accounting for both prior state
    /// and the eliminations made so far in this call.
    fn single_option(&self, slot_id: SlotId, eliminations: &EliminationSet) -> Option<WordId>;
}

/// A failed propagation: some slot lost its last candidate. The map says how
/// much of the wiped-out slot's domain each of its crossings destroyed,
/// keyed by crossing id; the search folds these into its learned weights.
#[derive(Debug)]
pub struct PropagationFailure {
    pub weight_updates: HashMap<CrossingId, f64>,
}

pub type PropagationResult = Result<(), PropagationFailure>;

/// Scratch state for one slot during one call.
struct SlotScratch<'a> {
    slot_id: SlotId,

    /// Where this call's eliminations for the slot accumulate. Never
    /// includes anything the context already reported eliminated.
    eliminations: &'a mut EliminationSet,

    /// Per cell, how many eliminations this call has blamed on it.
    blame_counts: Vec<usize>,

    /// Live candidate count: initial count minus this call's eliminations.
    option_count: usize,

    /// Copy-on-write glyph counts; `None` until the slot is first touched.
    glyph_counts: Option<GlyphCountsByCell>,

    /// Cells whose support just changed and need outward propagation.
    queued_cells: Option<Vec<usize>>,

    /// Set when the slot reaches exactly one candidate and its dupes still
    /// need to be pushed out of the other slots.
    needs_singleton_propagation: bool,
}

impl SlotScratch<'_> {
    #[inline]
    fn glyph_counts_mut<Ctx: PropagationContext>(&mut self, ctx: &Ctx) -> &mut GlyphCountsByCell {
        if self.glyph_counts.is_none() {
            self.glyph_counts = Some(ctx.glyph_counts(self.slot_id));
        }
        self.glyph_counts.as_mut().unwrap()
    }

    fn enqueue_cell(&mut self, cell_idx: usize, slot_length: usize) {
        let queued = self
            .queued_cells
            .get_or_insert_with(|| Vec::with_capacity(slot_length));
        if !queued.contains(&cell_idx) {
            queued.push(cell_idx);
        }
    }
}

/// Record one elimination and everything it implies: bookkeeping, failure
/// detection, singleton flagging, and re-enqueueing cells whose glyph support
/// just disappeared.
#[allow(clippy::too_many_arguments)]
fn eliminate<Ctx: PropagationContext>(
    config: &GridConfig,
    ctx: &Ctx,
    scratch: &mut [SlotScratch],
    initial_option_counts: &[usize],
    fixed_slots: &[bool],
    slot_id: SlotId,
    word_id: WordId,
    blamed_cell_idx: Option<usize>,
) -> PropagationResult {
    let slot_config = &config.slot_configs[slot_id];

    scratch[slot_id].eliminations.add(word_id);
    scratch[slot_id].option_count -= 1;
    if let Some(blamed_cell_idx) = blamed_cell_idx {
        scratch[slot_id].blame_counts[blamed_cell_idx] += 1;
    }

    // Last candidate gone: attribute the wipeout to this slot's crossings,
    // proportionally to how much of the domain each one removed.
    if scratch[slot_id].option_count == 0 {
        let initial_count = initial_option_counts[slot_id] as f64;
        let weight_updates = slot_config
            .crossings
            .iter()
            .enumerate()
            .filter_map(|(cell_idx, crossing)| {
                crossing.as_ref().map(|crossing| {
                    (
                        crossing.crossing_id,
                        scratch[slot_id].blame_counts[cell_idx] as f64 / initial_count,
                    )
                })
            })
            .collect();
        return Err(PropagationFailure { weight_updates });
    }

    if scratch[slot_id].option_count == 1 {
        scratch[slot_id].needs_singleton_propagation = true;
    }

    // Shrink this slot's glyph counts by the eliminated word, and wherever a
    // count bottoms out, queue that cell so the loss of support propagates
    // into the crossing slot.
    for cell_idx in 0..slot_config.length {
        let glyph = config.word_list.words[slot_config.length][word_id].glyphs[cell_idx];

        let remaining = {
            let counts = &mut scratch[slot_id].glyph_counts_mut(ctx)[cell_idx];
            if CHECK_INVARIANTS && counts[glyph] == 0 {
                panic!("glyph count underflow in slot {slot_id} cell {cell_idx}");
            }
            counts[glyph] -= 1;
            counts[glyph]
        };

        // The blamed cell's crossing already has no support for this glyph,
        // so there's nothing new to tell it.
        if remaining > 0 || blamed_cell_idx == Some(cell_idx) {
            continue;
        }
        let Some(crossing) = &slot_config.crossings[cell_idx] else {
            continue;
        };
        if fixed_slots[crossing.other_slot_id] {
            continue;
        }

        let peer_count = scratch[crossing.other_slot_id].glyph_counts_mut(ctx)
            [crossing.other_slot_cell][glyph];
        if peer_count > 0 {
            scratch[slot_id].enqueue_cell(cell_idx, slot_config.length);
        }
    }

    Ok(())
}

/// Drive the grid to arc consistency, or report which crossings to blame.
///
/// `seeded_slot` carries the propagation mode: `Some(slot)` means the grid
/// was consistent until that one slot's domain changed (a choice or an
/// elimination) and only its effects need propagating; `None` means nothing
/// can be assumed and every non-fixed slot is checked.
///
/// On success the eliminations this call decided on are left in
/// `elimination_sets` (reset at entry) for the caller to commit; on failure
/// the sets are meaningless and the caller must discard them.
#[allow(clippy::too_many_arguments)]
pub fn propagate<Ctx: PropagationContext>(
    config: &GridConfig,
    ctx: &Ctx,
    initial_option_counts: &[usize],
    crossing_weights: &[f64],
    slot_weights: &[f64],
    fixed_slots: &[bool],
    seeded_slot: Option<SlotId>,
    elimination_sets: &mut [EliminationSet],
) -> PropagationResult {
    let slot_count = config.slot_configs.len();

    let mut scratch: Vec<SlotScratch> = config
        .slot_configs
        .iter()
        .zip(elimination_sets.iter_mut())
        .map(|(slot_config, elimination_set)| {
            elimination_set.reset();
            SlotScratch {
                slot_id: slot_config.id,
                eliminations: elimination_set,
                blame_counts: vec![0; slot_config.length],
                option_count: initial_option_counts[slot_config.id],
                glyph_counts: None,
                queued_cells: None,
                needs_singleton_propagation: false,
            }
        })
        .collect();

    // Seed the queue. A single changed slot seeds just itself; a global pass
    // seeds every slot (fixed ones too, so prefilled entries push their
    // dupes out), each restricted to cells whose peer isn't fixed.
    let seeds: Vec<SlotId> = match seeded_slot {
        Some(slot_id) => vec![slot_id],
        None => (0..slot_count).collect(),
    };
    for slot_id in seeds {
        if scratch[slot_id].option_count == 0 {
            return Err(PropagationFailure {
                weight_updates: HashMap::new(),
            });
        }

        let cells: Vec<usize> = config.slot_configs[slot_id]
            .crossings
            .iter()
            .enumerate()
            .filter(|(_, crossing)| {
                crossing
                    .as_ref()
                    .map_or(false, |crossing| !fixed_slots[crossing.other_slot_id])
            })
            .map(|(cell_idx, _)| cell_idx)
            .collect();
        scratch[slot_id].queued_cells = Some(cells);

        if scratch[slot_id].option_count == 1 {
            scratch[slot_id].needs_singleton_propagation = true;
        }
    }

    if CHECK_INVARIANTS {
        for (slot_id, &fixed) in fixed_slots.iter().enumerate() {
            if fixed {
                ctx.single_option(slot_id, &*scratch[slot_id].eliminations)
                    .expect("fixed slot must have exactly one candidate");
            }
        }
    }

    // Alternate between cell-support propagation and singleton (dupe)
    // propagation until neither has work left. The phases are separate
    // because dupe rules don't fit the glyph-count support model, and almost
    // all of their pruning power appears exactly when a slot hits one
    // candidate.
    loop {
        loop {
            // Most constrained queued slot first: lowest live count over
            // learned weight.
            let slot_id = (0..slot_count)
                .filter(|&slot_id| scratch[slot_id].queued_cells.is_some())
                .min_by_key(|&slot_id| {
                    FloatOrd(scratch[slot_id].option_count as f64 / slot_weights[slot_id])
                });
            let Some(slot_id) = slot_id else {
                break;
            };

            let mut cell_idxs = scratch[slot_id].queued_cells.take().unwrap();
            cell_idxs.sort_by_cached_key(|&cell_idx| {
                let crossing_id = config.slot_configs[slot_id].crossings[cell_idx]
                    .as_ref()
                    .expect("queued cell must have a crossing")
                    .crossing_id;
                Reverse(FloatOrd(crossing_weights[crossing_id]))
            });

            for cell_idx in cell_idxs {
                let &Crossing {
                    other_slot_id,
                    other_slot_cell,
                    ..
                } = config.slot_configs[slot_id].crossings[cell_idx]
                    .as_ref()
                    .unwrap();
                let other_length = config.slot_configs[other_slot_id].length;

                for &candidate in &config.slot_options[other_slot_id] {
                    if ctx.is_eliminated(other_slot_id, candidate)
                        || scratch[other_slot_id].eliminations.contains(candidate)
                    {
                        continue;
                    }

                    let glyph = config.word_list.words[other_length][candidate].glyphs
                        [other_slot_cell];
                    let support = scratch[slot_id].glyph_counts_mut(ctx)[cell_idx][glyph];

                    if support == 0 {
                        eliminate(
                            config,
                            ctx,
                            &mut scratch,
                            initial_option_counts,
                            fixed_slots,
                            other_slot_id,
                            candidate,
                            Some(other_slot_cell),
                        )?;
                    }
                }
            }
        }

        let singleton_slot_ids: Vec<SlotId> = scratch
            .iter_mut()
            .filter(|slot| slot.needs_singleton_propagation)
            .map(|slot| {
                slot.needs_singleton_propagation = false;
                slot.slot_id
            })
            .collect();

        for slot_id in singleton_slot_ids {
            let length = config.slot_configs[slot_id].length;
            let word_id = ctx
                .single_option(slot_id, &*scratch[slot_id].eliminations)
                .expect("singleton slot must have exactly one candidate");

            let glyphs = config.word_list.words[length][word_id].glyphs.clone();
            let dupes_by_length = config
                .word_list
                .dupe_index
                .get_dupes((length, word_id), &glyphs);

            for other_slot_id in 0..slot_count {
                if other_slot_id == slot_id || fixed_slots[other_slot_id] {
                    continue;
                }
                let other_length = config.slot_configs[other_slot_id].length;
                let Some(dupe_ids) = dupes_by_length.get(&other_length) else {
                    continue;
                };

                for &candidate in &config.slot_options[other_slot_id] {
                    if dupe_ids.contains(&candidate)
                        && !ctx.is_eliminated(other_slot_id, candidate)
                        && !scratch[other_slot_id].eliminations.contains(candidate)
                    {
                        // Dupe eliminations blame no cell; they don't feed
                        // crossing weights.
                        eliminate(
                            config,
                            ctx,
                            &mut scratch,
                            initial_option_counts,
                            fixed_slots,
                            other_slot_id,
                            candidate,
                            None,
                        )?;
                    }
                }
            }
        }

        let done = scratch
            .iter()
            .all(|slot| slot.queued_cells.is_none() && !slot.needs_singleton_propagation);
        if done {
            return Ok(());
        }
    }
}

/// Propagate a freshly built config with no search state: prefilled slots
/// are fixed, everything else starts from its full option list. Useful for
/// pruning a static grid and as the initial pass in tests.
pub fn propagate_static_grid(
    config: &GridConfig,
    elimination_sets: &mut [EliminationSet],
) -> PropagationResult {
    struct StaticContext<'a> {
        config: &'a GridConfig,
    }

    impl PropagationContext for StaticContext<'_> {
        fn is_eliminated(&self, _slot_id: SlotId, _word_id: WordId) -> bool {
            false
        }

        fn glyph_counts(&self, slot_id: SlotId) -> GlyphCountsByCell {
            self.config.word_list.glyph_counts_by_cell(
                self.config.slot_configs[slot_id].length,
                &self.config.slot_options[slot_id],
            )
        }

        fn single_option(&self, slot_id: SlotId, eliminations: &EliminationSet) -> Option<WordId> {
            self.config.slot_options[slot_id]
                .iter()
                .find(|&&word_id| !eliminations.contains(word_id))
                .copied()
        }
    }

    let initial_option_counts: Vec<usize> = config
        .slot_options
        .iter()
        .map(|options| options.len())
        .collect();

    let fixed_slots: Vec<bool> = config
        .slot_configs
        .iter()
        .map(|slot_config| {
            slot_config
                .complete_fill(&config.fill, config.width)
                .is_some()
        })
        .collect();

    // No learned weights yet: every crossing counts 1, a slot weighs its
    // number of non-fixed crossings.
    let crossing_weights: Vec<f64> = vec![1.0; config.crossing_count];
    let slot_weights: Vec<f64> = config
        .slot_configs
        .iter()
        .map(|slot_config| {
            slot_config
                .crossings
                .iter()
                .flatten()
                .filter(|crossing| !fixed_slots[crossing.other_slot_id])
                .count() as f64
        })
        .collect();

    propagate(
        config,
        &StaticContext { config },
        &initial_option_counts,
        &crossing_weights,
        &slot_weights,
        &fixed_slots,
        None,
        elimination_sets,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::config_for;
    use crate::grid::GridConfig;
    use crate::words::tests::bundled_word_list;

    #[test]
    fn test_elimination_set_basics() {
        let mut set = EliminationSet::new(8);
        assert!(!set.contains(3));
        set.add(3);
        set.add(5);
        set.add(3);
        assert!(set.contains(3));
        assert_eq!(set.ids(), &[3, 5]);
        set.reset();
        assert!(!set.contains(3));
        assert!(set.ids().is_empty());
    }

    #[test]
    fn test_prefill_propagates_through_crossings() {
        // Column 0 is "z??" (zip/zoo in the bundled list), so the middle and
        // bottom rows lose every word that doesn't put a compatible letter
        // in column 0.
        let config = config_for("
            z..
            ...
            ...
        ");
        let mut sets = EliminationSet::build_all(&config.slot_configs, &config.word_list);
        propagate_static_grid(&config, &mut sets).expect("grid should stay satisfiable");

        let middle_row = &config.slot_configs[1];
        assert_eq!(middle_row.start_cell, (0, 1));
        let survivors: Vec<&str> = config.slot_options[1]
            .iter()
            .filter(|&&word_id| !sets[1].contains(word_id))
            .map(|&word_id| config.word_list.words[3][word_id].normalized.as_str())
            .collect();
        assert!(!survivors.is_empty());
        for word in survivors {
            // zip/zoo put i or o in the middle row's first cell.
            assert!(word.starts_with('i') || word.starts_with('o'), "{word}");
        }
    }

    #[test]
    fn test_propagation_is_idempotent() {
        let mut config = config_for("
            z..
            ...
            ...
        ");
        let mut sets = EliminationSet::build_all(&config.slot_configs, &config.word_list);
        propagate_static_grid(&config, &mut sets).unwrap();

        // Commit the first pass's eliminations, then re-propagate: nothing
        // further may be eliminated.
        for (slot_id, options) in config.slot_options.iter_mut().enumerate() {
            options.retain(|&word_id| !sets[slot_id].contains(word_id));
        }
        propagate_static_grid(&config, &mut sets).unwrap();
        assert!(sets.iter().all(|set| set.ids().is_empty()));
    }

    #[test]
    fn test_empty_slot_fails_immediately() {
        // No 2-letter bundled word starts with q, so the across slot's
        // option list is empty from construction.
        let config = config_for("
            q.
            .#
        ");
        assert!(config.slot_options[0].is_empty());

        let mut sets = EliminationSet::build_all(&config.slot_configs, &config.word_list);
        let failure = propagate_static_grid(&config, &mut sets).unwrap_err();
        assert!(failure.weight_updates.is_empty());
    }

    #[test]
    fn test_glyph_counts_match_survivors() {
        let config = config_for("
            z..
            ...
            ...
        ");
        let mut sets = EliminationSet::build_all(&config.slot_configs, &config.word_list);
        propagate_static_grid(&config, &mut sets).unwrap();

        for slot_config in &config.slot_configs {
            let survivors: Vec<crate::WordId> = config.slot_options[slot_config.id]
                .iter()
                .filter(|&&word_id| !sets[slot_config.id].contains(word_id))
                .copied()
                .collect();
            let counts = config
                .word_list
                .glyph_counts_by_cell(slot_config.length, &survivors);
            for cell_counts in counts {
                let total: u32 = cell_counts.iter().sum();
                assert_eq!(total as usize, survivors.len());
            }
        }
    }

    #[test]
    fn test_unknown_prefilled_letters_are_interned() {
        // A prefilled letter that appears in no word still gets a glyph id
        // and flows through propagation without disturbing anything else.
        let word_list = bundled_word_list(5);
        let glyph_count = word_list.glyphs.len();
        let config = GridConfig::from_template(word_list, "\u{e9}..\n...\n...", 50).unwrap();
        assert_eq!(config.word_list.glyphs.len(), glyph_count + 1);

        let mut sets = EliminationSet::build_all(&config.slot_configs, &config.word_list);
        // Nothing crosses support for 'é', so the slots through it wipe out.
        assert!(propagate_static_grid(&config, &mut sets).is_err());
    }
}
