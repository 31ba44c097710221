//! The fill search: weighted dynamic variable ordering (a `dom/wdeg`
//! variant) over the slots, arc consistency maintained at every node, and
//! conflict-driven crossing weights with randomized restarts. Loosely after
//! the adaptive-branching strategy described by Balafoutis for constraint
//! satisfaction.

use std::fmt::{Debug, Formatter};
use std::sync::atomic::Ordering;

use float_ord::FloatOrd;
use instant::{Duration, Instant};
use log::debug;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use smallvec::SmallVec;

use crate::grid::{Choice, Crossing, GridConfig};
use crate::propagate::{propagate, EliminationSet, PropagationContext};
use crate::words::GlyphCountsByCell;
use crate::{SlotId, WordId, CHECK_INVARIANTS, MAX_SLOT_COUNT};

/// If the previously-attempted slot is within this distance of the lowest
/// priority value, stay on it instead of switching.
pub const ADAPTIVE_BRANCHING_THRESHOLD: f64 = 0.15;

/// How many search states between deadline/abort checks.
pub const INTERRUPT_FREQUENCY: usize = 10;

/// Decay applied to learned crossing weights on every propagation failure;
/// keeps recent conflicts more prominent than stale ones.
pub const WEIGHT_AGE_FACTOR: f64 = 0.99;

/// Sampling weights over the best-ranked slots when choosing a variable.
pub const RANDOM_SLOT_WEIGHTS: [u8; 3] = [4, 2, 1];

/// Sampling weights over the first non-eliminated words when choosing a
/// value.
pub const RANDOM_WORD_WEIGHTS: [u8; 3] = [4, 2, 1];

/// Backtrack budget for the first attempt.
pub const INITIAL_BACKTRACK_LIMIT: usize = 500;

/// Growth factor applied to the backtrack budget on each restart.
pub const RETRY_GROWTH_FACTOR: f64 = 1.1;

/// Counters and timings for one fill call.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub states: usize,
    pub backtracks: usize,
    pub restricted_branchings: usize,
    pub retries: usize,
    pub total_time: Duration,
    pub try_time: Duration,
    pub initial_propagation_time: Duration,
    pub choice_propagation_time: Duration,
    pub elimination_propagation_time: Duration,
}

/// Live state of one slot during filling.
#[derive(Clone)]
pub struct Slot {
    id: SlotId,
    length: usize,

    /// Indexed by WordId within this slot's length bucket:
    /// * `Some(Some(id))`: eliminated because of the choice in slot `id`
    /// * `Some(None)`: eliminated unconditionally
    /// * `None`: still available (or never an option)
    eliminations: Vec<Option<Option<SlotId>>>,

    /// Per-cell counts of each glyph over the still-available options.
    glyph_counts_by_cell: GlyphCountsByCell,

    remaining_option_count: usize,

    /// A word explicitly chosen for this slot (or forced by the prefill).
    /// Shadows the three fields above, which keep their pre-choice values so
    /// that clearing the choice is free.
    fixed_word_id: Option<WordId>,
    fixed_glyph_counts_by_cell: Option<GlyphCountsByCell>,
}

impl Debug for Slot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field("remaining_option_count", &self.remaining_option_count)
            .field("fixed_word_id", &self.fixed_word_id)
            .finish()
    }
}

impl Slot {
    fn add_elimination(
        &mut self,
        config: &GridConfig,
        word_id: WordId,
        blamed_slot_id: Option<SlotId>,
    ) {
        if CHECK_INVARIANTS && self.fixed_word_id.is_some() {
            panic!("editing eliminations for a fixed slot");
        }

        self.eliminations[word_id] = Some(blamed_slot_id);
        self.remaining_option_count -= 1;

        let word = &config.word_list.words[self.length][word_id];
        for (cell_idx, &glyph) in word.glyphs.iter().enumerate() {
            self.glyph_counts_by_cell[cell_idx][glyph] -= 1;
        }
    }

    fn remove_elimination(&mut self, config: &GridConfig, word_id: WordId) {
        if CHECK_INVARIANTS && self.fixed_word_id.is_some() {
            panic!("editing eliminations for a fixed slot");
        }

        self.eliminations[word_id] = None;
        self.remaining_option_count += 1;

        let word = &config.word_list.words[self.length][word_id];
        for (cell_idx, &glyph) in word.glyphs.iter().enumerate() {
            self.glyph_counts_by_cell[cell_idx][glyph] += 1;
        }
    }

    /// Undo every elimination blamed on the given slot's (now-undone)
    /// choice.
    fn clear_eliminations(&mut self, config: &GridConfig, blamed_slot_id: SlotId) {
        for word_id in 0..self.eliminations.len() {
            if self.eliminations[word_id] == Some(Some(blamed_slot_id)) {
                self.remove_elimination(config, word_id);
            }
        }
    }

    fn choose_word(&mut self, config: &GridConfig, word_id: WordId) {
        self.fixed_word_id = Some(word_id);
        self.fixed_glyph_counts_by_cell =
            Some(config.word_list.glyph_counts_by_cell(self.length, &[word_id]));
    }

    /// Clear a choice; the shadowed state is still valid because backtracking
    /// is strictly last-in-first-out.
    fn clear_choice(&mut self) {
        self.fixed_word_id = None;
        self.fixed_glyph_counts_by_cell = None;
    }

    /// The choice this slot has settled on: its fixed word, or its sole
    /// surviving option if propagation narrowed it to one.
    fn get_choice(&self, config: &GridConfig) -> Option<Choice> {
        let word_id = self.fixed_word_id.or_else(|| {
            if self.remaining_option_count != 1 {
                return None;
            }
            config.slot_options[self.id]
                .iter()
                .find(|&&word_id| self.eliminations[word_id].is_none())
                .copied()
        });
        word_id.map(|word_id| Choice {
            slot_id: self.id,
            word_id,
        })
    }
}

/// `wdeg` weight of one slot: the summed weights of its crossings into
/// still-undetermined slots.
fn calculate_slot_weight(
    config: &GridConfig,
    slots: &[Slot],
    crossing_weights: &[f64],
    slot_id: SlotId,
) -> f64 {
    config.slot_configs[slot_id]
        .crossings
        .iter()
        .flatten()
        .map(
            |&Crossing {
                 other_slot_id,
                 crossing_id,
                 ..
             }| {
                if slots[other_slot_id].remaining_option_count > 1 {
                    crossing_weights[crossing_id]
                } else {
                    0.0
                }
            },
        )
        .sum()
}

fn calculate_slot_weights(
    config: &GridConfig,
    slots: &[Slot],
    crossing_weights: &[f64],
) -> Vec<f64> {
    (0..slots.len())
        .map(|slot_id| calculate_slot_weight(config, slots, crossing_weights, slot_id))
        .collect()
}

/// `dom/wdeg` priority; lower means fill sooner.
fn calculate_slot_priority(slots: &[Slot], slot_weights: &[f64], slot_id: SlotId) -> f64 {
    slots[slot_id].remaining_option_count as f64 / slot_weights[slot_id]
}

#[derive(Debug)]
enum PropagationMode {
    Initial,
    Choice(Choice),
    Elimination(Choice, Option<SlotId>),
}

/// Apply a tentative change, propagate it, and either commit the resulting
/// eliminations (true) or roll the change back and fold the failure into the
/// crossing weights (false).
fn run_propagation(
    config: &GridConfig,
    slots: &mut [Slot],
    crossing_weights: &mut [f64],
    slot_weights: &[f64],
    mode: &PropagationMode,
    elimination_sets: &mut [EliminationSet],
    time: &mut Duration,
) -> bool {
    let start = Instant::now();

    match mode {
        PropagationMode::Choice(choice) => {
            slots[choice.slot_id].choose_word(config, choice.word_id);
        }
        PropagationMode::Elimination(choice, blamed_slot_id) => {
            slots[choice.slot_id].add_elimination(config, choice.word_id, *blamed_slot_id);
        }
        PropagationMode::Initial => {}
    }

    let remaining_option_counts: Vec<usize> = slots
        .iter()
        .map(|slot| {
            if slot.fixed_word_id.is_some() {
                1
            } else {
                slot.remaining_option_count
            }
        })
        .collect();

    let fixed_slots: Vec<bool> = if matches!(mode, PropagationMode::Initial) {
        // Initially only verbatim prefills count as fixed: another slot may
        // happen to hold a single option that crossings can still rule out.
        slots.iter().map(|slot| slot.fixed_word_id.is_some()).collect()
    } else {
        // Later, any single-option slot is fixed: its crossings were already
        // pruned to compatible options and its dupes already propagated.
        slots
            .iter()
            .map(|slot| remaining_option_counts[slot.id] == 1)
            .collect()
    };

    struct SearchContext<'a> {
        config: &'a GridConfig,
        slots: &'a [Slot],
    }

    impl PropagationContext for SearchContext<'_> {
        fn is_eliminated(&self, slot_id: SlotId, word_id: WordId) -> bool {
            self.slots[slot_id].eliminations[word_id].is_some()
        }

        fn glyph_counts(&self, slot_id: SlotId) -> GlyphCountsByCell {
            self.slots[slot_id]
                .fixed_glyph_counts_by_cell
                .clone()
                .unwrap_or_else(|| self.slots[slot_id].glyph_counts_by_cell.clone())
        }

        fn single_option(&self, slot_id: SlotId, eliminations: &EliminationSet) -> Option<WordId> {
            self.slots[slot_id].fixed_word_id.or_else(|| {
                self.config.slot_options[slot_id]
                    .iter()
                    .find(|&&word_id| {
                        self.slots[slot_id].eliminations[word_id].is_none()
                            && !eliminations.contains(word_id)
                    })
                    .copied()
            })
        }
    }

    let seeded_slot = match mode {
        PropagationMode::Initial => None,
        PropagationMode::Choice(choice) | PropagationMode::Elimination(choice, _) => {
            Some(choice.slot_id)
        }
    };
    let blamed_slot_id = match mode {
        PropagationMode::Initial => None,
        PropagationMode::Choice(choice) => Some(choice.slot_id),
        PropagationMode::Elimination(_, blamed_slot_id) => *blamed_slot_id,
    };

    let result = propagate(
        config,
        &SearchContext {
            config,
            slots: &*slots,
        },
        &remaining_option_counts,
        crossing_weights,
        slot_weights,
        &fixed_slots,
        seeded_slot,
        elimination_sets,
    );

    let success = match result {
        Ok(()) => {
            for (slot_id, eliminations) in elimination_sets.iter().enumerate() {
                for &word_id in eliminations.ids() {
                    slots[slot_id].add_elimination(config, word_id, blamed_slot_id);
                }
            }
            true
        }

        Err(failure) => {
            match mode {
                PropagationMode::Choice(choice) => {
                    slots[choice.slot_id].clear_choice();
                }
                PropagationMode::Elimination(choice, ..) => {
                    slots[choice.slot_id].remove_elimination(config, choice.word_id);
                }
                PropagationMode::Initial => {}
            }

            for (crossing_id, weight) in crossing_weights.iter_mut().enumerate() {
                *weight = 1.0
                    + ((*weight - 1.0) * WEIGHT_AGE_FACTOR)
                    + failure.weight_updates.get(&crossing_id).unwrap_or(&0.0);
                if CHECK_INVARIANTS && *weight < 1.0 {
                    panic!("crossing weight fell below 1.0");
                }
            }

            false
        }
    };

    *time += start.elapsed();
    success
}

/// Pick the next slot to fill: `dom/wdeg` priority with adaptive branching
/// (stay on the previous slot when it's close enough to the best) and
/// weighted random choice among the top few.
fn choose_next_slot(
    slots: &[Slot],
    slot_weights: &[f64],
    last_slot_id: Option<SlotId>,
    rng: &mut SmallRng,
    dist: &WeightedIndex<u8>,
    statistics: &mut Statistics,
) -> Option<SlotId> {
    let mut best_priority: Option<f64> = None;
    let mut last_priority: Option<f64> = None;

    let mut sorted_slot_ids: Vec<SlotId> = (0..slots.len())
        .filter(|&slot_id| {
            slots[slot_id].fixed_word_id.is_none() && slots[slot_id].remaining_option_count > 1
        })
        .collect();

    if sorted_slot_ids.is_empty() {
        return None;
    }

    sorted_slot_ids.sort_by_cached_key(|&slot_id| {
        let priority = calculate_slot_priority(slots, slot_weights, slot_id);
        if best_priority.map_or(true, |best| best > priority) {
            best_priority = Some(priority);
        }
        if last_slot_id == Some(slot_id) {
            last_priority = Some(priority);
        }
        FloatOrd(priority)
    });

    if let (Some(best), Some(last_slot_id), Some(last)) =
        (best_priority, last_slot_id, last_priority)
    {
        if last - best < ADAPTIVE_BRANCHING_THRESHOLD {
            statistics.restricted_branchings += 1;
            return Some(last_slot_id);
        }
    }

    Some(sorted_slot_ids[dist.sample(rng).min(sorted_slot_ids.len() - 1)])
}

/// A completed fill: one choice per slot, in slot-id order.
#[derive(Debug)]
pub struct FillSuccess {
    pub statistics: Statistics,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillFailure {
    /// Provably unsatisfiable under the current word list and score
    /// threshold.
    HardFailure,
    Timeout,
    Abort,
    ExceededBacktrackLimit(usize),
}

/// One attempt with a fixed rng seed and backtrack budget. Slot state is
/// passed in so retries can share the initial-propagation work, and crossing
/// weights persist across attempts so each retry starts smarter.
fn find_fill_for_seed(
    config: &GridConfig,
    slots: &SmallVec<[Slot; MAX_SLOT_COUNT]>,
    deadline: Option<Instant>,
    max_backtracks: usize,
    rng_seed: u64,
    crossing_weights: &mut [f64],
    elimination_sets: &mut [EliminationSet],
) -> Result<FillSuccess, FillFailure> {
    let start = Instant::now();
    let mut rng: SmallRng = SeedableRng::seed_from_u64(rng_seed);
    let mut statistics = Statistics::default();

    let mut slots: SmallVec<[Slot; MAX_SLOT_COUNT]> = (*slots).clone();
    let mut choices: Vec<Choice> = Vec::with_capacity(config.slot_configs.len());

    // Cursor into the current slot's option list, so revisiting the same
    // slot resumes after the words already tried.
    let mut last_slot_id: Option<SlotId> = None;
    let mut last_starting_word_idx: Option<usize> = None;

    let slot_dist = WeightedIndex::new(RANDOM_SLOT_WEIGHTS).unwrap();
    let word_dist = WeightedIndex::new(RANDOM_WORD_WEIGHTS).unwrap();

    // Each iteration: pick a slot and word, try to propagate the choice. If
    // the choice can't propagate, propagate its elimination instead; if even
    // that fails, undo previous choices until an elimination propagates or
    // nothing is left to undo.
    loop {
        statistics.states += 1;

        if statistics.states % INTERRUPT_FREQUENCY == 0 {
            if let Some(deadline) = deadline {
                if Instant::now() > deadline {
                    return Err(FillFailure::Timeout);
                }
            }
            if let Some(abort) = &config.abort {
                if abort.load(Ordering::Relaxed) {
                    return Err(FillFailure::Abort);
                }
            }
        }

        let slot_weights = calculate_slot_weights(config, &slots, crossing_weights);
        let Some(slot_id) = choose_next_slot(
            &slots,
            &slot_weights,
            last_slot_id,
            &mut rng,
            &slot_dist,
            &mut statistics,
        ) else {
            // Nothing left to decide. Collect the explicit choices plus the
            // ones propagation made implicitly.
            statistics.total_time = start.elapsed();

            let mut all_choices = Vec::with_capacity(slots.len());
            for slot in slots {
                match slot.get_choice(config) {
                    Some(choice) => all_choices.push(choice),
                    None => {
                        if CHECK_INVARIANTS {
                            panic!("slot {} has no single choice at success", slot.id);
                        }
                        return Err(FillFailure::HardFailure);
                    }
                }
            }

            return Ok(FillSuccess {
                statistics,
                choices: all_choices,
            });
        };

        let starting_word_idx = if last_slot_id == Some(slot_id) {
            last_starting_word_idx.unwrap_or(0)
        } else {
            0
        };

        let word_candidates: Vec<(usize, WordId)> = config.slot_options[slot_id]
            .iter()
            .copied()
            .enumerate()
            .skip(starting_word_idx)
            .filter(|&(_, word_id)| slots[slot_id].eliminations[word_id].is_none())
            .take(RANDOM_WORD_WEIGHTS.len())
            .collect();

        if word_candidates.is_empty() {
            if CHECK_INVARIANTS {
                panic!("eligible slot {slot_id} has no live candidates");
            }
            return Err(FillFailure::HardFailure);
        }

        let (_, word_id) = word_candidates[word_dist.sample(&mut rng).min(word_candidates.len() - 1)];

        last_slot_id = Some(slot_id);
        last_starting_word_idx = Some(word_candidates[0].0);

        let choice = Choice { slot_id, word_id };

        if run_propagation(
            config,
            &mut slots,
            crossing_weights,
            &slot_weights,
            &PropagationMode::Choice(choice.clone()),
            elimination_sets,
            &mut statistics.choice_propagation_time,
        ) {
            choices.push(choice);
            continue;
        }

        // The choice wiped something out. Rule the word out instead, and keep
        // unwinding choices until some elimination propagates cleanly.
        let mut undoing_choice = choice;
        loop {
            statistics.backtracks += 1;

            if run_propagation(
                config,
                &mut slots,
                crossing_weights,
                &slot_weights,
                &PropagationMode::Elimination(
                    undoing_choice.clone(),
                    choices.last().map(|choice| choice.slot_id),
                ),
                elimination_sets,
                &mut statistics.elimination_propagation_time,
            ) {
                break;
            }

            // Neither `slot = word` nor `slot != word` survives propagation,
            // so the previous choice is untenable too: undo it and try to
            // propagate its elimination next.
            let Some(last_choice) = choices.pop() else {
                return Err(FillFailure::HardFailure);
            };
            undoing_choice = last_choice;

            slots[undoing_choice.slot_id].clear_choice();
            for slot in slots.iter_mut() {
                if slot.id != undoing_choice.slot_id && slot.fixed_word_id.is_none() {
                    slot.clear_eliminations(config, undoing_choice.slot_id);
                }
            }

            if statistics.backtracks > max_backtracks {
                return Err(FillFailure::ExceededBacktrackLimit(statistics.backtracks));
            }

            last_slot_id = None;
            last_starting_word_idx = None;
        }
    }
}

/// Search for a fill, restarting with a fresh seed and a larger backtrack
/// budget whenever an attempt exhausts its budget.
pub fn find_fill(
    config: &GridConfig,
    deadline: Option<Instant>,
) -> Result<FillSuccess, FillFailure> {
    find_fill_from(config, deadline, 0)
}

/// `find_fill` with the starting retry number exposed, so a caller can
/// reproduce or skip ahead in the restart schedule.
pub fn find_fill_from(
    config: &GridConfig,
    deadline: Option<Instant>,
    first_retry: u64,
) -> Result<FillSuccess, FillFailure> {
    let start = Instant::now();

    // Base slot state, cloned by each attempt instead of rebuilt.
    let mut slots: SmallVec<[Slot; MAX_SLOT_COUNT]> = SmallVec::new();
    for slot_config in &config.slot_configs {
        let options = &config.slot_options[slot_config.id];
        let glyph_counts_by_cell = config
            .word_list
            .glyph_counts_by_cell(slot_config.length, options);

        let is_fixed = slot_config
            .complete_fill(&config.fill, config.width)
            .is_some();
        if is_fixed && options.len() != 1 {
            if CHECK_INVARIANTS {
                panic!("prefilled slot {} has {} options", slot_config.id, options.len());
            }
            return Err(FillFailure::HardFailure);
        }

        let bucket_size = config
            .word_list
            .words
            .get(slot_config.length)
            .map_or(0, Vec::len);
        slots.push(Slot {
            id: slot_config.id,
            length: slot_config.length,
            eliminations: vec![None; bucket_size],
            remaining_option_count: options.len(),
            fixed_word_id: if is_fixed { Some(options[0]) } else { None },
            fixed_glyph_counts_by_cell: if is_fixed {
                Some(glyph_counts_by_cell.clone())
            } else {
                None
            },
            glyph_counts_by_cell,
        });
    }

    // Allocated once and reset in place by every propagation call.
    let mut elimination_sets = EliminationSet::build_all(&config.slot_configs, &config.word_list);

    // Learned crossing weights, shared across retries.
    let mut crossing_weights: Vec<f64> = vec![1.0; config.crossing_count];

    let mut initial_propagation_time = Duration::default();
    let slot_weights = calculate_slot_weights(config, &slots, &crossing_weights);
    if !run_propagation(
        config,
        &mut slots,
        &mut crossing_weights,
        &slot_weights,
        &PropagationMode::Initial,
        &mut elimination_sets,
        &mut initial_propagation_time,
    ) {
        return Err(FillFailure::HardFailure);
    }

    let mut max_backtracks = INITIAL_BACKTRACK_LIMIT;

    for retry_num in first_retry.. {
        match find_fill_for_seed(
            config,
            &slots,
            deadline,
            max_backtracks,
            config.seed ^ retry_num,
            &mut crossing_weights,
            &mut elimination_sets,
        ) {
            Ok(mut result) => {
                result.statistics.retries = (retry_num - first_retry) as usize;
                result.statistics.try_time = result.statistics.total_time;
                result.statistics.total_time = start.elapsed();
                result.statistics.initial_propagation_time = initial_propagation_time;
                debug!("fill found: {:?}", result.statistics);
                return Ok(result);
            }
            Err(FillFailure::ExceededBacktrackLimit(backtracks)) => {
                max_backtracks =
                    (max_backtracks + 1).max((max_backtracks as f64 * RETRY_GROWTH_FACTOR) as usize);
                debug!(
                    "retry {}: {} backtracks exhausted, next budget {}",
                    retry_num, backtracks, max_backtracks
                );
            }
            Err(other) => return Err(other),
        }
    }

    unreachable!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::{config_for, CORNER5, MINI1, PARITY1};
    use crate::grid::{render_grid, GridConfig};
    use crate::words::{WordList, WordListSourceConfig};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn tiny_word_list(entries: &[&str]) -> WordList {
        WordList::new(
            vec![WordListSourceConfig::Memory {
                id: "mem".into(),
                enabled: true,
                entries: entries.iter().map(|&w| (w.to_string(), 50)).collect(),
            }],
            None,
            None,
        )
    }

    /// Everything a successful fill must satisfy: crossings agree, prefills
    /// survive, scores clear the threshold, no dupes, no unfilled cells.
    fn assert_fill_invariants(config: &GridConfig, result: &FillSuccess) {
        assert_eq!(result.choices.len(), config.slot_configs.len());

        let word = |choice: &Choice| {
            let length = config.slot_configs[choice.slot_id].length;
            &config.word_list.words[length][choice.word_id]
        };

        // Prefilled cells keep their letters; crossings agree.
        for choice in &result.choices {
            let slot_config = &config.slot_configs[choice.slot_id];
            for (cell_idx, &glyph) in word(choice).glyphs.iter().enumerate() {
                let (x, y) = slot_config.cell_loc(cell_idx);
                if let Some(prefilled) = config.fill[y * config.width + x] {
                    assert_eq!(prefilled, glyph, "prefill clobbered at ({x},{y})");
                }
                if let Some(crossing) = &slot_config.crossings[cell_idx] {
                    let other = &result.choices[crossing.other_slot_id];
                    assert_eq!(
                        word(other).glyphs[crossing.other_slot_cell],
                        glyph,
                        "crossing disagreement at ({x},{y})"
                    );
                }
            }
        }

        // Scores clear the threshold (hidden entries are prefill-forced and
        // exempt); no duplicate words under the list's dupe rules.
        for (idx, choice) in result.choices.iter().enumerate() {
            let chosen = word(choice);
            assert!(chosen.hidden || chosen.score >= config.min_score);

            let length = config.slot_configs[choice.slot_id].length;
            let dupes = config
                .word_list
                .dupe_index
                .get_dupes((length, choice.word_id), &chosen.glyphs);
            for other in &result.choices[idx + 1..] {
                let other_length = config.slot_configs[other.slot_id].length;
                assert_ne!(
                    (length, choice.word_id),
                    (other_length, other.word_id),
                    "word repeated"
                );
                assert!(
                    !dupes
                        .get(&other_length)
                        .map_or(false, |ids| ids.contains(&other.word_id)),
                    "dupe rule violated: {} / {}",
                    chosen.normalized,
                    word(other).normalized
                );
            }
        }

        // A complete fill renders with every open cell lettered.
        assert!(!render_grid(config, &result.choices).contains('.'));
    }

    #[test]
    fn test_fill_corner_blocked_5x5() {
        init_logging();
        let config = config_for(CORNER5);
        let result = find_fill(&config, None).expect("corner grid must fill");
        assert_fill_invariants(&config, &result);
    }

    #[test]
    fn test_fill_mini1() {
        init_logging();
        let config = config_for(MINI1);
        assert_eq!(config.slot_configs.len(), 10);
        let result = find_fill(&config, None).expect("mini1 must fill");
        assert_fill_invariants(&config, &result);
    }

    #[test]
    fn test_unsolvable_micro_grid() {
        init_logging();
        let word_list = tiny_word_list(&["ab", "cd"]);
        let config = GridConfig::from_template(word_list, "..\n.#", 50).unwrap();
        assert_eq!(config.slot_configs.len(), 2);
        assert_eq!(find_fill(&config, None).unwrap_err(), FillFailure::HardFailure);
    }

    #[test]
    fn test_hidden_prefilled_entry_fills_around() {
        init_logging();
        // "ab" is no word, so the top row becomes a hidden entry; the rest
        // of the grid still completes around it.
        let word_list = tiny_word_list(&["at", "be", "te"]);
        let config = GridConfig::from_template(word_list, "ab\n..", 50).unwrap();

        let result = find_fill(&config, None).expect("peers are satisfiable");
        assert_fill_invariants(&config, &result);

        let top = &result.choices[0];
        let top_word = &config.word_list.words[2][top.word_id];
        assert!(top_word.hidden);
        assert_eq!(top_word.normalized, "ab");
        assert_eq!(render_grid(&config, &result.choices), "ab\nte");
    }

    #[test]
    fn test_fill_parity1_and_determinism() {
        init_logging();
        let config = config_for(PARITY1);
        assert_eq!(config.slot_configs.len(), 58);

        let result = find_fill(&config, None).expect("parity grid must fill");
        assert_fill_invariants(&config, &result);

        // The theme entry survives verbatim.
        let rendered = render_grid(&config, &result.choices);
        assert!(rendered.lines().nth(7).unwrap().contains("cremebrulees"));

        // Identical inputs and seed reproduce the identical fill.
        let config_again = config_for(PARITY1);
        let result_again = find_fill(&config_again, None).unwrap();
        assert_eq!(result.choices, result_again.choices);
        assert_eq!(rendered, render_grid(&config_again, &result_again.choices));
    }

    #[test]
    fn test_retry_number_override_is_deterministic() {
        init_logging();
        let config = config_for(MINI1);
        let a = find_fill_from(&config, None, 5).expect("must fill");
        let b = find_fill_from(&config, None, 5).expect("must fill");
        assert_eq!(a.choices, b.choices);
        assert_fill_invariants(&config, &a);
    }

    #[test]
    fn test_expired_deadline_times_out() {
        init_logging();
        let config = config_for(PARITY1);
        let deadline = Instant::now();
        assert_eq!(
            find_fill(&config, Some(deadline)).unwrap_err(),
            FillFailure::Timeout
        );
    }

    #[test]
    fn test_abort_flag_cancels() {
        init_logging();
        let mut config = config_for(PARITY1);
        let abort = Arc::new(AtomicBool::new(true));
        config.abort = Some(Arc::clone(&abort));
        assert_eq!(find_fill(&config, None).unwrap_err(), FillFailure::Abort);
    }

    #[test]
    fn test_statistics_are_populated() {
        init_logging();
        let config = config_for(MINI1);
        let result = find_fill(&config, None).unwrap();
        assert!(result.statistics.states > 0);
        assert!(result.statistics.total_time >= result.statistics.try_time);
    }
}
