use crate::settings::RandomizerSettings;
use crate::spoiler_log::{
    make_obtain_route, SpoilerDetails, SpoilerItemCount, SpoilerItemLoc, SpoilerLog,
    SpoilerStartState, SpoilerSummary, SpoilerTrickLevel,
};
use crate::traverse::{traverse, TraverseResult};
use hashbrown::HashSet;
use itemrando_game::{
    Capacity, FlagId, ItemId, ItemLocationId, MalformedWorldError, TrickLevel, WorldGraph,
};
use itemrando_logic::GlobalState;
use log::info;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FillError {
    #[error("item pool has {pool_size} entries but the world has {num_locations} item locations")]
    PoolMismatch {
        pool_size: usize,
        num_locations: usize,
    },
    #[error("no completable assignment found within {attempts} attempts")]
    GenerationExhausted { attempts: usize },
}

/// One kind of item and how many copies of it the pool contributes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolEntry {
    pub name: String,
    pub count: usize,
}

/// Expands a name-based pool description into one ItemId per copy.
pub fn resolve_pool(
    world: &WorldGraph,
    entries: &[PoolEntry],
) -> Result<Vec<ItemId>, MalformedWorldError> {
    let mut pool: Vec<ItemId> = Vec::new();
    for entry in entries {
        let item_id = world
            .item_id(&entry.name)
            .ok_or_else(|| MalformedWorldError::UnknownItem(entry.name.clone()))?;
        for _ in 0..entry.count {
            pool.push(item_id);
        }
    }
    Ok(pool)
}

#[derive(Debug)]
pub struct Randomization {
    pub assignment: Vec<ItemId>, // per ItemLocationId
    pub spoiler_log: SpoilerLog,
    pub seed: usize,
    pub attempts_used: usize,
}

#[derive(Debug)]
pub struct Randomizer<'a> {
    pub world: &'a WorldGraph,
    pub settings: &'a RandomizerSettings,
    pool: Vec<ItemId>, // one entry per copy
    progression_mask: Vec<bool>, // per ItemId: item appears in some requirement
    trick_levels: Vec<TrickLevel>, // per TrickId, resolved from settings
    starting_items: Vec<(ItemId, Capacity)>,
}

// A committed placement. Backtracking pops these in reverse order; a popped
// (location, item) pair is excluded from being retried for the rest of the
// attempt.
struct Decision {
    location: ItemLocationId,
    item: ItemId,
}

struct AttemptState {
    assignment: Vec<Option<ItemId>>, // per ItemLocationId
    items_remaining: Vec<usize>,     // per ItemId, copies not yet placed
    progression_remaining: usize,
    decision_stack: Vec<Decision>,
    excluded: HashSet<(ItemLocationId, ItemId)>,
    retries: usize,
    step_num: usize,
}

impl<'a> Randomizer<'a> {
    pub fn new(
        world: &'a WorldGraph,
        pool: Vec<ItemId>,
        settings: &'a RandomizerSettings,
    ) -> Result<Self, MalformedWorldError> {
        let mut trick_levels: Vec<TrickLevel> = vec![0; world.num_tricks()];
        for trick_setting in &settings.trick_settings {
            let trick_id = *world
                .trick_isv
                .index_by_key
                .get(&trick_setting.name)
                .ok_or_else(|| MalformedWorldError::UnknownTrick(trick_setting.name.clone()))?;
            trick_levels[trick_id] = trick_setting.level;
        }
        let mut starting_items: Vec<(ItemId, Capacity)> = Vec::new();
        for starting_item in &settings.starting_items {
            let item_id = world
                .item_id(&starting_item.name)
                .ok_or_else(|| MalformedWorldError::UnknownItem(starting_item.name.clone()))?;
            starting_items.push((item_id, starting_item.count));
        }
        Ok(Randomizer {
            world,
            settings,
            pool,
            progression_mask: world.gating_item_mask(),
            trick_levels,
            starting_items,
        })
    }

    fn initial_global_state(&self) -> GlobalState {
        let mut global = GlobalState::initial(self.world, self.trick_levels.clone());
        for &(item_id, count) in &self.starting_items {
            global.inventory.items[item_id] += count;
        }
        global
    }

    fn check_pool(&self) -> Result<(), FillError> {
        let pool_size = self.pool.len();
        let num_locations = self.world.item_locations.len();
        if pool_size != num_locations {
            return Err(FillError::PoolMismatch {
                pool_size,
                num_locations,
            });
        }
        Ok(())
    }

    // For each item kind, the number of frontier edges (reachable source,
    // unreachable target) whose requirement mentions it. Items with higher
    // counts are preferred when placing, to open the map faster; this is a
    // heuristic, not a correctness requirement.
    fn gate_counts(&self, result: &TraverseResult) -> Vec<usize> {
        let num_items = self.world.num_items();
        let mut counts = vec![0; num_items];
        let mut mask = vec![false; num_items];
        for edge in &self.world.edges {
            if !result.reachable[edge.from_node_id] || result.reachable[edge.to_node_id] {
                continue;
            }
            mask.fill(false);
            edge.requirement.mark_item_refs(&mut mask);
            for (item_id, &referenced) in mask.iter().enumerate() {
                if referenced {
                    counts[item_id] += 1;
                }
            }
        }
        counts
    }

    fn choose_placement<R: Rng>(
        &self,
        state: &AttemptState,
        result: &TraverseResult,
        item_precedence: &[ItemId],
        candidates: &mut Vec<ItemLocationId>,
        rng: &mut R,
    ) -> Option<(ItemLocationId, ItemId)> {
        if candidates.is_empty() {
            return None;
        }
        candidates.shuffle(rng);
        let gate_counts = self.gate_counts(result);
        for &location in candidates.iter() {
            let mut best: Option<ItemId> = None;
            let mut best_count: usize = 0;
            for &item in item_precedence {
                if state.items_remaining[item] == 0 {
                    continue;
                }
                if state.excluded.contains(&(location, item)) {
                    continue;
                }
                if best.is_none() || gate_counts[item] > best_count {
                    best = Some(item);
                    best_count = gate_counts[item];
                }
            }
            if let Some(item) = best {
                return Some((location, item));
            }
        }
        None
    }

    fn backtrack(&self, attempt_num: usize, state: &mut AttemptState) -> bool {
        state.retries += 1;
        if state.retries > self.settings.max_retries_per_attempt {
            info!("[attempt {attempt_num}] retry budget exhausted");
            return false;
        }
        match state.decision_stack.pop() {
            Some(Decision { location, item }) => {
                state.assignment[location] = None;
                state.items_remaining[item] += 1;
                state.progression_remaining += 1;
                state.excluded.insert((location, item));
                info!(
                    "[attempt {attempt_num}] backtracking: removed {} from {}",
                    self.world.item_isv.keys[item],
                    self.world.nodes[self.world.item_locations[location]].name
                );
                true
            }
            None => {
                info!("[attempt {attempt_num}] nothing left to backtrack");
                false
            }
        }
    }

    fn finish<R: Rng>(
        &self,
        state: &AttemptState,
        rng: &mut R,
        summary: Vec<SpoilerSummary>,
        details: Vec<SpoilerDetails>,
    ) -> (Vec<ItemId>, SpoilerLog) {
        // Filler cannot gate progress, so the remaining copies go anywhere.
        let mut remaining_items: Vec<ItemId> = Vec::new();
        for (item_id, &count) in state.items_remaining.iter().enumerate() {
            for _ in 0..count {
                remaining_items.push(item_id);
            }
        }
        remaining_items.shuffle(rng);
        let mut idx = 0;
        let mut assignment: Vec<ItemId> = Vec::with_capacity(state.assignment.len());
        for placed in &state.assignment {
            match placed {
                Some(item_id) => assignment.push(*item_id),
                None => {
                    assignment.push(remaining_items[idx]);
                    idx += 1;
                }
            }
        }
        assert!(idx == remaining_items.len());

        let all_items = assignment
            .iter()
            .enumerate()
            .map(|(location, &item_id)| SpoilerItemLoc {
                item: self.world.item_isv.keys[item_id].clone(),
                location: self.world.nodes[self.world.item_locations[location]]
                    .name
                    .clone(),
            })
            .collect();
        let spoiler_log = SpoilerLog {
            start_state: SpoilerStartState {
                starting_items: self
                    .settings
                    .starting_items
                    .iter()
                    .map(|s| SpoilerItemCount {
                        item: s.name.clone(),
                        count: s.count,
                    })
                    .collect(),
                tricks: self
                    .settings
                    .trick_settings
                    .iter()
                    .map(|t| SpoilerTrickLevel {
                        trick: t.name.clone(),
                        level: t.level,
                    })
                    .collect(),
            },
            summary,
            details,
            all_items,
        };
        (assignment, spoiler_log)
    }

    // One fill attempt: place progression items one at a time at reachable
    // unfilled locations, backtracking when the search stalls, then place
    // filler. Returns None if the attempt fails within its retry budget.
    fn attempt(
        &self,
        attempt_num: usize,
        cancel: Option<&AtomicBool>,
    ) -> Option<(Vec<ItemId>, SpoilerLog)> {
        let mut rng_seed = [0u8; 32];
        rng_seed[..8].copy_from_slice(&(self.settings.seed as u64).to_le_bytes());
        rng_seed[8..16].copy_from_slice(&(attempt_num as u64).to_le_bytes());
        let mut rng = rand::rngs::StdRng::from_seed(rng_seed);

        let initial_global = self.initial_global_state();
        let num_locations = self.world.item_locations.len();
        let mut items_remaining = vec![0usize; self.world.num_items()];
        for &item_id in &self.pool {
            items_remaining[item_id] += 1;
        }
        let progression_remaining = self
            .pool
            .iter()
            .filter(|&&item_id| self.progression_mask[item_id])
            .count();
        let mut item_precedence: Vec<ItemId> = (0..self.world.num_items())
            .filter(|&item_id| self.progression_mask[item_id])
            .collect();
        item_precedence.shuffle(&mut rng);

        let mut state = AttemptState {
            assignment: vec![None; num_locations],
            items_remaining,
            progression_remaining,
            decision_stack: Vec::new(),
            excluded: HashSet::new(),
            retries: 0,
            step_num: 0,
        };
        let mut summary: Vec<SpoilerSummary> = Vec::new();
        let mut details: Vec<SpoilerDetails> = Vec::new();
        let mut known_flags: HashSet<FlagId> = HashSet::new();

        loop {
            if let Some(cancel) = cancel {
                // Checked between fill iterations only; a single traversal
                // pass is short and runs to completion.
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
            }
            let result = traverse(self.world, &state.assignment, &initial_global);

            if state.progression_remaining == 0 {
                if result.victory {
                    return Some(self.finish(&state, &mut rng, summary, details));
                }
                info!("[attempt {attempt_num}] all progression placed but victory unreachable");
                if !self.backtrack(attempt_num, &mut state) {
                    return None;
                }
                // Spoiler entries for undone placements are stale; drop them.
                summary.truncate(state.decision_stack.len());
                details.truncate(state.decision_stack.len());
                state.step_num = state.decision_stack.len();
                continue;
            }

            let mut candidates: Vec<ItemLocationId> = (0..num_locations)
                .filter(|&location| {
                    state.assignment[location].is_none()
                        && result.reachable[self.world.item_locations[location]]
                })
                .collect();
            let reachable_locations = candidates.len() + state.decision_stack.len();
            match self.choose_placement(&state, &result, &item_precedence, &mut candidates, &mut rng)
            {
                Some((location, item)) => {
                    state.step_num += 1;
                    state.assignment[location] = Some(item);
                    state.items_remaining[item] -= 1;
                    state.progression_remaining -= 1;
                    state.decision_stack.push(Decision { location, item });

                    let node_id = self.world.item_locations[location];
                    let item_name = self.world.item_isv.keys[item].clone();
                    let location_name = self.world.nodes[node_id].name.clone();
                    info!(
                        "[attempt {attempt_num}] step {}: placing {} at {}",
                        state.step_num, item_name, location_name
                    );
                    let new_flags: Vec<String> = result
                        .collected_flags
                        .iter()
                        .filter(|flag_id| !known_flags.contains(*flag_id))
                        .map(|&flag_id| self.world.flag_isv.keys[flag_id].clone())
                        .collect();
                    known_flags = result.collected_flags.iter().copied().collect();
                    summary.push(SpoilerSummary {
                        step: state.step_num,
                        item: item_name.clone(),
                        location: location_name.clone(),
                        flags: new_flags,
                        reachable_locations,
                        filled_locations: state.decision_stack.len(),
                    });
                    details.push(SpoilerDetails {
                        step: state.step_num,
                        item: item_name,
                        location: location_name,
                        obtain_route: make_obtain_route(self.world, &result, node_id),
                    });
                }
                None => {
                    info!(
                        "[attempt {attempt_num}] stalled with {} progression items unplaced",
                        state.progression_remaining
                    );
                    if !self.backtrack(attempt_num, &mut state) {
                        return None;
                    }
                    // Spoiler entries for undone placements are stale; drop them.
                    summary.truncate(state.decision_stack.len());
                    details.truncate(state.decision_stack.len());
                    state.step_num = state.decision_stack.len();
                }
            }
        }
    }

    pub fn randomize(&self) -> Result<Randomization, FillError> {
        self.check_pool()?;
        for attempt_num in 0..self.settings.max_attempts {
            info!("fill attempt {attempt_num}");
            if let Some((assignment, spoiler_log)) = self.attempt(attempt_num, None) {
                return Ok(Randomization {
                    assignment,
                    spoiler_log,
                    seed: self.settings.seed,
                    attempts_used: attempt_num + 1,
                });
            }
        }
        Err(FillError::GenerationExhausted {
            attempts: self.settings.max_attempts,
        })
    }

    /// Parallel independent attempts: workers interleave attempt numbers,
    /// share only the read-only world, and the first success cancels the
    /// rest. Among successes that raced to completion, the lowest attempt
    /// number wins.
    pub fn randomize_parallel(&self, num_workers: usize) -> Result<Randomization, FillError> {
        self.check_pool()?;
        let num_workers = num_workers.max(1);
        let cancel = AtomicBool::new(false);
        let (tx, rx) = crossbeam_channel::unbounded::<(usize, Vec<ItemId>, SpoilerLog)>();
        std::thread::scope(|scope| {
            for worker in 0..num_workers {
                let tx = tx.clone();
                let cancel = &cancel;
                scope.spawn(move || {
                    let mut attempt_num = worker;
                    while attempt_num < self.settings.max_attempts {
                        if cancel.load(Ordering::Relaxed) {
                            return;
                        }
                        info!("fill attempt {attempt_num}");
                        if let Some((assignment, spoiler_log)) =
                            self.attempt(attempt_num, Some(cancel))
                        {
                            cancel.store(true, Ordering::Relaxed);
                            let _ = tx.send((attempt_num, assignment, spoiler_log));
                            return;
                        }
                        attempt_num += num_workers;
                    }
                });
            }
        });
        drop(tx);
        match rx.try_iter().min_by_key(|(attempt_num, _, _)| *attempt_num) {
            Some((attempt_num, assignment, spoiler_log)) => Ok(Randomization {
                assignment,
                spoiler_log,
                seed: self.settings.seed,
                attempts_used: attempt_num + 1,
            }),
            None => Err(FillError::GenerationExhausted {
                attempts: self.settings.max_attempts,
            }),
        }
    }
}
