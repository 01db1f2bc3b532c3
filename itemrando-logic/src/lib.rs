use itemrando_game::{Capacity, FlagId, ItemId, Requirement, TrickLevel, WorldGraph};
use serde::{Deserialize, Serialize};

/// Multiset of resources available to a solve attempt: a quantity per item
/// kind plus a boolean per event flag. Grows monotonically during a single
/// reachability pass; nothing ever decreases a solver-visible quantity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inventory {
    pub items: Vec<Capacity>,
    pub flags: Vec<bool>,
}

impl Inventory {
    pub fn empty(num_items: usize, num_flags: usize) -> Self {
        Inventory {
            items: vec![0; num_items],
            flags: vec![false; num_flags],
        }
    }

    pub fn count(&self, item_id: ItemId) -> Capacity {
        self.items[item_id]
    }

    pub fn has_flag(&self, flag_id: FlagId) -> bool {
        self.flags[flag_id]
    }

    /// True if every quantity/flag in `other` is covered by `self`.
    pub fn is_superset_of(&self, other: &Inventory) -> bool {
        self.items
            .iter()
            .zip(other.items.iter())
            .all(|(a, b)| a >= b)
            && self
                .flags
                .iter()
                .zip(other.flags.iter())
                .all(|(a, b)| *a || !*b)
    }
}

// Tricks are a fixed configuration of the attempt, not something collected,
// but requirement evaluation needs them alongside the inventory, so they
// ride together here.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalState {
    pub inventory: Inventory,
    pub tricks: Vec<TrickLevel>,
}

impl GlobalState {
    pub fn initial(world: &WorldGraph, tricks: Vec<TrickLevel>) -> Self {
        assert_eq!(tricks.len(), world.num_tricks());
        GlobalState {
            inventory: Inventory::empty(world.num_items(), world.num_flags()),
            tricks,
        }
    }

    pub fn collect(&mut self, item_id: ItemId, world: &WorldGraph) {
        self.inventory.items[item_id] += world.item_grant[item_id];
    }

    pub fn set_flag(&mut self, flag_id: FlagId) {
        self.inventory.flags[flag_id] = true;
    }
}

/// Pure evaluation of a requirement expression against a state snapshot.
/// `And` stops on the first unsatisfied child, `Or` on the first satisfied
/// one. Satisfaction is monotonic in the inventory: nothing here can flip
/// from satisfied to unsatisfied as quantities grow.
pub fn evaluate_requirement(req: &Requirement, global: &GlobalState) -> bool {
    match req {
        Requirement::Free => true,
        Requirement::Never => false,
        Requirement::Item(item_id, count) => global.inventory.items[*item_id] >= *count,
        Requirement::Flag(flag_id) => global.inventory.flags[*flag_id],
        Requirement::Trick(trick_id, level) => global.tricks[*trick_id] >= *level,
        Requirement::And(reqs) => reqs.iter().all(|r| evaluate_requirement(r, global)),
        Requirement::Or(reqs) => reqs.iter().any(|r| evaluate_requirement(r, global)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemrando_game::{EdgeDesc, ItemDesc, NodeDesc, RequirementDesc, WorldDesc};

    fn two_item_world() -> WorldGraph {
        let desc = WorldDesc {
            items: vec![
                ItemDesc {
                    name: "Missile".to_string(),
                    grant: 5,
                },
                ItemDesc {
                    name: "Key".to_string(),
                    grant: 1,
                },
            ],
            tricks: vec!["LedgeJump".to_string()],
            nodes: vec![
                NodeDesc {
                    name: "Start".to_string(),
                    item: false,
                    flag: None,
                },
                NodeDesc {
                    name: "Gate".to_string(),
                    item: false,
                    flag: Some("GateOpened".to_string()),
                },
            ],
            edges: vec![EdgeDesc {
                from: "Start".to_string(),
                to: "Gate".to_string(),
                name: None,
                requires: RequirementDesc::Item {
                    name: "Missile".to_string(),
                    count: 10,
                },
            }],
            start_node: "Start".to_string(),
            victory: RequirementDesc::Flag {
                name: "GateOpened".to_string(),
            },
        };
        WorldGraph::build(&desc).unwrap()
    }

    #[test]
    fn test_collect_applies_grant() {
        let world = two_item_world();
        let mut global = GlobalState::initial(&world, vec![0]);
        let missile = world.item_id("Missile").unwrap();
        global.collect(missile, &world);
        assert_eq!(global.inventory.count(missile), 5);
        global.collect(missile, &world);
        assert_eq!(global.inventory.count(missile), 10);
    }

    #[test]
    fn test_evaluate_count_threshold() {
        let world = two_item_world();
        let mut global = GlobalState::initial(&world, vec![0]);
        let missile = world.item_id("Missile").unwrap();
        let req = Requirement::Item(missile, 10);
        assert!(!evaluate_requirement(&req, &global));
        global.collect(missile, &world);
        assert!(!evaluate_requirement(&req, &global));
        global.collect(missile, &world);
        assert!(evaluate_requirement(&req, &global));
    }

    #[test]
    fn test_evaluate_trick_level() {
        let world = two_item_world();
        let req = Requirement::Trick(0, 3);
        let low = GlobalState::initial(&world, vec![2]);
        let high = GlobalState::initial(&world, vec![3]);
        assert!(!evaluate_requirement(&req, &low));
        assert!(evaluate_requirement(&req, &high));
    }

    #[test]
    fn test_evaluate_and_or() {
        let world = two_item_world();
        let mut global = GlobalState::initial(&world, vec![0]);
        let key = world.item_id("Key").unwrap();
        let and = Requirement::And(vec![Requirement::Item(key, 1), Requirement::Free]);
        let or = Requirement::Or(vec![Requirement::Never, Requirement::Item(key, 1)]);
        assert!(!evaluate_requirement(&and, &global));
        assert!(!evaluate_requirement(&or, &global));
        global.collect(key, &world);
        assert!(evaluate_requirement(&and, &global));
        assert!(evaluate_requirement(&or, &global));
    }

    #[test]
    fn test_inventory_superset() {
        let world = two_item_world();
        let mut a = GlobalState::initial(&world, vec![0]);
        let b = a.clone();
        a.collect(world.item_id("Key").unwrap(), &world);
        a.set_flag(world.flag_id("GateOpened").unwrap());
        assert!(a.inventory.is_superset_of(&b.inventory));
        assert!(!b.inventory.is_superset_of(&a.inventory));
    }
}
