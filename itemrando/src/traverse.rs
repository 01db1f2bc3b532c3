use itemrando_game::{EdgeIdx, FlagId, ItemId, ItemLocationId, NodeId, WorldGraph};
use itemrando_logic::{evaluate_requirement, GlobalState};

pub type StepTrailId = i32;

#[derive(Clone, Debug)]
pub struct StepTrail {
    pub prev_trail_id: StepTrailId,
    pub edge_idx: EdgeIdx,
}

#[derive(Clone)]
pub struct TraverseResult {
    pub reachable: Vec<bool>, // per NodeId
    pub start_trail_ids: Vec<Option<StepTrailId>>, // per NodeId
    pub step_trails: Vec<StepTrail>,
    pub collected_items: Vec<(ItemLocationId, ItemId)>, // pickups merged during the pass, in visit order
    pub collected_flags: Vec<FlagId>, // flags granted during the pass, in visit order
    pub global_state: GlobalState, // state after merging everything reachable
    pub victory: bool,
}

struct Traversal {
    reachable: Vec<bool>,
    start_trail_ids: Vec<Option<StepTrailId>>,
    step_trails: Vec<StepTrail>,
    collected_items: Vec<(ItemLocationId, ItemId)>,
    collected_flags: Vec<FlagId>,
    frontier: Vec<NodeId>,
    grants: usize, // bumped on every inventory merge; drives the blocked-edge re-scan
}

impl Traversal {
    fn visit(
        &mut self,
        world: &WorldGraph,
        assignment: &[Option<ItemId>],
        global: &mut GlobalState,
        node_id: NodeId,
        prev_trail_id: StepTrailId,
        edge_idx: Option<EdgeIdx>,
    ) {
        let trail_id = match edge_idx {
            Some(edge_idx) => {
                self.step_trails.push(StepTrail {
                    prev_trail_id,
                    edge_idx,
                });
                (self.step_trails.len() - 1) as StepTrailId
            }
            None => -1,
        };
        self.reachable[node_id] = true;
        self.start_trail_ids[node_id] = Some(trail_id);

        // Merge grants immediately, so edges evaluated later in this pass
        // already see them.
        let node = &world.nodes[node_id];
        if let Some(flag_id) = node.flag {
            if !global.inventory.has_flag(flag_id) {
                global.set_flag(flag_id);
                self.collected_flags.push(flag_id);
                self.grants += 1;
            }
        }
        if let Some(location_id) = node.item_location {
            if let Some(item_id) = assignment[location_id] {
                global.collect(item_id, world);
                self.collected_items.push((location_id, item_id));
                self.grants += 1;
            }
        }
        self.frontier.push(node_id);
    }
}

/// Monotonic fixed-point reachability: computes the set of nodes reachable
/// from the start node, merging each reached node's flag and placed item into
/// the inventory as it is first visited. `assignment` maps each item location
/// to the item placed there (or None while unfilled).
///
/// Satisfied edges never need re-evaluation (satisfaction is monotonic), so
/// each edge is walked once from the frontier. Edges that fail are parked on
/// a blocked list and re-checked only after the inventory has grown, bounding
/// total work by O(edges x merged grants).
pub fn traverse(
    world: &WorldGraph,
    assignment: &[Option<ItemId>],
    global: &GlobalState,
) -> TraverseResult {
    assert_eq!(assignment.len(), world.item_locations.len());
    let num_nodes = world.nodes.len();
    let mut global = global.clone();
    let mut t = Traversal {
        reachable: vec![false; num_nodes],
        start_trail_ids: vec![None; num_nodes],
        step_trails: Vec::with_capacity(world.edges.len()),
        collected_items: Vec::new(),
        collected_flags: Vec::new(),
        frontier: Vec::new(),
        grants: 0,
    };
    let mut blocked: Vec<EdgeIdx> = Vec::new();

    t.visit(world, assignment, &mut global, world.start_node_id, -1, None);
    let mut grants_at_last_scan = 0;
    loop {
        while let Some(src_id) = t.frontier.pop() {
            let src_trail_id = t.start_trail_ids[src_id].unwrap();
            for &edge_idx in &world.edges_by_src[src_id] {
                let edge = &world.edges[edge_idx];
                if t.reachable[edge.to_node_id] {
                    continue;
                }
                if evaluate_requirement(&edge.requirement, &global) {
                    t.visit(
                        world,
                        assignment,
                        &mut global,
                        edge.to_node_id,
                        src_trail_id,
                        Some(edge_idx),
                    );
                } else {
                    blocked.push(edge_idx);
                }
            }
        }
        // The frontier is drained. If anything was merged since the last
        // scan, previously-unsatisfied edges may now pass; otherwise the
        // fixed point is reached.
        if t.grants == grants_at_last_scan {
            break;
        }
        grants_at_last_scan = t.grants;
        let mut still_blocked: Vec<EdgeIdx> = Vec::new();
        for edge_idx in blocked {
            let edge = &world.edges[edge_idx];
            if t.reachable[edge.to_node_id] {
                continue;
            }
            if evaluate_requirement(&edge.requirement, &global) {
                let src_trail_id = t.start_trail_ids[edge.from_node_id].unwrap();
                t.visit(
                    world,
                    assignment,
                    &mut global,
                    edge.to_node_id,
                    src_trail_id,
                    Some(edge_idx),
                );
            } else {
                still_blocked.push(edge_idx);
            }
        }
        blocked = still_blocked;
    }

    let victory = evaluate_requirement(&world.victory, &global);
    TraverseResult {
        reachable: t.reachable,
        start_trail_ids: t.start_trail_ids,
        step_trails: t.step_trails,
        collected_items: t.collected_items,
        collected_flags: t.collected_flags,
        global_state: global,
        victory,
    }
}

/// Reachability with all item locations treated as empty.
pub fn compute_reachability(world: &WorldGraph, global: &GlobalState) -> TraverseResult {
    let assignment: Vec<Option<ItemId>> = vec![None; world.item_locations.len()];
    traverse(world, &assignment, global)
}

/// Reconstructs the sequence of edges taken from the start node to the given
/// node. The node must be reachable in the given result.
pub fn get_spoiler_route(result: &TraverseResult, node_id: NodeId) -> Vec<EdgeIdx> {
    let mut trail_id = result.start_trail_ids[node_id].unwrap();
    let mut steps: Vec<EdgeIdx> = Vec::new();
    while trail_id != -1 {
        let step_trail = &result.step_trails[trail_id as usize];
        steps.push(step_trail.edge_idx);
        trail_id = step_trail.prev_trail_id;
    }
    steps.reverse();
    steps
}
