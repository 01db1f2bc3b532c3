use crate::traverse::{get_spoiler_route, TraverseResult};
use itemrando_game::{Capacity, NodeId, TrickLevel, WorldGraph};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerRouteEntry {
    pub node: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerItemCount {
    pub item: String,
    pub count: Capacity,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerTrickLevel {
    pub trick: String,
    pub level: TrickLevel,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerStartState {
    pub starting_items: Vec<SpoilerItemCount>,
    pub tricks: Vec<SpoilerTrickLevel>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerSummary {
    pub step: usize,
    pub item: String,
    pub location: String,
    pub flags: Vec<String>,
    pub reachable_locations: usize,
    pub filled_locations: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerDetails {
    pub step: usize,
    pub item: String,
    pub location: String,
    pub obtain_route: Vec<SpoilerRouteEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerItemLoc {
    pub item: String,
    pub location: String,
}

/// Trace of one successful fill: per-step summaries and detailed routes,
/// plus the final item-to-location listing. This is the reachability proof
/// the engine hands back alongside the assignment.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerLog {
    pub start_state: SpoilerStartState,
    pub summary: Vec<SpoilerSummary>,
    pub details: Vec<SpoilerDetails>,
    pub all_items: Vec<SpoilerItemLoc>,
}

/// Route from the start node to `node_id`, as node/edge names. The node must
/// be reachable in `result`.
pub fn make_obtain_route(
    world: &WorldGraph,
    result: &TraverseResult,
    node_id: NodeId,
) -> Vec<SpoilerRouteEntry> {
    let mut route = vec![SpoilerRouteEntry {
        node: world.nodes[world.start_node_id].name.clone(),
        edge: None,
    }];
    for edge_idx in get_spoiler_route(result, node_id) {
        let edge = &world.edges[edge_idx];
        route.push(SpoilerRouteEntry {
            node: world.nodes[edge.to_node_id].name.clone(),
            edge: edge.name.clone(),
        });
    }
    route
}
