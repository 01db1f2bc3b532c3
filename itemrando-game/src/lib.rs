use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use std::borrow::ToOwned;
use std::hash::Hash;
use thiserror::Error;

pub type ItemId = usize; // Index into WorldGraph.item_isv.keys: distinct item names
pub type FlagId = usize; // Index into WorldGraph.flag_isv.keys: distinct event flag names
pub type TrickId = usize; // Index into WorldGraph.trick_isv.keys: distinct trick names
pub type NodeId = usize; // Index into WorldGraph.nodes
pub type EdgeIdx = usize; // Index into WorldGraph.edges
pub type ItemLocationId = usize; // Index into WorldGraph.item_locations: nodes with an item slot
pub type Capacity = i32; // Data type used to represent quantities of items/resources
pub type TrickLevel = i32; // Configured difficulty level of a trick (0 = disabled)

#[derive(Default, Clone, Debug)]
pub struct IndexedVec<T: Hash + Eq> {
    pub keys: Vec<T>,
    pub index_by_key: HashMap<T, usize>,
}

impl<T: Hash + Eq> IndexedVec<T> {
    pub fn add<U: ToOwned<Owned = T> + ?Sized>(&mut self, name: &U) -> usize {
        if !self.index_by_key.contains_key(&name.to_owned()) {
            let idx = self.keys.len();
            self.index_by_key.insert(name.to_owned(), idx);
            self.keys.push(name.to_owned());
            idx
        } else {
            self.index_by_key[&name.to_owned()]
        }
    }
}

/// Compiled requirement expression gating an edge (or victory). The closed set
/// of variants is fixed here: anything a world description can express must
/// compile into one of these at build time, so that evaluation never errors.
#[derive(Clone, Debug, PartialEq)]
pub enum Requirement {
    Free,
    Never,
    Item(ItemId, Capacity),
    Flag(FlagId),
    Trick(TrickId, TrickLevel),
    And(Vec<Requirement>),
    Or(Vec<Requirement>),
}

impl Requirement {
    pub fn make_and(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            if let Requirement::Never = req {
                return Requirement::Never;
            } else if let Requirement::Free = req {
                continue;
            }
            out_reqs.push(req);
        }
        if out_reqs.is_empty() {
            Requirement::Free
        } else if out_reqs.len() == 1 {
            out_reqs.into_iter().next().unwrap()
        } else {
            Requirement::And(out_reqs)
        }
    }

    pub fn make_or(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            if let Requirement::Never = req {
                continue;
            } else if let Requirement::Free = req {
                return Requirement::Free;
            }
            out_reqs.push(req);
        }
        if out_reqs.is_empty() {
            Requirement::Never
        } else if out_reqs.len() == 1 {
            out_reqs.into_iter().next().unwrap()
        } else {
            Requirement::Or(out_reqs)
        }
    }

    /// Marks every item id referenced anywhere in this expression tree.
    pub fn mark_item_refs(&self, mask: &mut [bool]) {
        match self {
            Requirement::Item(item_id, _) => {
                mask[*item_id] = true;
            }
            Requirement::And(reqs) | Requirement::Or(reqs) => {
                for req in reqs {
                    req.mark_item_refs(mask);
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedWorldError {
    #[error("world has no nodes")]
    EmptyWorld,
    #[error("start node {0:?} does not exist")]
    UnknownStartNode(String),
    #[error("duplicate node name {0:?}")]
    DuplicateNode(String),
    #[error("edge {edge_idx} references unknown node {name:?}")]
    UnknownEdgeNode { edge_idx: usize, name: String },
    #[error("requirement references unknown item {0:?}")]
    UnknownItem(String),
    #[error("requirement references unknown flag {0:?}")]
    UnknownFlag(String),
    #[error("requirement references unknown trick {0:?}")]
    UnknownTrick(String),
    #[error("flag {0:?} is granted by more than one node")]
    DuplicateFlag(String),
}

// World description input. This is the parsed form handed over by the
// surrounding application (which owns whatever on-disk format it uses);
// names are resolved into arena indices by WorldGraph::build.

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDesc {
    pub name: String,
    #[serde(default = "default_grant")]
    pub grant: Capacity, // quantity added to the inventory count per collected copy
}

fn default_grant() -> Capacity {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequirementDesc {
    Free,
    Never,
    Item {
        name: String,
        #[serde(default = "default_grant")]
        count: Capacity,
    },
    Flag {
        name: String,
    },
    Trick {
        name: String,
        level: TrickLevel,
    },
    And(Vec<RequirementDesc>),
    Or(Vec<RequirementDesc>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDesc {
    pub name: String,
    #[serde(default)]
    pub item: bool, // node carries an item slot, empty until filled
    #[serde(default)]
    pub flag: Option<String>, // event flag granted on first visit
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDesc {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub name: Option<String>,
    pub requires: RequirementDesc,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldDesc {
    pub items: Vec<ItemDesc>,
    #[serde(default)]
    pub tricks: Vec<String>,
    pub nodes: Vec<NodeDesc>,
    pub edges: Vec<EdgeDesc>,
    pub start_node: String,
    pub victory: RequirementDesc,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub item_location: Option<ItemLocationId>,
    pub flag: Option<FlagId>,
}

#[derive(Clone, Debug)]
pub struct Edge {
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub requirement: Requirement,
    pub name: Option<String>,
}

/// The complete compiled world: node arena, edge list, interned name tables,
/// start node and victory condition. Built once, immutable afterwards, and
/// safe to share read-only across concurrent solve attempts.
#[derive(Debug)]
pub struct WorldGraph {
    pub item_isv: IndexedVec<String>,
    pub flag_isv: IndexedVec<String>,
    pub trick_isv: IndexedVec<String>,
    pub item_grant: Vec<Capacity>, // per ItemId
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub edges_by_src: Vec<Vec<EdgeIdx>>,
    pub item_locations: Vec<NodeId>,
    pub flag_locations: Vec<(NodeId, FlagId)>,
    pub start_node_id: NodeId,
    pub victory: Requirement,
}

struct RequirementContext<'a> {
    item_isv: &'a IndexedVec<String>,
    flag_isv: &'a IndexedVec<String>,
    trick_isv: &'a IndexedVec<String>,
}

fn compile_requirement(
    desc: &RequirementDesc,
    cx: &RequirementContext,
) -> Result<Requirement, MalformedWorldError> {
    match desc {
        RequirementDesc::Free => Ok(Requirement::Free),
        RequirementDesc::Never => Ok(Requirement::Never),
        RequirementDesc::Item { name, count } => {
            let item_id = *cx
                .item_isv
                .index_by_key
                .get(name)
                .ok_or_else(|| MalformedWorldError::UnknownItem(name.clone()))?;
            Ok(Requirement::Item(item_id, *count))
        }
        RequirementDesc::Flag { name } => {
            let flag_id = *cx
                .flag_isv
                .index_by_key
                .get(name)
                .ok_or_else(|| MalformedWorldError::UnknownFlag(name.clone()))?;
            Ok(Requirement::Flag(flag_id))
        }
        RequirementDesc::Trick { name, level } => {
            let trick_id = *cx
                .trick_isv
                .index_by_key
                .get(name)
                .ok_or_else(|| MalformedWorldError::UnknownTrick(name.clone()))?;
            Ok(Requirement::Trick(trick_id, *level))
        }
        RequirementDesc::And(descs) => {
            let reqs = descs
                .iter()
                .map(|d| compile_requirement(d, cx))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Requirement::make_and(reqs))
        }
        RequirementDesc::Or(descs) => {
            let reqs = descs
                .iter()
                .map(|d| compile_requirement(d, cx))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Requirement::make_or(reqs))
        }
    }
}

impl WorldGraph {
    pub fn build(desc: &WorldDesc) -> Result<WorldGraph, MalformedWorldError> {
        if desc.nodes.is_empty() {
            return Err(MalformedWorldError::EmptyWorld);
        }

        let mut item_isv: IndexedVec<String> = IndexedVec::default();
        let mut item_grant: Vec<Capacity> = Vec::new();
        for item in &desc.items {
            item_isv.add(&item.name);
            item_grant.push(item.grant);
        }
        let mut trick_isv: IndexedVec<String> = IndexedVec::default();
        for trick in &desc.tricks {
            trick_isv.add(trick);
        }

        // Flags are interned from the nodes that grant them: a requirement
        // referencing a flag no node grants is a referential defect.
        let mut flag_isv: IndexedVec<String> = IndexedVec::default();
        let mut granted_flags: HashSet<String> = HashSet::new();
        for node in &desc.nodes {
            if let Some(flag_name) = &node.flag {
                if !granted_flags.insert(flag_name.clone()) {
                    return Err(MalformedWorldError::DuplicateFlag(flag_name.clone()));
                }
                flag_isv.add(flag_name);
            }
        }

        let mut node_id_by_name: HashMap<String, NodeId> = HashMap::new();
        let mut nodes: Vec<Node> = Vec::with_capacity(desc.nodes.len());
        let mut item_locations: Vec<NodeId> = Vec::new();
        let mut flag_locations: Vec<(NodeId, FlagId)> = Vec::new();
        for (node_id, node_desc) in desc.nodes.iter().enumerate() {
            if node_id_by_name
                .insert(node_desc.name.clone(), node_id)
                .is_some()
            {
                return Err(MalformedWorldError::DuplicateNode(node_desc.name.clone()));
            }
            let item_location = if node_desc.item {
                item_locations.push(node_id);
                Some(item_locations.len() - 1)
            } else {
                None
            };
            let flag = match &node_desc.flag {
                Some(flag_name) => {
                    let flag_id = flag_isv.index_by_key[flag_name];
                    flag_locations.push((node_id, flag_id));
                    Some(flag_id)
                }
                None => None,
            };
            nodes.push(Node {
                name: node_desc.name.clone(),
                item_location,
                flag,
            });
        }

        let start_node_id = *node_id_by_name
            .get(&desc.start_node)
            .ok_or_else(|| MalformedWorldError::UnknownStartNode(desc.start_node.clone()))?;

        let cx = RequirementContext {
            item_isv: &item_isv,
            flag_isv: &flag_isv,
            trick_isv: &trick_isv,
        };
        let mut edges: Vec<Edge> = Vec::with_capacity(desc.edges.len());
        let mut edges_by_src: Vec<Vec<EdgeIdx>> = vec![Vec::new(); nodes.len()];
        for (edge_idx, edge_desc) in desc.edges.iter().enumerate() {
            let from_node_id = *node_id_by_name.get(&edge_desc.from).ok_or_else(|| {
                MalformedWorldError::UnknownEdgeNode {
                    edge_idx,
                    name: edge_desc.from.clone(),
                }
            })?;
            let to_node_id = *node_id_by_name.get(&edge_desc.to).ok_or_else(|| {
                MalformedWorldError::UnknownEdgeNode {
                    edge_idx,
                    name: edge_desc.to.clone(),
                }
            })?;
            let requirement = compile_requirement(&edge_desc.requires, &cx)?;
            edges_by_src[from_node_id].push(edges.len());
            edges.push(Edge {
                from_node_id,
                to_node_id,
                requirement,
                name: edge_desc.name.clone(),
            });
        }

        let victory = compile_requirement(&desc.victory, &cx)?;

        Ok(WorldGraph {
            item_isv,
            flag_isv,
            trick_isv,
            item_grant,
            nodes,
            edges,
            edges_by_src,
            item_locations,
            flag_locations,
            start_node_id,
            victory,
        })
    }

    pub fn num_items(&self) -> usize {
        self.item_isv.keys.len()
    }

    pub fn num_flags(&self) -> usize {
        self.flag_isv.keys.len()
    }

    pub fn num_tricks(&self) -> usize {
        self.trick_isv.keys.len()
    }

    pub fn item_id(&self, name: &str) -> Option<ItemId> {
        self.item_isv.index_by_key.get(name).copied()
    }

    pub fn flag_id(&self, name: &str) -> Option<FlagId> {
        self.flag_isv.index_by_key.get(name).copied()
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Items that appear in at least one requirement (edge or victory).
    /// These are the progression items; everything else is filler.
    pub fn gating_item_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.num_items()];
        for edge in &self.edges {
            edge.requirement.mark_item_refs(&mut mask);
        }
        self.victory.mark_item_refs(&mut mask);
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req_item(name: &str) -> RequirementDesc {
        RequirementDesc::Item {
            name: name.to_string(),
            count: 1,
        }
    }

    fn minimal_desc() -> WorldDesc {
        WorldDesc {
            items: vec![ItemDesc {
                name: "Key".to_string(),
                grant: 1,
            }],
            tricks: vec![],
            nodes: vec![
                NodeDesc {
                    name: "Start".to_string(),
                    item: true,
                    flag: None,
                },
                NodeDesc {
                    name: "Vault".to_string(),
                    item: true,
                    flag: Some("VaultOpened".to_string()),
                },
            ],
            edges: vec![EdgeDesc {
                from: "Start".to_string(),
                to: "Vault".to_string(),
                name: None,
                requires: req_item("Key"),
            }],
            start_node: "Start".to_string(),
            victory: RequirementDesc::Flag {
                name: "VaultOpened".to_string(),
            },
        }
    }

    #[test]
    fn test_build_minimal_world() {
        let world = WorldGraph::build(&minimal_desc()).unwrap();
        assert_eq!(world.nodes.len(), 2);
        assert_eq!(world.item_locations.len(), 2);
        assert_eq!(world.flag_locations, vec![(1, 0)]);
        assert_eq!(world.start_node_id, 0);
        assert_eq!(world.edges_by_src[0], vec![0]);
        assert!(world.edges_by_src[1].is_empty());
    }

    #[test]
    fn test_build_rejects_empty_world() {
        let mut desc = minimal_desc();
        desc.nodes.clear();
        desc.edges.clear();
        assert_eq!(
            WorldGraph::build(&desc).unwrap_err(),
            MalformedWorldError::EmptyWorld
        );
    }

    #[test]
    fn test_build_rejects_unknown_start_node() {
        let mut desc = minimal_desc();
        desc.start_node = "Nowhere".to_string();
        assert_eq!(
            WorldGraph::build(&desc).unwrap_err(),
            MalformedWorldError::UnknownStartNode("Nowhere".to_string())
        );
    }

    #[test]
    fn test_build_rejects_dangling_edge() {
        let mut desc = minimal_desc();
        desc.edges.push(EdgeDesc {
            from: "Vault".to_string(),
            to: "Basement".to_string(),
            name: None,
            requires: RequirementDesc::Free,
        });
        assert_eq!(
            WorldGraph::build(&desc).unwrap_err(),
            MalformedWorldError::UnknownEdgeNode {
                edge_idx: 1,
                name: "Basement".to_string()
            }
        );
    }

    #[test]
    fn test_build_rejects_duplicate_node() {
        let mut desc = minimal_desc();
        desc.nodes.push(NodeDesc {
            name: "Start".to_string(),
            item: false,
            flag: None,
        });
        assert_eq!(
            WorldGraph::build(&desc).unwrap_err(),
            MalformedWorldError::DuplicateNode("Start".to_string())
        );
    }

    #[test]
    fn test_build_rejects_duplicate_flag() {
        let mut desc = minimal_desc();
        desc.nodes.push(NodeDesc {
            name: "Annex".to_string(),
            item: false,
            flag: Some("VaultOpened".to_string()),
        });
        assert_eq!(
            WorldGraph::build(&desc).unwrap_err(),
            MalformedWorldError::DuplicateFlag("VaultOpened".to_string())
        );
    }

    #[test]
    fn test_build_rejects_unknown_item() {
        let mut desc = minimal_desc();
        desc.edges[0].requires = req_item("Crowbar");
        assert_eq!(
            WorldGraph::build(&desc).unwrap_err(),
            MalformedWorldError::UnknownItem("Crowbar".to_string())
        );
    }

    #[test]
    fn test_build_rejects_unknown_flag() {
        let mut desc = minimal_desc();
        desc.victory = RequirementDesc::Flag {
            name: "NoSuchFlag".to_string(),
        };
        assert_eq!(
            WorldGraph::build(&desc).unwrap_err(),
            MalformedWorldError::UnknownFlag("NoSuchFlag".to_string())
        );
    }

    #[test]
    fn test_build_rejects_unknown_trick() {
        let mut desc = minimal_desc();
        desc.edges[0].requires = RequirementDesc::Trick {
            name: "WallClip".to_string(),
            level: 2,
        };
        assert_eq!(
            WorldGraph::build(&desc).unwrap_err(),
            MalformedWorldError::UnknownTrick("WallClip".to_string())
        );
    }

    #[test]
    fn test_make_and_folds_constants() {
        assert_eq!(
            Requirement::make_and(vec![Requirement::Free, Requirement::Flag(0)]),
            Requirement::Flag(0)
        );
        assert_eq!(
            Requirement::make_and(vec![Requirement::Item(0, 1), Requirement::Never]),
            Requirement::Never
        );
        assert_eq!(Requirement::make_and(vec![]), Requirement::Free);
    }

    #[test]
    fn test_make_or_folds_constants() {
        assert_eq!(
            Requirement::make_or(vec![Requirement::Never, Requirement::Flag(0)]),
            Requirement::Flag(0)
        );
        assert_eq!(
            Requirement::make_or(vec![Requirement::Item(0, 1), Requirement::Free]),
            Requirement::Free
        );
        assert_eq!(Requirement::make_or(vec![]), Requirement::Never);
    }

    #[test]
    fn test_gating_item_mask() {
        let mut desc = minimal_desc();
        desc.items.push(ItemDesc {
            name: "Pebble".to_string(),
            grant: 1,
        });
        let world = WorldGraph::build(&desc).unwrap();
        assert_eq!(world.gating_item_mask(), vec![true, false]);
    }
}
