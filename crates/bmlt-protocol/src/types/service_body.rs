//! Service bodies and their hierarchy.
//!
//! The server hands out a flat list where each entry names its parent. The
//! [`ServiceBodyTree`] keeps that list in its original order and links the
//! nodes by index under a synthetic root, so both views come from one
//! allocation and no node owns another.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::error::{BmltError, BmltResult};
use crate::wire;

/// Server-assigned service body id
pub type ServiceBodyId = u64;

/// An organizational unit owning a subset of meetings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceBody {
    /// Service body id
    pub id: ServiceBodyId,
    /// Parent id as reported by the server; `None` for top-level bodies
    pub parent_id: Option<ServiceBodyId>,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Server-defined kind, such as `AS` (area) or `RS` (region)
    pub body_type: String,
}

impl ServiceBody {
    fn from_wire(object: &Map<String, Value>) -> BmltResult<Self> {
        let raw_id = wire::required(object, "id")?;
        let id = wire::parse_id(&raw_id).ok_or_else(|| {
            BmltError::malformed(format!("service body id `{raw_id}` is not numeric"))
        })?;
        let parent_id = wire::parse_id(&wire::optional(object, "parent_id")).filter(|&p| p != 0);
        Ok(Self {
            id,
            parent_id,
            name: wire::optional(object, "name"),
            description: wire::optional(object, "description"),
            body_type: wire::optional(object, "type"),
        })
    }
}

/// Decode the flat service body list
pub fn decode_service_bodies(value: &Value) -> BmltResult<Vec<ServiceBody>> {
    wire::one_or_many(value)?
        .into_iter()
        .map(ServiceBody::from_wire)
        .collect()
}

/// Why a flat list could not be linked into a tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TreeError {
    /// Two entries share an id
    #[error("duplicate service body id {0}")]
    DuplicateId(ServiceBodyId),
    /// Parent links form a loop that never reaches the root
    #[error("service body {0} is part of a parent cycle")]
    Cycle(ServiceBodyId),
}

impl From<TreeError> for BmltError {
    fn from(err: TreeError) -> Self {
        BmltError::malformed(err.to_string())
    }
}

/// Where a node hangs in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeParent {
    /// Child of the synthetic root
    Root,
    /// Child of the node at this flat index
    Node(usize),
}

#[derive(Debug, Clone)]
struct Slot {
    body: ServiceBody,
    parent: TreeParent,
    children: Vec<usize>,
}

/// Flat and hierarchical views over one service body list
#[derive(Debug, Clone, Default)]
pub struct ServiceBodyTree {
    slots: Vec<Slot>,
    roots: Vec<usize>,
    by_id: HashMap<ServiceBodyId, usize>,
}

impl ServiceBodyTree {
    /// Link a flat list into a tree.
    ///
    /// A parent id that names no body in the list attaches the node to the
    /// synthetic root; the server may reference bodies it does not publish.
    ///
    /// # Errors
    ///
    /// Fails on duplicate ids and on parent cycles.
    pub fn build(bodies: Vec<ServiceBody>) -> Result<Self, TreeError> {
        let mut by_id = HashMap::with_capacity(bodies.len());
        for (index, body) in bodies.iter().enumerate() {
            if by_id.insert(body.id, index).is_some() {
                return Err(TreeError::DuplicateId(body.id));
            }
        }

        let mut slots: Vec<Slot> = bodies
            .into_iter()
            .map(|body| Slot {
                body,
                parent: TreeParent::Root,
                children: Vec::new(),
            })
            .collect();

        let mut roots = Vec::new();
        for index in 0..slots.len() {
            let parent = slots[index]
                .body
                .parent_id
                .and_then(|pid| by_id.get(&pid).copied())
                .filter(|&p| p != index);
            match parent {
                Some(p) => {
                    slots[index].parent = TreeParent::Node(p);
                    slots[p].children.push(index);
                }
                None => {
                    if let Some(pid) = slots[index].body.parent_id
                        && !by_id.contains_key(&pid)
                    {
                        tracing::debug!(
                            id = slots[index].body.id,
                            parent = pid,
                            "service body parent not published; attaching to root"
                        );
                    }
                    if slots[index].body.parent_id == Some(slots[index].body.id) {
                        return Err(TreeError::Cycle(slots[index].body.id));
                    }
                    roots.push(index);
                }
            }
        }

        let tree = Self {
            slots,
            roots,
            by_id,
        };
        let reachable = tree.walk().count();
        if reachable != tree.slots.len() {
            let reached: std::collections::HashSet<ServiceBodyId> =
                tree.walk().map(|(_, b)| b.id).collect();
            let stuck = tree
                .slots
                .iter()
                .map(|s| s.body.id)
                .find(|id| !reached.contains(id))
                .unwrap_or_default();
            return Err(TreeError::Cycle(stuck));
        }
        Ok(tree)
    }

    /// Number of service bodies
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the tree holds no bodies
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Flat view, in server order
    pub fn flat(&self) -> impl ExactSizeIterator<Item = &ServiceBody> {
        self.slots.iter().map(|s| &s.body)
    }

    /// Body with this id
    #[must_use]
    pub fn get(&self, id: ServiceBodyId) -> Option<&ServiceBody> {
        self.by_id.get(&id).map(|&i| &self.slots[i].body)
    }

    /// Tree parent of the body with this id
    #[must_use]
    pub fn parent_of(&self, id: ServiceBodyId) -> Option<TreeParent> {
        self.by_id.get(&id).map(|&i| self.slots[i].parent)
    }

    /// Body stored at a flat index
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&ServiceBody> {
        self.slots.get(index).map(|s| &s.body)
    }

    /// Children of the synthetic root
    pub fn roots(&self) -> impl Iterator<Item = &ServiceBody> {
        self.roots.iter().map(|&i| &self.slots[i].body)
    }

    /// Direct children of a body
    pub fn children(&self, id: ServiceBodyId) -> impl Iterator<Item = &ServiceBody> {
        self.by_id
            .get(&id)
            .into_iter()
            .flat_map(|&i| self.slots[i].children.iter())
            .map(|&c| &self.slots[c].body)
    }

    /// Ancestors of a body, nearest first, excluding the synthetic root
    #[must_use]
    pub fn ancestors(&self, id: ServiceBodyId) -> Vec<&ServiceBody> {
        let mut out = Vec::new();
        let mut cursor = self.by_id.get(&id).map(|&i| self.slots[i].parent);
        while let Some(TreeParent::Node(p)) = cursor {
            out.push(&self.slots[p].body);
            cursor = Some(self.slots[p].parent);
        }
        out
    }

    /// A body and everything beneath it
    #[must_use]
    pub fn subtree_ids(&self, id: ServiceBodyId) -> Vec<ServiceBodyId> {
        let Some(&start) = self.by_id.get(&id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            out.push(self.slots[index].body.id);
            stack.extend(self.slots[index].children.iter().rev());
        }
        out
    }

    /// Depth-first walk from the synthetic root, yielding `(depth, body)`;
    /// top-level bodies have depth 0
    pub fn walk(&self) -> impl Iterator<Item = (usize, &ServiceBody)> {
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&i| (0, i)).collect();
        std::iter::from_fn(move || {
            let (depth, index) = stack.pop()?;
            let slot = &self.slots[index];
            stack.extend(slot.children.iter().rev().map(|&c| (depth + 1, c)));
            Some((depth, &slot.body))
        })
    }
}
