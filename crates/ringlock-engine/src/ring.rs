//! The cyclic pool of resources.
//!
//! Agent `i` sits between resource `i` (left) and resource `(i + 1) mod N`
//! (right), so every resource is shared by exactly two neighbouring agents.
//! That sharing is what makes a circular wait possible.
//!
//! The ring also carries a per-resource usage counter. Agents enter it while
//! eating; two agents inside the same counter at once would mean the resource
//! lock failed to exclude.

use std::sync::atomic::{AtomicU32, Ordering};

use ringlock_core::{AgentId, ConfigError, ResourceId};
use smallvec::SmallVec;

use crate::resource::Resource;

/// Owns all N resources of one simulation.
#[derive(Debug)]
pub struct ResourceRing {
    resources: Box<[Resource]>,
    in_use: Box<[AtomicU32]>,
}

impl ResourceRing {
    /// Smallest ring with distinct neighbours.
    pub const MIN_LEN: usize = 2;

    /// Build a ring of `len` free resources.
    pub fn new(len: usize, fair: bool) -> Result<Self, ConfigError> {
        if len < Self::MIN_LEN {
            return Err(ConfigError::AgentCountTooSmall { configured: len });
        }
        if u32::try_from(len).is_err() {
            return Err(ConfigError::AgentCountTooLarge { configured: len });
        }
        let resources = (0..len as u32)
            .map(|i| Resource::new(ResourceId(i), fair))
            .collect();
        let in_use = (0..len).map(|_| AtomicU32::new(0)).collect();
        Ok(Self { resources, in_use })
    }

    /// Number of resources (equal to the number of agents).
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Always `false`; construction rejects rings below [`MIN_LEN`](Self::MIN_LEN).
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All resources in ring order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    /// Look up a resource by id.
    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id.index())
    }

    /// Id of the agent's left resource.
    pub fn left_id(&self, agent: AgentId) -> ResourceId {
        ResourceId(agent.0 % self.len() as u32)
    }

    /// Id of the agent's right resource.
    pub fn right_id(&self, agent: AgentId) -> ResourceId {
        ResourceId((agent.0 % self.len() as u32 + 1) % self.len() as u32)
    }

    /// The agent's left resource, `resources[i]`.
    pub fn left_of(&self, agent: AgentId) -> &Resource {
        &self.resources[self.left_id(agent).index()]
    }

    /// The agent's right resource, `resources[(i + 1) mod N]`.
    pub fn right_of(&self, agent: AgentId) -> &Resource {
        &self.resources[self.right_id(agent).index()]
    }

    /// The two agents that share `resource`: the one to its right
    /// (for whom it is the left resource) and the one to its left.
    pub fn sharers(&self, resource: ResourceId) -> (AgentId, AgentId) {
        let n = self.len() as u32;
        let i = resource.0 % n;
        (AgentId(i), AgentId((i + n - 1) % n))
    }

    /// Resources among the agent's two neighbours that it currently holds.
    pub fn held_by(&self, agent: AgentId) -> SmallVec<[ResourceId; 2]> {
        [self.left_of(agent), self.right_of(agent)]
            .into_iter()
            .filter(|r| r.holder() == Some(agent))
            .map(Resource::id)
            .collect()
    }

    /// Current holder of every resource, in ring order.
    pub fn holders(&self) -> Vec<Option<AgentId>> {
        self.resources.iter().map(Resource::holder).collect()
    }

    /// Close every resource, waking all blocked waiters.
    pub fn close(&self) {
        for r in self.resources.iter() {
            r.close();
        }
    }

    /// Mark `resource` as in use by the caller.
    ///
    /// Returns `false` if another user was already inside, which means
    /// mutual exclusion was broken.
    pub(crate) fn enter_use(&self, resource: ResourceId) -> bool {
        self.in_use[resource.index()].fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Undo a matching [`enter_use`](Self::enter_use).
    pub(crate) fn exit_use(&self, resource: ResourceId) {
        self.in_use[resource.index()].fetch_sub(1, Ordering::AcqRel);
    }
}
