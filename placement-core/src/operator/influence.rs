//! Store load deltas imposed by operator steps.
//!
//! Admission control sums the influence of in-flight operators to avoid
//! overloading a store, and balancers sum total influence to forecast where
//! the cluster ends up once every operator completes.

use std::collections::HashMap;

use placement_model::{ResourceKind, StoreId};

/// Regions larger than this (MB) cost a full step unit against store limits.
pub const SMALL_REGION_THRESHOLD: i64 = 20;
/// Regions at or below this size (MB) are treated as empty and cost nothing.
pub const EMPTY_REGION_APPROXIMATE_SIZE: i64 = 1;
/// Step cost charged for a regular region.
pub const REGION_INFLUENCE: i64 = 1000;
/// Step cost charged for a small, non-empty region.
pub const SMALL_REGION_INFLUENCE: i64 = 200;

/// Store limit bucket a step consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreLimitType {
    AddPeer,
    RemovePeer,
}

/// Accumulated delta for one store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreInfluence {
    pub region_size: i64,
    pub region_count: i64,
    pub leader_size: i64,
    pub leader_count: i64,
    pub witness_count: i64,
    pub step_cost: HashMap<StoreLimitType, i64>,
}

impl StoreInfluence {
    /// Charges the limit bucket according to region size.
    pub fn adjust_step_cost(&mut self, limit: StoreLimitType, region_size: i64) {
        let cost = if region_size > SMALL_REGION_THRESHOLD {
            REGION_INFLUENCE
        } else if region_size > EMPTY_REGION_APPROXIMATE_SIZE {
            SMALL_REGION_INFLUENCE
        } else {
            return;
        };
        *self.step_cost.entry(limit).or_default() += cost;
    }

    pub fn step_cost(&self, limit: StoreLimitType) -> i64 {
        self.step_cost.get(&limit).copied().unwrap_or_default()
    }

    pub fn resource_property(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Leader => self.leader_count,
            ResourceKind::Region => self.region_size,
            ResourceKind::Witness => self.witness_count,
        }
    }

    fn add(&mut self, other: &StoreInfluence) {
        self.region_size += other.region_size;
        self.region_count += other.region_count;
        self.leader_size += other.leader_size;
        self.leader_count += other.leader_count;
        self.witness_count += other.witness_count;
        for (limit, cost) in &other.step_cost {
            *self.step_cost.entry(*limit).or_default() += cost;
        }
    }
}

/// Per-store influence accumulator handed to `influence` calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpInfluence {
    stores: HashMap<StoreId, StoreInfluence>,
}

impl OpInfluence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable entry for `store`, created zeroed on first use.
    pub fn store_mut(&mut self, store: StoreId) -> &mut StoreInfluence {
        self.stores.entry(store).or_default()
    }

    pub fn store(&self, store: StoreId) -> Option<&StoreInfluence> {
        self.stores.get(&store)
    }

    pub fn stores(&self) -> impl Iterator<Item = (&StoreId, &StoreInfluence)> {
        self.stores.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Merges `other` into this accumulator.
    pub fn add(&mut self, other: &OpInfluence) {
        for (store, influence) in &other.stores {
            self.store_mut(*store).add(influence);
        }
    }
}
