//! The closed set of atomic steps an operator is built from.
//!
//! A step never reports completion. Instead every heartbeat's region
//! snapshot is tested against the step's intended effect (`is_finish`).
//! Each behaviour dispatches with an exhaustive `match`, so a new variant
//! cannot silently skip one of them.

use std::fmt;
use std::time::Duration;

use placement_model::{Peer, PeerId, PeerRole, RegionInfo, StoreId};
use tracing::warn;

use super::config::StepCostModel;
use super::influence::{OpInfluence, SMALL_REGION_THRESHOLD, StoreLimitType};
use crate::error::{OperatorError, Result};

/// Moves leadership between two stores that both hold a voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferLeader {
    pub from_store: StoreId,
    pub to_store: StoreId,
}

/// Adds a voter directly (without passing through the learner role).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddPeer {
    pub to_store: StoreId,
    pub peer_id: PeerId,
    /// Lightweight additions skip store-limit accounting.
    pub is_lightweight: bool,
}

/// Adds a learner, optionally as a witness that carries no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddLearner {
    pub to_store: StoreId,
    pub peer_id: PeerId,
    pub is_witness: bool,
    pub is_lightweight: bool,
}

/// Promotes an existing learner to voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromoteLearner {
    pub to_store: StoreId,
    pub peer_id: PeerId,
    pub is_witness: bool,
}

/// Demotes an existing voter to learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DemoteVoter {
    pub to_store: StoreId,
    pub peer_id: PeerId,
    pub is_witness: bool,
}

/// Removes whatever peer the region has on `from_store`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemovePeer {
    pub from_store: StoreId,
    /// Expected peer id, when the caller knows it.
    pub peer_id: Option<PeerId>,
    /// Removals from a down store are charged at most a small-region cost.
    pub is_down_store: bool,
}

/// Enters joint consensus, applying several role changes atomically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ChangePeerV2Enter {
    pub promote_learners: Vec<PromoteLearner>,
    pub demote_voters: Vec<DemoteVoter>,
}

/// Leaves joint consensus, finalizing the role changes made on entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ChangePeerV2Leave {
    pub promote_learners: Vec<PromoteLearner>,
    pub demote_voters: Vec<DemoteVoter>,
}

/// Turns a full replica into a witness, dropping its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BecomeWitness {
    pub store_id: StoreId,
    pub peer_id: PeerId,
}

/// Turns a witness back into a full replica, which needs a data copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BecomeNonWitness {
    pub store_id: StoreId,
    pub peer_id: PeerId,
}

/// One atomic, independently verifiable action within an operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpStep {
    TransferLeader(TransferLeader),
    AddPeer(AddPeer),
    AddLearner(AddLearner),
    PromoteLearner(PromoteLearner),
    DemoteVoter(DemoteVoter),
    RemovePeer(RemovePeer),
    ChangePeerV2Enter(ChangePeerV2Enter),
    ChangePeerV2Leave(ChangePeerV2Leave),
    BecomeWitness(BecomeWitness),
    BecomeNonWitness(BecomeNonWitness),
}

/// Fieldless mirror of [`OpStep`] for "does this operator contain a ..."
/// queries and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpStepKind {
    TransferLeader,
    AddPeer,
    AddLearner,
    PromoteLearner,
    DemoteVoter,
    RemovePeer,
    ChangePeerV2Enter,
    ChangePeerV2Leave,
    BecomeWitness,
    BecomeNonWitness,
}

impl OpStepKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            OpStepKind::TransferLeader => "transfer_leader",
            OpStepKind::AddPeer => "add_peer",
            OpStepKind::AddLearner => "add_learner",
            OpStepKind::PromoteLearner => "promote_learner",
            OpStepKind::DemoteVoter => "demote_voter",
            OpStepKind::RemovePeer => "remove_peer",
            OpStepKind::ChangePeerV2Enter => "change_peer_v2_enter",
            OpStepKind::ChangePeerV2Leave => "change_peer_v2_leave",
            OpStepKind::BecomeWitness => "become_witness",
            OpStepKind::BecomeNonWitness => "become_non_witness",
        }
    }
}

impl fmt::Display for OpStepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! impl_from_step {
    ($($variant:ident),+ $(,)?) => {
        $(
            impl From<$variant> for OpStep {
                fn from(step: $variant) -> Self {
                    OpStep::$variant(step)
                }
            }
        )+
    };
}

impl_from_step!(
    TransferLeader,
    AddPeer,
    AddLearner,
    PromoteLearner,
    DemoteVoter,
    RemovePeer,
    ChangePeerV2Enter,
    ChangePeerV2Leave,
    BecomeWitness,
    BecomeNonWitness,
);

impl OpStep {
    pub fn kind(&self) -> OpStepKind {
        match self {
            OpStep::TransferLeader(_) => OpStepKind::TransferLeader,
            OpStep::AddPeer(_) => OpStepKind::AddPeer,
            OpStep::AddLearner(_) => OpStepKind::AddLearner,
            OpStep::PromoteLearner(_) => OpStepKind::PromoteLearner,
            OpStep::DemoteVoter(_) => OpStepKind::DemoteVoter,
            OpStep::RemovePeer(_) => OpStepKind::RemovePeer,
            OpStep::ChangePeerV2Enter(_) => OpStepKind::ChangePeerV2Enter,
            OpStep::ChangePeerV2Leave(_) => OpStepKind::ChangePeerV2Leave,
            OpStep::BecomeWitness(_) => OpStepKind::BecomeWitness,
            OpStep::BecomeNonWitness(_) => OpStepKind::BecomeNonWitness,
        }
    }

    /// Stable label used for step-duration observations.
    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// `true` if the snapshot already reflects this step's effect.
    pub fn is_finish(&self, region: &RegionInfo) -> bool {
        match self {
            OpStep::TransferLeader(step) => step.is_finish(region),
            OpStep::AddPeer(step) => step.is_finish(region),
            OpStep::AddLearner(step) => step.is_finish(region),
            OpStep::PromoteLearner(step) => step.is_finish(region),
            OpStep::DemoteVoter(step) => step.is_finish(region),
            OpStep::RemovePeer(step) => step.is_finish(region),
            OpStep::ChangePeerV2Enter(step) => step.is_finish(region),
            OpStep::ChangePeerV2Leave(step) => step.is_finish(region),
            OpStep::BecomeWitness(step) => step.is_finish(region),
            OpStep::BecomeNonWitness(step) => step.is_finish(region),
        }
    }

    /// Conf-version increments this step has consumed, judged from the
    /// snapshot.
    pub fn conf_ver_changed(&self, region: &RegionInfo) -> u64 {
        match self {
            OpStep::TransferLeader(_) => 0,
            OpStep::AddPeer(step) => step.conf_ver_changed(region),
            OpStep::AddLearner(step) => step.conf_ver_changed(region),
            OpStep::PromoteLearner(step) => step.conf_ver_changed(region),
            OpStep::DemoteVoter(step) => step.conf_ver_changed(region),
            OpStep::RemovePeer(step) => step.conf_ver_changed(region),
            OpStep::ChangePeerV2Enter(step) => step.conf_ver_changed(region),
            OpStep::ChangePeerV2Leave(step) => step.conf_ver_changed(region),
            OpStep::BecomeWitness(step) => step.conf_ver_changed(region),
            OpStep::BecomeNonWitness(step) => step.conf_ver_changed(region),
        }
    }

    /// Applies this step's store load delta to `influence`.
    pub fn influence(&self, influence: &mut OpInfluence, region: &RegionInfo) {
        match self {
            OpStep::TransferLeader(step) => step.influence(influence, region),
            OpStep::AddPeer(step) => step.influence(influence, region),
            OpStep::AddLearner(step) => step.influence(influence, region),
            OpStep::RemovePeer(step) => step.influence(influence, region),
            OpStep::BecomeWitness(step) => step.influence(influence, region),
            OpStep::BecomeNonWitness(step) => step.influence(influence, region),
            // Role changes move no data and no leadership.
            OpStep::PromoteLearner(_)
            | OpStep::DemoteVoter(_)
            | OpStep::ChangePeerV2Enter(_)
            | OpStep::ChangePeerV2Leave(_) => {}
        }
    }

    /// Projected worst-case duration for this step.
    pub fn timeout(&self, cost: &StepCostModel, region_size_mb: u64) -> Duration {
        match self {
            OpStep::AddPeer(_) | OpStep::BecomeNonWitness(_) => {
                cost.slow_step_duration(region_size_mb)
            }
            OpStep::AddLearner(step) if !step.is_witness => cost.slow_step_duration(region_size_mb),
            OpStep::AddLearner(_)
            | OpStep::TransferLeader(_)
            | OpStep::PromoteLearner(_)
            | OpStep::DemoteVoter(_)
            | OpStep::RemovePeer(_)
            | OpStep::ChangePeerV2Enter(_)
            | OpStep::ChangePeerV2Leave(_)
            | OpStep::BecomeWitness(_) => cost.fast_step_duration(),
        }
    }

    /// Verifies the snapshot still permits this step before it is
    /// (re)dispatched.
    pub fn check_in_progress(&self, region: &RegionInfo) -> Result<()> {
        match self {
            OpStep::TransferLeader(step) => step.check_in_progress(region),
            OpStep::AddPeer(step) => step.check_in_progress(region),
            OpStep::AddLearner(step) => step.check_in_progress(region),
            OpStep::PromoteLearner(step) => {
                expect_peer(region, step.to_store, step.peer_id).map(|_| ())
            }
            OpStep::DemoteVoter(step) => step.check_in_progress(region),
            OpStep::RemovePeer(step) => step.check_in_progress(region),
            OpStep::ChangePeerV2Enter(step) => step.check_in_progress(region),
            OpStep::ChangePeerV2Leave(step) => step.check_in_progress(region),
            OpStep::BecomeWitness(step) => step.check_in_progress(region),
            OpStep::BecomeNonWitness(step) => {
                expect_peer(region, step.store_id, step.peer_id).map(|_| ())
            }
        }
    }
}

impl fmt::Display for OpStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpStep::TransferLeader(step) => write!(
                f,
                "transfer leader from store {} to store {}",
                step.from_store, step.to_store
            ),
            OpStep::AddPeer(step) => {
                write!(f, "add peer {} on store {}", step.peer_id, step.to_store)
            }
            OpStep::AddLearner(step) if step.is_witness => write!(
                f,
                "add witness learner peer {} on store {}",
                step.peer_id, step.to_store
            ),
            OpStep::AddLearner(step) => write!(
                f,
                "add learner peer {} on store {}",
                step.peer_id, step.to_store
            ),
            OpStep::PromoteLearner(step) => fmt::Display::fmt(step, f),
            OpStep::DemoteVoter(step) => fmt::Display::fmt(step, f),
            OpStep::RemovePeer(step) => write!(f, "remove peer on store {}", step.from_store),
            OpStep::ChangePeerV2Enter(step) => {
                f.write_str("use joint consensus")?;
                write_role_changes(f, &step.promote_learners, &step.demote_voters)
            }
            OpStep::ChangePeerV2Leave(step) => {
                f.write_str("leave joint state")?;
                write_role_changes(f, &step.promote_learners, &step.demote_voters)
            }
            OpStep::BecomeWitness(step) => write!(
                f,
                "switch peer {} on store {} to witness",
                step.peer_id, step.store_id
            ),
            OpStep::BecomeNonWitness(step) => write!(
                f,
                "switch peer {} on store {} to non-witness",
                step.peer_id, step.store_id
            ),
        }
    }
}

fn write_role_changes(
    f: &mut fmt::Formatter<'_>,
    promotions: &[PromoteLearner],
    demotions: &[DemoteVoter],
) -> fmt::Result {
    for promotion in promotions {
        write!(f, ", {promotion}")?;
    }
    for demotion in demotions {
        write!(f, ", {demotion}")?;
    }
    Ok(())
}

fn region_size(region: &RegionInfo) -> i64 {
    i64::try_from(region.approximate_size).unwrap_or(i64::MAX)
}

fn warn_unexpected_peer(region: &RegionInfo, store: StoreId, expected: PeerId, found: PeerId) {
    warn!(
        region_id = %region.id,
        store_id = %store,
        expected_peer = %expected,
        found_peer = %found,
        "obtain unexpected peer"
    );
}

/// The peer on `store`, which must carry the `expected` id.
fn expect_peer(region: &RegionInfo, store: StoreId, expected: PeerId) -> Result<&Peer> {
    let peer = region
        .store_peer(store)
        .ok_or(OperatorError::PeerNotFound { store })?;
    if peer.id != expected {
        return Err(OperatorError::PeerMismatch {
            store,
            expected,
            found: peer.id,
        });
    }
    Ok(peer)
}

fn unexpected_role(peer: &Peer, expected: &'static str) -> OperatorError {
    OperatorError::UnexpectedRole {
        store: peer.store_id,
        peer: peer.id,
        actual: peer.role,
        expected,
    }
}

impl TransferLeader {
    fn is_finish(&self, region: &RegionInfo) -> bool {
        region.leader_store_id() == Some(self.to_store)
    }

    fn influence(&self, influence: &mut OpInfluence, region: &RegionInfo) {
        let size = region_size(region);
        let from = influence.store_mut(self.from_store);
        from.leader_size -= size;
        from.leader_count -= 1;
        let to = influence.store_mut(self.to_store);
        to.leader_size += size;
        to.leader_count += 1;
    }

    fn check_in_progress(&self, region: &RegionInfo) -> Result<()> {
        let peer = region
            .store_peer(self.to_store)
            .ok_or(OperatorError::PeerNotFound { store: self.to_store })?;
        if !peer.role.is_voter_like() {
            return Err(unexpected_role(peer, "voter"));
        }
        if peer.is_witness {
            return Err(OperatorError::WitnessLeader(self.to_store));
        }
        Ok(())
    }
}

impl AddPeer {
    fn is_finish(&self, region: &RegionInfo) -> bool {
        match region.store_voter(self.to_store) {
            Some(peer) if peer.id != self.peer_id => {
                warn_unexpected_peer(region, self.to_store, self.peer_id, peer.id);
                false
            }
            Some(peer) => region.pending_peer(peer.id).is_none(),
            None => false,
        }
    }

    fn conf_ver_changed(&self, region: &RegionInfo) -> u64 {
        u64::from(
            region
                .store_voter(self.to_store)
                .is_some_and(|peer| peer.id == self.peer_id),
        )
    }

    fn influence(&self, influence: &mut OpInfluence, region: &RegionInfo) {
        let size = region_size(region);
        let to = influence.store_mut(self.to_store);
        to.region_size += size;
        to.region_count += 1;
        if self.is_lightweight {
            return;
        }
        to.adjust_step_cost(StoreLimitType::AddPeer, size);
    }

    fn check_in_progress(&self, region: &RegionInfo) -> Result<()> {
        match region.store_peer(self.to_store) {
            Some(peer) if peer.id != self.peer_id => Err(OperatorError::PeerMismatch {
                store: self.to_store,
                expected: self.peer_id,
                found: peer.id,
            }),
            _ => Ok(()),
        }
    }
}

impl AddLearner {
    fn is_finish(&self, region: &RegionInfo) -> bool {
        match region.store_learner(self.to_store) {
            Some(peer) if peer.id != self.peer_id => {
                warn_unexpected_peer(region, self.to_store, self.peer_id, peer.id);
                false
            }
            Some(peer) => region.pending_peer(peer.id).is_none(),
            None => false,
        }
    }

    fn conf_ver_changed(&self, region: &RegionInfo) -> u64 {
        u64::from(
            region
                .store_learner(self.to_store)
                .is_some_and(|peer| peer.id == self.peer_id),
        )
    }

    fn influence(&self, influence: &mut OpInfluence, region: &RegionInfo) {
        let size = region_size(region);
        let to = influence.store_mut(self.to_store);
        if self.is_witness {
            to.witness_count += 1;
        } else {
            to.region_size += size;
        }
        to.region_count += 1;
        if self.is_lightweight || self.is_witness {
            return;
        }
        to.adjust_step_cost(StoreLimitType::AddPeer, size);
    }

    fn check_in_progress(&self, region: &RegionInfo) -> Result<()> {
        let Some(peer) = region.store_peer(self.to_store) else {
            return Ok(());
        };
        if peer.id != self.peer_id {
            return Err(OperatorError::PeerMismatch {
                store: self.to_store,
                expected: self.peer_id,
                found: peer.id,
            });
        }
        if peer.role.is_voter_like() {
            return Err(unexpected_role(peer, "learner"));
        }
        Ok(())
    }
}

impl PromoteLearner {
    fn is_finish(&self, region: &RegionInfo) -> bool {
        match region.store_voter(self.to_store) {
            Some(peer) if peer.id != self.peer_id => {
                warn_unexpected_peer(region, self.to_store, self.peer_id, peer.id);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn conf_ver_changed(&self, region: &RegionInfo) -> u64 {
        u64::from(
            region
                .store_voter(self.to_store)
                .is_some_and(|peer| peer.id == self.peer_id),
        )
    }
}

impl fmt::Display for PromoteLearner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "promote learner peer {} on store {} to voter",
            self.peer_id, self.to_store
        )
    }
}

impl DemoteVoter {
    fn is_finish(&self, region: &RegionInfo) -> bool {
        match region.store_learner(self.to_store) {
            Some(peer) if peer.id != self.peer_id => {
                warn_unexpected_peer(region, self.to_store, self.peer_id, peer.id);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn conf_ver_changed(&self, region: &RegionInfo) -> u64 {
        u64::from(
            region
                .store_learner(self.to_store)
                .is_some_and(|peer| peer.id == self.peer_id),
        )
    }

    fn check_in_progress(&self, region: &RegionInfo) -> Result<()> {
        expect_peer(region, self.to_store, self.peer_id)?;
        if region.leader_store_id() == Some(self.to_store) {
            return Err(OperatorError::LeaderPeer(self.to_store));
        }
        Ok(())
    }
}

impl fmt::Display for DemoteVoter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "demote voter peer {} on store {} to learner",
            self.peer_id, self.to_store
        )
    }
}

impl RemovePeer {
    fn is_finish(&self, region: &RegionInfo) -> bool {
        region.store_peer(self.from_store).is_none()
    }

    fn conf_ver_changed(&self, region: &RegionInfo) -> u64 {
        match region.store_peer(self.from_store) {
            None => 1,
            // A different peer on the store means ours was removed and
            // another one added since.
            Some(peer) => u64::from(self.peer_id.is_some_and(|id| id != peer.id)),
        }
    }

    fn influence(&self, influence: &mut OpInfluence, region: &RegionInfo) {
        let mut size = region_size(region);
        let from = influence.store_mut(self.from_store);
        from.region_size -= size;
        from.region_count -= 1;
        if self.is_down_store && size > SMALL_REGION_THRESHOLD {
            size = SMALL_REGION_THRESHOLD;
        }
        from.adjust_step_cost(StoreLimitType::RemovePeer, size);
    }

    fn check_in_progress(&self, region: &RegionInfo) -> Result<()> {
        if region.leader_store_id() == Some(self.from_store) {
            return Err(OperatorError::LeaderPeer(self.from_store));
        }
        Ok(())
    }
}

impl ChangePeerV2Enter {
    fn entered(&self, region: &RegionInfo) -> bool {
        let promoted = self.promote_learners.iter().all(|pl| {
            region.store_voter(pl.to_store).is_some_and(|peer| {
                peer.id == pl.peer_id
                    && matches!(peer.role, PeerRole::Voter | PeerRole::IncomingVoter)
            })
        });
        let demoted = self.demote_voters.iter().all(|dv| {
            region.store_peer(dv.to_store).is_some_and(|peer| {
                peer.id == dv.peer_id
                    && matches!(peer.role, PeerRole::Learner | PeerRole::DemotingVoter)
            })
        });
        promoted && demoted
    }

    fn is_finish(&self, region: &RegionInfo) -> bool {
        self.entered(region)
    }

    fn conf_ver_changed(&self, region: &RegionInfo) -> u64 {
        if self.entered(region) {
            (self.promote_learners.len() + self.demote_voters.len()) as u64
        } else {
            0
        }
    }

    fn check_in_progress(&self, region: &RegionInfo) -> Result<()> {
        for pl in &self.promote_learners {
            expect_peer(region, pl.to_store, pl.peer_id)?;
        }
        for dv in &self.demote_voters {
            let peer = expect_peer(region, dv.to_store, dv.peer_id)?;
            if peer.role == PeerRole::Voter && region.leader_store_id() == Some(dv.to_store) {
                return Err(OperatorError::LeaderPeer(dv.to_store));
            }
        }
        Ok(())
    }
}

impl ChangePeerV2Leave {
    fn applied(&self, region: &RegionInfo) -> bool {
        let promoted = self.promote_learners.iter().all(|pl| {
            region
                .store_voter(pl.to_store)
                .is_some_and(|peer| peer.id == pl.peer_id && peer.role == PeerRole::Voter)
        });
        let demoted = self.demote_voters.iter().all(|dv| {
            region
                .store_peer(dv.to_store)
                .is_some_and(|peer| peer.id == dv.peer_id && peer.role == PeerRole::Learner)
        });
        promoted && demoted
    }

    fn is_finish(&self, region: &RegionInfo) -> bool {
        if !self.applied(region) {
            return false;
        }
        if region.is_in_joint_state() {
            warn!(region_id = %region.id, "region is still in the joint state");
            return false;
        }
        true
    }

    fn conf_ver_changed(&self, region: &RegionInfo) -> u64 {
        if self.applied(region) {
            (self.promote_learners.len() + self.demote_voters.len()) as u64
        } else {
            0
        }
    }

    fn check_in_progress(&self, region: &RegionInfo) -> Result<()> {
        for pl in &self.promote_learners {
            let peer = expect_peer(region, pl.to_store, pl.peer_id)?;
            if !peer.role.is_voter_like() {
                return Err(unexpected_role(peer, "incoming voter"));
            }
        }
        for dv in &self.demote_voters {
            let peer = expect_peer(region, dv.to_store, dv.peer_id)?;
            if !matches!(peer.role, PeerRole::DemotingVoter | PeerRole::Learner) {
                return Err(unexpected_role(peer, "demoting voter"));
            }
            if region.leader_store_id() == Some(dv.to_store) {
                return Err(OperatorError::LeaderPeer(dv.to_store));
            }
        }
        Ok(())
    }
}

impl BecomeWitness {
    fn is_finish(&self, region: &RegionInfo) -> bool {
        region
            .store_peer(self.store_id)
            .is_some_and(|peer| peer.id == self.peer_id && peer.is_witness)
    }

    fn conf_ver_changed(&self, region: &RegionInfo) -> u64 {
        u64::from(self.is_finish(region))
    }

    fn influence(&self, influence: &mut OpInfluence, region: &RegionInfo) {
        let size = region_size(region);
        let store = influence.store_mut(self.store_id);
        store.witness_count += 1;
        store.region_size -= size;
        store.adjust_step_cost(StoreLimitType::RemovePeer, size);
    }

    fn check_in_progress(&self, region: &RegionInfo) -> Result<()> {
        expect_peer(region, self.store_id, self.peer_id)?;
        if region.leader_store_id() == Some(self.store_id) {
            return Err(OperatorError::WitnessLeader(self.store_id));
        }
        Ok(())
    }
}

impl BecomeNonWitness {
    fn is_finish(&self, region: &RegionInfo) -> bool {
        region.store_peer(self.store_id).is_some_and(|peer| {
            peer.id == self.peer_id && !peer.is_witness && region.pending_peer(peer.id).is_none()
        })
    }

    fn conf_ver_changed(&self, region: &RegionInfo) -> u64 {
        u64::from(
            region
                .store_peer(self.store_id)
                .is_some_and(|peer| peer.id == self.peer_id && !peer.is_witness),
        )
    }

    fn influence(&self, influence: &mut OpInfluence, region: &RegionInfo) {
        let size = region_size(region);
        let store = influence.store_mut(self.store_id);
        store.witness_count -= 1;
        store.region_size += size;
        store.adjust_step_cost(StoreLimitType::AddPeer, size);
    }
}

#[cfg(test)]
mod tests {
    use placement_model::{Peer, RegionEpoch};

    use super::*;
    use crate::operator::influence::REGION_INFLUENCE;

    fn region(peers: Vec<Peer>, leader: u64) -> RegionInfo {
        RegionInfo::new(1, RegionEpoch::new(1, 1), peers)
            .with_leader(leader)
            .with_approximate_size(96)
    }

    fn add_peer(store: u64, peer: u64) -> OpStep {
        AddPeer {
            to_store: StoreId(store),
            peer_id: PeerId(peer),
            is_lightweight: false,
        }
        .into()
    }

    #[test]
    fn transfer_leader_finishes_when_target_leads() {
        let step: OpStep = TransferLeader {
            from_store: StoreId(1),
            to_store: StoreId(2),
        }
        .into();
        let peers = vec![Peer::voter(1, 1), Peer::voter(2, 2)];
        assert!(!step.is_finish(&region(peers.clone(), 1)));
        assert!(step.is_finish(&region(peers.clone(), 2)));
        assert_eq!(step.conf_ver_changed(&region(peers, 2)), 0);
    }

    #[test]
    fn transfer_leader_moves_leader_load() {
        let step: OpStep = TransferLeader {
            from_store: StoreId(1),
            to_store: StoreId(2),
        }
        .into();
        let snapshot = region(vec![Peer::voter(1, 1), Peer::voter(2, 2)], 1);
        let mut influence = OpInfluence::new();
        step.influence(&mut influence, &snapshot);
        let from = influence.store(StoreId(1)).unwrap();
        let to = influence.store(StoreId(2)).unwrap();
        assert_eq!((from.leader_count, from.leader_size), (-1, -96));
        assert_eq!((to.leader_count, to.leader_size), (1, 96));
    }

    #[test]
    fn add_peer_waits_for_pending_peer() {
        let step = add_peer(3, 30);
        let without = region(vec![Peer::voter(1, 1)], 1);
        assert!(!step.is_finish(&without));
        assert_eq!(step.conf_ver_changed(&without), 0);

        let pending = region(vec![Peer::voter(1, 1), Peer::voter(30, 3)], 1)
            .with_pending(&[PeerId(30)]);
        assert!(!step.is_finish(&pending));
        assert_eq!(step.conf_ver_changed(&pending), 1);

        let caught_up = region(vec![Peer::voter(1, 1), Peer::voter(30, 3)], 1);
        assert!(step.is_finish(&caught_up));
    }

    #[test]
    fn add_peer_rejects_foreign_peer_on_store() {
        let step = add_peer(3, 30);
        let snapshot = region(vec![Peer::voter(1, 1), Peer::voter(31, 3)], 1);
        assert!(!step.is_finish(&snapshot));
        assert_eq!(
            step.check_in_progress(&snapshot),
            Err(OperatorError::PeerMismatch {
                store: StoreId(3),
                expected: PeerId(30),
                found: PeerId(31),
            })
        );
    }

    #[test]
    fn add_peer_influence_honours_lightweight() {
        let snapshot = region(vec![Peer::voter(1, 1)], 1);
        let mut influence = OpInfluence::new();
        add_peer(3, 30).influence(&mut influence, &snapshot);
        let store = influence.store(StoreId(3)).unwrap();
        assert_eq!((store.region_count, store.region_size), (1, 96));
        assert_eq!(store.step_cost(StoreLimitType::AddPeer), REGION_INFLUENCE);

        let light: OpStep = AddPeer {
            to_store: StoreId(4),
            peer_id: PeerId(40),
            is_lightweight: true,
        }
        .into();
        light.influence(&mut influence, &snapshot);
        assert_eq!(influence.store(StoreId(4)).unwrap().step_cost(StoreLimitType::AddPeer), 0);
    }

    #[test]
    fn witness_learner_counts_witness_not_size() {
        let step: OpStep = AddLearner {
            to_store: StoreId(3),
            peer_id: PeerId(30),
            is_witness: true,
            is_lightweight: false,
        }
        .into();
        let snapshot = region(vec![Peer::voter(1, 1)], 1);
        let mut influence = OpInfluence::new();
        step.influence(&mut influence, &snapshot);
        let store = influence.store(StoreId(3)).unwrap();
        assert_eq!(store.witness_count, 1);
        assert_eq!(store.region_size, 0);
        assert_eq!(store.region_count, 1);
        assert!(store.step_cost.is_empty());
        assert_eq!(
            step.timeout(&StepCostModel::default(), 96),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn learner_roles_drive_promote_and_demote() {
        let promote: OpStep = PromoteLearner {
            to_store: StoreId(2),
            peer_id: PeerId(2),
            is_witness: false,
        }
        .into();
        let demote: OpStep = DemoteVoter {
            to_store: StoreId(2),
            peer_id: PeerId(2),
            is_witness: false,
        }
        .into();
        let as_learner = region(vec![Peer::voter(1, 1), Peer::learner(2, 2)], 1);
        let as_voter = region(vec![Peer::voter(1, 1), Peer::voter(2, 2)], 1);

        assert!(!promote.is_finish(&as_learner));
        assert!(promote.is_finish(&as_voter));
        assert!(demote.is_finish(&as_learner));
        assert!(!demote.is_finish(&as_voter));
        assert_eq!(promote.conf_ver_changed(&as_voter), 1);
        assert_eq!(demote.conf_ver_changed(&as_voter), 0);
    }

    #[test]
    fn remove_peer_counts_conf_ver_when_gone_or_replaced() {
        let step: OpStep = RemovePeer {
            from_store: StoreId(2),
            peer_id: Some(PeerId(2)),
            is_down_store: false,
        }
        .into();
        let present = region(vec![Peer::voter(1, 1), Peer::voter(2, 2)], 1);
        let gone = region(vec![Peer::voter(1, 1)], 1);
        let replaced = region(vec![Peer::voter(1, 1), Peer::voter(22, 2)], 1);

        assert!(!step.is_finish(&present));
        assert!(step.is_finish(&gone));
        assert_eq!(step.conf_ver_changed(&present), 0);
        assert_eq!(step.conf_ver_changed(&gone), 1);
        assert_eq!(step.conf_ver_changed(&replaced), 1);
    }

    #[test]
    fn remove_from_down_store_is_charged_as_small_region() {
        let step: OpStep = RemovePeer {
            from_store: StoreId(2),
            peer_id: None,
            is_down_store: true,
        }
        .into();
        let snapshot = region(vec![Peer::voter(1, 1), Peer::voter(2, 2)], 1);
        let mut influence = OpInfluence::new();
        step.influence(&mut influence, &snapshot);
        let store = influence.store(StoreId(2)).unwrap();
        assert_eq!((store.region_count, store.region_size), (-1, -96));
        assert_eq!(
            store.step_cost(StoreLimitType::RemovePeer),
            crate::operator::influence::SMALL_REGION_INFLUENCE
        );
    }

    #[test]
    fn remove_leader_is_refused() {
        let step: OpStep = RemovePeer {
            from_store: StoreId(1),
            peer_id: None,
            is_down_store: false,
        }
        .into();
        let snapshot = region(vec![Peer::voter(1, 1), Peer::voter(2, 2)], 1);
        assert_eq!(
            step.check_in_progress(&snapshot),
            Err(OperatorError::LeaderPeer(StoreId(1)))
        );
    }

    #[test]
    fn joint_consensus_enter_and_leave() {
        let changes = (
            vec![PromoteLearner {
                to_store: StoreId(3),
                peer_id: PeerId(3),
                is_witness: false,
            }],
            vec![DemoteVoter {
                to_store: StoreId(2),
                peer_id: PeerId(2),
                is_witness: false,
            }],
        );
        let enter: OpStep = ChangePeerV2Enter {
            promote_learners: changes.0.clone(),
            demote_voters: changes.1.clone(),
        }
        .into();
        let leave: OpStep = ChangePeerV2Leave {
            promote_learners: changes.0,
            demote_voters: changes.1,
        }
        .into();

        let before = region(
            vec![Peer::voter(1, 1), Peer::voter(2, 2), Peer::learner(3, 3)],
            1,
        );
        let joint = region(
            vec![
                Peer::voter(1, 1),
                Peer::voter(2, 2).with_role(PeerRole::DemotingVoter),
                Peer::voter(3, 3).with_role(PeerRole::IncomingVoter),
            ],
            1,
        );
        let after = region(
            vec![Peer::voter(1, 1), Peer::learner(2, 2), Peer::voter(3, 3)],
            1,
        );

        assert!(!enter.is_finish(&before));
        assert!(enter.is_finish(&joint));
        assert!(enter.is_finish(&after));
        assert_eq!(enter.conf_ver_changed(&joint), 2);
        assert_eq!(enter.conf_ver_changed(&before), 0);

        assert!(!leave.is_finish(&joint));
        assert!(leave.is_finish(&after));
        assert_eq!(leave.conf_ver_changed(&joint), 0);
        assert_eq!(leave.conf_ver_changed(&after), 2);
        assert!(leave.check_in_progress(&joint).is_ok());
        assert!(matches!(
            leave.check_in_progress(&before),
            Err(OperatorError::UnexpectedRole { .. })
        ));
    }

    #[test]
    fn empty_leave_only_waits_for_joint_state_to_clear() {
        let leave = OpStep::ChangePeerV2Leave(ChangePeerV2Leave::default());
        let joint = region(
            vec![Peer::voter(1, 1), Peer::voter(2, 2).with_role(PeerRole::IncomingVoter)],
            1,
        );
        assert!(!leave.is_finish(&joint));
        assert!(leave.is_finish(&region(vec![Peer::voter(1, 1)], 1)));
    }

    #[test]
    fn witness_switches() {
        let become_witness: OpStep = BecomeWitness {
            store_id: StoreId(2),
            peer_id: PeerId(2),
        }
        .into();
        let become_full: OpStep = BecomeNonWitness {
            store_id: StoreId(2),
            peer_id: PeerId(2),
        }
        .into();
        let full = region(vec![Peer::voter(1, 1), Peer::voter(2, 2)], 1);
        let witness = region(vec![Peer::voter(1, 1), Peer::voter(2, 2).witness()], 1);

        assert!(become_witness.is_finish(&witness));
        assert!(!become_witness.is_finish(&full));
        assert!(become_full.is_finish(&full));
        assert!(!become_full.is_finish(&full.clone().with_pending(&[PeerId(2)])));

        let mut influence = OpInfluence::new();
        become_full.influence(&mut influence, &full);
        let store = influence.store(StoreId(2)).unwrap();
        assert_eq!((store.witness_count, store.region_size), (-1, 96));

        let cost = StepCostModel::default();
        assert_eq!(become_full.timeout(&cost, 0), cost.slow_step_duration(0));
        assert_eq!(become_witness.timeout(&cost, 96), cost.fast_step_duration());
    }

    #[test]
    fn data_copy_steps_scale_with_size() {
        let cost = StepCostModel::default();
        let add = add_peer(3, 30);
        let transfer: OpStep = TransferLeader {
            from_store: StoreId(1),
            to_store: StoreId(2),
        }
        .into();
        assert!(add.timeout(&cost, 1000) > add.timeout(&cost, 10));
        assert_eq!(transfer.timeout(&cost, 1000), transfer.timeout(&cost, 10));
    }

    #[test]
    fn transfer_to_learner_or_witness_is_refused() {
        let step: OpStep = TransferLeader {
            from_store: StoreId(1),
            to_store: StoreId(2),
        }
        .into();
        let learner = region(vec![Peer::voter(1, 1), Peer::learner(2, 2)], 1);
        let witness = region(vec![Peer::voter(1, 1), Peer::voter(2, 2).witness()], 1);
        let missing = region(vec![Peer::voter(1, 1)], 1);
        assert!(matches!(
            step.check_in_progress(&learner),
            Err(OperatorError::UnexpectedRole { .. })
        ));
        assert_eq!(
            step.check_in_progress(&witness),
            Err(OperatorError::WitnessLeader(StoreId(2)))
        );
        assert_eq!(
            step.check_in_progress(&missing),
            Err(OperatorError::PeerNotFound { store: StoreId(2) })
        );
    }

    #[test]
    fn descriptions_are_human_readable() {
        let leave: OpStep = ChangePeerV2Leave {
            promote_learners: vec![PromoteLearner {
                to_store: StoreId(3),
                peer_id: PeerId(3),
                is_witness: false,
            }],
            demote_voters: vec![],
        }
        .into();
        assert_eq!(
            leave.to_string(),
            "leave joint state, promote learner peer 3 on store 3 to voter"
        );
        assert_eq!(add_peer(5, 5).to_string(), "add peer 5 on store 5");
        assert_eq!(add_peer(5, 5).name(), "add_peer");
    }
}
