//! Update-record conflict resolution (§4.1.2): the pure merge step run on
//! every received piggybacked record, independent of how it arrived
//! (PING reply, IREQ relay, or a future transport).

use cluster_types::{EventKind, EventSource, Hlc, HlcClock, MemberStatus, MembershipEvent, MembershipList, Rank, UpdateRecord};

/// Outcome of merging one received record into local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// An externally-visible event to emit, if the merge produced an
    /// `Alive`/`Dead` transition (`Suspect` is internal, §4.1.2).
    pub event: Option<MembershipEvent>,
    /// If the incoming record would have marked self `Suspect`/`Dead`,
    /// this carries the bumped incarnation self must re-advertise as
    /// `Alive` (§4.1.2).
    pub self_reincarnation: Option<u64>,
}

const NO_EVENT: MergeOutcome = MergeOutcome {
    event: None,
    self_reincarnation: None,
};

/// Merges one received `UpdateRecord` into `list`, per §4.1.2:
///
/// - Unknown `id` is ignored (membership is fixed per pool-map epoch;
///   additions are driven externally, not by gossip).
/// - Otherwise `(status, incarnation)` is compared against local state:
///   a strictly higher incarnation always wins; at equal incarnation,
///   `Dead` dominates `Suspect` dominates `Alive`.
/// - A record that would mark `self_id` `Suspect`/`Dead` instead bumps
///   self's incarnation to `clock.now()` and is reported back to the
///   caller so it can enqueue a fresh `Alive` advertisement; self's own
///   record is never downgraded to `Suspect`/`Dead` (§3 invariant).
pub fn merge_update_record(
    list: &mut MembershipList,
    self_id: Rank,
    record: UpdateRecord,
    clock: &HlcClock,
) -> MergeOutcome {
    if record.id == self_id {
        if matches!(record.status, MemberStatus::Suspect | MemberStatus::Dead) {
            let bumped = clock.now().as_raw();
            if let Some(me) = list.get_mut(self_id) {
                if bumped > me.incarnation {
                    me.incarnation = bumped;
                    me.status = MemberStatus::Alive;
                }
            }
            return MergeOutcome {
                event: None,
                self_reincarnation: Some(bumped),
            };
        }
        // An Alive/Inactive report about self only matters if it carries
        // a fresher incarnation; either way it never produces an event
        // (self's own transitions aren't reported to self).
        if let Some(me) = list.get_mut(self_id) {
            me.merge_status(record.incarnation, record.status);
        }
        return NO_EVENT;
    }

    let Some(member) = list.get_mut(record.id) else {
        return NO_EVENT;
    };

    let changed = member.merge_status(record.incarnation, record.status);
    if !changed {
        return NO_EVENT;
    }

    let event = match member.status {
        MemberStatus::Alive => Some(MembershipEvent {
            rank: member.id,
            incarnation: member.incarnation,
            source: EventSource::Swim,
            kind: EventKind::Alive,
        }),
        MemberStatus::Dead => Some(MembershipEvent {
            rank: member.id,
            incarnation: member.incarnation,
            source: EventSource::Swim,
            kind: EventKind::Dead,
        }),
        MemberStatus::Suspect | MemberStatus::Inactive => None,
    };

    MergeOutcome {
        event,
        self_reincarnation: None,
    }
}

/// Updates the local delay estimate for `id` given a freshly observed
/// delay value, per §4.1.3: `sender`'s entry folds in the measured
/// receive delay (and the result is echoed back as the sender's own
/// observation); any other id's entry folds in the remote-reported value
/// carried in that id's piggybacked `UpdateRecord`. Both cases apply the
/// same EWMA fold; only the source of `observed` differs, which the
/// caller has already picked.
pub fn update_delay(list: &mut MembershipList, id: Rank, observed: u32) -> u32 {
    let Some(member) = list.get_mut(id) else {
        return 0;
    };
    member.delay_ms = crate::delay::ewma_update(member.delay_ms, observed);
    member.delay_ms
}

/// Marks every non-self member `Inactive`, suppressing eviction, for a
/// detected network outage (§4.1.3, operation `suspend_all`).
pub fn suspend_all(list: &mut MembershipList, self_id: Rank) {
    for member in list.iter().map(|m| m.id).collect::<Vec<_>>() {
        if member == self_id {
            continue;
        }
        if let Some(m) = list.get_mut(member) {
            m.status = MemberStatus::Inactive;
        }
    }
}

/// Applies the net-glitch forward shift (§4.1.3) to a suspicion deadline.
pub fn apply_net_glitch(deadline_hlc: Hlc, excess_ms: u64) -> Hlc {
    deadline_hlc.add_ms(excess_ms)
}
