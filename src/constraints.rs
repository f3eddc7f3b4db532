use crate::conflict::ConflictIndex;
use crate::data::Penalty;
use crate::data::ReasonCode;
use crate::problem::{Candidate, Problem, Resource, SoftTarget};
use itertools::{Itertools, MinMaxResult};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;

/// The hard rule a candidate placement breaks.
///
/// Variants are declared in check order, so `Ord` tells how far a
/// candidate got before it was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HardViolation {
    /// The room is not eligible or lacks a required capability tag.
    Capability,
    /// The room has fewer seats than the section needs.
    Capacity,
    /// The span leaves the day, the slot table, or the eligible slots.
    SlotSpan,
    /// The instructor is unavailable in a covered slot.
    InstructorUnavailable,
    /// Another section already holds the room in a covered slot.
    RoomBooked,
    /// The instructor already teaches in a covered slot.
    InstructorBooked,
}

impl HardViolation {
    pub fn reason(self) -> ReasonCode {
        match self {
            HardViolation::Capability => ReasonCode::NoCapabilityMatch,
            HardViolation::Capacity => ReasonCode::InsufficientCapacity,
            HardViolation::SlotSpan | HardViolation::RoomBooked => ReasonCode::NoFreeSlot,
            HardViolation::InstructorUnavailable | HardViolation::InstructorBooked => {
                ReasonCode::InstructorConflict
            }
        }
    }
}

impl fmt::Display for HardViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HardViolation::Capability => "room capability",
            HardViolation::Capacity => "room capacity",
            HardViolation::SlotSpan => "slot span",
            HardViolation::InstructorUnavailable => "instructor availability",
            HardViolation::RoomBooked => "room double booking",
            HardViolation::InstructorBooked => "instructor double booking",
        };
        f.write_str(text)
    }
}

/// Occupancy-independent hard checks. Returns the covered slot indices.
pub fn check_static(
    problem: &Problem,
    section: usize,
    candidate: Candidate,
) -> Result<Range<usize>, HardViolation> {
    let spec = &problem.sections[section];
    let room = &problem.rooms[candidate.room];

    if !spec.eligible_rooms[candidate.room] || !spec.capabilities.is_subset(&room.capabilities) {
        return Err(HardViolation::Capability);
    }
    if room.capacity < spec.demand {
        return Err(HardViolation::Capacity);
    }
    let span = problem
        .span(candidate.start, spec.duration)
        .ok_or(HardViolation::SlotSpan)?;
    if span.clone().any(|s| !spec.eligible_slots[s]) {
        return Err(HardViolation::SlotSpan);
    }
    let unavailable = &problem.instructors[spec.instructor].unavailable;
    if span.clone().any(|s| unavailable[s]) {
        return Err(HardViolation::InstructorUnavailable);
    }
    Ok(span)
}

/// Every hard check, fail-fast, against the current occupancy.
/// Returns the covered slot indices when the placement is allowed.
pub fn check_hard(
    problem: &Problem,
    index: &ConflictIndex,
    section: usize,
    candidate: Candidate,
) -> Result<Range<usize>, HardViolation> {
    let span = check_static(problem, section, candidate)?;
    if !index.is_free(Resource::Room(candidate.room), span.clone()) {
        return Err(HardViolation::RoomBooked);
    }
    let instructor = problem.sections[section].instructor;
    if !index.is_free(Resource::Instructor(instructor), span.clone()) {
        return Err(HardViolation::InstructorBooked);
    }
    Ok(span)
}

/// Soft penalties of an assignment, indexed by section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoftScore {
    /// Violated constraints only, in constraint input order.
    pub penalties: Vec<Penalty>,
    pub total: u64,
}

pub fn score_soft(problem: &Problem, assignment: &[Option<Candidate>]) -> SoftScore {
    let mut score = SoftScore::default();

    for constraint in &problem.soft {
        let units = match &constraint.target {
            SoftTarget::PreferredTimeWindow {
                section,
                days,
                from_period,
                to_period,
            } => match assignment[*section] {
                Some(c) => {
                    let slot = &problem.slots[c.start];
                    let wrong_day = days.as_ref().is_some_and(|d| !d.contains(&slot.day));
                    let outside = slot.period < *from_period || slot.period > *to_period;
                    u64::from(wrong_day || outside)
                }
                None => 0,
            },
            SoftTarget::MinimizeGaps { instructor } => {
                idle_periods(problem, assignment, *instructor)
            }
            SoftTarget::AvoidBackToBack { instructor } => {
                back_to_back_pairs(problem, assignment, *instructor)
            }
            SoftTarget::BalanceLoad => load_spread(problem, assignment),
            SoftTarget::EarlyStart => assignment
                .iter()
                .flatten()
                .map(|c| problem.day_position(c.start) as u64)
                .sum(),
            SoftTarget::CompactSchedule => (0..problem.instructors.len())
                .map(|i| idle_periods(problem, assignment, i))
                .sum(),
        };

        let penalty = units.saturating_mul(constraint.weight);
        if penalty > 0 {
            score.penalties.push(Penalty {
                constraint_id: constraint.id,
                penalty,
            });
            score.total = score.total.saturating_add(penalty);
        }
    }

    score
}

// placed spans of one instructor's sections
fn instructor_spans<'a>(
    problem: &'a Problem,
    assignment: &'a [Option<Candidate>],
    instructor: usize,
) -> impl Iterator<Item = Range<usize>> + 'a {
    assignment
        .iter()
        .enumerate()
        .filter(move |(s, _)| problem.sections[*s].instructor == instructor)
        .filter_map(move |(s, c)| c.and_then(|c| problem.section_span(s, c.start)))
}

fn idle_periods(problem: &Problem, assignment: &[Option<Candidate>], instructor: usize) -> u64 {
    let by_day = instructor_spans(problem, assignment, instructor)
        .flatten()
        .map(|i| (problem.slots[i].day, problem.slots[i].period))
        .into_group_map();

    by_day
        .values()
        .map(|periods| {
            let taught: BTreeSet<u32> = periods.iter().copied().collect();
            match (taught.first(), taught.last()) {
                (Some(&first), Some(&last)) => {
                    u64::from(last) - u64::from(first) + 1 - taught.len() as u64
                }
                _ => 0,
            }
        })
        .sum()
}

fn back_to_back_pairs(
    problem: &Problem,
    assignment: &[Option<Candidate>],
    instructor: usize,
) -> u64 {
    let spans: Vec<Range<usize>> = instructor_spans(problem, assignment, instructor).collect();
    let mut pairs = 0;
    for a in &spans {
        let last = &problem.slots[a.end - 1];
        for b in &spans {
            let first = &problem.slots[b.start];
            if last.day == first.day && first.period.checked_sub(1) == Some(last.period) {
                pairs += 1;
            }
        }
    }
    pairs
}

// slots taught, busiest instructor minus idlest
fn load_spread(problem: &Problem, assignment: &[Option<Candidate>]) -> u64 {
    let mut loads = vec![0u64; problem.instructors.len()];
    for (s, c) in assignment.iter().enumerate() {
        let span = c.and_then(|c| problem.section_span(s, c.start));
        if let Some(span) = span {
            loads[problem.sections[s].instructor] += span.len() as u64;
        }
    }
    match loads.iter().minmax() {
        MinMaxResult::MinMax(min, max) => max - min,
        _ => 0,
    }
}
