use crate::conflict::ConflictIndex;
use crate::constraints::{HardViolation, check_static};
use crate::data::{
    Diagnostics, InstructorLoad, Placement, ReasonCode, ScheduleResponse, StopReason, Unplaced,
};
use crate::problem::{Candidate, Problem, Resource};
use crate::solver::SearchOutcome;
use itertools::{Itertools, MinMaxResult};
use log::debug;

/// Added to the score for every section left unplaced.
pub const UNPLACED_SECTION_PENALTY: u64 = 1_000;

pub fn build_response(problem: &Problem, outcome: &SearchOutcome) -> ScheduleResponse {
    let mut index = ConflictIndex::new(problem);
    for (s, candidate) in placed(outcome) {
        if let Some(span) = problem.section_span(s, candidate.start) {
            index.occupy(Resource::Room(candidate.room), span.clone());
            index.occupy(Resource::Instructor(problem.sections[s].instructor), span);
        }
    }

    let assignment = placed(outcome)
        .map(|(s, c)| {
            (
                problem.sections[s].id,
                Placement {
                    room_id: problem.rooms[c.room].id,
                    slot_id: problem.slots[c.start].id,
                },
            )
        })
        .collect();

    let unplaced: Vec<Unplaced> = outcome
        .assignment
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_none())
        .map(|(s, _)| Unplaced {
            section_id: problem.sections[s].id,
            reason_code: classify(problem, &index, s),
        })
        .collect();

    let score = outcome
        .soft
        .total
        .saturating_add(UNPLACED_SECTION_PENALTY.saturating_mul(unplaced.len() as u64));
    let complete = unplaced.is_empty();
    debug_assert_eq!(
        complete,
        outcome.stop_reason == StopReason::Complete,
        "stop reason disagrees with the assignment"
    );

    let instructor_load = instructor_load(problem, outcome);
    let load_difference = match instructor_load.iter().map(|l| l.slots_assigned).minmax() {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(_) => Some(0),
        MinMaxResult::MinMax(min, max) => Some(max - min),
    };

    ScheduleResponse {
        assignment,
        unplaced,
        penalties: outcome.soft.penalties.clone(),
        score,
        complete,
        diagnostics: Diagnostics {
            total_sections: problem.sections.len() as u32,
            placed_count: outcome.placed as u32,
            stop_reason: outcome.stop_reason,
            steps: outcome.steps,
            instructor_load,
            load_difference,
        },
    }
}

fn placed(outcome: &SearchOutcome) -> impl Iterator<Item = (usize, Candidate)> + '_ {
    outcome
        .assignment
        .iter()
        .enumerate()
        .filter_map(|(s, c)| c.map(|c| (s, c)))
}

/// Why `section` has no placement under the occupancy in `index`.
///
/// Takes the violation that got furthest through the hard checks over
/// every room and start slot. Room and instructor occupancy are checked
/// independently, so a busy instructor outranks a booked room.
pub fn classify(problem: &Problem, index: &ConflictIndex, section: usize) -> ReasonCode {
    let instructor = Resource::Instructor(problem.sections[section].instructor);
    let mut furthest: Option<HardViolation> = None;
    for (room, start) in (0..problem.rooms.len()).cartesian_product(0..problem.slots.len()) {
        let violation = match check_static(problem, section, Candidate { room, start }) {
            Err(violation) => violation,
            Ok(span) if !index.is_free(instructor, span.clone()) => HardViolation::InstructorBooked,
            Ok(span) if !index.is_free(Resource::Room(room), span.clone()) => HardViolation::RoomBooked,
            Ok(_) => {
                debug!(
                    "Section {} is unplaced but fits room index {} at slot index {}",
                    problem.sections[section].id, room, start
                );
                continue;
            }
        };
        furthest = furthest.max(Some(violation));
    }
    furthest.map_or(ReasonCode::NoCapabilityMatch, HardViolation::reason)
}

fn instructor_load(problem: &Problem, outcome: &SearchOutcome) -> Vec<InstructorLoad> {
    let mut loads: Vec<InstructorLoad> = problem
        .instructors
        .iter()
        .map(|ins| InstructorLoad {
            instructor_id: ins.id,
            sections_assigned: 0,
            slots_assigned: 0,
            minutes_assigned: 0,
        })
        .collect();

    for (s, candidate) in placed(outcome) {
        let spec = &problem.sections[s];
        let Some(span) = problem.section_span(s, candidate.start) else {
            continue;
        };
        let load = &mut loads[spec.instructor];
        load.sections_assigned += 1;
        load.slots_assigned += span.len() as u32;
        load.minutes_assigned += span.map(|i| problem.slots[i].minutes).sum::<u32>();
    }
    loads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::SoftScore;
    use crate::data::{Instructor, Penalty, Room, ScheduleRequest, Section, TimeSlot};

    fn problem() -> Problem {
        let request = ScheduleRequest {
            sections: vec![
                Section::new(1, 1, 7, 30).with_duration(2),
                Section::new(2, 2, 7, 30),
                Section::new(3, 3, 8, 30),
                Section::new(4, 4, 8, 90),
                Section::new(5, 5, 8, 10).with_capability("lab"),
            ],
            rooms: vec![Room::new(10, 30), Room::new(20, 30)],
            time_slots: (1..=3).map(|p| TimeSlot::new(p, 1, p)).collect(),
            instructors: vec![Instructor::new(7), Instructor::new(8), Instructor::new(9)],
            ..Default::default()
        };
        Problem::build(&request).unwrap()
    }

    fn outcome(assignment: Vec<Option<Candidate>>) -> SearchOutcome {
        let placed = assignment.iter().flatten().count();
        SearchOutcome {
            assignment,
            placed,
            soft: SoftScore {
                penalties: vec![Penalty {
                    constraint_id: 4,
                    penalty: 3,
                }],
                total: 3,
            },
            stop_reason: StopReason::Exhausted,
            steps: 17,
        }
    }

    #[test]
    fn test_response_shape() {
        let problem = problem();
        // Instructor 7 fills room 10 all day; section 3 takes room 20 period 1.
        let outcome = outcome(vec![
            Some(Candidate { room: 0, start: 0 }),
            Some(Candidate { room: 0, start: 2 }),
            Some(Candidate { room: 1, start: 0 }),
            None,
            None,
        ]);
        let response = build_response(&problem, &outcome);

        assert_eq!(response.assignment.len(), 3);
        assert_eq!(
            response.assignment[&2],
            Placement {
                room_id: 10,
                slot_id: 3
            }
        );
        assert!(!response.complete);
        assert_eq!(response.score, 3 + 2 * UNPLACED_SECTION_PENALTY);
        assert_eq!(response.penalties.len(), 1);

        let reasons: Vec<_> = response
            .unplaced
            .iter()
            .map(|u| (u.section_id, u.reason_code))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (4, ReasonCode::InsufficientCapacity),
                (5, ReasonCode::NoCapabilityMatch)
            ]
        );

        let diagnostics = &response.diagnostics;
        assert_eq!(diagnostics.total_sections, 5);
        assert_eq!(diagnostics.placed_count, 3);
        assert_eq!(diagnostics.steps, 17);
        assert_eq!(
            diagnostics.instructor_load[0],
            InstructorLoad {
                instructor_id: 7,
                sections_assigned: 2,
                slots_assigned: 3,
                minutes_assigned: 180
            }
        );
        assert_eq!(diagnostics.instructor_load[2].slots_assigned, 0);
        assert_eq!(diagnostics.load_difference, Some(3));
    }

    #[test]
    fn test_classify_prefers_furthest_violation() {
        let problem = problem();
        let mut index = ConflictIndex::new(&problem);
        // Room 10 and instructor 8 are busy all day. Room 20 is free, so
        // section 3 gets as far as the instructor check.
        index.occupy(Resource::Room(0), 0..3);
        index.occupy(Resource::Instructor(1), 0..3);
        assert_eq!(classify(&problem, &index, 2), ReasonCode::InstructorConflict);

        index.release(Resource::Instructor(1), 0..3);
        index.occupy(Resource::Room(1), 0..3);
        assert_eq!(classify(&problem, &index, 2), ReasonCode::NoFreeSlot);
    }

    #[test]
    fn test_busy_instructor_outranks_booked_room() {
        let problem = problem();
        let mut index = ConflictIndex::new(&problem);
        // Both rooms and instructor 8 are busy all day.
        index.occupy(Resource::Room(0), 0..3);
        index.occupy(Resource::Room(1), 0..3);
        index.occupy(Resource::Instructor(1), 0..3);
        assert_eq!(classify(&problem, &index, 2), ReasonCode::InstructorConflict);
    }
}
