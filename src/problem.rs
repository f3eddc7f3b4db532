use crate::constraints::check_static;
use crate::data::{
    Constraint, ConstraintId, HardRule, InstructorId, ResourceRef, Room, RoomId, ScheduleRequest,
    SectionId, SlotId, SoftRule, TimeSlot,
};
use crate::error::{InputError, InputErrors};
use itertools::Itertools;
use log::{info, trace};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;

/// A (room, starting slot) pair, both as indices into [`Problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Candidate {
    pub room: usize,
    pub start: usize,
}

/// A section with every reference resolved and every hard record merged in.
#[derive(Debug, Clone)]
pub struct SectionSpec {
    pub id: SectionId,
    pub demand: u32,
    pub duration: usize,
    pub instructor: usize,
    pub capabilities: BTreeSet<String>,
    /// Indexed by room index.
    pub eligible_rooms: Vec<bool>,
    /// Indexed by slot index.
    pub eligible_slots: Vec<bool>,
    /// Placements that pass every occupancy-independent hard check, rooms
    /// ascending by id then slots ascending by position.
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone)]
pub struct InstructorSpec {
    pub id: InstructorId,
    /// Indexed by slot index.
    pub unavailable: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftTarget {
    PreferredTimeWindow {
        section: usize,
        days: Option<BTreeSet<u32>>,
        from_period: u32,
        to_period: u32,
    },
    MinimizeGaps {
        instructor: usize,
    },
    AvoidBackToBack {
        instructor: usize,
    },
    BalanceLoad,
    EarlyStart,
    CompactSchedule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftConstraint {
    pub id: ConstraintId,
    pub weight: u64,
    pub target: SoftTarget,
}

/// Occupancy-side resource, addressed by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Room(usize),
    Instructor(usize),
}

// rooms sorted by id, slots by (day, period, id); index order is candidate order
#[derive(Debug, Clone)]
pub struct Problem {
    pub sections: Vec<SectionSpec>,
    pub rooms: Vec<Room>,
    pub slots: Vec<TimeSlot>,
    pub instructors: Vec<InstructorSpec>,
    pub soft: Vec<SoftConstraint>,
    /// Resource/slot pairs taken before this request.
    pub occupied: Vec<(Resource, usize)>,
    /// `runs[i]`: how many contiguous same-day slots start at slot `i`.
    runs: Vec<usize>,
    day_positions: Vec<usize>,
}

impl Problem {
    /// Validates `request` and compiles it. Collects every problem found
    /// instead of stopping at the first one.
    pub fn build(request: &ScheduleRequest) -> Result<Self, InputErrors> {
        let mut errors = Vec::new();

        let room_ids = unique_ids(
            request.rooms.iter().map(|r| r.id),
            "rooms",
            "room",
            &mut errors,
        );
        let slot_ids = unique_ids(
            request.time_slots.iter().map(|s| s.id),
            "timeSlots",
            "slot",
            &mut errors,
        );
        let instructor_ids = unique_ids(
            request.instructors.iter().map(|i| i.id),
            "instructors",
            "instructor",
            &mut errors,
        );
        let section_ids = unique_ids(
            request.sections.iter().map(|s| s.id),
            "sections",
            "section",
            &mut errors,
        );
        unique_ids(
            request.constraints.iter().map(Constraint::id),
            "constraints",
            "constraint",
            &mut errors,
        );

        let mut positions = HashSet::new();
        for (i, slot) in request.time_slots.iter().enumerate() {
            if !positions.insert((slot.day, slot.period)) {
                errors.push(InputError::DuplicatePosition {
                    field: format!("timeSlots[{i}].period"),
                    slot_id: slot.id,
                    day: slot.day,
                    period: slot.period,
                });
            }
        }

        for (i, instructor) in request.instructors.iter().enumerate() {
            check_refs(
                &instructor.unavailable_slots,
                &slot_ids,
                || format!("instructors[{i}].unavailableSlots"),
                "slot",
                &mut errors,
            );
        }

        let mut slots = request.time_slots.clone();
        slots.sort_by_key(|s| (s.day, s.period, s.id));
        let runs = contiguous_runs(&slots);
        let longest_run = runs.iter().copied().max().unwrap_or(0);

        for (i, section) in request.sections.iter().enumerate() {
            if !instructor_ids.contains(&section.instructor_id) {
                errors.push(InputError::UnknownReference {
                    field: format!("sections[{i}].instructorId"),
                    entity: "instructor",
                    id: section.instructor_id,
                });
            }
            if let Some(rooms) = &section.eligible_rooms {
                check_refs(
                    rooms,
                    &room_ids,
                    || format!("sections[{i}].eligibleRooms"),
                    "room",
                    &mut errors,
                );
            }
            if let Some(eligible) = &section.eligible_slots {
                check_refs(
                    eligible,
                    &slot_ids,
                    || format!("sections[{i}].eligibleSlots"),
                    "slot",
                    &mut errors,
                );
            }
            if section.duration == 0 {
                errors.push(InputError::ZeroDuration {
                    field: format!("sections[{i}].duration"),
                    section_id: section.id,
                });
            } else if section.duration as usize > longest_run {
                errors.push(InputError::DurationExceedsDay {
                    field: format!("sections[{i}].duration"),
                    section_id: section.id,
                    duration: section.duration,
                    longest_run: longest_run as u32,
                });
            }
        }

        for (i, constraint) in request.constraints.iter().enumerate() {
            match constraint {
                Constraint::Hard { rule, .. } => match rule {
                    HardRule::RoomCapacity { section_id, .. }
                    | HardRule::RoomCapability { section_id, .. } => {
                        check_ref(
                            *section_id,
                            &section_ids,
                            || format!("constraints[{i}].rule.sectionId"),
                            "section",
                            &mut errors,
                        );
                    }
                    HardRule::NoDoubleBookingRoom | HardRule::NoDoubleBookingInstructor => {}
                    HardRule::InstructorAvailability {
                        instructor_id,
                        unavailable_slots,
                    } => {
                        check_ref(
                            *instructor_id,
                            &instructor_ids,
                            || format!("constraints[{i}].rule.instructorId"),
                            "instructor",
                            &mut errors,
                        );
                        check_refs(
                            unavailable_slots,
                            &slot_ids,
                            || format!("constraints[{i}].rule.unavailableSlots"),
                            "slot",
                            &mut errors,
                        );
                    }
                },
                Constraint::Soft { id, rule, .. } => match rule {
                    SoftRule::PreferredTimeWindow {
                        section_id,
                        from_period,
                        to_period,
                        ..
                    } => {
                        check_ref(
                            *section_id,
                            &section_ids,
                            || format!("constraints[{i}].rule.sectionId"),
                            "section",
                            &mut errors,
                        );
                        if from_period > to_period {
                            errors.push(InputError::InvertedWindow {
                                field: format!("constraints[{i}].rule.fromPeriod"),
                                constraint_id: *id,
                                from: *from_period,
                                to: *to_period,
                            });
                        }
                    }
                    SoftRule::MinimizeGaps { instructor_id }
                    | SoftRule::AvoidBackToBack { instructor_id } => {
                        check_ref(
                            *instructor_id,
                            &instructor_ids,
                            || format!("constraints[{i}].rule.instructorId"),
                            "instructor",
                            &mut errors,
                        );
                    }
                    SoftRule::BalanceLoad | SoftRule::EarlyStart | SoftRule::CompactSchedule => {}
                },
            }
        }

        for (i, occupied) in request.occupied.iter().enumerate() {
            let (known, entity) = match occupied.resource() {
                ResourceRef::Room(id) => (room_ids.contains(&id), "room"),
                ResourceRef::Instructor(id) => (instructor_ids.contains(&id), "instructor"),
            };
            if !known {
                errors.push(InputError::UnknownReference {
                    field: format!("occupied[{i}].resourceId"),
                    entity,
                    id: occupied.resource_id,
                });
            }
            check_ref(
                occupied.slot_id,
                &slot_ids,
                || format!("occupied[{i}].slotId"),
                "slot",
                &mut errors,
            );
        }

        if let Some(errors) = InputErrors::from_vec(errors) {
            return Err(errors);
        }

        Ok(Self::compile(request, slots, runs))
    }

    /// Builds the indexed form. Assumes `request` passed validation.
    fn compile(request: &ScheduleRequest, slots: Vec<TimeSlot>, runs: Vec<usize>) -> Self {
        let mut rooms = request.rooms.clone();
        rooms.sort_by_key(|r| r.id);

        let room_index: HashMap<RoomId, usize> =
            rooms.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
        let slot_index: HashMap<SlotId, usize> =
            slots.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        let instructor_index: HashMap<InstructorId, usize> = request
            .instructors
            .iter()
            .enumerate()
            .map(|(i, ins)| (ins.id, i))
            .collect();
        let section_index: HashMap<SectionId, usize> = request
            .sections
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();

        let slot_mask = |ids: &BTreeSet<SlotId>| {
            let mut mask = vec![false; slots.len()];
            for id in ids {
                mask[slot_index[id]] = true;
            }
            mask
        };

        let mut instructors: Vec<InstructorSpec> = request
            .instructors
            .iter()
            .map(|ins| InstructorSpec {
                id: ins.id,
                unavailable: slot_mask(&ins.unavailable_slots),
            })
            .collect();

        let mut sections: Vec<SectionSpec> = request
            .sections
            .iter()
            .map(|s| SectionSpec {
                id: s.id,
                demand: s.demand(),
                duration: s.duration as usize,
                instructor: instructor_index[&s.instructor_id],
                capabilities: s.required_capabilities.clone(),
                eligible_rooms: match &s.eligible_rooms {
                    Some(ids) => {
                        let mut mask = vec![false; rooms.len()];
                        for id in ids {
                            mask[room_index[id]] = true;
                        }
                        mask
                    }
                    None => vec![true; rooms.len()],
                },
                eligible_slots: match &s.eligible_slots {
                    Some(ids) => slot_mask(ids),
                    None => vec![true; slots.len()],
                },
                candidates: Vec::new(),
            })
            .collect();

        let mut soft = Vec::new();
        for constraint in &request.constraints {
            match constraint {
                Constraint::Hard { rule, .. } => match rule {
                    HardRule::RoomCapacity {
                        section_id,
                        min_capacity,
                    } => {
                        let section = &mut sections[section_index[section_id]];
                        section.demand = section.demand.max(*min_capacity);
                    }
                    HardRule::RoomCapability {
                        section_id,
                        capabilities,
                    } => {
                        sections[section_index[section_id]]
                            .capabilities
                            .extend(capabilities.iter().cloned());
                    }
                    // Always enforced by the checker.
                    HardRule::NoDoubleBookingRoom | HardRule::NoDoubleBookingInstructor => {}
                    HardRule::InstructorAvailability {
                        instructor_id,
                        unavailable_slots,
                    } => {
                        let instructor = &mut instructors[instructor_index[instructor_id]];
                        for id in unavailable_slots {
                            instructor.unavailable[slot_index[id]] = true;
                        }
                    }
                },
                Constraint::Soft { id, weight, rule } => {
                    let target = match rule {
                        SoftRule::PreferredTimeWindow {
                            section_id,
                            days,
                            from_period,
                            to_period,
                        } => SoftTarget::PreferredTimeWindow {
                            section: section_index[section_id],
                            days: days.clone(),
                            from_period: *from_period,
                            to_period: *to_period,
                        },
                        SoftRule::MinimizeGaps { instructor_id } => SoftTarget::MinimizeGaps {
                            instructor: instructor_index[instructor_id],
                        },
                        SoftRule::AvoidBackToBack { instructor_id } => {
                            SoftTarget::AvoidBackToBack {
                                instructor: instructor_index[instructor_id],
                            }
                        }
                        SoftRule::BalanceLoad => SoftTarget::BalanceLoad,
                        SoftRule::EarlyStart => SoftTarget::EarlyStart,
                        SoftRule::CompactSchedule => SoftTarget::CompactSchedule,
                    };
                    soft.push(SoftConstraint {
                        id: *id,
                        weight: *weight,
                        target,
                    });
                }
            }
        }

        let occupied = request
            .occupied
            .iter()
            .map(|o| {
                let resource = match o.resource() {
                    ResourceRef::Room(id) => Resource::Room(room_index[&id]),
                    ResourceRef::Instructor(id) => Resource::Instructor(instructor_index[&id]),
                };
                (resource, slot_index[&o.slot_id])
            })
            .unique()
            .collect();

        let day_positions = positions_in_day(&slots);
        let mut problem = Self {
            sections,
            rooms,
            slots,
            instructors,
            soft,
            occupied,
            runs,
            day_positions,
        };

        for s in 0..problem.sections.len() {
            let candidates = (0..problem.rooms.len())
                .cartesian_product(0..problem.slots.len())
                .map(|(room, start)| Candidate { room, start })
                .filter(|c| check_static(&problem, s, *c).is_ok())
                .collect();
            problem.sections[s].candidates = candidates;
        }

        info!(
            "Compiled problem with {} sections, {} rooms, {} slots, {} instructors and {} soft constraints",
            problem.sections.len(),
            problem.rooms.len(),
            problem.slots.len(),
            problem.instructors.len(),
            problem.soft.len()
        );
        trace!(
            "Generated {} static candidates out of a theoretical maximum of {}",
            problem
                .sections
                .iter()
                .map(|s| s.candidates.len())
                .sum::<usize>(),
            problem.sections.len() * problem.rooms.len() * problem.slots.len()
        );

        problem
    }

    /// Slot indices covered by a section of `duration` starting at `start`,
    /// or `None` if the span would leave the day or the slot table.
    pub fn span(&self, start: usize, duration: usize) -> Option<Range<usize>> {
        match self.runs.get(start) {
            Some(&run) if duration > 0 && run >= duration => Some(start..start + duration),
            _ => None,
        }
    }

    pub fn section_span(&self, section: usize, start: usize) -> Option<Range<usize>> {
        self.span(start, self.sections[section].duration)
    }

    /// 0 for the first slot of a day, 1 for the next, and so on.
    pub fn day_position(&self, slot: usize) -> usize {
        self.day_positions[slot]
    }
}

// for each (sorted) slot, the length of the contiguous same-day run starting there
fn contiguous_runs(slots: &[TimeSlot]) -> Vec<usize> {
    let mut runs = vec![1; slots.len()];
    for i in (0..slots.len().saturating_sub(1)).rev() {
        let (cur, next) = (&slots[i], &slots[i + 1]);
        if cur.day == next.day && next.period.checked_sub(1) == Some(cur.period) {
            runs[i] = runs[i + 1] + 1;
        }
    }
    runs
}

fn positions_in_day(slots: &[TimeSlot]) -> Vec<usize> {
    let mut positions: Vec<usize> = Vec::with_capacity(slots.len());
    for (i, slot) in slots.iter().enumerate() {
        let position = match i.checked_sub(1) {
            Some(prev) if slots[prev].day == slot.day => positions[prev] + 1,
            _ => 0,
        };
        positions.push(position);
    }
    positions
}

fn unique_ids(
    ids: impl Iterator<Item = u32>,
    list: &str,
    entity: &'static str,
    errors: &mut Vec<InputError>,
) -> HashSet<u32> {
    let mut seen = HashSet::new();
    for (i, id) in ids.enumerate() {
        if !seen.insert(id) {
            errors.push(InputError::DuplicateId {
                field: format!("{list}[{i}].id"),
                entity,
                id,
            });
        }
    }
    seen
}

fn check_ref(
    id: u32,
    known: &HashSet<u32>,
    field: impl FnOnce() -> String,
    entity: &'static str,
    errors: &mut Vec<InputError>,
) {
    if !known.contains(&id) {
        errors.push(InputError::UnknownReference {
            field: field(),
            entity,
            id,
        });
    }
}

fn check_refs(
    ids: &BTreeSet<u32>,
    known: &HashSet<u32>,
    field: impl Fn() -> String,
    entity: &'static str,
    errors: &mut Vec<InputError>,
) {
    for &id in ids {
        check_ref(id, known, &field, entity, errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Instructor, OccupiedSlot, Section};

    fn week_slots() -> Vec<TimeSlot> {
        // Two days, three periods each, deliberately out of order.
        vec![
            TimeSlot::new(6, 2, 3),
            TimeSlot::new(1, 1, 1),
            TimeSlot::new(3, 1, 3),
            TimeSlot::new(2, 1, 2),
            TimeSlot::new(4, 2, 1),
            TimeSlot::new(5, 2, 2),
        ]
    }

    fn sample_request() -> ScheduleRequest {
        ScheduleRequest {
            sections: vec![
                Section::new(100, 10, 201, 25),
                Section::new(101, 11, 202, 40).with_duration(2),
            ],
            rooms: vec![Room::new(12, 50), Room::new(11, 30)],
            time_slots: week_slots(),
            instructors: vec![Instructor::new(201), Instructor::new(202)],
            ..Default::default()
        }
    }

    #[test]
    fn test_rooms_and_slots_are_sorted() {
        let problem = Problem::build(&sample_request()).unwrap();
        let room_ids: Vec<_> = problem.rooms.iter().map(|r| r.id).collect();
        let slot_ids: Vec<_> = problem.slots.iter().map(|s| s.id).collect();
        assert_eq!(room_ids, vec![11, 12]);
        assert_eq!(slot_ids, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_span_never_crosses_a_day() {
        let problem = Problem::build(&sample_request()).unwrap();
        assert_eq!(problem.span(0, 3), Some(0..3));
        assert_eq!(problem.span(1, 2), Some(1..3));
        // Slot index 2 is the last period of day 1.
        assert_eq!(problem.span(2, 2), None);
        assert_eq!(problem.span(3, 3), Some(3..6));
        assert_eq!(problem.span(6, 1), None);
    }

    #[test]
    fn test_gap_in_periods_breaks_contiguity() {
        let slots = vec![
            TimeSlot::new(1, 1, 1),
            TimeSlot::new(2, 1, 2),
            TimeSlot::new(3, 1, 4),
        ];
        assert_eq!(contiguous_runs(&slots), vec![2, 1, 1]);
    }

    #[test]
    fn test_extreme_periods_are_not_contiguous() {
        let slots = vec![
            TimeSlot::new(1, 1, 0),
            TimeSlot::new(2, 1, u32::MAX - 1),
            TimeSlot::new(3, 1, u32::MAX),
        ];
        assert_eq!(contiguous_runs(&slots), vec![1, 2, 1]);
    }

    #[test]
    fn test_day_positions_restart_each_day() {
        let problem = Problem::build(&sample_request()).unwrap();
        let positions: Vec<_> = (0..problem.slots.len())
            .map(|i| problem.day_position(i))
            .collect();
        assert_eq!(positions, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_static_candidates_respect_capacity_and_span() {
        let problem = Problem::build(&sample_request()).unwrap();
        // Section 101 needs 40 seats: only room 12 (index 1). Two-slot spans
        // can start at slot indices 0, 1, 3, 4.
        let starts: Vec<_> = problem.sections[1]
            .candidates
            .iter()
            .map(|c| (c.room, c.start))
            .collect();
        assert_eq!(starts, vec![(1, 0), (1, 1), (1, 3), (1, 4)]);
        assert_eq!(problem.sections[0].candidates.len(), 12);
    }

    #[test]
    fn test_hard_records_are_merged() {
        let mut request = sample_request();
        request.constraints = vec![
            Constraint::hard(
                1,
                HardRule::RoomCapacity {
                    section_id: 100,
                    min_capacity: 45,
                },
            ),
            Constraint::hard(
                2,
                HardRule::InstructorAvailability {
                    instructor_id: 202,
                    unavailable_slots: [1].into(),
                },
            ),
            Constraint::hard(3, HardRule::NoDoubleBookingRoom),
        ];
        let problem = Problem::build(&request).unwrap();
        assert_eq!(problem.sections[0].demand, 45);
        assert!(problem.instructors[1].unavailable[0]);
        assert!(problem.sections[1].candidates.iter().all(|c| c.start != 0));
    }

    #[test]
    fn test_duplicate_ids_are_reported_with_field() {
        let mut request = sample_request();
        request.rooms.push(Room::new(11, 10));
        request.sections.push(Section::new(100, 12, 201, 5));

        let errors = Problem::build(&request).unwrap_err();
        let fields: Vec<_> = errors.errors().iter().map(|e| e.field().to_string()).collect();
        assert!(fields.contains(&"rooms[2].id".to_string()));
        assert!(fields.contains(&"sections[2].id".to_string()));
    }

    #[test]
    fn test_unknown_references_are_reported() {
        let mut request = sample_request();
        request.sections[0].instructor_id = 999;
        request.sections[1].eligible_rooms = Some([77].into());
        request.constraints = vec![Constraint::soft(
            5,
            1,
            SoftRule::MinimizeGaps { instructor_id: 404 },
        )];
        request.occupied = vec![OccupiedSlot::room(11, 42)];

        let errors = Problem::build(&request).unwrap_err();
        assert!(errors.errors().iter().any(|e| matches!(
            e,
            InputError::UnknownReference { field, id: 999, .. } if field == "sections[0].instructorId"
        )));
        assert!(errors
            .errors()
            .iter()
            .any(|e| e.field() == "sections[1].eligibleRooms"));
        assert!(errors
            .errors()
            .iter()
            .any(|e| e.field() == "constraints[0].rule.instructorId"));
        assert!(errors.errors().iter().any(|e| e.field() == "occupied[0].slotId"));
    }

    #[test]
    fn test_duration_longer_than_any_day_is_rejected() {
        let mut request = sample_request();
        request.sections[0].duration = 4;
        let errors = Problem::build(&request).unwrap_err();
        assert!(matches!(
            errors.errors()[0],
            InputError::DurationExceedsDay {
                duration: 4,
                longest_run: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        let mut request = sample_request();
        request.sections[1].duration = 0;
        let errors = Problem::build(&request).unwrap_err();
        assert_eq!(errors.errors()[0].field(), "sections[1].duration");
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let mut request = sample_request();
        request.constraints = vec![Constraint::soft(
            9,
            3,
            SoftRule::PreferredTimeWindow {
                section_id: 100,
                days: None,
                from_period: 3,
                to_period: 1,
            },
        )];
        let errors = Problem::build(&request).unwrap_err();
        assert!(matches!(
            errors.errors()[0],
            InputError::InvertedWindow { constraint_id: 9, .. }
        ));
    }

    #[test]
    fn test_duplicate_slot_position_is_rejected() {
        let mut request = sample_request();
        request.time_slots.push(TimeSlot::new(7, 1, 2));
        let errors = Problem::build(&request).unwrap_err();
        assert_eq!(errors.errors()[0].field(), "timeSlots[6].period");
    }

    #[test]
    fn test_occupied_pairs_are_resolved() {
        let mut request = sample_request();
        request.occupied = vec![
            OccupiedSlot::room(12, 4),
            OccupiedSlot::instructor(201, 2),
            OccupiedSlot::room(12, 4),
        ];
        let problem = Problem::build(&request).unwrap();
        assert_eq!(
            problem.occupied,
            vec![(Resource::Room(1), 3), (Resource::Instructor(0), 1)]
        );
    }
}
