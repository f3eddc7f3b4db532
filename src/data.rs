use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// Type aliases for clarity
pub type SectionId = u32;
pub type CourseId = u32;
pub type RoomId = u32;
pub type InstructorId = u32;
pub type SlotId = u32;
pub type ConstraintId = u32;

fn default_duration() -> u32 {
    1
}

fn default_slot_minutes() -> u32 {
    60
}

/// A single offering of a course that needs one room/time assignment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: SectionId,
    pub course_id: CourseId,
    pub enrolled: u32,
    /// Seats the room must offer. Falls back to `enrolled` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_capacity: Option<u32>,
    pub instructor_id: InstructorId,
    /// Number of contiguous slots the section occupies.
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,
    /// `None` means every room is eligible; an empty set means none is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible_rooms: Option<BTreeSet<RoomId>>,
    /// `None` means every slot is eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible_slots: Option<BTreeSet<SlotId>>,
}

impl Section {
    pub fn new(id: SectionId, course_id: CourseId, instructor_id: InstructorId, enrolled: u32) -> Self {
        Self {
            id,
            course_id,
            enrolled,
            required_capacity: None,
            instructor_id,
            duration: 1,
            required_capabilities: BTreeSet::new(),
            eligible_rooms: None,
            eligible_slots: None,
        }
    }

    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_required_capacity(mut self, capacity: u32) -> Self {
        self.required_capacity = Some(capacity);
        self
    }

    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.required_capabilities.insert(tag.into());
        self
    }

    pub fn with_eligible_rooms(mut self, rooms: impl IntoIterator<Item = RoomId>) -> Self {
        self.eligible_rooms = Some(rooms.into_iter().collect());
        self
    }

    pub fn with_eligible_slots(mut self, slots: impl IntoIterator<Item = SlotId>) -> Self {
        self.eligible_slots = Some(slots.into_iter().collect());
        self
    }

    /// Seats required in the assigned room.
    pub fn demand(&self) -> u32 {
        self.required_capacity.unwrap_or(self.enrolled)
    }
}

/// Represents a physical room with a given capacity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub capacity: u32,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl Room {
    pub fn new(id: RoomId, capacity: u32) -> Self {
        Self {
            id,
            capacity,
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capabilities.insert(tag.into());
        self
    }
}

/// A teaching period on a given day. Slots are ordered by `(day, period, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub id: SlotId,
    pub day: u32,
    pub period: u32,
    #[serde(default = "default_slot_minutes")]
    pub minutes: u32,
}

impl TimeSlot {
    pub fn new(id: SlotId, day: u32, period: u32) -> Self {
        Self {
            id,
            day,
            period,
            minutes: default_slot_minutes(),
        }
    }
}

/// Represents an instructor with their scheduling constraints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instructor {
    pub id: InstructorId,
    #[serde(default)]
    pub unavailable_slots: BTreeSet<SlotId>,
}

impl Instructor {
    pub fn new(id: InstructorId) -> Self {
        Self {
            id,
            unavailable_slots: BTreeSet::new(),
        }
    }

    pub fn unavailable_at(mut self, slots: impl IntoIterator<Item = SlotId>) -> Self {
        self.unavailable_slots.extend(slots);
        self
    }
}

/// A room or instructor reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    Room(RoomId),
    Instructor(InstructorId),
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceRef::Room(id) => write!(f, "room {id}"),
            ResourceRef::Instructor(id) => write!(f, "instructor {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    Room,
    Instructor,
}

/// A slot already taken by a schedule computed outside this request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupiedSlot {
    pub resource_type: ResourceType,
    pub resource_id: u32,
    pub slot_id: SlotId,
}

impl OccupiedSlot {
    pub fn room(room_id: RoomId, slot_id: SlotId) -> Self {
        Self {
            resource_type: ResourceType::Room,
            resource_id: room_id,
            slot_id,
        }
    }

    pub fn instructor(instructor_id: InstructorId, slot_id: SlotId) -> Self {
        Self {
            resource_type: ResourceType::Instructor,
            resource_id: instructor_id,
            slot_id,
        }
    }

    pub fn resource(&self) -> ResourceRef {
        match self.resource_type {
            ResourceType::Room => ResourceRef::Room(self.resource_id),
            ResourceType::Instructor => ResourceRef::Instructor(self.resource_id),
        }
    }
}

/// A rule that must hold in every returned schedule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HardRule {
    #[serde(rename_all = "camelCase")]
    RoomCapacity {
        section_id: SectionId,
        min_capacity: u32,
    },
    #[serde(rename_all = "camelCase")]
    RoomCapability {
        section_id: SectionId,
        capabilities: BTreeSet<String>,
    },
    NoDoubleBookingRoom,
    NoDoubleBookingInstructor,
    #[serde(rename_all = "camelCase")]
    InstructorAvailability {
        instructor_id: InstructorId,
        unavailable_slots: BTreeSet<SlotId>,
    },
}

/// A rule whose violation is penalized but tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SoftRule {
    /// The section should start within `[from_period, to_period]`,
    /// optionally restricted to `days`.
    #[serde(rename_all = "camelCase")]
    PreferredTimeWindow {
        section_id: SectionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        days: Option<BTreeSet<u32>>,
        from_period: u32,
        to_period: u32,
    },
    /// Idle periods between an instructor's classes on the same day.
    #[serde(rename_all = "camelCase")]
    MinimizeGaps { instructor_id: InstructorId },
    /// Classes of the same instructor that run straight into each other.
    #[serde(rename_all = "camelCase")]
    AvoidBackToBack { instructor_id: InstructorId },
    /// Assigned slots of the busiest instructor minus those of the idlest.
    BalanceLoad,
    /// How far into its day each placed section starts.
    EarlyStart,
    /// Idle periods summed over every instructor.
    CompactSchedule,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Constraint {
    Hard { id: ConstraintId, rule: HardRule },
    Soft {
        id: ConstraintId,
        weight: u64,
        rule: SoftRule,
    },
}

impl Constraint {
    pub fn hard(id: ConstraintId, rule: HardRule) -> Self {
        Self::Hard { id, rule }
    }

    pub fn soft(id: ConstraintId, weight: u64, rule: SoftRule) -> Self {
        Self::Soft { id, weight, rule }
    }

    pub fn id(&self) -> ConstraintId {
        match self {
            Constraint::Hard { id, .. } | Constraint::Soft { id, .. } => *id,
        }
    }
}

/// Search limits supplied with a request. Missing fields take the
/// scheduler's configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_millis: Option<u64>,
}

/// The complete input for the scheduling problem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub sections: Vec<Section>,
    pub rooms: Vec<Room>,
    pub time_slots: Vec<TimeSlot>,
    pub instructors: Vec<Instructor>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub occupied: Vec<OccupiedSlot>,
    #[serde(default)]
    pub budget: Option<Budget>,
}

/// Where a placed section runs. `slot_id` is the first slot it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub room_id: RoomId,
    pub slot_id: SlotId,
}

/// Why a section could not be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    InsufficientCapacity,
    NoCapabilityMatch,
    NoFreeSlot,
    InstructorConflict,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReasonCode::InsufficientCapacity => "insufficient room capacity",
            ReasonCode::NoCapabilityMatch => "no capability match",
            ReasonCode::NoFreeSlot => "no free slot",
            ReasonCode::InstructorConflict => "instructor conflict",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Unplaced {
    pub section_id: SectionId,
    pub reason_code: ReasonCode,
}

/// Describes a soft constraint that was not met in the final schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Penalty {
    pub constraint_id: ConstraintId,
    pub penalty: u64,
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// Every section was placed.
    Complete,
    /// The whole search tree was explored without a complete assignment.
    Exhausted,
    /// The step or time budget ran out first.
    BudgetExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorLoad {
    pub instructor_id: InstructorId,
    pub sections_assigned: u32,
    pub slots_assigned: u32,
    pub minutes_assigned: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub total_sections: u32,
    pub placed_count: u32,
    pub stop_reason: StopReason,
    pub steps: u64,
    pub instructor_load: Vec<InstructorLoad>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_difference: Option<u32>,
}

/// The final output of the solver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    pub assignment: BTreeMap<SectionId, Placement>,
    pub unplaced: Vec<Unplaced>,
    pub penalties: Vec<Penalty>,
    pub score: u64,
    pub complete: bool,
    pub diagnostics: Diagnostics,
}
