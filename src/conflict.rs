use crate::problem::{Problem, Resource};
use std::ops::Range;

/// Room and instructor occupancy, one flat row of slots per resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictIndex {
    slots: usize,
    rooms: Vec<bool>,
    instructors: Vec<bool>,
    /// Occupied cells, pre-loaded ones included.
    load: usize,
}

impl ConflictIndex {
    /// An index sized for `problem`, with its pre-occupied slots loaded.
    pub fn new(problem: &Problem) -> Self {
        let slots = problem.slots.len();
        let mut index = Self {
            slots,
            rooms: vec![false; problem.rooms.len() * slots],
            instructors: vec![false; problem.instructors.len() * slots],
            load: 0,
        };
        for &(resource, slot) in &problem.occupied {
            index.occupy(resource, slot..slot + 1);
        }
        index
    }

    fn row(&self, resource: Resource) -> (&[bool], usize) {
        match resource {
            Resource::Room(r) => (self.rooms.as_slice(), r * self.slots),
            Resource::Instructor(i) => (self.instructors.as_slice(), i * self.slots),
        }
    }

    fn row_mut(&mut self, resource: Resource) -> (&mut [bool], usize) {
        match resource {
            Resource::Room(r) => (self.rooms.as_mut_slice(), r * self.slots),
            Resource::Instructor(i) => (self.instructors.as_mut_slice(), i * self.slots),
        }
    }

    pub fn is_free(&self, resource: Resource, span: Range<usize>) -> bool {
        let (cells, base) = self.row(resource);
        cells[base + span.start..base + span.end]
            .iter()
            .all(|busy| !busy)
    }

    /// Marks `span` as taken. Slots already taken stay taken.
    pub fn occupy(&mut self, resource: Resource, span: Range<usize>) {
        let (cells, base) = self.row_mut(resource);
        let mut added = 0;
        for cell in &mut cells[base + span.start..base + span.end] {
            if !*cell {
                *cell = true;
                added += 1;
            }
        }
        self.load += added;
    }

    /// Frees `span`. Must mirror an earlier [`occupy`](Self::occupy).
    pub fn release(&mut self, resource: Resource, span: Range<usize>) {
        let (cells, base) = self.row_mut(resource);
        let mut removed = 0;
        for cell in &mut cells[base + span.start..base + span.end] {
            debug_assert!(*cell, "releasing a free slot");
            if *cell {
                *cell = false;
                removed += 1;
            }
        }
        self.load -= removed;
    }

    /// Number of occupied (resource, slot) cells.
    pub fn load(&self) -> usize {
        self.load
    }
}
