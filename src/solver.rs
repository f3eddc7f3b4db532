use crate::conflict::ConflictIndex;
use crate::constraints::{SoftScore, check_hard, score_soft};
use crate::data::{Budget, StopReason};
use crate::problem::{Candidate, Problem, Resource};
use itertools::Itertools;
use log::{debug, info, trace, warn};
use std::cmp::Reverse;
use std::ops::Range;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_STEPS: u64 = 200_000;
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(10);

/// The clock is sampled when `steps & CLOCK_CHECK_MASK == 0`.
const CLOCK_CHECK_MASK: u64 = 0xFF;

/// Resolved search budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub max_steps: u64,
    pub max_duration: Duration,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }
}

impl SearchLimits {
    /// Overrides these limits with whatever the request specified.
    pub fn with_budget(self, budget: Option<&Budget>) -> Self {
        let Some(budget) = budget else {
            return self;
        };
        Self {
            max_steps: budget.max_steps.unwrap_or(self.max_steps),
            max_duration: budget
                .max_duration_millis
                .map(Duration::from_millis)
                .unwrap_or(self.max_duration),
        }
    }
}

/// The best assignment the search found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Indexed by section index.
    pub assignment: Vec<Option<Candidate>>,
    pub placed: usize,
    pub soft: SoftScore,
    pub stop_reason: StopReason,
    pub steps: u64,
}

#[derive(Debug, Clone)]
struct Frame {
    section: usize,
    /// Next candidate to try.
    cursor: usize,
    placed: Option<(Candidate, Range<usize>)>,
    skipped: bool,
}

impl Frame {
    fn new(section: usize) -> Self {
        Self {
            section,
            cursor: 0,
            placed: None,
            skipped: false,
        }
    }

    fn is_undecided(&self) -> bool {
        self.cursor == 0 && self.placed.is_none() && !self.skipped
    }
}

enum Choice {
    Place(Candidate, Range<usize>),
    Skip,
}

#[derive(Debug, Clone)]
struct Incumbent {
    assignment: Vec<Option<Candidate>>,
    placed: usize,
    soft: SoftScore,
}

pub(crate) struct Search<'a> {
    problem: &'a Problem,
    index: ConflictIndex,
    order: Vec<usize>,
    // committed placements here are exactly what `index` holds beyond its baseline
    frames: Vec<Frame>,
    current: Vec<Option<Candidate>>,
    placed: usize,
    best: Option<Incumbent>,
    steps: u64,
    limits: SearchLimits,
    started: Instant,
}

/// Searches for a complete assignment, falling back to the best partial
/// one when none exists or the budget runs out.
pub fn search(problem: &Problem, limits: SearchLimits) -> SearchOutcome {
    let mut search = Search::new(problem, limits);
    let stop_reason = search.run();
    search.into_outcome(stop_reason)
}

impl<'a> Search<'a> {
    pub(crate) fn new(problem: &'a Problem, limits: SearchLimits) -> Self {
        let order = (0..problem.sections.len())
            .sorted_by_key(|&s| {
                let spec = &problem.sections[s];
                (spec.candidates.len(), Reverse(spec.demand), spec.id)
            })
            .collect();

        Self {
            problem,
            index: ConflictIndex::new(problem),
            order,
            frames: Vec::with_capacity(problem.sections.len()),
            current: vec![None; problem.sections.len()],
            placed: 0,
            best: None,
            steps: 0,
            limits,
            started: Instant::now(),
        }
    }

    pub(crate) fn run(&mut self) -> StopReason {
        self.started = Instant::now();
        let baseline = self.index.load();
        info!(
            "Starting search over {} sections with budget of {} steps / {:?}",
            self.order.len(),
            self.limits.max_steps,
            self.limits.max_duration
        );

        let stop_reason = match self.order.first() {
            None => {
                self.record_leaf();
                StopReason::Complete
            }
            Some(&first) => {
                self.frames.push(Frame::new(first));
                self.explore()
            }
        };

        let stop_reason = if stop_reason == StopReason::BudgetExhausted {
            warn!(
                "Search budget exhausted after {} steps in {:.2?}; completing greedily",
                self.steps,
                self.started.elapsed()
            );
            self.complete_greedily();
            match &self.best {
                Some(best) if best.placed == self.order.len() => StopReason::Complete,
                _ => StopReason::BudgetExhausted,
            }
        } else {
            stop_reason
        };

        self.unwind();
        debug_assert_eq!(self.index.load(), baseline, "tentative occupancy leaked");

        info!(
            "Search finished ({:?}) in {:.2?} after {} steps, placed {}/{}",
            stop_reason,
            self.started.elapsed(),
            self.steps,
            self.best.as_ref().map_or(0, |b| b.placed),
            self.order.len()
        );
        stop_reason
    }

    fn explore(&mut self) -> StopReason {
        loop {
            if self.budget_exhausted() {
                return StopReason::BudgetExhausted;
            }
            let Some(depth) = self.frames.len().checked_sub(1) else {
                return StopReason::Exhausted;
            };

            let section = self.frames[depth].section;
            if let Some((candidate, span)) = self.frames[depth].placed.take() {
                self.retract(section, candidate, span);
            }

            let Some(choice) = self.next_choice(depth) else {
                self.frames.pop();
                continue;
            };
            self.steps += 1;
            if let Choice::Place(candidate, span) = choice {
                self.commit(section, candidate, span.clone());
                self.frames[depth].placed = Some((candidate, span));
            }

            let next = depth + 1;
            if next == self.order.len() {
                if self.record_leaf() {
                    return StopReason::Complete;
                }
            } else if self.can_improve(self.placed + self.order.len() - next) {
                self.frames.push(Frame::new(self.order[next]));
            }
        }
    }

    /// Advances the frame at `depth` to its next feasible candidate, or to
    /// the skip branch once candidates run out.
    fn next_choice(&mut self, depth: usize) -> Option<Choice> {
        let problem = self.problem;
        let frame = &mut self.frames[depth];
        let candidates = &problem.sections[frame.section].candidates;

        while let Some(&candidate) = candidates.get(frame.cursor) {
            frame.cursor += 1;
            if let Ok(span) = check_hard(problem, &self.index, frame.section, candidate) {
                return Some(Choice::Place(candidate, span));
            }
        }

        if frame.skipped {
            return None;
        }
        frame.skipped = true;
        let potential = self.placed + self.order.len() - depth - 1;
        self.can_improve(potential).then_some(Choice::Skip)
    }

    /// Whether a leaf with `potential` placed sections could replace the
    /// incumbent.
    fn can_improve(&self, potential: usize) -> bool {
        match &self.best {
            None => true,
            Some(best) => {
                potential > best.placed || (potential == best.placed && best.soft.total > 0)
            }
        }
    }

    fn budget_exhausted(&self) -> bool {
        if self.steps >= self.limits.max_steps {
            return true;
        }
        self.steps & CLOCK_CHECK_MASK == 0 && self.started.elapsed() >= self.limits.max_duration
    }

    fn commit(&mut self, section: usize, candidate: Candidate, span: Range<usize>) {
        let instructor = self.problem.sections[section].instructor;
        self.index
            .occupy(Resource::Room(candidate.room), span.clone());
        self.index.occupy(Resource::Instructor(instructor), span);
        self.current[section] = Some(candidate);
        self.placed += 1;
    }

    fn retract(&mut self, section: usize, candidate: Candidate, span: Range<usize>) {
        let instructor = self.problem.sections[section].instructor;
        self.index
            .release(Resource::Room(candidate.room), span.clone());
        self.index.release(Resource::Instructor(instructor), span);
        self.current[section] = None;
        self.placed -= 1;
    }

    fn first_feasible(&self, section: usize) -> Option<(usize, Candidate, Range<usize>)> {
        self.problem.sections[section]
            .candidates
            .iter()
            .enumerate()
            .find_map(|(i, &c)| {
                check_hard(self.problem, &self.index, section, c)
                    .ok()
                    .map(|span| (i, c, span))
            })
    }

    /// Scores the current full path. Sections left unplaced that fit by now
    /// are placed first, so a recorded leaf never leaves a free placement
    /// unused. Returns whether the leaf is complete.
    fn record_leaf(&mut self) -> bool {
        let mut filled = Vec::new();
        for pos in 0..self.order.len() {
            let section = self.order[pos];
            if self.current[section].is_some() {
                continue;
            }
            if let Some((_, candidate, span)) = self.first_feasible(section) {
                self.commit(section, candidate, span.clone());
                filled.push((section, candidate, span));
            }
        }

        let complete = self.placed == self.order.len();
        let improves = match &self.best {
            None => true,
            Some(best) => self.placed >= best.placed,
        };
        if improves {
            let soft = score_soft(self.problem, &self.current);
            let better = match &self.best {
                Some(best) => self.placed > best.placed || soft.total < best.soft.total,
                None => true,
            };
            if better {
                debug!(
                    "New incumbent at step {}: {} placed, soft penalty {}",
                    self.steps, self.placed, soft.total
                );
                self.best = Some(Incumbent {
                    assignment: self.current.clone(),
                    placed: self.placed,
                    soft,
                });
            }
        }

        for (section, candidate, span) in filled.into_iter().rev() {
            self.retract(section, candidate, span);
        }
        complete
    }

    // no backtracking: each remaining section takes its first feasible candidate
    fn complete_greedily(&mut self) {
        if self.frames.last().is_some_and(Frame::is_undecided) {
            self.frames.pop();
        }
        trace!(
            "Greedy completion from depth {} of {}",
            self.frames.len(),
            self.order.len()
        );
        for pos in self.frames.len()..self.order.len() {
            let section = self.order[pos];
            let mut frame = Frame::new(section);
            match self.first_feasible(section) {
                Some((i, candidate, span)) => {
                    self.commit(section, candidate, span.clone());
                    frame.cursor = i + 1;
                    frame.placed = Some((candidate, span));
                }
                None => frame.skipped = true,
            }
            self.frames.push(frame);
        }
        self.record_leaf();
    }

    fn unwind(&mut self) {
        while let Some(frame) = self.frames.pop() {
            if let Some((candidate, span)) = frame.placed {
                self.retract(frame.section, candidate, span);
            }
        }
    }

    pub(crate) fn into_outcome(self, stop_reason: StopReason) -> SearchOutcome {
        let sections = self.problem.sections.len();
        let best = self.best.unwrap_or_else(|| Incumbent {
            assignment: vec![None; sections],
            placed: 0,
            soft: SoftScore::default(),
        });
        SearchOutcome {
            assignment: best.assignment,
            placed: best.placed,
            soft: best.soft,
            stop_reason,
            steps: self.steps,
        }
    }
}
