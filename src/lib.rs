//! Assigns course sections to (room, time slot) pairs, or returns the best
//! partial schedule with a reason for every section left out.

pub mod config;
pub mod conflict;
pub mod constraints;
pub mod data;
pub mod error;
pub mod problem;
pub mod report;
pub mod server;
pub mod solver;

pub use config::Config;
pub use data::{ScheduleRequest, ScheduleResponse};
pub use error::{Error, InputError, InputErrors, Result};
pub use solver::SearchLimits;

use log::info;
use problem::Problem;

/// Computes schedules with a fixed set of default search limits.
///
/// Holds no per-request state; one instance can serve any number of
/// requests concurrently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scheduler {
    limits: SearchLimits,
}

impl Scheduler {
    pub fn new(limits: SearchLimits) -> Self {
        Self { limits }
    }

    /// Validates `request` and computes its schedule.
    ///
    /// Only malformed input is an error. Infeasible or budget-limited
    /// requests succeed with `complete == false`.
    pub fn calculate(&self, request: &ScheduleRequest) -> Result<ScheduleResponse> {
        let problem = Problem::build(request)?;
        let limits = self.limits.with_budget(request.budget.as_ref());
        let outcome = solver::search(&problem, limits);
        let response = report::build_response(&problem, &outcome);
        info!(
            "Schedule calculated: {}/{} sections placed, score {}",
            response.diagnostics.placed_count, response.diagnostics.total_sections, response.score
        );
        Ok(response)
    }
}

/// Computes a schedule with the default search limits.
pub fn calculate(request: &ScheduleRequest) -> Result<ScheduleResponse> {
    Scheduler::default().calculate(request)
}
