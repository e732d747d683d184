//! Counsel Planning - deciding which executors answer a query
//!
//! The planner classifies the query into a goal, picks an ordered,
//! duplicate-free subset of the registered executors (optionally grouped
//! into parallel stages) or asks the student a clarifying question first.

pub mod plan;
pub mod planner;
mod prompt;

pub use plan::{PlanRationale, WorkflowPlan, FALLBACK_GOAL};
pub use planner::{LlmPlanner, WorkflowPlanner};
pub use prompt::HISTORY_MESSAGE_LIMIT;
