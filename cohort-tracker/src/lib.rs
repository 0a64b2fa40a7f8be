pub mod capture;
pub mod join;
pub mod recheck;
pub mod storage;
pub mod summary;
pub mod user_cache;
pub mod workflow;

pub use capture::{build_post_record, capture_cohort, CapturedCohort, SELFTEXT_LIMIT};
pub use join::join_cohort;
pub use recheck::{derive_status, BatchRechecker};
pub use storage::{DataLayout, RunSelector};
pub use summary::CohortSummary;
pub use user_cache::{CacheStats, UserInfoCache};
pub use workflow::{run_pass1, run_pass2, Pacers, Pass1Report, Pass2Report};

#[cfg(test)]
mod tests;
