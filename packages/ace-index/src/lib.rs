pub mod document;
pub mod plan;
pub mod rebuild;
pub mod retry;

mod error;

pub use document::{AlertIndexInput, ObservableEntry};
pub use error::{Error, Result};
pub use plan::{IndexRows, RebuildPlan, SkippedTag};
pub use rebuild::{IndexRebuilder, RebuildReport, schedule_rebuild};
pub use retry::{RetryPolicy, UnitOfWork, with_retry};
