pub mod summary;
pub mod tally;

pub use summary::{summarize, PollSummary};
pub use tally::{compute_stats, TallyError};
