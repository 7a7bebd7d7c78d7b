pub mod backfill;
pub mod decision;
pub mod feed;
pub mod stake;

pub use backfill::{backfill_from_csv, BackfillReport};
pub use decision::{DecisionEngine, RoundPhase};
pub use feed::{ObservationFeed, ReplayFeed, RoundEvent};
pub use stake::StakeLadder;
