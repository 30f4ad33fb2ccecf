pub mod backfill;
pub mod dataset_store;
pub mod volume_aggregator;

pub use backfill::{BackfillDriver, BackfillOutcome, BackfillPlan, BackfillReport};
pub use dataset_store::{Dataset, DatasetStore, MergeOutcome, StoredRow};
pub use volume_aggregator::{DailyAggregate, VolumeAggregator};
