//! Filter/pattern/combine: the shard-generation tail end of a sweep. Takes
//! branch results, drops anything failing a hard requirement, ranks and
//! selects survivors (overall or per pattern), groups them by a
//! canonicalised signature that ignores window length and threshold, and
//! assembles the selection into one composite strategy tree. Selected
//! shards persist through `ShardStore` so a composite can be reloaded and
//! re-evaluated without re-running the sweep that produced it.

pub mod combine;
pub mod error;
pub mod filter;
pub mod signature;
pub mod store;

pub use combine::combine;
pub use error::ShardStoreError;
pub use filter::{filter_rank_select, HardRequirement, MetricKey, Selection, ThresholdComparator};
pub use signature::{pattern_signature, PatternSignature};
pub use store::{Shard, ShardStore};
