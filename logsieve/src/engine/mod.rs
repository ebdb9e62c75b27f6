/// The parallel filtering pipeline.
///
/// ```text
/// input file -> chunker -> N segments -> worker pool -> worker results -> aggregator
///                                                                      -> (output file, report)
/// ```
///
/// The chunker splits the input into line-aligned byte ranges, one per worker.
/// Workers scan their ranges on a fixed-size rayon pool and return owned
/// results; they share no mutable state apart from relaxed counters. The
/// aggregator puts results back in segment order, so output order never
/// depends on which worker finished first.
pub mod aggregator;
pub mod chunker;
pub mod orchestrator;
pub mod worker;

pub use aggregator::Aggregator;
pub use chunker::{plan, Segment};
pub use orchestrator::{execute, execute_with_config, execute_with_source};
pub use worker::{ScanOutcome, SegmentWorker};
