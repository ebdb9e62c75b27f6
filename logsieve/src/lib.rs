pub mod config;
pub mod engine;
pub mod errors;
pub mod filters;
pub mod info;
pub mod logging;
pub mod metrics;
pub mod results;
pub mod source;

pub use config::{ConfigOverrides, SieveConfig};
pub use engine::{execute, execute_with_config, execute_with_source};
pub use errors::{SegmentReadError, SieveError, SieveResult};
pub use filters::{Filter, FilterSet};
pub use info::FileInfo;
pub use logging::init_logging;
pub use results::{LogLine, Report, WorkerResult};
pub use source::{FileSource, LogSource, MemorySource};
