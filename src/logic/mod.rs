pub mod entries;
pub mod lifecycle;
pub mod models;
pub mod query_parser;
pub mod record_filter;
pub mod validate;

pub use entries::EntryService;
pub use lifecycle::{ChunkFailure, LifecycleManager, SweepReport, DEFAULT_PURGE_CHUNK_SIZE};
pub use models::ModelService;
pub use query_parser::{ParseMode, QueryParser};
pub use record_filter::RecordFilter;
