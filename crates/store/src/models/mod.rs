mod block;
mod entry;
mod fields;

pub use self::block::{BlockIndexEntry, BlockStatus};
pub(crate) use self::block::BlockRow;
pub use self::entry::CacheEntry;
pub(crate) use self::entry::EntryRow;
pub use self::fields::ExtractedFields;
