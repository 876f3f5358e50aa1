mod error;
mod memory;
mod price_cache;
mod record_store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use price_cache::PriceCache;
pub use record_store::{new_record_id, RecordStore};
