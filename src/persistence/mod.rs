pub mod buffer;
pub mod defaults;
pub mod index;
pub mod reader;
pub mod shard;
pub mod snapshot;
pub mod store;
pub mod subrecord;
pub mod tag;
pub mod writer;
