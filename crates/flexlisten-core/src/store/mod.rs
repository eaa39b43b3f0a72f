pub(crate) mod collection;
mod data_store;
mod subscription;

pub use data_store::{ApplyOutcome, DataStore, EVENT_CHANNEL_SIZE};
pub use subscription::{EntityStream, EntityWatchStream};
