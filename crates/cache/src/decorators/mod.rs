mod blocking;
mod fifo;
mod logging;
mod lru;
mod scheduled;
mod serialized;
mod soft;
mod synchronized;

pub use blocking::BlockingCache;
pub use fifo::FifoCache;
pub use logging::LoggingCache;
pub use lru::LruCache;
pub use scheduled::ScheduledCache;
pub use serialized::SerializedCache;
pub use soft::ReclaimableCache;
pub use synchronized::SynchronizedCache;
