pub mod archive;
pub mod block;
pub mod codec;
pub mod error;
pub mod observer;
pub mod processor;
pub mod toc;

pub use archive::{Archive, FileStat};
pub use block::{Block, BlockHeader, BLOCK_SIZE, HEADER_SIZE, PAYLOAD_SIZE};
pub use error::{ArchiveError, ArchiveResult};
pub use observer::{ActionType, ArchiveObserver, LogObserver};
pub use processor::{DataProcessor, ProcessorRegistry};
