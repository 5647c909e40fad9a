//! Buffered, chunked, compressed record store.
//!
//! Records accumulate in memory and are flushed in whole batches to a
//! growable on-disk dataset: rank-2 for fixed-multiplicity rows, rank-1
//! for scalars. The storage backend sits behind the narrow
//! [`container::Container`] seam; [`chunked::ChunkedFile`] is the
//! file-backed implementation.

pub mod chunked;
pub mod container;
pub mod error;
pub mod layout;
pub mod test_util;
pub mod writer;

pub use container::Container;
pub use container::Dataset;
pub use container::Dataspace;
pub use container::Selection;
pub use error::Result;
pub use error::StoreError;
pub use layout::DataLayout;
pub use layout::Record;
pub use writer::Writer;
pub use writer::Writer1d;
pub use writer::DEFAULT_COMPRESSION_LEVEL;
