//! ofs-block: local/block filesystem backend
//!
//! Implements the `FileStore` contract over a mounted filesystem: direct
//! reads and writes, offset-based multipart chunk writes, and content-hash
//! ETags.

mod store;

pub use store::BlockStore;
