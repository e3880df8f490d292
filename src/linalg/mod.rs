//! Gid-addressed maps, vectors and sparse (block) matrices for a single process.

pub mod block;
pub mod map;
pub mod sparse;

pub use block::BlockSparseMatrix;
pub use map::{DofMap, MapExtractor, MultiMapExtractor, export_vector};
pub use sparse::SparseMatrix;
