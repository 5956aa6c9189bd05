//! The unified index interface.
//!
//! Every index variant implements [`Index`]: flat (exact), PQ (compressed
//! codes), IVF (inverted lists over a coarse quantizer), a PCA pre-transform
//! wrapper and an exact re-ranking wrapper.
//!
//! # Index Factory
//!
//! Use [`index_factory`] to create indexes from string descriptions:
//!
//! ```
//! use vecquant::ann::{index_factory, Index};
//!
//! let mut index = index_factory(4, "Flat").unwrap();
//! index.add(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
//! let res = index.search(&[1.0, 1.0, 1.0, 0.9], 1).unwrap();
//! assert_eq!(res.labels(), &[1]);
//! ```

pub mod factory;
pub mod results;
pub mod traits;

pub use factory::{
    index_factory, index_factory_with_metric, AnyIndex, CoarseStage, Encoding, IndexDescriptor,
    TransformStage,
};
pub use results::SearchResults;
pub use traits::{Index, IndexStats};
