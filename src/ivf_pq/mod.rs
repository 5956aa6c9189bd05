//! Product quantization and inverted-file indexes.
//!
//! Two ideas, usable alone or together:
//!
//! 1. **IVF (Inverted File)**: partition space into Voronoi cells with a coarse
//!    k-means quantizer and only scan the `nprobe` cells nearest to a query.
//! 2. **PQ (Product Quantization)**: compress vectors to a few bytes while
//!    preserving distance estimation.
//!
//! ```text
//!           Query
//!             |
//!     +-------+-------+
//!     |               |
//!   Cell A          Cell B      (probe 2 cells)
//!   |__|__|         |__|__|
//!   v  v  v         v  v  v
//!  [codes]         [codes]      (compare within cells)
//! ```
//!
//! ## Product Quantization
//!
//! Split the vector into M subvectors and quantize each one independently
//! with a small codebook of `2^nbits` entries. Only the codebook indices are
//! stored, bit-packed:
//!
//! ```text
//! Original:  [v₁ v₂ v₃ v₄ ... v₆₄]  (64 floats = 256 bytes)
//!            └──┴──┘ └──┴──┘ ... └──┘
//!              ↓       ↓         ↓
//!            [c₁]    [c₂]  ... [cₘ]   (M=4, nbits=8: 4 bytes)
//! ```
//!
//! ## Asymmetric Distance Computation (ADC)
//!
//! The query is never compressed. Distances from each query subvector to
//! every codeword are tabulated once, then the score of any code is M table
//! lookups:
//!
//! ```text
//! d(query, db) ≈ Σᵢ table[i][db_code[i]]
//! ```
//!
//! ## Trade-offs
//!
//! | Parameter | ↑ Effect |
//! |-----------|----------|
//! | nprobe | Better recall, slower search |
//! | nlist | Finer partitioning, slower training |
//! | num_codebooks | More memory, better accuracy |
//!
//! ## References
//!
//! - Jégou, Douze, Schmid (2011). "Product Quantization for Nearest Neighbor Search."

pub mod index;
pub mod pq;
pub mod search;

pub use index::PqIndex;
pub use pq::ProductQuantizer;
pub use search::{IvfEncoding, IvfIndex, IvfParams};
