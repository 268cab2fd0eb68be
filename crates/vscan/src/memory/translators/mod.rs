//! Address translation.
//!
//! - `PageWalker` - x86-64 4-level paging with optional EPT nesting, LRU cached
//! - `ept` - Extended Page Table entry decoding

pub mod ept;
pub mod intel64;

pub use intel64::PageWalker;
