//! Element tree, FSH path parsing and soft indexing

pub mod element_tree;
pub mod path;
pub mod soft_index;

pub use element_tree::{ElementIdx, ElementTree, slice_id, unsliced_id};
pub use path::{Bracket, PathError, PathSegment, SoftIndexOp, join_path, parse_path};
pub use soft_index::SoftIndexCursor;
