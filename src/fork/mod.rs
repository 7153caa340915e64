//! Fork-tree consistency: size limits, subject root assignment and the
//! repository lifecycle operations that move `fork_id` pointers.

mod lifecycle;
mod limiter;
mod root;

pub use lifecycle::{
    DeleteOutcome, PushOutcome, create_repository, delete_repository, fork_repository, record_push,
};
pub use limiter::{
    DEFAULT_ROOT_SEARCH_DEPTH, ForkTreeLimiter, TreeLimit, count_tree_nodes, find_tree_root,
};
pub use root::{RootAssignment, assign_root, assign_root_in};
