//! Filesystem tree and node types.

pub(crate) mod node;
pub(crate) mod resolver;
pub mod tree;

pub use node::{Node, NodeMeta, NodeType, Quota};
pub use resolver::BAD_ATTRIBUTE;
pub use tree::MegaFs;
