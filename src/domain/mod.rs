pub mod comment;
pub mod item;
pub mod source;

pub use comment::{CommentBody, CommentNode, CommentTree};
pub use item::{Item, ItemId};
pub use source::{ItemRecord, RawRecord, SearchChild, SearchHit, SourceKind};
