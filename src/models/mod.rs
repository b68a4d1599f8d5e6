// src/models/mod.rs
pub mod edge;
pub mod member_list;
pub mod post;

pub use edge::SimilarityEdge;
pub use member_list::{format_joined_record, parse_joined_record, MemberList, MentionSet};
pub use post::{Post, RetweetedStatus, UrlRef};
