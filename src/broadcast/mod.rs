// src/broadcast/mod.rs
pub mod annotate;
pub mod table;
pub mod text_opinion;

pub use annotate::{BroadcastAnnotator, MemberAnnotation, NeighborhoodOpinion};
pub use table::{BroadcastTable, ABSENT_VALUE};
pub use text_opinion::{TextOpinionTable, UserOpinion};
