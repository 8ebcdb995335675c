//! Graph model and the merge step producing it

mod model;
mod unify;

pub use model::{
    Alias, Confidence, Edge, EdgeKind, EdgeTarget, Entity, EntityKind, Graph, RawEdge,
    Visibility, EXTERNAL_ID,
};
pub use unify::{PartialGraph, Unifier};
