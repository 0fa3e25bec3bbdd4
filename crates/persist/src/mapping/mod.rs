//! Collection mapping metadata consumed by the loaders

pub mod join_plan;

pub use join_plan::{
    render_template, CollectionKind, JoinPlan, JoinStep, JoinType, OrderDirection, OrderTerm, ALIAS_TOKEN,
};
