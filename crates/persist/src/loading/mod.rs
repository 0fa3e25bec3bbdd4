//! Batched collection loading
//!
//! [`CollectionSqlBuilder`] turns a [`JoinPlan`](crate::mapping::JoinPlan)
//! into a static select once per role; [`CollectionLoader`] binds owner keys
//! into it and groups the returned rows by owner.

pub mod batch;
pub mod collection_loader;
pub mod sql_builder;

pub use batch::{BatchKeySet, OwnerKey};
pub use collection_loader::{CollectionLoader, CollectionRow, LoadedCollections, LoaderConfig};
pub use sql_builder::{
    CollectionSqlBuilder, ColumnSlot, KeyRestriction, RowLayout, SelectColumn, StaticSelectStatement,
};
