//! Batched collection loading
//!
//! A [`CollectionLoader`] generates its static select once at construction
//! and is immutable afterwards, so one instance can serve concurrent loads.
//! Each load binds its own parameters, executes once and groups the rows by
//! owning key.

use std::sync::Arc;

use tracing::debug;

use crate::backends::{DatabaseConnection, DatabaseRow, DatabaseValue, SqlDialect};
use crate::error::{OrmError, OrmResult};
use crate::mapping::JoinPlan;
use crate::translation::{ErrorTranslator, RawDatabaseError};

use super::batch::{BatchKeySet, OwnerKey};
use super::sql_builder::{CollectionSqlBuilder, StaticSelectStatement};

const LOAD_CALL_SITE: &str = "CollectionLoader::load";
const SUBSELECT_CALL_SITE: &str = "CollectionLoader::load_subselect";

/// Value bound to unused parameter groups; NULL never equals a key
const PADDING: DatabaseValue = DatabaseValue::Null;

/// Configuration for collection loaders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Maximum number of owner keys loaded per round trip
    pub batch_size: usize,
    /// Placeholder style of the generated SQL
    pub dialect: SqlDialect,
    /// Restrict owners by this subquery instead of bound keys
    pub subquery: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            dialect: SqlDialect::default(),
            subquery: None,
        }
    }
}

impl LoaderConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_subquery(mut self, subquery: impl Into<String>) -> Self {
        self.subquery = Some(subquery.into());
        self
    }
}

/// One hydrated collection entry
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRow {
    index: Vec<DatabaseValue>,
    element: Vec<DatabaseValue>,
    associations: Vec<Vec<DatabaseValue>>,
}

impl CollectionRow {
    /// List index or map key values; empty for bags and sets
    pub fn index(&self) -> &[DatabaseValue] {
        &self.index
    }

    pub fn element(&self) -> &[DatabaseValue] {
        &self.element
    }

    /// Values selected by each join step, in join order
    pub fn associations(&self) -> &[Vec<DatabaseValue>] {
        &self.associations
    }
}

/// Collection contents per owner key, in batch order
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedCollections {
    role: String,
    entries: Vec<(OwnerKey, Vec<CollectionRow>)>,
}

impl LoadedCollections {
    fn empty(role: &str, owners: impl IntoIterator<Item = OwnerKey>) -> Self {
        Self {
            role: role.to_string(),
            entries: owners.into_iter().map(|key| (key, Vec::new())).collect(),
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Rows for `key` in result set order; `None` if the key was not loaded
    pub fn get(&self, key: &OwnerKey) -> Option<&[CollectionRow]> {
        self.entries
            .iter()
            .find(|(owner, _)| owner.matches(key.values()))
            .map(|(_, rows)| rows.as_slice())
    }

    pub fn contains(&self, key: &OwnerKey) -> bool {
        self.get(key).is_some()
    }

    pub fn owners(&self) -> impl Iterator<Item = &OwnerKey> {
        self.entries.iter().map(|(owner, _)| owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OwnerKey, &[CollectionRow])> {
        self.entries.iter().map(|(owner, rows)| (owner, rows.as_slice()))
    }

    /// Number of owners
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.entries.iter().map(|(_, rows)| rows.len()).sum()
    }

    pub fn into_entries(self) -> Vec<(OwnerKey, Vec<CollectionRow>)> {
        self.entries
    }
}

/// Loader for one collection role
#[derive(Debug, Clone)]
pub struct CollectionLoader {
    plan: Arc<JoinPlan>,
    statement: Arc<StaticSelectStatement>,
    translator: Arc<dyn ErrorTranslator>,
}

impl CollectionLoader {
    /// Generate the static select for `plan` and build the loader
    pub fn new(plan: Arc<JoinPlan>, translator: Arc<dyn ErrorTranslator>, config: LoaderConfig) -> OrmResult<Self> {
        let statement = CollectionSqlBuilder::new(config.dialect).build(
            &plan,
            config.batch_size,
            config.subquery.as_deref(),
        )?;

        debug!(role = %plan.role(), sql = %statement.sql(), "Static select for collection");

        Ok(Self {
            plan,
            statement: Arc::new(statement),
            translator,
        })
    }

    pub fn plan(&self) -> &JoinPlan {
        &self.plan
    }

    pub fn statement(&self) -> &StaticSelectStatement {
        &self.statement
    }

    pub fn role(&self) -> &str {
        self.plan.role()
    }

    /// Owner keys a single `load` call accepts
    pub fn batch_size(&self) -> usize {
        self.statement.parameter_groups()
    }

    /// Load the collections of every owner in `keys` in one round trip.
    ///
    /// Parameter groups beyond `keys.len()` are bound to NULL. Every key in
    /// the batch gets an entry in the result, possibly empty.
    pub async fn load(&self, conn: &mut dyn DatabaseConnection, keys: &BatchKeySet) -> OrmResult<LoadedCollections> {
        if self.statement.is_subselect() {
            return Err(OrmError::Mapping(format!(
                "Loader for role '{}' is restricted by a subquery; use load_subselect",
                self.role()
            )));
        }
        if keys.is_empty() {
            return Ok(LoadedCollections::empty(self.role(), Vec::new()));
        }

        let groups = self.statement.parameter_groups();
        let width = self.statement.key_width();
        if keys.len() > groups {
            return Err(OrmError::InvalidKey(format!(
                "{} owner keys supplied to role '{}' which loads at most {} per batch",
                keys.len(),
                self.role(),
                groups
            )));
        }
        if keys.key_width() != Some(width) {
            return Err(OrmError::InvalidKey(format!(
                "Owner keys for role '{}' must have {} columns",
                self.role(),
                width
            )));
        }

        let mut params = Vec::with_capacity(self.statement.parameter_count());
        for key in keys.iter() {
            params.extend(key.values().iter().cloned());
        }
        params.resize(self.statement.parameter_count(), PADDING);

        debug!(role = %self.role(), keys = keys.len(), padded = groups - keys.len(), "Loading collection batch");

        let message = || format!("could not initialize a collection batch: [{}#{}]", self.role(), keys);
        let rows = conn
            .fetch_all(self.statement.sql(), &params)
            .await
            .map_err(|raw| self.translate(raw, LOAD_CALL_SITE, message()))?;

        self.group_rows(rows, keys.iter().cloned())
            .map_err(|raw| self.translate(raw, LOAD_CALL_SITE, message()))
    }

    /// Load a single owner's collection
    pub async fn load_one(
        &self,
        conn: &mut dyn DatabaseConnection,
        key: impl Into<OwnerKey>,
    ) -> OrmResult<Vec<CollectionRow>> {
        let key = key.into();
        let mut keys = BatchKeySet::new(self.batch_size().max(1))?;
        keys.insert(key.clone())?;

        let loaded = self.load(conn, &keys).await?;
        Ok(loaded
            .into_entries()
            .into_iter()
            .find(|(owner, _)| owner.matches(key.values()))
            .map(|(_, rows)| rows)
            .unwrap_or_default())
    }

    /// Load collections through the subquery the loader was built with.
    ///
    /// `params` are bound to the subquery's own placeholders. Every owner
    /// in `owners` gets an entry; rows for other owners are dropped.
    pub async fn load_subselect(
        &self,
        conn: &mut dyn DatabaseConnection,
        owners: &[OwnerKey],
        params: &[DatabaseValue],
    ) -> OrmResult<LoadedCollections> {
        if !self.statement.is_subselect() {
            return Err(OrmError::Mapping(format!(
                "Loader for role '{}' was not built with a subquery",
                self.role()
            )));
        }
        if let Some(bad) = owners.iter().find(|key| key.width() != self.statement.key_width()) {
            return Err(OrmError::InvalidKey(format!(
                "Owner key {} for role '{}' must have {} columns",
                bad,
                self.role(),
                self.statement.key_width()
            )));
        }

        let message = || format!("could not load collection by subselect: [{}]", self.role());
        let rows = conn
            .fetch_all(self.statement.sql(), params)
            .await
            .map_err(|raw| self.translate(raw, SUBSELECT_CALL_SITE, message()))?;

        self.group_rows(rows, owners.iter().cloned())
            .map_err(|raw| self.translate(raw, SUBSELECT_CALL_SITE, message()))
    }

    fn group_rows(
        &self,
        rows: Vec<Box<dyn DatabaseRow>>,
        owners: impl IntoIterator<Item = OwnerKey>,
    ) -> Result<LoadedCollections, RawDatabaseError> {
        let mut loaded = LoadedCollections::empty(self.role(), owners);
        let layout = self.statement.layout();
        let expected_columns = self.statement.columns().len();

        for row in rows {
            if row.column_count() < expected_columns {
                return Err(RawDatabaseError::new(format!(
                    "result row has {} columns, static select for '{}' selects {}",
                    row.column_count(),
                    self.role(),
                    expected_columns
                )));
            }

            let key = read_values(row.as_ref(), &layout.key)?;
            let Some((_, entries)) = loaded.entries.iter_mut().find(|(owner, _)| owner.matches(&key)) else {
                debug!(role = %self.role(), "Ignoring row for an owner outside the batch");
                continue;
            };

            let associations = layout
                .joined
                .iter()
                .map(|positions| read_values(row.as_ref(), positions))
                .collect::<Result<Vec<_>, _>>()?;

            entries.push(CollectionRow {
                index: read_values(row.as_ref(), &layout.index)?,
                element: read_values(row.as_ref(), &layout.element)?,
                associations,
            });
        }

        Ok(loaded)
    }

    fn translate(&self, raw: RawDatabaseError, call_site: &'static str, message: String) -> OrmError {
        let normalized = self.translator.convert(raw, &message, self.statement.sql());
        debug!(
            role = %self.role(),
            call_site,
            kind = %normalized.kind(),
            "Collection load failed"
        );
        OrmError::CollectionLoad {
            role: self.role().to_string(),
            call_site,
            source: Box::new(normalized),
        }
    }
}

fn read_values(row: &dyn DatabaseRow, positions: &[usize]) -> Result<Vec<DatabaseValue>, RawDatabaseError> {
    positions.iter().map(|&position| row.get_by_index(position)).collect()
}
