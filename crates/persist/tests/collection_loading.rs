//! Collection loading against an in-memory connection

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use elif_persist::backends::{DatabaseConnection, DatabaseRow, DatabaseValue, SqlDialect};
use elif_persist::translation::{DatabaseErrorKind, ErrorTranslator, ErrorTranslatorConfig, ErrorTranslatorFactory};
use elif_persist::{
    BatchKeySet, CollectionKind, CollectionLoader, Dialect, JoinPlan, JoinStep, JoinType, LoaderConfig,
    OrmError, OwnerKey, PostgresDialect, RawDatabaseError,
};

// Mock row holding positional values
struct MockRow(Vec<DatabaseValue>);

impl DatabaseRow for MockRow {
    fn get_by_index(&self, index: usize) -> Result<DatabaseValue, RawDatabaseError> {
        self.0
            .get(index)
            .cloned()
            .ok_or_else(|| RawDatabaseError::new(format!("no column at {}", index)))
    }

    fn column_count(&self) -> usize {
        self.0.len()
    }
}

type Executions = Arc<Mutex<Vec<(String, Vec<DatabaseValue>)>>>;

/// Serves `order_items` rows, keeping those whose owner key (column 0)
/// equals one of the bound parameters, like `order_id IN (...)` would
struct MockConnection {
    table: Vec<Vec<DatabaseValue>>,
    filter_by_params: bool,
    failure: Option<RawDatabaseError>,
    executions: Executions,
}

impl MockConnection {
    fn with_rows(table: Vec<Vec<DatabaseValue>>) -> Self {
        Self {
            table,
            filter_by_params: true,
            failure: None,
            executions: Arc::default(),
        }
    }

    fn unfiltered(mut self) -> Self {
        self.filter_by_params = false;
        self
    }

    fn failing(failure: RawDatabaseError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::with_rows(Vec::new())
        }
    }

    fn executions(&self) -> Vec<(String, Vec<DatabaseValue>)> {
        self.executions.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatabaseConnection for MockConnection {
    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> Result<Vec<Box<dyn DatabaseRow>>, RawDatabaseError> {
        self.executions.lock().unwrap().push((sql.to_string(), params.to_vec()));

        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        Ok(self
            .table
            .iter()
            .filter(|row| !self.filter_by_params || params.iter().any(|p| p.key_eq(&row[0])))
            .map(|row| Box::new(MockRow(row.clone())) as Box<dyn DatabaseRow>)
            .collect())
    }
}

fn item(order_id: i64, position: i32, product_id: i64, quantity: i32, name: &str, price: f64) -> Vec<DatabaseValue> {
    vec![
        order_id.into(),
        position.into(),
        product_id.into(),
        quantity.into(),
        name.into(),
        price.into(),
    ]
}

fn order_items_table() -> Vec<Vec<DatabaseValue>> {
    vec![
        item(101, 1, 7, 2, "Widget", 9.5),
        item(102, 0, 8, 1, "Gadget", 24.0),
        item(103, 0, 7, 5, "Widget", 9.5),
        item(101, 0, 9, 1, "Sprocket", 3.25),
    ]
}

fn order_items_plan() -> Arc<JoinPlan> {
    Arc::new(
        JoinPlan::new("Order.items", CollectionKind::ElementTable, "order_items")
            .with_key_columns(&["order_id"])
            .with_index_columns(&["position"])
            .with_element_columns(&["product_id", "quantity"])
            .with_join(
                JoinStep::new(JoinType::Left, "products", "p", "c")
                    .on("product_id", "id")
                    .select(&["name", "price"]),
            ),
    )
}

fn postgres_translator() -> Arc<dyn ErrorTranslator> {
    ErrorTranslatorFactory::default()
        .build(&PostgresDialect, &ErrorTranslatorConfig::new())
        .unwrap()
}

fn loader(batch_size: usize) -> CollectionLoader {
    CollectionLoader::new(
        order_items_plan(),
        postgres_translator(),
        LoaderConfig::default()
            .with_batch_size(batch_size)
            .with_dialect(PostgresDialect.sql_dialect()),
    )
    .unwrap()
}

fn positions(loaded_rows: &[elif_persist::CollectionRow]) -> Vec<DatabaseValue> {
    loaded_rows.iter().map(|row| row.index()[0].clone()).collect()
}

#[tokio::test]
async fn test_partial_batch_is_padded_with_null() {
    let loader = loader(3);
    let mut conn = MockConnection::with_rows(order_items_table());
    let keys = BatchKeySet::from_keys(3, [101i64, 102]).unwrap();

    let loaded = loader.load(&mut conn, &keys).await.unwrap();

    let executions = conn.executions();
    assert_eq!(executions.len(), 1);
    let (sql, params) = &executions[0];
    assert_eq!(sql, loader.statement().sql());
    assert!(sql.contains("WHERE c.order_id IN ($1, $2, $3)"));
    assert_eq!(
        params,
        &vec![DatabaseValue::Int64(101), DatabaseValue::Int64(102), DatabaseValue::Null]
    );

    assert_eq!(loaded.role(), "Order.items");
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.row_count(), 3);
    assert!(!loaded.contains(&OwnerKey::from(103i64)));
}

#[tokio::test]
async fn test_rows_keep_result_set_order_per_owner() {
    let loader = loader(3);
    let mut conn = MockConnection::with_rows(order_items_table());
    let keys = BatchKeySet::from_keys(3, [102i64, 101]).unwrap();

    let loaded = loader.load(&mut conn, &keys).await.unwrap();

    let owners: Vec<String> = loaded.owners().map(ToString::to_string).collect();
    assert_eq!(owners, vec!["102", "101"]);

    let order_101 = loaded.get(&OwnerKey::from(101i64)).unwrap();
    assert_eq!(positions(order_101), vec![DatabaseValue::Int32(1), DatabaseValue::Int32(0)]);
    assert_eq!(order_101[0].element(), &[DatabaseValue::Int64(7), DatabaseValue::Int32(2)]);
    assert_eq!(
        order_101[0].associations(),
        &[vec![DatabaseValue::String("Widget".into()), DatabaseValue::Float64(9.5)]]
    );
}

#[tokio::test]
async fn test_owner_without_rows_gets_empty_collection() {
    let loader = loader(2);
    let mut conn = MockConnection::with_rows(order_items_table());
    let keys = BatchKeySet::from_keys(2, [101i64, 500]).unwrap();

    let loaded = loader.load(&mut conn, &keys).await.unwrap();

    assert_eq!(loaded.get(&OwnerKey::from(500i64)), Some(&[][..]));
    assert_eq!(loaded.get(&OwnerKey::from(101i64)).map(<[_]>::len), Some(2));
}

#[tokio::test]
async fn test_rows_for_unrequested_owners_are_dropped() {
    let loader = loader(2);
    let mut conn = MockConnection::with_rows(order_items_table()).unfiltered();
    let keys = BatchKeySet::from_keys(2, [102i64]).unwrap();

    let loaded = loader.load(&mut conn, &keys).await.unwrap();

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.row_count(), 1);
}

#[tokio::test]
async fn test_constraint_violation_is_translated() {
    let loader = loader(3);
    let failure = RawDatabaseError::new("duplicate key value violates unique constraint \"UQ_ORDER_CODE\"")
        .with_sql_state("23505");
    let mut conn = MockConnection::failing(failure);
    let keys = BatchKeySet::from_keys(3, [101i64, 102]).unwrap();

    let error = loader.load(&mut conn, &keys).await.unwrap_err();

    match &error {
        OrmError::CollectionLoad { role, call_site, source } => {
            assert_eq!(role, "Order.items");
            assert_eq!(*call_site, "CollectionLoader::load");
            assert_eq!(source.kind(), DatabaseErrorKind::ConstraintViolation);
            assert_eq!(source.constraint_name(), Some("UQ_ORDER_CODE"));
            assert_eq!(source.sql(), loader.statement().sql());
            assert_eq!(source.message(), "could not initialize a collection batch: [Order.items#<101, 102>]");
            assert_eq!(source.cause().sql_state(), Some("23505"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(error.normalized().is_some());
    assert!(!error.is_bootstrap_error());
}

#[tokio::test]
async fn test_lock_failure_is_translated() {
    let loader = loader(1);
    let mut conn = MockConnection::failing(RawDatabaseError::new("deadlock detected").with_sql_state("40P01"));
    let keys = BatchKeySet::from_keys(1, [101i64]).unwrap();

    let error = loader.load(&mut conn, &keys).await.unwrap_err();
    assert_eq!(error.normalized().map(|e| e.kind()), Some(DatabaseErrorKind::LockAcquisition));
}

#[tokio::test]
async fn test_short_rows_are_reported_as_load_failures() {
    let loader = loader(1);
    let mut conn = MockConnection::with_rows(vec![vec![DatabaseValue::Int64(101)]]);
    let keys = BatchKeySet::from_keys(1, [101i64]).unwrap();

    let error = loader.load(&mut conn, &keys).await.unwrap_err();
    assert_eq!(error.normalized().map(|e| e.kind()), Some(DatabaseErrorKind::Generic));
}

#[tokio::test]
async fn test_oversized_batch_is_rejected_before_execution() {
    let loader = loader(2);
    let mut conn = MockConnection::with_rows(order_items_table());
    let keys = BatchKeySet::from_keys(3, [101i64, 102, 103]).unwrap();

    let result = loader.load(&mut conn, &keys).await;
    assert!(matches!(result, Err(OrmError::InvalidKey(_))));
    assert!(conn.executions().is_empty());
}

#[tokio::test]
async fn test_composite_keys_against_single_column_loader_are_rejected() {
    let loader = loader(2);
    let mut conn = MockConnection::with_rows(order_items_table());
    let mut keys = BatchKeySet::new(2).unwrap();
    keys.insert(OwnerKey::composite(vec![101i64.into(), 1i64.into()])).unwrap();

    let result = loader.load(&mut conn, &keys).await;
    assert!(matches!(result, Err(OrmError::InvalidKey(_))));
}

#[tokio::test]
async fn test_empty_batch_does_not_execute() {
    let loader = loader(4);
    let mut conn = MockConnection::with_rows(order_items_table());
    let keys = BatchKeySet::new(4).unwrap();

    let loaded = loader.load(&mut conn, &keys).await.unwrap();
    assert!(loaded.is_empty());
    assert!(conn.executions().is_empty());
}

#[tokio::test]
async fn test_load_one_uses_single_key_statement() {
    let loader = CollectionLoader::new(order_items_plan(), postgres_translator(), LoaderConfig::default()).unwrap();
    let mut conn = MockConnection::with_rows(order_items_table());

    let rows = loader.load_one(&mut conn, 101i64).await.unwrap();

    assert_eq!(rows.len(), 2);
    let (sql, params) = &conn.executions()[0];
    assert!(sql.ends_with("WHERE c.order_id = ?"));
    assert_eq!(params, &vec![DatabaseValue::Int64(101)]);
}

#[tokio::test]
async fn test_subselect_load_binds_subquery_parameters() {
    let loader = CollectionLoader::new(
        order_items_plan(),
        postgres_translator(),
        LoaderConfig::default()
            .with_dialect(SqlDialect::PostgreSQL)
            .with_subquery("SELECT o.id FROM orders o WHERE o.customer_id = $1"),
    )
    .unwrap();
    let mut conn = MockConnection::with_rows(order_items_table()).unfiltered();
    let owners = [OwnerKey::from(101i64), OwnerKey::from(102i64)];

    let loaded = loader
        .load_subselect(&mut conn, &owners, &[DatabaseValue::Int64(7)])
        .await
        .unwrap();

    let (sql, params) = &conn.executions()[0];
    assert!(sql.contains("WHERE c.order_id IN (SELECT o.id FROM orders o WHERE o.customer_id = $1)"));
    assert_eq!(params, &vec![DatabaseValue::Int64(7)]);
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.row_count(), 3);
}

#[tokio::test]
async fn test_subselect_loader_rejects_batch_load() {
    let loader = CollectionLoader::new(
        order_items_plan(),
        postgres_translator(),
        LoaderConfig::default().with_subquery("SELECT o.id FROM orders o"),
    )
    .unwrap();
    let mut conn = MockConnection::with_rows(order_items_table());
    let keys = BatchKeySet::from_keys(1, [101i64]).unwrap();

    assert!(matches!(loader.load(&mut conn, &keys).await, Err(OrmError::Mapping(_))));
}

#[tokio::test]
async fn test_loader_is_shared_across_tasks() {
    let loader = Arc::new(loader(2));

    let handles: Vec<_> = [[101i64, 102], [103, 104]]
        .into_iter()
        .map(|batch| {
            let loader = Arc::clone(&loader);
            tokio::spawn(async move {
                let mut conn = MockConnection::with_rows(order_items_table());
                let keys = BatchKeySet::from_keys(2, batch).unwrap();
                loader.load(&mut conn, &keys).await.map(|loaded| loaded.row_count())
            })
        })
        .collect();

    let mut counts = Vec::new();
    for handle in handles {
        counts.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(counts, vec![3, 1]);
}
