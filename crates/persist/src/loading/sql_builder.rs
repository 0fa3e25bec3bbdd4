//! Static select generation for collection loading
//!
//! A [`JoinPlan`] plus a batch size becomes one immutable SQL text. The
//! selected column order is fixed here and hydration reads rows by position,
//! so the layout recorded in [`StaticSelectStatement`] is part of the
//! statement's contract.

use std::collections::HashSet;

use crate::backends::SqlDialect;
use crate::error::{OrmError, OrmResult};
use crate::mapping::{render_template, JoinPlan};

/// What a selected column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnSlot {
    OwnerKey(usize),
    Index(usize),
    Element(usize),
    Joined { join: usize, column: usize },
}

/// One entry of the select list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    /// Qualified column, e.g. `c.order_id`
    pub expression: String,
    pub alias: String,
    pub slot: ColumnSlot,
}

/// Positions of each column group in a result row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowLayout {
    pub key: Vec<usize>,
    pub index: Vec<usize>,
    pub element: Vec<usize>,
    /// One position list per join step, in join order
    pub joined: Vec<Vec<usize>>,
}

/// How the owning key is restricted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRestriction {
    /// One parameter group per owner key
    Batch { groups: usize },
    /// Keys come from an embedded subquery
    Subquery,
}

/// Generated SQL for one collection role.
///
/// For batch restrictions the statement expects exactly
/// `parameter_groups() * key_width()` bind parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSelectStatement {
    role: String,
    sql: String,
    columns: Vec<SelectColumn>,
    layout: RowLayout,
    key_width: usize,
    restriction: KeyRestriction,
}

impl StaticSelectStatement {
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn columns(&self) -> &[SelectColumn] {
        &self.columns
    }

    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    /// Number of columns in the owning key
    pub fn key_width(&self) -> usize {
        self.key_width
    }

    pub fn restriction(&self) -> KeyRestriction {
        self.restriction
    }

    /// Owner keys one execution can bind; zero for subquery restrictions
    pub fn parameter_groups(&self) -> usize {
        match self.restriction {
            KeyRestriction::Batch { groups } => groups,
            KeyRestriction::Subquery => 0,
        }
    }

    /// Bind parameters the key restriction expects
    pub fn parameter_count(&self) -> usize {
        self.parameter_groups() * self.key_width
    }

    pub fn is_subselect(&self) -> bool {
        self.restriction == KeyRestriction::Subquery
    }
}

/// Builds static selects in a given placeholder style
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionSqlBuilder {
    dialect: SqlDialect,
}

impl CollectionSqlBuilder {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Build the static select for `plan`.
    ///
    /// With a `subquery` the owning key is matched against the subquery's
    /// result and `batch_size` is ignored.
    pub fn build(
        &self,
        plan: &JoinPlan,
        batch_size: usize,
        subquery: Option<&str>,
    ) -> OrmResult<StaticSelectStatement> {
        validate_plan(plan, self.dialect)?;

        let restriction = match subquery {
            Some(subquery) if subquery.trim().is_empty() => {
                return Err(OrmError::Mapping(format!(
                    "Empty subquery supplied for collection role '{}'",
                    plan.role()
                )));
            }
            Some(_) => KeyRestriction::Subquery,
            None if batch_size == 0 => return Err(OrmError::InvalidBatchSize(batch_size)),
            None => KeyRestriction::Batch { groups: batch_size },
        };

        let (columns, layout) = select_columns(plan);

        let mut sql = String::from("SELECT ");
        let select_list: Vec<String> = columns
            .iter()
            .map(|column| format!("{} AS {}", column.expression, column.alias))
            .collect();
        sql.push_str(&select_list.join(", "));

        sql.push_str(&format!(" FROM {} {}", plan.table(), plan.alias()));
        self.push_joins(&mut sql, plan);

        sql.push_str(" WHERE ");
        match subquery {
            Some(subquery) => push_subquery_restriction(&mut sql, plan, subquery.trim()),
            None => self.push_batch_restriction(&mut sql, plan, batch_size),
        }

        for template in plan.restrictions() {
            sql.push_str(" AND (");
            sql.push_str(&render_template(template, plan.alias()));
            sql.push(')');
        }

        if !plan.ordering().is_empty() {
            let terms: Vec<String> = plan
                .ordering()
                .iter()
                .map(|term| {
                    let alias = term.alias.as_deref().unwrap_or_else(|| plan.alias());
                    format!("{}.{} {}", alias, term.column, term.direction)
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        Ok(StaticSelectStatement {
            role: plan.role().to_string(),
            sql,
            columns,
            layout,
            key_width: plan.key_columns().len(),
            restriction,
        })
    }

    fn push_joins(&self, sql: &mut String, plan: &JoinPlan) {
        for join in plan.joins() {
            sql.push(' ');
            sql.push_str(&join.join_type.to_string());
            sql.push(' ');
            sql.push_str(&join.table);
            sql.push(' ');
            sql.push_str(&join.alias);
            sql.push_str(" ON ");
            for (i, (left, right)) in join.on_conditions.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" AND ");
                }
                sql.push_str(&format!("{}.{} = {}.{}", join.parent_alias, left, join.alias, right));
            }
            if let Some(template) = &join.restriction {
                sql.push_str(" AND (");
                sql.push_str(&render_template(template, &join.alias));
                sql.push(')');
            }
        }
    }

    /// `c.k IN (?, ?)` for single-column keys, a disjunction of
    /// conjunctions for composite keys
    fn push_batch_restriction(&self, sql: &mut String, plan: &JoinPlan, groups: usize) {
        let alias = plan.alias();
        let keys = plan.key_columns();
        let width = keys.len();
        let placeholder = |group: usize, column: usize| self.dialect.parameter_placeholder(group * width + column);

        if width == 1 {
            if groups == 1 {
                sql.push_str(&format!("{}.{} = {}", alias, keys[0], placeholder(0, 0)));
            } else {
                let placeholders: Vec<String> = (0..groups).map(|g| placeholder(g, 0)).collect();
                sql.push_str(&format!("{}.{} IN ({})", alias, keys[0], placeholders.join(", ")));
            }
            return;
        }

        let conjunction = |group: usize| {
            keys.iter()
                .enumerate()
                .map(|(c, key)| format!("{}.{} = {}", alias, key, placeholder(group, c)))
                .collect::<Vec<_>>()
                .join(" AND ")
        };

        if groups == 1 {
            sql.push_str(&conjunction(0));
        } else {
            let disjuncts: Vec<String> = (0..groups).map(|g| format!("({})", conjunction(g))).collect();
            sql.push('(');
            sql.push_str(&disjuncts.join(" OR "));
            sql.push(')');
        }
    }
}

fn push_subquery_restriction(sql: &mut String, plan: &JoinPlan, subquery: &str) {
    let alias = plan.alias();
    let keys = plan.key_columns();

    if keys.len() == 1 {
        sql.push_str(&format!("{}.{} IN ({})", alias, keys[0], subquery));
    } else {
        let qualified: Vec<String> = keys.iter().map(|key| format!("{}.{}", alias, key)).collect();
        sql.push_str(&format!("({}) IN ({})", qualified.join(", "), subquery));
    }
}

/// Keys, then index, then element columns, then each join's columns
fn select_columns(plan: &JoinPlan) -> (Vec<SelectColumn>, RowLayout) {
    let mut columns = Vec::new();
    let mut layout = RowLayout::default();
    let alias = plan.alias();

    for (i, column) in plan.key_columns().iter().enumerate() {
        layout.key.push(columns.len());
        columns.push(SelectColumn {
            expression: format!("{}.{}", alias, column),
            alias: format!("k{}_", i),
            slot: ColumnSlot::OwnerKey(i),
        });
    }

    for (i, column) in plan.index_columns().iter().enumerate() {
        layout.index.push(columns.len());
        columns.push(SelectColumn {
            expression: format!("{}.{}", alias, column),
            alias: format!("i{}_", i),
            slot: ColumnSlot::Index(i),
        });
    }

    for (i, column) in plan.element_columns().iter().enumerate() {
        layout.element.push(columns.len());
        columns.push(SelectColumn {
            expression: format!("{}.{}", alias, column),
            alias: format!("e{}_", i),
            slot: ColumnSlot::Element(i),
        });
    }

    for (j, join) in plan.joins().iter().enumerate() {
        let mut positions = Vec::with_capacity(join.columns.len());
        for (i, column) in join.columns.iter().enumerate() {
            positions.push(columns.len());
            columns.push(SelectColumn {
                expression: format!("{}.{}", join.alias, column),
                alias: format!("j{}_{}_", j, i),
                slot: ColumnSlot::Joined { join: j, column: i },
            });
        }
        layout.joined.push(positions);
    }

    (columns, layout)
}

fn validate_plan(plan: &JoinPlan, dialect: SqlDialect) -> OrmResult<()> {
    let role = plan.role();

    if !plan.is_queryable() {
        return Err(OrmError::Mapping(format!(
            "Collection role '{}' of kind {:?} has no queryable representation and needs a dedicated loader",
            role,
            plan.kind()
        )));
    }

    if plan.key_columns().is_empty() {
        return Err(OrmError::Mapping(format!("Collection role '{}' declares no owning key columns", role)));
    }

    let joined_columns: usize = plan.joins().iter().map(|join| join.columns.len()).sum();
    if plan.element_columns().is_empty() && joined_columns == 0 {
        return Err(OrmError::Mapping(format!("Collection role '{}' selects no element columns", role)));
    }

    let mut aliases = HashSet::new();
    aliases.insert(plan.alias());
    for join in plan.joins() {
        if !aliases.contains(join.parent_alias.as_str()) {
            return Err(OrmError::Mapping(format!(
                "Join to '{}' in role '{}' starts from unknown alias '{}'",
                join.table, role, join.parent_alias
            )));
        }
        if !aliases.insert(join.alias.as_str()) {
            return Err(OrmError::Mapping(format!(
                "Alias '{}' is used twice in role '{}'",
                join.alias, role
            )));
        }
        if join.on_conditions.is_empty() {
            return Err(OrmError::Mapping(format!(
                "Join to '{}' in role '{}' has no join condition",
                join.table, role
            )));
        }
    }

    let templates = plan
        .restrictions()
        .iter()
        .chain(plan.joins().iter().filter_map(|join| join.restriction.as_ref()));
    for template in templates {
        if has_bind_placeholder(template, dialect) {
            return Err(OrmError::Mapping(format!(
                "Restriction '{}' in role '{}' contains a bind parameter; static selects bind owner keys only",
                template, role
            )));
        }
    }

    for term in plan.ordering() {
        if let Some(alias) = &term.alias {
            if !aliases.contains(alias.as_str()) {
                return Err(OrmError::Mapping(format!(
                    "Ordering on '{}.{}' in role '{}' refers to an unknown alias",
                    alias, term.column, role
                )));
            }
        }
    }

    Ok(())
}

/// Placeholder syntax of `dialect` outside quoted literals and identifiers.
///
/// `$n` only binds under PostgreSQL, where a bare `?` is the jsonb operator.
fn has_bind_placeholder(fragment: &str, dialect: SqlDialect) -> bool {
    let numbered = dialect == SqlDialect::PostgreSQL;
    let mut quote: Option<char> = None;
    let mut chars = fragment.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            // a doubled quote closes and reopens, which leaves us inside
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '?' if !numbered => return true,
                '$' if numbered && chars.peek().map_or(false, char::is_ascii_digit) => return true,
                _ => {}
            },
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{CollectionKind, JoinStep, JoinType, OrderDirection};
    use sqlparser::dialect::{GenericDialect, PostgreSqlDialect};
    use sqlparser::parser::Parser;

    fn order_items() -> JoinPlan {
        JoinPlan::new("Order.items", CollectionKind::ElementTable, "order_items")
            .with_key_columns(&["order_id"])
            .with_index_columns(&["position"])
            .with_element_columns(&["product_id", "quantity"])
            .with_join(
                JoinStep::new(JoinType::Left, "products", "p", "c")
                    .on("product_id", "id")
                    .select(&["name", "price"]),
            )
            .order_by_index()
    }

    fn composite_owner() -> JoinPlan {
        JoinPlan::new("Shipment.parcels", CollectionKind::OneToMany, "parcels")
            .with_alias("pc")
            .with_key_columns(&["carrier_code", "shipment_no"])
            .with_element_columns(&["id", "weight"])
    }

    fn assert_parses(sql: &str) {
        Parser::parse_sql(&PostgreSqlDialect {}, sql).unwrap_or_else(|e| panic!("{}: {}", e, sql));
    }

    #[test]
    fn test_batched_select() {
        let statement = CollectionSqlBuilder::new(SqlDialect::PostgreSQL)
            .build(&order_items(), 3, None)
            .unwrap();

        assert_eq!(
            statement.sql(),
            "SELECT c.order_id AS k0_, c.position AS i0_, c.product_id AS e0_, c.quantity AS e1_, \
             p.name AS j0_0_, p.price AS j0_1_ \
             FROM order_items c LEFT JOIN products p ON c.product_id = p.id \
             WHERE c.order_id IN ($1, $2, $3) ORDER BY c.position ASC"
        );
        assert_eq!(statement.parameter_groups(), 3);
        assert_eq!(statement.parameter_count(), 3);
        assert_eq!(statement.role(), "Order.items");
        assert_parses(statement.sql());
    }

    #[test]
    fn test_column_layout_is_positional() {
        let statement = CollectionSqlBuilder::default().build(&order_items(), 1, None).unwrap();

        let layout = statement.layout();
        assert_eq!(layout.key, vec![0]);
        assert_eq!(layout.index, vec![1]);
        assert_eq!(layout.element, vec![2, 3]);
        assert_eq!(layout.joined, vec![vec![4, 5]]);

        let slots: Vec<ColumnSlot> = statement.columns().iter().map(|c| c.slot).collect();
        assert_eq!(
            slots,
            vec![
                ColumnSlot::OwnerKey(0),
                ColumnSlot::Index(0),
                ColumnSlot::Element(0),
                ColumnSlot::Element(1),
                ColumnSlot::Joined { join: 0, column: 0 },
                ColumnSlot::Joined { join: 0, column: 1 },
            ]
        );
    }

    #[test]
    fn test_single_key_uses_equality() {
        let statement = CollectionSqlBuilder::default().build(&order_items(), 1, None).unwrap();
        assert!(statement.sql().contains("WHERE c.order_id = ? ORDER BY"));
        assert_eq!(statement.parameter_count(), 1);
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = CollectionSqlBuilder::new(SqlDialect::PostgreSQL);
        let plan = order_items().with_restriction("{alias}.deleted = false");

        let first = builder.build(&plan, 5, None).unwrap();
        let second = builder.build(&plan, 5, None).unwrap();
        assert_eq!(first.sql(), second.sql());
        assert_eq!(first, second);
    }

    #[test]
    fn test_composite_key_batch() {
        let statement = CollectionSqlBuilder::new(SqlDialect::PostgreSQL)
            .build(&composite_owner(), 2, None)
            .unwrap();

        assert_eq!(
            statement.sql(),
            "SELECT pc.carrier_code AS k0_, pc.shipment_no AS k1_, pc.id AS e0_, pc.weight AS e1_ \
             FROM parcels pc \
             WHERE ((pc.carrier_code = $1 AND pc.shipment_no = $2) OR (pc.carrier_code = $3 AND pc.shipment_no = $4))"
        );
        assert_eq!(statement.key_width(), 2);
        assert_eq!(statement.parameter_count(), 4);
        assert_parses(statement.sql());

        let single = CollectionSqlBuilder::new(SqlDialect::PostgreSQL)
            .build(&composite_owner(), 1, None)
            .unwrap();
        assert!(single.sql().ends_with("WHERE pc.carrier_code = $1 AND pc.shipment_no = $2"));
    }

    #[test]
    fn test_subquery_ignores_batch_size() {
        let subquery = "SELECT o.id FROM orders o WHERE o.customer_id = $1";
        let builder = CollectionSqlBuilder::new(SqlDialect::PostgreSQL);

        let statement = builder.build(&order_items(), 25, Some(subquery)).unwrap();
        assert!(statement.is_subselect());
        assert_eq!(statement.parameter_groups(), 0);
        assert!(statement
            .sql()
            .contains("WHERE c.order_id IN (SELECT o.id FROM orders o WHERE o.customer_id = $1) ORDER BY"));
        assert_eq!(statement.sql(), builder.build(&order_items(), 1, Some(subquery)).unwrap().sql());
        assert_eq!(statement.sql(), builder.build(&order_items(), 0, Some(subquery)).unwrap().sql());
        assert_parses(statement.sql());

        let composite = builder
            .build(&composite_owner(), 4, Some("SELECT s.carrier_code, s.shipment_no FROM shipments s"))
            .unwrap();
        assert!(composite
            .sql()
            .ends_with("WHERE (pc.carrier_code, pc.shipment_no) IN (SELECT s.carrier_code, s.shipment_no FROM shipments s)"));
    }

    #[test]
    fn test_restrictions_and_join_conditions() {
        let plan = JoinPlan::new("User.roles", CollectionKind::ElementTable, "user_roles")
            .with_alias("ur")
            .with_key_columns(&["user_id"])
            .with_join(
                JoinStep::new(JoinType::Inner, "roles", "r", "ur")
                    .on("role_id", "id")
                    .on("tenant_id", "tenant_id")
                    .select(&["id", "name"])
                    .with_restriction("{alias}.active = true"),
            )
            .with_restriction("{alias}.revoked_at IS NULL")
            .order_by_joined("r", "name", OrderDirection::Desc);

        let statement = CollectionSqlBuilder::default().build(&plan, 2, None).unwrap();
        assert_eq!(
            statement.sql(),
            "SELECT ur.user_id AS k0_, r.id AS j0_0_, r.name AS j0_1_ FROM user_roles ur \
             INNER JOIN roles r ON ur.role_id = r.id AND ur.tenant_id = r.tenant_id AND (r.active = true) \
             WHERE ur.user_id IN (?, ?) AND (ur.revoked_at IS NULL) ORDER BY r.name DESC"
        );
        Parser::parse_sql(&GenericDialect {}, statement.sql()).unwrap();
    }

    #[test]
    fn test_unqueryable_role_is_mapping_error() {
        let plan = JoinPlan::new("Order.totals", CollectionKind::Derived, "order_totals")
            .with_key_columns(&["order_id"])
            .with_element_columns(&["amount"]);

        let err = CollectionSqlBuilder::default().build(&plan, 1, None).unwrap_err();
        assert!(matches!(err, OrmError::Mapping(ref msg) if msg.contains("Order.totals")));
    }

    #[test]
    fn test_malformed_plans_are_rejected() {
        let builder = CollectionSqlBuilder::default();

        let no_keys = JoinPlan::new("A.b", CollectionKind::OneToMany, "b").with_element_columns(&["id"]);
        assert!(matches!(builder.build(&no_keys, 1, None), Err(OrmError::Mapping(_))));

        let no_elements = JoinPlan::new("A.b", CollectionKind::OneToMany, "b").with_key_columns(&["a_id"]);
        assert!(matches!(builder.build(&no_elements, 1, None), Err(OrmError::Mapping(_))));

        let unknown_parent = order_items().with_join(JoinStep::new(JoinType::Inner, "x", "x", "zz").on("a", "b").select(&["id"]));
        assert!(matches!(builder.build(&unknown_parent, 1, None), Err(OrmError::Mapping(_))));

        let duplicate_alias =
            order_items().with_join(JoinStep::new(JoinType::Inner, "x", "p", "c").on("a", "b").select(&["id"]));
        assert!(matches!(builder.build(&duplicate_alias, 1, None), Err(OrmError::Mapping(_))));

        let bound_filter = order_items().with_restriction("{alias}.region = ?");
        assert!(matches!(builder.build(&bound_filter, 1, None), Err(OrmError::Mapping(_))));

        let numbered_filter = order_items().with_restriction("{alias}.region = $1");
        assert!(matches!(
            CollectionSqlBuilder::new(SqlDialect::PostgreSQL).build(&numbered_filter, 1, None),
            Err(OrmError::Mapping(_))
        ));

        assert!(matches!(builder.build(&order_items(), 0, None), Err(OrmError::InvalidBatchSize(0))));
        assert!(matches!(builder.build(&order_items(), 1, Some("  ")), Err(OrmError::Mapping(_))));
    }

    #[test]
    fn test_quoted_question_marks_are_not_parameters() {
        let notes = JoinPlan::new("Order.notes", CollectionKind::OneToMany, "order_notes")
            .with_key_columns(&["order_id"])
            .with_element_columns(&["body"])
            .with_restriction("{alias}.kind <> 'why?'")
            .with_restriction("{alias}.\"tag?\" IS NOT NULL")
            .with_restriction("{alias}.body <> 'it''s $1?'");

        for dialect in [SqlDialect::Ansi, SqlDialect::MySQL, SqlDialect::PostgreSQL] {
            let statement = CollectionSqlBuilder::new(dialect).build(&notes, 2, None).unwrap();
            assert!(statement.sql().contains("c.kind <> 'why?'"));
        }
    }

    #[test]
    fn test_placeholder_syntax_follows_dialect() {
        let jsonb = order_items().with_restriction("{alias}.attributes ? 'gift'");
        let postgres = CollectionSqlBuilder::new(SqlDialect::PostgreSQL).build(&jsonb, 1, None).unwrap();
        assert!(postgres.sql().contains("c.attributes ? 'gift'"));
        assert!(matches!(
            CollectionSqlBuilder::new(SqlDialect::MySQL).build(&jsonb, 1, None),
            Err(OrmError::Mapping(_))
        ));

        let dollar_literal = order_items().with_restriction("{alias}.note <> $1");
        assert!(CollectionSqlBuilder::new(SqlDialect::MySQL).build(&dollar_literal, 1, None).is_ok());
    }

    #[test]
    fn test_generated_sql_parses_for_many_batch_sizes() {
        let builder = CollectionSqlBuilder::new(SqlDialect::PostgreSQL);
        for batch_size in [1, 2, 7, 16] {
            let statement = builder.build(&composite_owner(), batch_size, None).unwrap();
            assert_eq!(statement.parameter_count(), batch_size * 2);
            assert_parses(statement.sql());
        }
    }
}
