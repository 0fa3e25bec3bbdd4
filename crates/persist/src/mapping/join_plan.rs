//! Join plans describing how a collection role is read from the database

use std::fmt;

use serde::{Deserialize, Serialize};

/// Token replaced by the owning table alias in restriction templates
pub const ALIAS_TOKEN: &str = "{alias}";

/// How a collection role is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    /// Values or associations held in a dedicated collection table
    ElementTable,
    /// Rows of the associated entity's own table, keyed by a foreign key
    OneToMany,
    /// Computed or formula-backed; has no table a static select can read
    Derived,
}

impl CollectionKind {
    /// Returns true if a static select can load this collection
    pub fn is_queryable(self) -> bool {
        matches!(self, Self::ElementTable | Self::OneToMany)
    }
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// One join from an already joined table to an associated table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinStep {
    pub join_type: JoinType,
    pub table: String,
    pub alias: String,
    /// Alias of the table this step joins from
    pub parent_alias: String,
    /// (parent column, joined column) pairs, ANDed together
    pub on_conditions: Vec<(String, String)>,
    /// Columns of the joined table to select, in order
    pub columns: Vec<String>,
    /// Extra ON predicate; `{alias}` is replaced by this step's alias
    pub restriction: Option<String>,
}

impl JoinStep {
    pub fn new(join_type: JoinType, table: impl Into<String>, alias: impl Into<String>, parent_alias: impl Into<String>) -> Self {
        Self {
            join_type,
            table: table.into(),
            alias: alias.into(),
            parent_alias: parent_alias.into(),
            on_conditions: Vec::new(),
            columns: Vec::new(),
            restriction: None,
        }
    }

    pub fn on(mut self, parent_column: impl Into<String>, joined_column: impl Into<String>) -> Self {
        self.on_conditions.push((parent_column.into(), joined_column.into()));
        self
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn with_restriction(mut self, template: impl Into<String>) -> Self {
        self.restriction = Some(template.into());
        self
    }
}

/// Ordering term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTerm {
    /// Table alias; `None` means the collection table
    pub alias: Option<String>,
    pub column: String,
    pub direction: OrderDirection,
}

/// Everything needed to select one collection role's rows for a set of owners.
///
/// Built once per role by the mapping layer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPlan {
    role: String,
    kind: CollectionKind,
    table: String,
    alias: String,
    key_columns: Vec<String>,
    index_columns: Vec<String>,
    element_columns: Vec<String>,
    joins: Vec<JoinStep>,
    restrictions: Vec<String>,
    ordering: Vec<OrderTerm>,
}

impl JoinPlan {
    /// Create a plan for `role` reading from `table`
    pub fn new(role: impl Into<String>, kind: CollectionKind, table: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            kind,
            table: table.into(),
            alias: "c".to_string(),
            key_columns: Vec::new(),
            index_columns: Vec::new(),
            element_columns: Vec::new(),
            joins: Vec::new(),
            restrictions: Vec::new(),
            ordering: Vec::new(),
        }
    }

    /// Set the alias of the collection table (defaults to "c")
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Owning key columns, in identifier order
    pub fn with_key_columns(mut self, columns: &[&str]) -> Self {
        self.key_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// List index or map key columns
    pub fn with_index_columns(mut self, columns: &[&str]) -> Self {
        self.index_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Element value columns
    pub fn with_element_columns(mut self, columns: &[&str]) -> Self {
        self.element_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_join(mut self, join: JoinStep) -> Self {
        self.joins.push(join);
        self
    }

    /// Add a restriction predicate template (the collection's `where`
    /// fragment or an enabled filter); `{alias}` is substituted at build time
    pub fn with_restriction(mut self, template: impl Into<String>) -> Self {
        self.restrictions.push(template.into());
        self
    }

    /// Add an ordering term on the collection table
    pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.ordering.push(OrderTerm {
            alias: None,
            column: column.into(),
            direction,
        });
        self
    }

    /// Add an ordering term on a joined table
    pub fn order_by_joined(mut self, alias: impl Into<String>, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.ordering.push(OrderTerm {
            alias: Some(alias.into()),
            column: column.into(),
            direction,
        });
        self
    }

    /// Order ascending by every index column, as list collections require
    pub fn order_by_index(mut self) -> Self {
        let terms: Vec<OrderTerm> = self
            .index_columns
            .iter()
            .map(|column| OrderTerm {
                alias: None,
                column: column.clone(),
                direction: OrderDirection::Asc,
            })
            .collect();
        self.ordering.extend(terms);
        self
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn index_columns(&self) -> &[String] {
        &self.index_columns
    }

    pub fn element_columns(&self) -> &[String] {
        &self.element_columns
    }

    pub fn joins(&self) -> &[JoinStep] {
        &self.joins
    }

    pub fn restrictions(&self) -> &[String] {
        &self.restrictions
    }

    pub fn ordering(&self) -> &[OrderTerm] {
        &self.ordering
    }

    pub fn is_queryable(&self) -> bool {
        self.kind.is_queryable()
    }
}

/// Substitute `alias` for every `{alias}` token in a restriction template
pub fn render_template(template: &str, alias: &str) -> String {
    template.replace(ALIAS_TOKEN, alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queryable_kinds() {
        assert!(CollectionKind::ElementTable.is_queryable());
        assert!(CollectionKind::OneToMany.is_queryable());
        assert!(!CollectionKind::Derived.is_queryable());
    }

    #[test]
    fn test_order_by_index_uses_index_columns() {
        let plan = JoinPlan::new("Order.lines", CollectionKind::ElementTable, "order_lines")
            .with_key_columns(&["order_id"])
            .with_index_columns(&["position"])
            .with_element_columns(&["sku"])
            .order_by_index();

        assert_eq!(
            plan.ordering(),
            &[OrderTerm {
                alias: None,
                column: "position".to_string(),
                direction: OrderDirection::Asc,
            }]
        );
    }

    #[test]
    fn test_render_template() {
        assert_eq!(
            render_template("{alias}.deleted = false AND {alias}.qty > 0", "c"),
            "c.deleted = false AND c.qty > 0"
        );
    }
}
