//! Ordering, slicing and filtering attached to a prefetch

use std::collections::BTreeMap;
use std::fmt;

use async_graphql_value::ConstValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, OptimizerResult};
use crate::pagination::{PaginationArgs, PaginationInput};
use crate::schema::{EntityDefinition, FieldKind};

/// Sort direction
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

/// One ordering term on a column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// Parse `name` or `-name`
    pub fn parse(term: &str) -> Self {
        let term = term.trim();
        match term.strip_prefix('-') {
            Some(column) => Self::desc(column),
            None => Self::asc(term),
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            OrderDirection::Asc => write!(f, "{}", self.column),
            OrderDirection::Desc => write!(f, "-{}", self.column),
        }
    }
}

/// Row selection for the query of one plan node: ordering, relay window and
/// the remaining field arguments as filters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryDirective {
    pub order_by: Vec<OrderBy>,
    pub pagination: Option<PaginationArgs>,
    pub filters: BTreeMap<String, ConstValue>,
}

impl QueryDirective {
    /// Derive a directive from the resolved arguments of a field returning `entity`.
    /// Pagination arguments are only recognised on connection fields.
    pub fn from_arguments(
        arguments: &IndexMap<String, ConstValue>,
        entity: &EntityDefinition,
        connection: bool,
        max_page_size: Option<u64>,
    ) -> OptimizerResult<Self> {
        let mut directive = QueryDirective::default();
        let mut pagination = PaginationInput::default();

        let mut ordering: Option<&str> = None;

        for (name, value) in arguments {
            match name.as_str() {
                "orderBy" | "order_by" => {
                    if *value == ConstValue::Null {
                        continue;
                    }
                    if let Some(previous) = ordering {
                        return Err(OptimizerError::argument(
                            name,
                            format!("cannot be combined with `{}`", previous),
                        ));
                    }
                    ordering = Some(name.as_str());
                    directive.order_by = parse_order_by(name, value, entity)?;
                }
                _ if connection && pagination.set(name, value.clone()) => {}
                _ if *value == ConstValue::Null => {}
                _ => {
                    directive.filters.insert(name.clone(), value.clone());
                }
            }
        }

        if connection {
            directive.pagination = PaginationArgs::validate(&pagination, max_page_size)?;
        }

        if directive.pagination.is_some() && directive.order_by.is_empty() {
            directive.order_by = entity.default_ordering().to_vec();
        }

        Ok(directive)
    }

    /// Returns true if the directive selects every related row in storage order
    pub fn is_empty(&self) -> bool {
        self.order_by.is_empty() && self.pagination.is_none() && self.filters.is_empty()
    }
}

fn parse_order_by(
    argument: &str,
    value: &ConstValue,
    entity: &EntityDefinition,
) -> OptimizerResult<Vec<OrderBy>> {
    let terms: Vec<String> = match value {
        ConstValue::Null => return Ok(Vec::new()),
        ConstValue::String(terms) => terms.split(',').map(str::to_string).collect(),
        ConstValue::Enum(term) => vec![term.to_string()],
        ConstValue::List(items) => items
            .iter()
            .map(|item| match item {
                ConstValue::String(term) => Ok(term.clone()),
                ConstValue::Enum(term) => Ok(term.to_string()),
                other => Err(OptimizerError::argument(
                    argument,
                    format!("expected an ordering term, got {}", other),
                )),
            })
            .collect::<OptimizerResult<_>>()?,
        other => {
            return Err(OptimizerError::argument(
                argument,
                format!("expected a string or a list of strings, got {}", other),
            ))
        }
    };

    terms
        .iter()
        .filter(|term| !term.trim().is_empty())
        .map(|term| {
            let OrderBy { column, direction } = OrderBy::parse(term);
            let column = resolve_order_column(entity, &column).ok_or_else(|| {
                OptimizerError::argument(
                    argument,
                    format!("cannot order '{}' by unknown field '{}'", entity.name(), column),
                )
            })?;
            Ok(OrderBy { column, direction })
        })
        .collect()
}

// Accepts either a GraphQL field name or the column itself
fn resolve_order_column(entity: &EntityDefinition, name: &str) -> Option<String> {
    if let Some(column) = entity.column_for_field(name) {
        return Some(column.to_string());
    }

    entity
        .fields()
        .any(|field| matches!(&field.kind, FieldKind::Column(column) if column == name))
        .then(|| name.to_string())
}
