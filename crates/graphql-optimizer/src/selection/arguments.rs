//! Variable values and argument resolution

use std::collections::BTreeMap;
use std::ops::Deref;

use async_graphql_parser::types::{Directive, VariableDefinition};
use async_graphql_parser::Positioned;
use async_graphql_value::{ConstValue, Name, Value};
use serde::Serialize;

use crate::error::{OptimizerError, OptimizerResult};

/// Variables supplied with a request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VariableValues(BTreeMap<String, ConstValue>);

impl VariableValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables from the JSON `variables` member of a request; `null` means none
    pub fn from_json(value: serde_json::Value) -> OptimizerResult<Self> {
        match value {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::Object(object) => object
                .into_iter()
                .map(|(name, value)| {
                    let value = ConstValue::from_json(value)
                        .map_err(|err| OptimizerError::argument(format!("${}", name), err.to_string()))?;
                    Ok((name, value))
                })
                .collect::<OptimizerResult<_>>()
                .map(Self),
            other => Err(OptimizerError::argument(
                "variables",
                format!("expected an object, got {}", other),
            )),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ConstValue) -> Option<ConstValue> {
        self.0.insert(name.into(), value)
    }

    pub fn with(mut self, name: impl Into<String>, value: ConstValue) -> Self {
        self.insert(name, value);
        self
    }
}

impl Deref for VariableValues {
    type Target = BTreeMap<String, ConstValue>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Resolves argument values of one operation against its variables
#[derive(Debug, Clone, Copy)]
pub(crate) struct ArgumentResolver<'a> {
    definitions: &'a [Positioned<VariableDefinition>],
    variables: &'a VariableValues,
}

impl<'a> ArgumentResolver<'a> {
    pub(crate) fn new(
        definitions: &'a [Positioned<VariableDefinition>],
        variables: &'a VariableValues,
    ) -> Self {
        Self {
            definitions,
            variables,
        }
    }

    /// Value of a variable: the provided value, then the declared default,
    /// then `null` for nullable variables
    pub(crate) fn variable(&self, name: &Name) -> OptimizerResult<ConstValue> {
        if let Some(value) = self.variables.get(name.as_str()) {
            return Ok(value.clone());
        }

        let definition = self
            .definitions
            .iter()
            .find(|definition| definition.node.name.node == *name)
            .ok_or_else(|| {
                OptimizerError::argument(
                    format!("${}", name),
                    "variable is not defined by the operation",
                )
            })?;

        if let Some(default) = &definition.node.default_value {
            return Ok(default.node.clone());
        }

        if definition.node.var_type.node.nullable {
            return Ok(ConstValue::Null);
        }

        Err(OptimizerError::argument(
            format!("${}", name),
            format!(
                "no value provided for required variable of type {}",
                definition.node.var_type.node
            ),
        ))
    }

    /// Substitute every variable in an argument value
    pub(crate) fn resolve(&self, value: &Value) -> OptimizerResult<ConstValue> {
        value.clone().into_const_with(|name| self.variable(&name))
    }

    /// Evaluate `@skip(if:)` and `@include(if:)`
    pub(crate) fn is_included(&self, directives: &[Positioned<Directive>]) -> OptimizerResult<bool> {
        for directive in directives {
            let skip = match directive.node.name.node.as_str() {
                "skip" => true,
                "include" => false,
                _ => continue,
            };

            let condition = directive
                .node
                .arguments
                .iter()
                .find(|(name, _)| name.node.as_str() == "if")
                .map(|(_, value)| self.resolve(&value.node))
                .transpose()?;

            let condition = match condition {
                Some(ConstValue::Boolean(condition)) => condition,
                other => {
                    return Err(OptimizerError::argument(
                        format!("@{}(if:)", directive.node.name.node),
                        format!(
                            "expected a Boolean, got {}",
                            other.map_or_else(|| "nothing".to_string(), |value| value.to_string())
                        ),
                    ))
                }
            };

            if condition == skip {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
