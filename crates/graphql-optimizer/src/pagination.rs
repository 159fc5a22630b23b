//! Relay pagination arguments for connection fields
//!
//! Arguments are validated once when the plan is built. The concrete row
//! window can only be computed by the query layer once it knows how many rows
//! a partition holds, see [`PaginationArgs::slice`].

use std::ops::Range;

use async_graphql_value::ConstValue;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, OptimizerResult};

const CURSOR_PREFIX: &str = "arrayconnection:";

/// Raw pagination arguments of one connection field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaginationInput {
    pub first: Option<ConstValue>,
    pub last: Option<ConstValue>,
    pub offset: Option<ConstValue>,
    pub after: Option<ConstValue>,
    pub before: Option<ConstValue>,
}

impl PaginationInput {
    /// Record an argument; returns false if it is not a pagination argument
    pub fn set(&mut self, name: &str, value: ConstValue) -> bool {
        let slot = match name {
            "first" => &mut self.first,
            "last" => &mut self.last,
            "offset" => &mut self.offset,
            "after" => &mut self.after,
            "before" => &mut self.before,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// Validated pagination window, expressed in row offsets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaginationArgs {
    /// Take at most this many rows from the start of the window
    pub first: Option<u64>,
    /// Take at most this many rows from the end of the window
    pub last: Option<u64>,
    /// Window starts at this offset (inclusive)
    pub after: Option<u64>,
    /// Window stops at this offset (exclusive)
    pub before: Option<u64>,
}

impl PaginationArgs {
    /// Validate raw arguments. Returns `None` when nothing limits the rows.
    pub fn validate(input: &PaginationInput, max_page_size: Option<u64>) -> OptimizerResult<Option<Self>> {
        let mut first = count_argument("first", input.first.as_ref())?;
        let last = count_argument("last", input.last.as_ref())?;
        let offset = count_argument("offset", input.offset.as_ref())?;
        let after = cursor_argument("after", input.after.as_ref())?;
        let before = cursor_argument("before", input.before.as_ref())?;

        if offset.is_some() && after.is_some() {
            return Err(OptimizerError::InvalidPagination(
                "can only use either `offset` or `after` for pagination".to_string(),
            ));
        }

        if let Some(max) = max_page_size {
            for (name, value) in [("first", first), ("last", last)] {
                if let Some(value) = value {
                    if value > max {
                        return Err(OptimizerError::InvalidPagination(format!(
                            "requesting {} records exceeds the `{}` limit of {} records",
                            value, name, max
                        )));
                    }
                }
            }

            if first.is_none() && last.is_none() {
                first = Some(max);
            }
        }

        // `after` excludes the row at the cursor
        let after = after
            .map(|cursor| {
                cursor.checked_add(1).ok_or_else(|| {
                    OptimizerError::InvalidPagination(format!(
                        "cursor offset {} is out of range",
                        cursor
                    ))
                })
            })
            .transpose()?;

        let args = Self {
            first,
            last,
            after: after.or(offset),
            before,
        };

        if args == Self::default() {
            return Ok(None);
        }

        Ok(Some(args))
    }

    /// Compute the row window for a partition holding `size` rows, following
    /// the relay pagination algorithm.
    pub fn slice(&self, size: u64) -> Range<u64> {
        let mut start = 0;
        let mut stop = size;

        if let Some(after) = self.after {
            start = after.min(stop);
        }

        if let Some(before) = self.before {
            stop = before.min(stop);
        }

        if let Some(first) = self.first {
            if first < stop.saturating_sub(start) {
                stop = start + first;
            }
        }

        if let Some(last) = self.last {
            if last < stop.saturating_sub(start) {
                start = stop - last;
            }
        }

        start..stop.max(start)
    }

    /// Returns true if the window can be computed without knowing the partition size
    pub fn is_size_independent(&self) -> bool {
        self.last.is_none() && self.before.is_none()
    }
}

/// Encode a row offset as a relay cursor
pub fn offset_to_cursor(offset: u64) -> String {
    STANDARD.encode(format!("{}{}", CURSOR_PREFIX, offset))
}

/// Decode a relay cursor into a row offset
pub fn cursor_to_offset(cursor: &str) -> OptimizerResult<u64> {
    let invalid = || OptimizerError::InvalidPagination(format!("invalid cursor '{}'", cursor));

    let decoded = STANDARD.decode(cursor).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;

    decoded
        .strip_prefix(CURSOR_PREFIX)
        .and_then(|offset| offset.parse().ok())
        .ok_or_else(invalid)
}

fn count_argument(name: &str, value: Option<&ConstValue>) -> OptimizerResult<Option<u64>> {
    match value {
        None | Some(ConstValue::Null) => Ok(None),
        Some(ConstValue::Number(number)) => match number.as_u64() {
            Some(count) => Ok(Some(count)),
            None => Err(OptimizerError::InvalidPagination(format!(
                "argument `{}` must be a non-negative integer, got {}",
                name, number
            ))),
        },
        Some(other) => Err(OptimizerError::argument(
            name,
            format!("expected an integer, got {}", other),
        )),
    }
}

fn cursor_argument(name: &str, value: Option<&ConstValue>) -> OptimizerResult<Option<u64>> {
    match value {
        None | Some(ConstValue::Null) => Ok(None),
        Some(ConstValue::String(cursor)) => cursor_to_offset(cursor).map(Some),
        Some(other) => Err(OptimizerError::argument(
            name,
            format!("expected a cursor string, got {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(pairs: &[(&str, ConstValue)]) -> PaginationInput {
        let mut input = PaginationInput::default();
        for (name, value) in pairs {
            assert!(input.set(name, value.clone()));
        }
        input
    }

    fn number(value: i64) -> ConstValue {
        ConstValue::Number(value.into())
    }

    #[test]
    fn test_cursor_round_trip() {
        let cursor = offset_to_cursor(3);
        assert_eq!(cursor, "YXJyYXljb25uZWN0aW9uOjM=");
        assert_eq!(cursor_to_offset(&cursor).unwrap(), 3);
        assert!(cursor_to_offset("not a cursor").is_err());
    }

    #[test]
    fn test_first_and_last() {
        let args = PaginationArgs::validate(&input(&[("first", number(2))]), None)
            .unwrap()
            .unwrap();
        assert_eq!(args.slice(5), 0..2);

        let args = PaginationArgs::validate(&input(&[("last", number(2))]), None)
            .unwrap()
            .unwrap();
        assert_eq!(args.slice(5), 3..5);
        assert!(!args.is_size_independent());
    }

    #[test]
    fn test_offset_and_cursors() {
        let args = PaginationArgs::validate(&input(&[("offset", number(2))]), None)
            .unwrap()
            .unwrap();
        assert_eq!(args.slice(5), 2..5);

        let after = ConstValue::String(offset_to_cursor(1));
        let before = ConstValue::String(offset_to_cursor(4));
        let args = PaginationArgs::validate(&input(&[("after", after), ("before", before)]), None)
            .unwrap()
            .unwrap();
        assert_eq!(args.slice(10), 2..4);
    }

    #[test]
    fn test_window_is_clamped_to_size() {
        let args = PaginationArgs {
            after: Some(8),
            first: Some(5),
            ..PaginationArgs::default()
        };
        assert_eq!(args.slice(3), 3..3);
    }

    #[test]
    fn test_max_page_size() {
        let args = PaginationArgs::validate(&PaginationInput::default(), Some(100))
            .unwrap()
            .unwrap();
        assert_eq!(args.first, Some(100));

        assert_eq!(
            PaginationArgs::validate(&PaginationInput::default(), None).unwrap(),
            None
        );

        let err = PaginationArgs::validate(&input(&[("first", number(101))]), Some(100)).unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidPagination(_)));
    }

    #[test]
    fn test_invalid_arguments() {
        let err = PaginationArgs::validate(&input(&[("first", number(-1))]), None).unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidPagination(_)));

        let after = ConstValue::String(offset_to_cursor(1));
        let err = PaginationArgs::validate(&input(&[("offset", number(1)), ("after", after)]), None)
            .unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidPagination(_)));

        let last_row = ConstValue::String(offset_to_cursor(u64::MAX));
        let err = PaginationArgs::validate(&input(&[("after", last_row)]), None).unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidPagination(_)));

        let err = PaginationArgs::validate(
            &input(&[("first", ConstValue::String("ten".into()))]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, OptimizerError::ArgumentResolution { .. }));
    }
}
