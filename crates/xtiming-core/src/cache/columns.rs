//! Named numeric columns serialized as one JSON block.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TimingError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum Column {
    F64(Vec<f64>),
    I64(Vec<i64>),
    U64(Vec<u64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::F64(v) => v.len(),
            Column::I64(v) => v.len(),
            Column::U64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dtype(&self) -> &'static str {
        match self {
            Column::F64(_) => "f64",
            Column::I64(_) => "i64",
            Column::U64(_) => "u64",
        }
    }
}

/// A set of equal-length columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnBlock {
    columns: BTreeMap<String, Column>,
}

impl ColumnBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, column: Column) -> Self {
        self.columns.insert(name.to_string(), column);
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a block and check that every column has the same length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let block: ColumnBlock = serde_json::from_slice(bytes)
            .map_err(|e| TimingError::corrupt(format!("unreadable column block: {e}")))?;
        let mut lengths = block.columns.iter().map(|(name, c)| (name, c.len()));
        if let Some((first_name, first_len)) = lengths.next() {
            if let Some((name, len)) = lengths.find(|(_, len)| *len != first_len) {
                return Err(TimingError::corrupt(format!(
                    "column {name} has {len} rows but {first_name} has {first_len}"
                )));
            }
        }
        Ok(block)
    }

    pub fn rows(&self) -> usize {
        self.columns.values().next().map_or(0, Column::len)
    }

    fn take(&mut self, name: &str) -> Result<Column> {
        self.columns
            .remove(name)
            .ok_or_else(|| TimingError::corrupt(format!("missing column {name}")))
    }

    pub fn take_f64(&mut self, name: &str) -> Result<Vec<f64>> {
        match self.take(name)? {
            Column::F64(v) => Ok(v),
            other => Err(mismatch(name, "f64", &other)),
        }
    }

    pub fn take_i64(&mut self, name: &str) -> Result<Vec<i64>> {
        match self.take(name)? {
            Column::I64(v) => Ok(v),
            other => Err(mismatch(name, "i64", &other)),
        }
    }

    pub fn take_u64(&mut self, name: &str) -> Result<Vec<u64>> {
        match self.take(name)? {
            Column::U64(v) => Ok(v),
            other => Err(mismatch(name, "u64", &other)),
        }
    }
}

fn mismatch(name: &str, expected: &str, found: &Column) -> TimingError {
    TimingError::corrupt(format!(
        "column {name} is {} where {expected} was expected",
        found.dtype()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_survive_exactly() {
        let values = vec![0.1, 1.0 / 3.0, 123_456_789.123_456_78, -0.0, 1.0e-300];
        let bytes = ColumnBlock::new()
            .with("time", Column::F64(values.clone()))
            .to_bytes()
            .unwrap();
        let mut block = ColumnBlock::from_bytes(&bytes).unwrap();
        let back = block.take_f64("time").unwrap();
        assert_eq!(
            back.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            values.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn wire_format_is_tagged() {
        let bytes = ColumnBlock::new()
            .with("counts", Column::U64(vec![1, 2]))
            .to_bytes()
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            r#"{"columns":{"counts":{"dtype":"u64","values":[1,2]}}}"#
        );
    }

    #[test]
    fn ragged_columns_are_corrupt() {
        let bytes = ColumnBlock::new()
            .with("time", Column::F64(vec![0.0, 1.0]))
            .with("counts", Column::U64(vec![1]))
            .to_bytes()
            .unwrap();
        assert!(matches!(
            ColumnBlock::from_bytes(&bytes),
            Err(TimingError::CacheCorrupt(_))
        ));
    }

    #[test]
    fn wrong_dtype_and_missing_column_are_corrupt() {
        let mut block = ColumnBlock::new().with("counts", Column::I64(vec![1]));
        assert!(matches!(
            block.take_u64("counts"),
            Err(TimingError::CacheCorrupt(_))
        ));
        assert!(matches!(
            block.take_f64("time"),
            Err(TimingError::CacheCorrupt(_))
        ));
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(matches!(
            ColumnBlock::from_bytes(b"\x00\x01not json"),
            Err(TimingError::CacheCorrupt(_))
        ));
    }
}
