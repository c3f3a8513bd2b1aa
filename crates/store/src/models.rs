use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use reel_codec::{Kind, Record, Value};
use std::collections::BTreeMap;

/// One attribute of one record, as selected by the `LEFT JOIN` queries. A
/// record without any attributes yields a single row with a `NULL` key.
#[derive(sqlx::FromRow)]
pub(crate) struct AttributeRow {
    pub(crate) row_id: i64,
    pub(crate) key: Option<String>,
    pub(crate) kind: Option<String>,
    pub(crate) int_value: Option<i64>,
    pub(crate) real_value: Option<f64>,
    pub(crate) text_value: Option<String>,
    pub(crate) blob_value: Option<Vec<u8>>,
}

/// Column values for writing a single attribute.
pub(crate) struct AttributeColumns {
    pub(crate) kind: &'static str,
    pub(crate) int_value: Option<i64>,
    pub(crate) real_value: Option<f64>,
    pub(crate) text_value: Option<String>,
    pub(crate) blob_value: Option<Vec<u8>>,
}
impl From<&Value> for AttributeColumns {
    fn from(value: &Value) -> Self {
        let mut columns = Self {
            kind: value.tag(),
            int_value: None,
            real_value: None,
            text_value: None,
            blob_value: None,
        };
        match value {
            Value::Null => {},
            Value::Bool(b) => columns.int_value = Some(i64::from(*b)),
            Value::Int(i) => columns.int_value = Some(*i),
            Value::Float(f) => columns.real_value = Some(*f),
            Value::Text(s) => columns.text_value = Some(s.clone()),
            Value::Blob(bytes) => columns.blob_value = Some(bytes.clone()),
        }
        columns
    }
}

impl AttributeRow {
    /// Splits the row into its key and value. `None` for the placeholder row
    /// of a record that has no attributes.
    fn into_attribute(self) -> Result<Option<(String, Value)>> {
        let (Some(key), Some(kind)) = (self.key, self.kind) else {
            return Ok(None);
        };
        if kind == "null" {
            return Ok(Some((key, Value::Null)));
        }
        let value = match kind.parse::<Kind>().or_raise(|| ErrorKind::InvalidData("attribute kind"))? {
            Kind::Bool => Value::Bool(self.int_value.ok_or_raise(|| ErrorKind::InvalidData("bool value"))? != 0),
            Kind::Int => Value::Int(self.int_value.ok_or_raise(|| ErrorKind::InvalidData("int value"))?),
            Kind::Float => Value::Float(self.real_value.ok_or_raise(|| ErrorKind::InvalidData("float value"))?),
            Kind::Text => Value::Text(self.text_value.ok_or_raise(|| ErrorKind::InvalidData("text value"))?),
            Kind::Blob => Value::Blob(self.blob_value.ok_or_raise(|| ErrorKind::InvalidData("blob value"))?),
        };
        Ok(Some((key, value)))
    }
}

/// Group attribute rows (ordered by `row_id`) into one record per row,
/// preserving row order.
pub(crate) fn group_by_row(rows: Vec<AttributeRow>) -> Result<Vec<(i64, Record)>> {
    let mut records: Vec<(i64, Record)> = Vec::new();
    for row in rows {
        let row_id = row.row_id;
        if records.last().is_none_or(|(last, _)| *last != row_id) {
            records.push((row_id, BTreeMap::new()));
        }
        if let Some((key, value)) = row.into_attribute()?
            && let Some((_, record)) = records.last_mut()
        {
            record.insert(key, value);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row(row_id: i64, key: &str, value: &Value) -> AttributeRow {
        let columns = AttributeColumns::from(value);
        AttributeRow {
            row_id,
            key: Some(key.to_string()),
            kind: Some(columns.kind.to_string()),
            int_value: columns.int_value,
            real_value: columns.real_value,
            text_value: columns.text_value,
            blob_value: columns.blob_value,
        }
    }

    #[rstest]
    #[case(Value::Null)]
    #[case(Value::Bool(true))]
    #[case(Value::Bool(false))]
    #[case(Value::Int(-12))]
    #[case(Value::Float(6.5))]
    #[case(Value::Text("Dune".to_string()))]
    #[case(Value::Blob(vec![0x89, 0x50, 0x4E, 0x47]))]
    fn test_columns_to_value(#[case] value: Value) {
        let (key, restored) = row(1, "field", &value).into_attribute().unwrap().unwrap();
        assert_eq!(key, "field");
        assert_eq!(restored, value);
    }

    #[test]
    fn test_missing_column_is_invalid() {
        let mut broken = row(1, "title", &Value::Text("x".to_string()));
        broken.text_value = None;
        assert!(matches!(&*broken.into_attribute().unwrap_err(), ErrorKind::InvalidData("text value")));
    }

    #[test]
    fn test_group_by_row() {
        let empty = AttributeRow {
            row_id: 2,
            key: None,
            kind: None,
            int_value: None,
            real_value: None,
            text_value: None,
            blob_value: None,
        };
        let rows = vec![
            row(1, "id", &Value::Int(10)),
            row(1, "title", &Value::Text("A".to_string())),
            empty,
            row(3, "id", &Value::Int(30)),
        ];
        let grouped = group_by_row(rows).unwrap();
        assert_eq!(grouped.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(grouped[0].1.len(), 2);
        assert!(grouped[1].1.is_empty());
        assert_eq!(grouped[2].1.get("id"), Some(&Value::Int(30)));
    }
}
