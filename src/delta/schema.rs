// Copyright 2025 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.
//
// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

//! Mapping from a parquet file's Arrow schema to the Delta `metaData`
//! fields: the canonical `schemaString` JSON and the table id derived
//! from it. The id is a pure function of the schema so that idempotent
//! re-runs regenerate the same `metaData` action.

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::log::DeltaError;

/// Render an Arrow schema as the Delta `schemaString` JSON.
///
/// serde_json sorts object keys, so the output is canonical for a given
/// schema and safe to hash.
pub fn schema_string_for(schema: &Schema) -> Result<String, DeltaError> {
    let fields: Vec<Value> = schema
        .fields()
        .iter()
        .map(|f| field_to_value(f))
        .collect::<Result<_, _>>()?;
    let root = json!({
        "type": "struct",
        "fields": fields,
    });
    Ok(root.to_string())
}

/// Deterministic table id: SHA-256 of the schema string, rendered in the
/// 8-4-4-4-12 grouping readers expect of `metaData.id`.
pub fn schema_id_for(schema_string: &str) -> String {
    let digest = Sha256::digest(schema_string.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn field_to_value(field: &Field) -> Result<Value, DeltaError> {
    Ok(json!({
        "name": field.name(),
        "type": type_to_value(field.data_type())?,
        "nullable": field.is_nullable(),
        "metadata": {},
    }))
}

fn type_to_value(data_type: &DataType) -> Result<Value, DeltaError> {
    let primitive = match data_type {
        DataType::Utf8 | DataType::LargeUtf8 => "string",
        DataType::Int64 => "long",
        DataType::Int32 | DataType::UInt16 => "integer",
        DataType::Int16 | DataType::UInt8 => "short",
        DataType::Int8 => "byte",
        DataType::Float32 => "float",
        DataType::Float64 => "double",
        DataType::Boolean => "boolean",
        DataType::Binary | DataType::LargeBinary | DataType::FixedSizeBinary(_) => "binary",
        DataType::Date32 | DataType::Date64 => "date",
        DataType::Timestamp(TimeUnit::Second, _)
        | DataType::Timestamp(TimeUnit::Millisecond, _)
        | DataType::Timestamp(TimeUnit::Microsecond, _)
        | DataType::Timestamp(TimeUnit::Nanosecond, _) => "timestamp",
        DataType::Decimal128(precision, scale) => {
            return Ok(Value::String(format!("decimal({precision},{scale})")))
        }
        DataType::Struct(fields) => {
            let fields: Vec<Value> = fields
                .iter()
                .map(|f| field_to_value(f))
                .collect::<Result<_, _>>()?;
            return Ok(json!({ "type": "struct", "fields": fields }));
        }
        DataType::List(item) | DataType::LargeList(item) => {
            return Ok(json!({
                "type": "array",
                "elementType": type_to_value(item.data_type())?,
                "containsNull": item.is_nullable(),
            }));
        }
        DataType::Map(entries, _) => {
            let DataType::Struct(kv) = entries.data_type() else {
                return Err(DeltaError::UnsupportedType(format!("{data_type:?}")));
            };
            if kv.len() != 2 {
                return Err(DeltaError::UnsupportedType(format!("{data_type:?}")));
            }
            return Ok(json!({
                "type": "map",
                "keyType": type_to_value(kv[0].data_type())?,
                "valueType": type_to_value(kv[1].data_type())?,
                "valueContainsNull": kv[1].is_nullable(),
            }));
        }
        other => return Err(DeltaError::UnsupportedType(format!("{other:?}"))),
    };
    Ok(Value::String(primitive.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::Fields;
    use std::sync::Arc;

    fn sample_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("active", DataType::Boolean, true),
        ])
    }

    #[test]
    fn test_schema_string_shape() {
        let schema_string = schema_string_for(&sample_schema()).unwrap();
        let value: Value = serde_json::from_str(&schema_string).unwrap();

        assert_eq!(value["type"], "struct");
        let fields = value["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0]["name"], "id");
        assert_eq!(fields[0]["type"], "long");
        assert_eq!(fields[0]["nullable"], false);
        assert_eq!(fields[1]["type"], "string");
        assert_eq!(fields[2]["type"], "boolean");
    }

    #[test]
    fn test_schema_string_is_deterministic() {
        let a = schema_string_for(&sample_schema()).unwrap();
        let b = schema_string_for(&sample_schema()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_schema_id_is_stable_and_uuid_shaped() {
        let schema_string = schema_string_for(&sample_schema()).unwrap();
        let id = schema_id_for(&schema_string);
        assert_eq!(id, schema_id_for(&schema_string));

        let groups: Vec<&str> = id.split('-').collect();
        assert_eq!(
            groups.iter().map(|g| g.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }

    #[test]
    fn test_schema_id_changes_with_schema() {
        let a = schema_string_for(&sample_schema()).unwrap();
        let wider = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("active", DataType::Boolean, true),
            Field::new("added", DataType::Date32, true),
        ]);
        let b = schema_string_for(&wider).unwrap();
        assert_ne!(schema_id_for(&a), schema_id_for(&b));
    }

    #[test]
    fn test_nested_types() {
        let inner = Fields::from(vec![
            Field::new("street", DataType::Utf8, true),
            Field::new("zip", DataType::Int32, true),
        ]);
        let schema = Schema::new(vec![
            Field::new("address", DataType::Struct(inner), true),
            Field::new(
                "tags",
                DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
                true,
            ),
            Field::new("amount", DataType::Decimal128(10, 2), true),
            Field::new(
                "updated",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
        ]);

        let value: Value = serde_json::from_str(&schema_string_for(&schema).unwrap()).unwrap();
        let fields = value["fields"].as_array().unwrap();
        assert_eq!(fields[0]["type"]["type"], "struct");
        assert_eq!(fields[1]["type"]["type"], "array");
        assert_eq!(fields[1]["type"]["elementType"], "string");
        assert_eq!(fields[2]["type"], "decimal(10,2)");
        assert_eq!(fields[3]["type"], "timestamp");
    }

    #[test]
    fn test_unsupported_type_is_an_error() {
        let schema = Schema::new(vec![Field::new(
            "window",
            DataType::Interval(arrow::datatypes::IntervalUnit::DayTime),
            true,
        )]);
        assert!(matches!(
            schema_string_for(&schema),
            Err(DeltaError::UnsupportedType(_))
        ));
    }
}
