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

//! Checkpoint parquet encoding
//!
//! A checkpoint is one row per live action, with the columns `txn`,
//! `add`, `remove`, `metaData` and `protocol` as nullable structs; each
//! row populates exactly one of them. This writer emits the flattened
//! live set (protocol, metaData, adds), so `txn` and `remove` are
//! always-null columns kept for the canonical shape.

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, Int32Array, Int32Builder, Int64Array,
    Int64Builder, ListArray, ListBuilder, MapArray, MapBuilder, StringArray, StringBuilder,
    StructArray,
};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{DataType, Field, Fields, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use super::action::{Action, Add, Format, MetaData, Protocol, Remove};
use super::log::DeltaError;

/// The `_last_checkpoint` object: the checkpointed version and the
/// number of actions in the checkpoint file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCheckpoint {
    pub version: i64,
    pub size: i64,
}

/// Encode the given actions as a checkpoint parquet file.
pub fn to_checkpoint_bytes(actions: &[Action]) -> Result<Vec<u8>, DeltaError> {
    let columns: Vec<(&str, ArrayRef)> = vec![
        ("txn", build_txn_column(actions.len())),
        ("add", build_add_column(actions)?),
        ("remove", build_remove_column(actions)?),
        ("metaData", build_metadata_column(actions)?),
        ("protocol", build_protocol_column(actions)?),
    ];

    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let arrays: Vec<ArrayRef> = columns.into_iter().map(|(_, array)| array).collect();
    let batch = RecordBatch::try_new(Arc::clone(&schema), arrays)?;

    let mut cursor = Cursor::new(Vec::<u8>::new());
    let mut writer = ArrowWriter::try_new(&mut cursor, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(cursor.into_inner())
}

/// Decode a checkpoint parquet file back into its actions.
pub fn from_checkpoint_bytes(bytes: Bytes) -> Result<Vec<Action>, DeltaError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?.build()?;

    let mut actions = Vec::new();
    for batch in reader {
        let batch = batch?;
        let add = struct_column(&batch, "add");
        let remove = struct_column(&batch, "remove");
        let metadata = struct_column(&batch, "metaData");
        let protocol = struct_column(&batch, "protocol");

        for row in 0..batch.num_rows() {
            if let Some(col) = add.filter(|c| c.is_valid(row)) {
                actions.push(Action::Add(read_add(col, row)?));
            } else if let Some(col) = remove.filter(|c| c.is_valid(row)) {
                actions.push(Action::Remove(read_remove(col, row)?));
            } else if let Some(col) = metadata.filter(|c| c.is_valid(row)) {
                actions.push(Action::MetaData(read_metadata(col, row)?));
            } else if let Some(col) = protocol.filter(|c| c.is_valid(row)) {
                actions.push(Action::Protocol(read_protocol(col, row)?));
            }
            // txn rows and fully-null rows carry nothing to replay
        }
    }
    Ok(actions)
}

fn build_txn_column(len: usize) -> ArrayRef {
    let fields = Fields::from(vec![
        Field::new("appId", DataType::Utf8, true),
        Field::new("version", DataType::Int64, true),
        Field::new("lastUpdated", DataType::Int64, true),
    ]);
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec![None::<&str>; len])),
        Arc::new(Int64Array::from(vec![None::<i64>; len])),
        Arc::new(Int64Array::from(vec![None::<i64>; len])),
    ];
    let nulls = NullBuffer::from(vec![false; len]);
    Arc::new(StructArray::new(fields, arrays, Some(nulls)))
}

fn build_add_column(actions: &[Action]) -> Result<ArrayRef, DeltaError> {
    let mut path = StringBuilder::new();
    let mut partition_values = MapBuilder::new(None, StringBuilder::new(), StringBuilder::new());
    let mut size = Int64Builder::new();
    let mut modification_time = Int64Builder::new();
    let mut data_change = BooleanBuilder::new();
    let mut validity = Vec::with_capacity(actions.len());

    for action in actions {
        if let Action::Add(add) = action {
            path.append_value(&add.path);
            append_map(&mut partition_values, &add.partition_values)?;
            size.append_value(add.size);
            modification_time.append_value(add.modification_time);
            data_change.append_value(add.data_change);
            validity.push(true);
        } else {
            path.append_null();
            partition_values.append(false)?;
            size.append_null();
            modification_time.append_null();
            data_change.append_null();
            validity.push(false);
        }
    }

    let partition_values = partition_values.finish();
    let fields = Fields::from(vec![
        Field::new("path", DataType::Utf8, true),
        Field::new("partitionValues", partition_values.data_type().clone(), true),
        Field::new("size", DataType::Int64, true),
        Field::new("modificationTime", DataType::Int64, true),
        Field::new("dataChange", DataType::Boolean, true),
    ]);
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(path.finish()),
        Arc::new(partition_values),
        Arc::new(size.finish()),
        Arc::new(modification_time.finish()),
        Arc::new(data_change.finish()),
    ];
    Ok(Arc::new(StructArray::try_new(
        fields,
        arrays,
        Some(NullBuffer::from(validity)),
    )?))
}

fn build_remove_column(actions: &[Action]) -> Result<ArrayRef, DeltaError> {
    let mut path = StringBuilder::new();
    let mut deletion_timestamp = Int64Builder::new();
    let mut data_change = BooleanBuilder::new();
    let mut extended = BooleanBuilder::new();
    let mut size = Int64Builder::new();
    let mut validity = Vec::with_capacity(actions.len());

    for action in actions {
        if let Action::Remove(remove) = action {
            path.append_value(&remove.path);
            deletion_timestamp.append_option(remove.deletion_timestamp);
            data_change.append_value(remove.data_change);
            extended.append_option(remove.extended_file_metadata);
            size.append_option(remove.size);
            validity.push(true);
        } else {
            path.append_null();
            deletion_timestamp.append_null();
            data_change.append_null();
            extended.append_null();
            size.append_null();
            validity.push(false);
        }
    }

    let fields = Fields::from(vec![
        Field::new("path", DataType::Utf8, true),
        Field::new("deletionTimestamp", DataType::Int64, true),
        Field::new("dataChange", DataType::Boolean, true),
        Field::new("extendedFileMetadata", DataType::Boolean, true),
        Field::new("size", DataType::Int64, true),
    ]);
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(path.finish()),
        Arc::new(deletion_timestamp.finish()),
        Arc::new(data_change.finish()),
        Arc::new(extended.finish()),
        Arc::new(size.finish()),
    ];
    Ok(Arc::new(StructArray::try_new(
        fields,
        arrays,
        Some(NullBuffer::from(validity)),
    )?))
}

fn build_metadata_column(actions: &[Action]) -> Result<ArrayRef, DeltaError> {
    let mut id = StringBuilder::new();
    let mut name = StringBuilder::new();
    let mut description = StringBuilder::new();
    let mut provider = StringBuilder::new();
    let mut schema_string = StringBuilder::new();
    let mut partition_columns = ListBuilder::new(StringBuilder::new());
    let mut configuration = MapBuilder::new(None, StringBuilder::new(), StringBuilder::new());
    let mut created_time = Int64Builder::new();
    let mut validity = Vec::with_capacity(actions.len());

    for action in actions {
        if let Action::MetaData(meta) = action {
            id.append_value(&meta.id);
            name.append_option(meta.name.as_deref());
            description.append_option(meta.description.as_deref());
            provider.append_value(&meta.format.provider);
            schema_string.append_value(&meta.schema_string);
            for column in &meta.partition_columns {
                partition_columns.values().append_value(column);
            }
            partition_columns.append(true);
            append_map(&mut configuration, &meta.configuration)?;
            created_time.append_option(meta.created_time);
            validity.push(true);
        } else {
            id.append_null();
            name.append_null();
            description.append_null();
            provider.append_null();
            schema_string.append_null();
            partition_columns.append(false);
            configuration.append(false)?;
            created_time.append_null();
            validity.push(false);
        }
    }

    let nulls = NullBuffer::from(validity);
    let format = StructArray::try_new(
        Fields::from(vec![Field::new("provider", DataType::Utf8, true)]),
        vec![Arc::new(provider.finish()) as ArrayRef],
        Some(nulls.clone()),
    )?;
    let partition_columns = partition_columns.finish();
    let configuration = configuration.finish();

    let fields = Fields::from(vec![
        Field::new("id", DataType::Utf8, true),
        Field::new("name", DataType::Utf8, true),
        Field::new("description", DataType::Utf8, true),
        Field::new("format", format.data_type().clone(), true),
        Field::new("schemaString", DataType::Utf8, true),
        Field::new(
            "partitionColumns",
            partition_columns.data_type().clone(),
            true,
        ),
        Field::new("configuration", configuration.data_type().clone(), true),
        Field::new("createdTime", DataType::Int64, true),
    ]);
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(id.finish()),
        Arc::new(name.finish()),
        Arc::new(description.finish()),
        Arc::new(format),
        Arc::new(schema_string.finish()),
        Arc::new(partition_columns),
        Arc::new(configuration),
        Arc::new(created_time.finish()),
    ];
    Ok(Arc::new(StructArray::try_new(
        fields,
        arrays,
        Some(nulls),
    )?))
}

fn build_protocol_column(actions: &[Action]) -> Result<ArrayRef, DeltaError> {
    let mut min_reader = Int32Builder::new();
    let mut min_writer = Int32Builder::new();
    let mut validity = Vec::with_capacity(actions.len());

    for action in actions {
        if let Action::Protocol(protocol) = action {
            min_reader.append_value(protocol.min_reader_version);
            min_writer.append_value(protocol.min_writer_version);
            validity.push(true);
        } else {
            min_reader.append_null();
            min_writer.append_null();
            validity.push(false);
        }
    }

    let fields = Fields::from(vec![
        Field::new("minReaderVersion", DataType::Int32, true),
        Field::new("minWriterVersion", DataType::Int32, true),
    ]);
    let arrays: Vec<ArrayRef> = vec![Arc::new(min_reader.finish()), Arc::new(min_writer.finish())];
    Ok(Arc::new(StructArray::try_new(
        fields,
        arrays,
        Some(NullBuffer::from(validity)),
    )?))
}

fn append_map(
    builder: &mut MapBuilder<StringBuilder, StringBuilder>,
    values: &HashMap<String, String>,
) -> Result<(), DeltaError> {
    let mut entries: Vec<_> = values.iter().collect();
    entries.sort();
    for (key, value) in entries {
        builder.keys().append_value(key);
        builder.values().append_value(value);
    }
    builder.append(true)?;
    Ok(())
}

fn struct_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StructArray> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StructArray>())
}

fn field_string(col: &StructArray, name: &str, row: usize) -> Result<Option<String>, DeltaError> {
    let array = field_array::<StringArray>(col, name)?;
    Ok(if array.is_valid(row) {
        Some(array.value(row).to_string())
    } else {
        None
    })
}

fn field_i64(col: &StructArray, name: &str, row: usize) -> Result<Option<i64>, DeltaError> {
    let array = field_array::<Int64Array>(col, name)?;
    Ok(array.is_valid(row).then(|| array.value(row)))
}

fn field_i32(col: &StructArray, name: &str, row: usize) -> Result<Option<i32>, DeltaError> {
    let array = field_array::<Int32Array>(col, name)?;
    Ok(array.is_valid(row).then(|| array.value(row)))
}

fn field_bool(col: &StructArray, name: &str, row: usize) -> Result<Option<bool>, DeltaError> {
    let array = field_array::<BooleanArray>(col, name)?;
    Ok(array.is_valid(row).then(|| array.value(row)))
}

fn field_array<'a, T: 'static>(col: &'a StructArray, name: &str) -> Result<&'a T, DeltaError> {
    col.column_by_name(name)
        .and_then(|array| array.as_any().downcast_ref::<T>())
        .ok_or_else(|| DeltaError::Corrupt(format!("checkpoint column '{name}' missing or mistyped")))
}

fn field_map(
    col: &StructArray,
    name: &str,
    row: usize,
) -> Result<HashMap<String, String>, DeltaError> {
    let array = field_array::<MapArray>(col, name)?;
    let mut out = HashMap::new();
    if array.is_valid(row) {
        let entries = array.value(row);
        let keys = entries
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| DeltaError::Corrupt(format!("'{name}' keys are not strings")))?;
        let values = entries
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| DeltaError::Corrupt(format!("'{name}' values are not strings")))?;
        for i in 0..entries.len() {
            if keys.is_valid(i) && values.is_valid(i) {
                out.insert(keys.value(i).to_string(), values.value(i).to_string());
            }
        }
    }
    Ok(out)
}

fn field_string_list(
    col: &StructArray,
    name: &str,
    row: usize,
) -> Result<Vec<String>, DeltaError> {
    let array = field_array::<ListArray>(col, name)?;
    let mut out = Vec::new();
    if array.is_valid(row) {
        let values = array.value(row);
        let values = values
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| DeltaError::Corrupt(format!("'{name}' items are not strings")))?;
        for i in 0..values.len() {
            if values.is_valid(i) {
                out.push(values.value(i).to_string());
            }
        }
    }
    Ok(out)
}

fn read_add(col: &StructArray, row: usize) -> Result<Add, DeltaError> {
    Ok(Add {
        path: field_string(col, "path", row)?
            .ok_or_else(|| DeltaError::Corrupt("add row without a path".to_string()))?,
        partition_values: field_map(col, "partitionValues", row)?,
        size: field_i64(col, "size", row)?.unwrap_or(0),
        modification_time: field_i64(col, "modificationTime", row)?.unwrap_or(0),
        data_change: field_bool(col, "dataChange", row)?.unwrap_or(false),
        stats: None,
    })
}

fn read_remove(col: &StructArray, row: usize) -> Result<Remove, DeltaError> {
    Ok(Remove {
        path: field_string(col, "path", row)?
            .ok_or_else(|| DeltaError::Corrupt("remove row without a path".to_string()))?,
        deletion_timestamp: field_i64(col, "deletionTimestamp", row)?,
        data_change: field_bool(col, "dataChange", row)?.unwrap_or(false),
        extended_file_metadata: field_bool(col, "extendedFileMetadata", row)?,
        partition_values: None,
        size: field_i64(col, "size", row)?,
    })
}

fn read_metadata(col: &StructArray, row: usize) -> Result<MetaData, DeltaError> {
    let provider = field_array::<StructArray>(col, "format")
        .ok()
        .map(|format| field_string(format, "provider", row))
        .transpose()?
        .flatten()
        .unwrap_or_else(|| "parquet".to_string());
    Ok(MetaData {
        id: field_string(col, "id", row)?
            .ok_or_else(|| DeltaError::Corrupt("metaData row without an id".to_string()))?,
        name: field_string(col, "name", row)?,
        description: field_string(col, "description", row)?,
        format: Format {
            provider,
            options: HashMap::new(),
        },
        schema_string: field_string(col, "schemaString", row)?
            .ok_or_else(|| DeltaError::Corrupt("metaData row without a schema".to_string()))?,
        partition_columns: field_string_list(col, "partitionColumns", row)?,
        configuration: field_map(col, "configuration", row)?,
        created_time: field_i64(col, "createdTime", row)?,
    })
}

fn read_protocol(col: &StructArray, row: usize) -> Result<Protocol, DeltaError> {
    Ok(Protocol {
        min_reader_version: field_i32(col, "minReaderVersion", row)?.unwrap_or(1),
        min_writer_version: field_i32(col, "minWriterVersion", row)?.unwrap_or(2),
    })
}
