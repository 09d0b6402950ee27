//! Data sources feeding records into an export.

use std::future::Future;
use std::io::Cursor;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::debug;
use polars::prelude::{AnyValue, DataFrame, IpcReader, SerReader, TimeUnit};
use serde_json::Value;

use crate::spec::{
    DataExportError, EnumFieldValue, Result, SpecExecuteOptions, SpecRecord, SpecSourceResult,
};

/// `num_days_from_ce` of 1970-01-01.
const N_DAYS_CE_TO_UNIX_EPOCH: i32 = 719_163;

/// Record provider bound to an exporter.
///
/// `args` are the caller's source arguments, forwarded untouched.
pub trait DataSource {
    /// Fetch records.
    fn execute(
        &self,
        args: &Value,
        options: SpecExecuteOptions,
    ) -> impl Future<Output = Result<SpecSourceResult>> + Send;
}

////////////////////////////////////////////////////////////////////////////////
// #region MemorySource

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<SpecRecord>,
    n_page_size: Option<usize>,
}

impl MemorySource {
    /// Source returning `records`.
    pub fn new(records: Vec<SpecRecord>) -> Self {
        Self {
            records,
            n_page_size: None,
        }
    }

    /// Page size honored for `partial_data` fetches.
    pub fn with_page_size(mut self, n_page_size: usize) -> Self {
        self.n_page_size = Some(n_page_size);
        self
    }
}

impl DataSource for MemorySource {
    async fn execute(
        &self,
        _args: &Value,
        options: SpecExecuteOptions,
    ) -> Result<SpecSourceResult> {
        let n_take = match (options.partial_data, self.n_page_size) {
            (true, Some(n_page_size)) => n_page_size,
            _ => self.records.len(),
        };
        Ok(SpecSourceResult {
            data: self.records.iter().take(n_take).cloned().collect(),
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region JsonFileSource

/// Records read from a JSON file.
///
/// The file holds either an array of objects or `{"data": [...]}`.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    /// Source reading `path` on every fetch.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DataSource for JsonFileSource {
    async fn execute(
        &self,
        _args: &Value,
        _options: SpecExecuteOptions,
    ) -> Result<SpecSourceResult> {
        let v_bytes = tokio::fs::read(&self.path).await.map_err(|err| {
            DataExportError::SourceFetch(format!("{}: {err}", self.path.display()))
        })?;
        let value: Value = serde_json::from_slice(&v_bytes)?;
        let data = derive_records_from_json(&value)?;
        debug!("read {} records from {}", data.len(), self.path.display());
        Ok(SpecSourceResult { data })
    }
}

/// Decode records from a JSON array (or an object with a `data` array).
pub fn derive_records_from_json(value: &Value) -> Result<Vec<SpecRecord>> {
    let l_items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(DataExportError::SourceFetch(
                    "JSON object has no `data` array".to_string(),
                ));
            }
        },
        _ => {
            return Err(DataExportError::SourceFetch(
                "JSON records must be an array of objects".to_string(),
            ));
        }
    };

    l_items
        .iter()
        .enumerate()
        .map(|(n_idx, item)| match item {
            Value::Object(map) => Ok(SpecRecord {
                fields: map
                    .iter()
                    .map(|(key, val)| (key.clone(), derive_field_value_from_json(val)))
                    .collect(),
                position: None,
            }),
            _ => Err(DataExportError::SourceFetch(format!(
                "record #{n_idx} is not a JSON object"
            ))),
        })
        .collect()
}

/// Convert one JSON value; ISO dates (`2024-03-05`, `2024-03-05T10:00:00`)
/// become date values.
pub fn derive_field_value_from_json(value: &Value) -> EnumFieldValue {
    match value {
        Value::Null => EnumFieldValue::None,
        Value::Bool(b) => EnumFieldValue::Boolean(*b),
        Value::Number(n) => n
            .as_f64()
            .map(EnumFieldValue::Number)
            .unwrap_or(EnumFieldValue::None),
        Value::String(s) => {
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                EnumFieldValue::Date(date)
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                EnumFieldValue::DateTime(dt)
            } else {
                EnumFieldValue::String(s.clone())
            }
        }
        Value::Array(_) | Value::Object(_) => EnumFieldValue::String(value.to_string()),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PolarsIpcSource

/// Records decoded from an Arrow IPC (Feather v2) payload.
#[derive(Debug, Clone)]
pub struct PolarsIpcSource {
    v_ipc_df: Vec<u8>,
}

impl PolarsIpcSource {
    /// Source decoding `v_ipc_df` on every fetch.
    pub fn new(v_ipc_df: Vec<u8>) -> Self {
        Self { v_ipc_df }
    }
}

impl DataSource for PolarsIpcSource {
    async fn execute(
        &self,
        _args: &Value,
        _options: SpecExecuteOptions,
    ) -> Result<SpecSourceResult> {
        let df = derive_dataframe_from_ipc_bytes(&self.v_ipc_df)?;
        Ok(SpecSourceResult {
            data: derive_records_from_dataframe(&df)?,
        })
    }
}

fn derive_dataframe_from_ipc_bytes(v_ipc_df: &[u8]) -> Result<DataFrame> {
    IpcReader::new(Cursor::new(v_ipc_df))
        .finish()
        .map_err(|err| DataExportError::SourceFetch(format!("failed to read IPC bytes: {err}")))
}

/// One record per DataFrame row, keyed by column name.
pub fn derive_records_from_dataframe(df: &DataFrame) -> Result<Vec<SpecRecord>> {
    let l_cols = df.get_columns();
    let mut l_records = Vec::with_capacity(df.height());
    for n_idx_row in 0..df.height() {
        let mut record = SpecRecord::new();
        for col in l_cols {
            let value = col.get(n_idx_row)?;
            record.fields.insert(
                col.name().to_string(),
                derive_field_value_from_any_value(value),
            );
        }
        l_records.push(record);
    }
    Ok(l_records)
}

/// Convert one polars value.
pub fn derive_field_value_from_any_value(value: AnyValue<'_>) -> EnumFieldValue {
    match value {
        AnyValue::Null => EnumFieldValue::None,
        AnyValue::String(val) => EnumFieldValue::String(val.to_string()),
        AnyValue::StringOwned(val) => EnumFieldValue::String(val.to_string()),
        AnyValue::Boolean(val) => EnumFieldValue::Boolean(val),
        AnyValue::UInt8(val) => EnumFieldValue::Number(val as f64),
        AnyValue::UInt16(val) => EnumFieldValue::Number(val as f64),
        AnyValue::UInt32(val) => EnumFieldValue::Number(val as f64),
        AnyValue::UInt64(val) => EnumFieldValue::Number(val as f64),
        AnyValue::Int8(val) => EnumFieldValue::Number(val as f64),
        AnyValue::Int16(val) => EnumFieldValue::Number(val as f64),
        AnyValue::Int32(val) => EnumFieldValue::Number(val as f64),
        AnyValue::Int64(val) => EnumFieldValue::Number(val as f64),
        AnyValue::Int128(val) => EnumFieldValue::Number(val as f64),
        AnyValue::Float32(val) => EnumFieldValue::Number(val as f64),
        AnyValue::Float64(val) => EnumFieldValue::Number(val),
        AnyValue::Date(n_days) => NaiveDate::from_num_days_from_ce_opt(
            n_days.saturating_add(N_DAYS_CE_TO_UNIX_EPOCH),
        )
        .map(EnumFieldValue::Date)
        .unwrap_or(EnumFieldValue::None),
        AnyValue::Datetime(n_ts, unit, _) => derive_datetime_from_timestamp(n_ts, unit)
            .map(EnumFieldValue::DateTime)
            .unwrap_or(EnumFieldValue::None),
        _ => EnumFieldValue::String(value.to_string()),
    }
}

fn derive_datetime_from_timestamp(n_ts: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(n_ts)?,
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(n_ts)?,
        TimeUnit::Nanoseconds => DateTime::from_timestamp_nanos(n_ts),
    };
    Some(dt.naive_utc())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use polars::prelude::{IpcWriter, SerWriter};
    use serde_json::json;

    use super::*;

    fn name_of(record: &SpecRecord) -> Option<&EnumFieldValue> {
        record.get("name")
    }

    #[tokio::test]
    async fn test_memory_source_pages_only_partial_fetches() {
        let records: Vec<SpecRecord> = (0..5_i64)
            .map(|n| SpecRecord::new().with_field("id", n))
            .collect();
        let source = MemorySource::new(records).with_page_size(2);

        let full = source
            .execute(&Value::Null, SpecExecuteOptions::default())
            .await
            .expect("full fetch");
        let partial = source
            .execute(
                &Value::Null,
                SpecExecuteOptions {
                    partial_data: true,
                    return_only: true,
                },
            )
            .await
            .expect("partial fetch");

        assert_eq!(full.data.len(), 5);
        assert_eq!(partial.data.len(), 2);
    }

    #[test]
    fn test_records_from_json_accept_array_and_data_object() {
        let l_array = derive_records_from_json(&json!([{"name": "Ann", "age": 30}]))
            .expect("decode array");
        let l_object = derive_records_from_json(&json!({"data": [{"name": "Bob"}]}))
            .expect("decode object");

        assert_eq!(name_of(&l_array[0]), Some(&EnumFieldValue::from("Ann")));
        assert_eq!(l_array[0].get("age"), Some(&EnumFieldValue::Number(30.0)));
        assert_eq!(name_of(&l_object[0]), Some(&EnumFieldValue::from("Bob")));

        assert!(matches!(
            derive_records_from_json(&json!([1, 2])),
            Err(DataExportError::SourceFetch(_))
        ));
        assert!(derive_records_from_json(&json!({"rows": []})).is_err());
    }

    #[test]
    fn test_field_value_from_json_parses_iso_dates() {
        assert_eq!(
            derive_field_value_from_json(&json!("2024-03-05")),
            EnumFieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 5).expect("date"))
        );
        assert!(matches!(
            derive_field_value_from_json(&json!("2024-03-05T10:30:00")),
            EnumFieldValue::DateTime(_)
        ));
        assert_eq!(
            derive_field_value_from_json(&json!("05.03.2024")),
            EnumFieldValue::from("05.03.2024")
        );
        assert_eq!(derive_field_value_from_json(&json!(null)), EnumFieldValue::None);
        assert_eq!(
            derive_field_value_from_json(&json!(true)),
            EnumFieldValue::Boolean(true)
        );
    }

    #[tokio::test]
    async fn test_json_file_source_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("records.json");
        std::fs::write(&path, r#"[{"name": "Ann"}, {"name": "Bob"}]"#).expect("write records");

        let result = JsonFileSource::new(&path)
            .execute(&Value::Null, SpecExecuteOptions::default())
            .await
            .expect("fetch");

        assert_eq!(result.data.len(), 2);
        assert_eq!(name_of(&result.data[1]), Some(&EnumFieldValue::from("Bob")));
    }

    #[tokio::test]
    async fn test_json_file_source_missing_file_is_fetch_error() {
        let dir = tempfile::tempdir().expect("tempdir");

        let result = JsonFileSource::new(dir.path().join("absent.json"))
            .execute(&Value::Null, SpecExecuteOptions::default())
            .await;

        assert!(matches!(result, Err(DataExportError::SourceFetch(_))));
    }

    #[tokio::test]
    async fn test_polars_ipc_source_decodes_rows() {
        let mut df = polars::df!(
            "name" => ["Ann", "Bob"],
            "age" => [Some(30_i64), None],
            "active" => [true, false],
        )
        .expect("build dataframe");
        let mut v_ipc = Vec::new();
        IpcWriter::new(&mut v_ipc)
            .finish(&mut df)
            .expect("write ipc");

        let result = PolarsIpcSource::new(v_ipc)
            .execute(&Value::Null, SpecExecuteOptions::default())
            .await
            .expect("fetch");

        assert_eq!(result.data.len(), 2);
        assert_eq!(name_of(&result.data[0]), Some(&EnumFieldValue::from("Ann")));
        assert_eq!(result.data[0].get("age"), Some(&EnumFieldValue::Number(30.0)));
        assert_eq!(result.data[1].get("age"), Some(&EnumFieldValue::None));
        assert_eq!(
            result.data[1].get("active"),
            Some(&EnumFieldValue::Boolean(false))
        );
    }

    #[tokio::test]
    async fn test_polars_ipc_source_rejects_garbage() {
        let result = PolarsIpcSource::new(b"not ipc".to_vec())
            .execute(&Value::Null, SpecExecuteOptions::default())
            .await;

        assert!(matches!(result, Err(DataExportError::SourceFetch(_))));
    }

    #[test]
    fn test_field_value_from_any_value_dates() {
        assert_eq!(
            derive_field_value_from_any_value(AnyValue::Date(0)),
            EnumFieldValue::Date(NaiveDate::from_ymd_opt(1970, 1, 1).expect("date"))
        );
        assert_eq!(
            derive_field_value_from_any_value(AnyValue::Date(19_787)),
            EnumFieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 5).expect("date"))
        );
        assert_eq!(
            derive_datetime_from_timestamp(86_400_000, TimeUnit::Milliseconds),
            NaiveDate::from_ymd_opt(1970, 1, 2).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
    }
}
