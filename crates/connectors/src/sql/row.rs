use crate::error::DbError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use mysql_async::{Column as MySqlColumn, Row as MySqlRow, Value as MySqlValue, consts::ColumnType};
use std::{fmt, str::FromStr};
use tokio_postgres::{
    Row as PgRow,
    types::{Json as PgJson, Type},
};
use tracing::warn;
use uuid::Uuid;

/// Character set id MySQL reports for binary columns.
const MYSQL_BINARY_CHARSET: u16 = 63;

pub enum DbRow<'a> {
    MySqlRow(&'a MySqlRow),
    PostgresRow(&'a PgRow),
}

impl DbRow<'_> {
    /// Converts a driver row into a [`RowData`] keyed by column label.
    pub fn to_row_data(&self, entity: &str) -> Result<RowData, DbError> {
        let field_values = match self {
            DbRow::PostgresRow(row) => row
                .columns()
                .iter()
                .enumerate()
                .map(|(index, column)| {
                    Ok(FieldValue {
                        name: column.name().to_string(),
                        value: postgres_value(row, index, column.type_(), column.name())?,
                    })
                })
                .collect::<Result<Vec<_>, DbError>>()?,
            DbRow::MySqlRow(row) => row
                .columns_ref()
                .iter()
                .enumerate()
                .map(|(index, column)| {
                    let value = match row.as_ref(index) {
                        Some(raw) => mysql_value(column, raw)?,
                        None => Value::Null,
                    };
                    Ok(FieldValue {
                        name: column.name_str().into_owned(),
                        value,
                    })
                })
                .collect::<Result<Vec<_>, DbError>>()?,
        };
        Ok(RowData::new(entity, field_values))
    }
}

fn postgres_value(row: &PgRow, index: usize, ty: &Type, name: &str) -> Result<Value, DbError> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(index)?.map(Value::Boolean),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(index)?
            .map(|v| Value::Int(v.into())),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(index)?
            .map(|v| Value::Int(v.into())),
        Type::INT8 => row.try_get::<_, Option<i64>>(index)?.map(Value::Int),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)?
            .map(|v| Value::Float(v.into())),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index)?.map(Value::Float),
        Type::NUMERIC => match row.try_get::<_, Option<rust_decimal::Decimal>>(index)? {
            Some(decimal) => Some(Value::Decimal(
                BigDecimal::from_str(&decimal.to_string()).map_err(|e| DbError::Decode {
                    column: name.to_string(),
                    reason: e.to_string(),
                })?,
            )),
            None => None,
        },
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(index)?.map(Value::String)
        }
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<PgJson<serde_json::Value>>>(index)?
            .map(|json| Value::Json(json.0)),
        Type::UUID => row.try_get::<_, Option<Uuid>>(index)?.map(Value::Uuid),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(index)?.map(Value::Date),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)?
            .map(|ts| Value::Timestamp(ts.and_utc())),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map(Value::Timestamp),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(index)?.map(Value::Bytes),
        _ => match row.try_get::<_, Option<String>>(index) {
            Ok(text) => text.map(Value::String),
            Err(_) => {
                warn!(column = name, r#type = %ty, "Unsupported Postgres column type, returning null");
                None
            }
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

fn mysql_value(column: &MySqlColumn, raw: &MySqlValue) -> Result<Value, DbError> {
    let decode_error = |reason: String| DbError::Decode {
        column: column.name_str().into_owned(),
        reason,
    };

    let value = match raw {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Int(v) => Value::Int(*v),
        MySqlValue::UInt(v) => Value::Uint(*v),
        MySqlValue::Float(v) => Value::Float((*v).into()),
        MySqlValue::Double(v) => Value::Float(*v),
        MySqlValue::Date(year, month, day, hour, minute, second, micros) => {
            let date = NaiveDate::from_ymd_opt((*year).into(), (*month).into(), (*day).into())
                .ok_or_else(|| decode_error(format!("invalid date {year}-{month}-{day}")))?;
            if matches!(column.column_type(), ColumnType::MYSQL_TYPE_DATE) {
                Value::Date(date)
            } else {
                let ts = date
                    .and_hms_micro_opt((*hour).into(), (*minute).into(), (*second).into(), *micros)
                    .ok_or_else(|| decode_error("invalid time of day".to_string()))?;
                Value::Timestamp(ts.and_utc())
            }
        }
        MySqlValue::Time(negative, days, hours, minutes, seconds, _) => {
            let sign = if *negative { "-" } else { "" };
            let hours = u32::from(*hours) + days * 24;
            Value::String(format!("{sign}{hours:02}:{minutes:02}:{seconds:02}"))
        }
        MySqlValue::Bytes(bytes) => match column.column_type() {
            ColumnType::MYSQL_TYPE_JSON => Value::Json(
                serde_json::from_slice(bytes).map_err(|e| decode_error(e.to_string()))?,
            ),
            ColumnType::MYSQL_TYPE_NEWDECIMAL | ColumnType::MYSQL_TYPE_DECIMAL => {
                let text = std::str::from_utf8(bytes).map_err(|e| decode_error(e.to_string()))?;
                Value::Decimal(BigDecimal::from_str(text).map_err(|e| decode_error(e.to_string()))?)
            }
            _ if column.character_set() == MYSQL_BINARY_CHARSET => Value::Bytes(bytes.clone()),
            _ => Value::String(
                String::from_utf8(bytes.clone()).map_err(|e| decode_error(e.to_string()))?,
            ),
        },
    };
    Ok(value)
}

impl fmt::Debug for DbRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbRow::MySqlRow(row) => write!(f, "{row:?}"),
            DbRow::PostgresRow(row) => write!(f, "{row:?}"),
        }
    }
}
