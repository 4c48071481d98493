use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use model::core::value::Value;
use rust_decimal::Decimal as RustDecimal;
use std::{error::Error, str::FromStr};
use tokio_postgres::types::{IsNull, Json as PgJson, ToSql, Type, to_sql_checked};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// A bound value encoded for the parameter type Postgres inferred. Filter
/// operands arrive untyped, so `"5"` against an `int4` column is sent as 5.
#[derive(Debug)]
pub struct PgParam(Value);

impl PgParam {
    pub fn from_value(value: Value) -> Self {
        PgParam(value)
    }
}

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot bind {value} as {ty}").into()
}

fn integer(value: &Value, ty: &Type) -> Result<i64, BoxError> {
    value.as_i64().ok_or_else(|| mismatch(value, ty))
}

fn float(value: &Value, ty: &Type) -> Result<f64, BoxError> {
    value.as_f64().ok_or_else(|| mismatch(value, ty))
}

fn text(value: &Value, ty: &Type) -> Result<String, BoxError> {
    value.as_string().ok_or_else(|| mismatch(value, ty))
}

fn timestamp(value: &Value, ty: &Type) -> Result<DateTime<Utc>, BoxError> {
    match value {
        Value::Timestamp(ts) => Ok(*ts),
        Value::Date(date) => date
            .and_hms_opt(0, 0, 0)
            .map(|ts| ts.and_utc())
            .ok_or_else(|| mismatch(value, ty)),
        other => {
            let raw = text(other, ty)?;
            if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
                return Ok(ts.with_timezone(&Utc));
            }
            if let Ok(ts) = NaiveDateTime::from_str(&raw) {
                return Ok(ts.and_utc());
            }
            NaiveDate::from_str(&raw)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|ts| ts.and_utc())
                .ok_or_else(|| mismatch(other, ty))
        }
    }
}

impl ToSql for PgParam {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let value = &self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => value.as_bool().ok_or_else(|| mismatch(value, ty))?.to_sql(ty, out),
            Type::INT2 => i16::try_from(integer(value, ty)?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(integer(value, ty)?)?.to_sql(ty, out),
            Type::INT8 => integer(value, ty)?.to_sql(ty, out),
            Type::FLOAT4 => (float(value, ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => float(value, ty)?.to_sql(ty, out),
            Type::NUMERIC => RustDecimal::from_str(&text(value, ty)?)?.to_sql(ty, out),
            Type::UUID => match value {
                Value::Uuid(uuid) => uuid.to_sql(ty, out),
                other => Uuid::parse_str(&text(other, ty)?)?.to_sql(ty, out),
            },
            Type::JSON | Type::JSONB => PgJson(value.to_json()).to_sql(ty, out),
            Type::DATE => match value {
                Value::Date(date) => date.to_sql(ty, out),
                other => timestamp(other, ty)?.date_naive().to_sql(ty, out),
            },
            Type::TIMESTAMP => timestamp(value, ty)?.naive_utc().to_sql(ty, out),
            Type::TIMESTAMPTZ => timestamp(value, ty)?.to_sql(ty, out),
            Type::BYTEA => match value {
                Value::Bytes(bytes) => bytes.to_sql(ty, out),
                other => text(other, ty)?.into_bytes().to_sql(ty, out),
            },
            // Text-like and user-defined types take the textual form.
            _ => {
                out.extend_from_slice(text(value, ty)?.as_bytes());
                Ok(IsNull::No)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

pub struct PgParamStore {
    pub params: Vec<PgParam>,
}

impl PgParamStore {
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            params: values.into_iter().map(PgParam::from_value).collect(),
        }
    }

    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|param| param as &(dyn ToSql + Sync))
            .collect()
    }
}
