use chrono::{Datelike, Timelike};
use model::core::value::Value;
use mysql_async::Value as MySqlValue;
use mysql_common::params::Params;

/// A bound value in MySQL's wire representation.
pub struct MySqlParam(MySqlValue);

impl MySqlParam {
    pub fn from_value(value: &Value) -> Self {
        let raw = match value {
            Value::Int(i) => MySqlValue::Int(*i),
            Value::Uint(u) => MySqlValue::UInt(*u),
            Value::Float(f) => MySqlValue::Double(*f),
            Value::Decimal(d) => MySqlValue::Bytes(d.to_string().into_bytes()),
            Value::String(s) => MySqlValue::Bytes(s.clone().into_bytes()),
            Value::Boolean(b) => MySqlValue::Int(i64::from(*b)),
            Value::Json(j) => match j {
                serde_json::Value::String(s) => MySqlValue::Bytes(s.clone().into_bytes()),
                other => MySqlValue::Bytes(other.to_string().into_bytes()),
            },
            Value::Uuid(u) => MySqlValue::Bytes(u.to_string().into_bytes()),
            Value::Bytes(b) => MySqlValue::Bytes(b.clone()),
            Value::Date(d) => MySqlValue::Date(
                d.year() as u16,
                d.month() as u8,
                d.day() as u8,
                0,
                0,
                0,
                0,
            ),
            Value::Timestamp(ts) => {
                let naive = ts.naive_utc();
                MySqlValue::Date(
                    naive.year() as u16,
                    naive.month() as u8,
                    naive.day() as u8,
                    naive.hour() as u8,
                    naive.minute() as u8,
                    naive.second() as u8,
                    naive.and_utc().timestamp_subsec_micros(),
                )
            }
            Value::Null => MySqlValue::NULL,
        };
        MySqlParam(raw)
    }
}

pub struct MySqlParamStore {
    pub params: Vec<MySqlParam>,
}

impl MySqlParamStore {
    pub fn from_values(values: &[Value]) -> Self {
        let params = values.iter().map(MySqlParam::from_value).collect();
        MySqlParamStore { params }
    }

    pub fn params(&self) -> Params {
        if self.params.is_empty() {
            return Params::Empty;
        }
        Params::Positional(self.params.iter().map(|p| p.0.clone()).collect())
    }
}
