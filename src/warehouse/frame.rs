//! Conversions between SQLite result sets and polars DataFrames

use crate::error::Result;
use polars::prelude::*;
use rusqlite::types::ValueRef;
use rusqlite::Statement;

/// Column buffer filled while stepping through a result set.
/// Integer columns widen to float when a REAL shows up, and anything that
/// meets a TEXT value becomes a string column.
enum ColumnBuffer {
    Empty(usize),
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnBuffer {
    fn push(&mut self, value: ValueRef<'_>) {
        match value {
            ValueRef::Null => self.push_null(),
            ValueRef::Integer(i) => match self {
                ColumnBuffer::Empty(nulls) => {
                    let mut v = vec![None; *nulls];
                    v.push(Some(i));
                    *self = ColumnBuffer::Int(v);
                }
                ColumnBuffer::Int(v) => v.push(Some(i)),
                ColumnBuffer::Float(v) => v.push(Some(i as f64)),
                ColumnBuffer::Text(v) => v.push(Some(i.to_string())),
            },
            ValueRef::Real(f) => match self {
                ColumnBuffer::Empty(nulls) => {
                    let mut v = vec![None; *nulls];
                    v.push(Some(f));
                    *self = ColumnBuffer::Float(v);
                }
                ColumnBuffer::Int(v) => {
                    let mut widened: Vec<Option<f64>> = v.iter().map(|x| x.map(|i| i as f64)).collect();
                    widened.push(Some(f));
                    *self = ColumnBuffer::Float(widened);
                }
                ColumnBuffer::Float(v) => v.push(Some(f)),
                ColumnBuffer::Text(v) => v.push(Some(f.to_string())),
            },
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                let s = String::from_utf8_lossy(bytes).into_owned();
                match self {
                    ColumnBuffer::Empty(nulls) => {
                        let mut v = vec![None; *nulls];
                        v.push(Some(s));
                        *self = ColumnBuffer::Text(v);
                    }
                    ColumnBuffer::Int(v) => {
                        let mut text: Vec<Option<String>> = v.iter().map(|x| x.map(|i| i.to_string())).collect();
                        text.push(Some(s));
                        *self = ColumnBuffer::Text(text);
                    }
                    ColumnBuffer::Float(v) => {
                        let mut text: Vec<Option<String>> = v.iter().map(|x| x.map(|f| f.to_string())).collect();
                        text.push(Some(s));
                        *self = ColumnBuffer::Text(text);
                    }
                    ColumnBuffer::Text(v) => v.push(Some(s)),
                }
            }
        }
    }

    fn push_null(&mut self) {
        match self {
            ColumnBuffer::Empty(nulls) => *nulls += 1,
            ColumnBuffer::Int(v) => v.push(None),
            ColumnBuffer::Float(v) => v.push(None),
            ColumnBuffer::Text(v) => v.push(None),
        }
    }

    fn into_series(self, name: &str) -> Series {
        match self {
            ColumnBuffer::Empty(nulls) => Series::new(name, vec![None::<String>; nulls]),
            ColumnBuffer::Int(v) => Series::new(name, v),
            ColumnBuffer::Float(v) => Series::new(name, v),
            ColumnBuffer::Text(v) => Series::new(name, v),
        }
    }
}

/// Run a prepared statement and collect every row into a DataFrame.
pub fn query_to_frame<P: rusqlite::Params>(stmt: &mut Statement<'_>, params: P) -> Result<DataFrame> {
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut buffers: Vec<ColumnBuffer> = names.iter().map(|_| ColumnBuffer::Empty(0)).collect();

    let mut rows = stmt.query(params)?;
    while let Some(row) = rows.next()? {
        for (idx, buffer) in buffers.iter_mut().enumerate() {
            buffer.push(row.get_ref(idx)?);
        }
    }

    let columns: Vec<Series> = buffers
        .into_iter()
        .zip(names.iter())
        .map(|(buffer, name)| buffer.into_series(name))
        .collect();

    Ok(DataFrame::new(columns)?)
}

/// Read a numeric column as `f64`, nulls become 0.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().map(|v| v.unwrap_or(0.0)).collect())
}

/// Read a numeric column as `f64`, keeping nulls.
pub fn opt_f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

/// Read a numeric column as `i64`, nulls become 0.
pub fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let series = df.column(name)?.cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().map(|v| v.unwrap_or(0)).collect())
}

/// Read a text column, nulls become the empty string.
pub fn string_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df.column(name)?.cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

/// Single numeric cell from a one-row aggregate, `None` when null or absent.
pub fn scalar_f64(df: &DataFrame, name: &str) -> Result<Option<f64>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    let values = series.f64()?;
    if values.is_empty() {
        return Ok(None);
    }
    Ok(values.get(0))
}
