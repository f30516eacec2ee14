//! Small column accessors over polars frames.
//!
//! Ledgers arrive as text grids and merged frames carry nulls for sources that
//! did not contribute a row, so every reader here yields owned values with the
//! null case made explicit.

use anyhow::{Result, anyhow};
use polars::prelude::*;

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

/// Cells of a column as text, `None` for nulls. Absent column yields `None`.
pub fn optional_text(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<String>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let column = column.cast(&DataType::String)?;
    let values = column
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect();
    Ok(Some(values))
}

/// Cells of a column as integers, `None` for nulls and non-numeric cells.
pub fn optional_ints(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<i64>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let column = column.cast(&DataType::Int64)?;
    let values = column.i64()?.into_iter().collect();
    Ok(Some(values))
}

/// Text cells with nulls flattened to empty strings.
pub fn text_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let values = optional_text(df, name)?
        .ok_or_else(|| anyhow!("Column not found: {}", name))?;
    Ok(values.into_iter().map(Option::unwrap_or_default).collect())
}

/// Integer cells with nulls flattened to zero; absent column is all zeros.
pub fn int_values_or_zero(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    Ok(match optional_ints(df, name)? {
        Some(values) => values.into_iter().map(|v| v.unwrap_or(0)).collect(),
        None => vec![0; df.height()],
    })
}

pub fn text_column(name: &str, values: Vec<String>) -> Column {
    Series::new(name.into(), values).into()
}

pub fn int_column(name: &str, values: Vec<i64>) -> Column {
    Series::new(name.into(), values).into()
}

/// Build a frame of text columns from a header row and data rows.
///
/// Short rows are padded with empty cells; extra cells are ignored.
pub fn frame_from_rows(headers: &[String], rows: &[Vec<String>]) -> Result<DataFrame> {
    let columns: Vec<Column> = headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            let values: Vec<String> = rows
                .iter()
                .map(|row| row.get(index).cloned().unwrap_or_default())
                .collect();
            text_column(header, values)
        })
        .collect();

    DataFrame::new(columns).map_err(|e| anyhow!("Failed to create DataFrame: {}", e))
}

/// Stack two text frames, taking the union of their columns.
///
/// Columns keep first-seen order; a cell missing on one side becomes empty.
pub fn union_text_frames(top: &DataFrame, bottom: &DataFrame) -> Result<DataFrame> {
    let mut headers = column_names(top);
    for name in column_names(bottom) {
        if !headers.contains(&name) {
            headers.push(name);
        }
    }

    let columns = headers
        .iter()
        .map(|header| {
            let mut values = padded_text(top, header)?;
            values.extend(padded_text(bottom, header)?);
            Ok(text_column(header, values))
        })
        .collect::<Result<Vec<Column>>>()?;

    DataFrame::new(columns).map_err(|e| anyhow!("Failed to stack DataFrames: {}", e))
}

fn padded_text(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    if has_column(df, name) {
        text_values(df, name)
    } else {
        Ok(vec![String::new(); df.height()])
    }
}

/// Keep only rows whose flag is set.
pub fn filter_rows(df: &DataFrame, keep: &[bool]) -> Result<DataFrame> {
    let mask = BooleanChunked::from_slice("keep".into(), keep);
    Ok(df.filter(&mask)?)
}
