use crate::models::Retailer;
use crate::models::schema::{self, is_join_key};
use crate::processor::frame::{column_names, has_column, text_column, text_values};
use anyhow::{Context, Result};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Marks a placeholder standing in for an empty key cell during the join.
const UNKEYED_MARK: char = '\u{1f}';

/// Outer join of the canonical retailer frames plus the record of which merged
/// column holds which retailer's field.
#[derive(Debug, Clone)]
pub struct MergedFrame {
    pub frame: DataFrame,
    lineage: HashMap<(Retailer, String), String>,
    sources: Vec<Retailer>,
}

impl MergedFrame {
    pub fn empty() -> Self {
        Self {
            frame: DataFrame::empty(),
            lineage: HashMap::new(),
            sources: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Merged column carrying `retailer`'s `column`, if that retailer
    /// contributed one.
    pub fn column_for(&self, retailer: Retailer, column: &str) -> Option<&str> {
        self.lineage
            .get(&(retailer, column.to_string()))
            .map(String::as_str)
    }

    /// Retailers that contributed at least one row, in join order.
    pub fn sources(&self) -> &[Retailer] {
        &self.sources
    }
}

pub struct MergeEngine;

impl MergeEngine {
    pub fn new() -> Self {
        MergeEngine
    }

    /// Full outer join on the normalized (date, isbn) key, in retailer
    /// priority order regardless of input order.
    ///
    /// The first non-empty frame keeps its column names. A later frame's
    /// column whose name is already taken is suffixed with the retailer tag
    /// before joining, so nothing is overwritten. Duplicate keys are joined
    /// as-is. A row with an empty date or ISBN never matches another row; it
    /// comes through on its own with the empty cell intact.
    pub fn merge(&self, mut frames: Vec<(Retailer, DataFrame)>) -> Result<MergedFrame> {
        frames.sort_by_key(|(retailer, _)| retailer.priority());

        let mut merged: Option<DataFrame> = None;
        let mut lineage = HashMap::new();
        let mut sources = Vec::new();

        for (retailer, mut frame) in frames {
            if frame.height() == 0 {
                debug!("{}: no rows to merge", retailer);
                continue;
            }

            let isolated = Self::isolate_empty_keys(retailer, &mut frame)?;
            if isolated > 0 {
                debug!("{}: {} rows with a partial key left unmatched", retailer, isolated);
            }

            let taken: HashSet<String> = match &merged {
                Some(left) => column_names(left).into_iter().collect(),
                None => HashSet::new(),
            };

            for name in column_names(&frame) {
                if is_join_key(&name) {
                    continue;
                }
                let merged_name = if taken.contains(&name) {
                    let suffixed = format!("{}_{}", name, retailer.tag());
                    frame.rename(&name, suffixed.as_str().into())?;
                    suffixed
                } else {
                    name.clone()
                };
                lineage.insert((retailer, name), merged_name);
            }

            let rows = frame.height();
            merged = Some(match merged.take() {
                None => frame,
                Some(left) => Self::full_join(left, frame)
                    .with_context(|| format!("Failed to join {} rows", retailer))?,
            });
            sources.push(retailer);
            info!(
                "Merged {} rows from {} ({} rows after join)",
                rows,
                retailer,
                merged.as_ref().map(|df| df.height()).unwrap_or(0)
            );
        }

        match merged {
            Some(mut frame) => {
                Self::restore_empty_keys(&mut frame)?;
                Ok(MergedFrame { frame, lineage, sources })
            }
            None => {
                info!("No retailer rows to merge");
                Ok(MergedFrame::empty())
            }
        }
    }

    /// Swap each empty key cell for a value unique to its retailer and row.
    /// Returns the number of rows touched.
    fn isolate_empty_keys(retailer: Retailer, frame: &mut DataFrame) -> Result<usize> {
        let mut touched = vec![false; frame.height()];
        for key in [schema::DATE, schema::ISBN] {
            if !has_column(frame, key) {
                continue;
            }
            let mut values = text_values(frame, key)?;
            for (row, value) in values.iter_mut().enumerate() {
                if value.is_empty() {
                    *value = format!("{}{}:{}", UNKEYED_MARK, retailer.tag(), row);
                    touched[row] = true;
                }
            }
            frame.with_column(text_column(key, values))?;
        }
        Ok(touched.iter().filter(|t| **t).count())
    }

    fn restore_empty_keys(frame: &mut DataFrame) -> Result<()> {
        for key in [schema::DATE, schema::ISBN] {
            if !has_column(frame, key) {
                continue;
            }
            let values: Vec<String> = text_values(frame, key)?
                .into_iter()
                .map(|value| if value.starts_with(UNKEYED_MARK) { String::new() } else { value })
                .collect();
            frame.with_column(text_column(key, values))?;
        }
        Ok(())
    }

    fn full_join(left: DataFrame, right: DataFrame) -> Result<DataFrame> {
        let keys = [col(schema::DATE), col(schema::ISBN)];
        let joined = left
            .lazy()
            .join(
                right.lazy(),
                keys.clone(),
                keys,
                JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
            )
            .collect()?;
        Ok(joined)
    }
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::new()
    }
}
