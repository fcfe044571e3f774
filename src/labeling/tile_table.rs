//! Tile table: one row per tile, grouped into contiguous per-slide blocks.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TileTableError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid tile record on line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
    /// A row lacks a column the table requires.
    #[error("missing column `{column}` in row {row}")]
    MissingColumn { column: &'static str, row: usize },
    #[error("tile table is empty")]
    Empty,
    /// A column's length differs from the `wsi` column.
    #[error("column `{column}` has {actual} rows, expected {expected}")]
    ColumnLength {
        column: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Slide blocks overlap or leave a gap.
    #[error("slide `{wsi}` starting at row {start} does not form one contiguous block")]
    SlidePartition { wsi: String, start: usize },
}

/// Raw tile row as it appears in `tiles.jsonl`.
#[derive(Debug, Clone, Deserialize)]
pub struct TileRecord {
    pub wsi: String,
    /// Ground-truth class, or the unlabeled index.
    pub class: Option<usize>,
    #[serde(default)]
    pub wsi_primary_label: Option<usize>,
    #[serde(default)]
    pub wsi_secondary_label: Option<usize>,
    #[serde(default)]
    pub wsi_label: Option<usize>,
    pub wsi_contains_unlabeled: Option<bool>,
}

/// Slide-level weak labels, either one label or a primary/secondary pair per row.
#[derive(Debug, Clone, PartialEq)]
pub enum WeakLabelColumns {
    Single(Vec<usize>),
    PrimarySecondary {
        primary: Vec<usize>,
        secondary: Vec<usize>,
    },
}

impl WeakLabelColumns {
    fn check_len(&self, expected: usize) -> Result<(), TileTableError> {
        match self {
            Self::Single(labels) => check_column_len("wsi_label", labels.len(), expected),
            Self::PrimarySecondary { primary, secondary } => {
                check_column_len("wsi_primary_label", primary.len(), expected)?;
                check_column_len("wsi_secondary_label", secondary.len(), expected)
            }
        }
    }

    /// Weak labels of `row` in processing order (primary before secondary), or `None`
    /// past the end of the columns.
    pub fn labels_at(&self, row: usize) -> Option<Vec<usize>> {
        match self {
            Self::Single(labels) => labels.get(row).map(|&label| vec![label]),
            Self::PrimarySecondary { primary, secondary } => {
                Some(vec![*primary.get(row)?, *secondary.get(row)?])
            }
        }
    }
}

/// Validated, column-oriented tile table.
///
/// Rows of one slide are adjacent; the table is never re-sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct TileTable {
    wsi: Vec<String>,
    class: Vec<usize>,
    weak_labels: WeakLabelColumns,
    wsi_contains_unlabeled: Vec<bool>,
}

/// Contiguous block of rows belonging to one slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideBlock {
    pub wsi: String,
    pub rows: Range<usize>,
}

fn check_column_len(column: &'static str, actual: usize, expected: usize) -> Result<(), TileTableError> {
    if actual == expected {
        Ok(())
    } else {
        Err(TileTableError::ColumnLength {
            column,
            expected,
            actual,
        })
    }
}

impl TileTable {
    /// Build a table from columns, rejecting an empty table or columns whose length
    /// differs from `wsi`.
    pub fn new(
        wsi: Vec<String>,
        class: Vec<usize>,
        weak_labels: WeakLabelColumns,
        wsi_contains_unlabeled: Vec<bool>,
    ) -> Result<Self, TileTableError> {
        if wsi.is_empty() {
            return Err(TileTableError::Empty);
        }
        let rows = wsi.len();
        check_column_len("class", class.len(), rows)?;
        check_column_len("wsi_contains_unlabeled", wsi_contains_unlabeled.len(), rows)?;
        weak_labels.check_len(rows)?;
        Ok(Self {
            wsi,
            class,
            weak_labels,
            wsi_contains_unlabeled,
        })
    }

    /// Build a table from raw records, checking that every required column is present.
    ///
    /// The weak-label layout is taken from the first row: if it carries
    /// `wsi_primary_label`, every row must carry both primary and secondary labels,
    /// otherwise every row must carry `wsi_label`.
    pub fn from_records(records: Vec<TileRecord>) -> Result<Self, TileTableError> {
        let Some(first) = records.first() else {
            return Err(TileTableError::Empty);
        };
        let paired = first.wsi_primary_label.is_some();
        let n = records.len();
        let mut wsi = Vec::with_capacity(n);
        let mut class = Vec::with_capacity(n);
        let mut contains_unlabeled = Vec::with_capacity(n);
        let mut primary = Vec::with_capacity(n);
        let mut secondary = Vec::with_capacity(if paired { n } else { 0 });

        for (row, record) in records.into_iter().enumerate() {
            let missing = |column| TileTableError::MissingColumn { column, row };
            class.push(record.class.ok_or_else(|| missing("class"))?);
            contains_unlabeled.push(
                record
                    .wsi_contains_unlabeled
                    .ok_or_else(|| missing("wsi_contains_unlabeled"))?,
            );
            if paired {
                primary.push(
                    record
                        .wsi_primary_label
                        .ok_or_else(|| missing("wsi_primary_label"))?,
                );
                secondary.push(
                    record
                        .wsi_secondary_label
                        .ok_or_else(|| missing("wsi_secondary_label"))?,
                );
            } else {
                primary.push(record.wsi_label.ok_or_else(|| missing("wsi_label"))?);
            }
            wsi.push(record.wsi);
        }

        let weak_labels = if paired {
            WeakLabelColumns::PrimarySecondary { primary, secondary }
        } else {
            WeakLabelColumns::Single(primary)
        };
        Self::new(wsi, class, weak_labels, contains_unlabeled)
    }

    /// Load a table from a JSONL file, one [`TileRecord`] per line.
    pub fn load_jsonl(path: &Path) -> Result<Self, TileTableError> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|source| TileTableError::Json {
                line: idx + 1,
                source,
            })?;
            records.push(record);
        }
        Self::from_records(records)
    }

    pub fn len(&self) -> usize {
        self.wsi.len()
    }

    /// Slide id of every row.
    pub fn wsi(&self) -> &[String] {
        &self.wsi
    }

    /// Ground-truth class of every row; the unlabeled index marks unknown tiles.
    pub fn class(&self) -> &[usize] {
        &self.class
    }

    pub fn weak_labels(&self) -> &WeakLabelColumns {
        &self.weak_labels
    }

    pub fn wsi_contains_unlabeled(&self) -> &[bool] {
        &self.wsi_contains_unlabeled
    }

    pub fn is_empty(&self) -> bool {
        self.wsi.is_empty()
    }

    /// Split the table into per-slide blocks in table order.
    ///
    /// A block's length is the total number of rows carrying its slide id, so a slide
    /// whose rows are scattered produces a block that either runs past the end of the
    /// table or contains another slide's rows. Both are reported as
    /// [`TileTableError::SlidePartition`].
    pub fn slide_blocks(&self) -> Result<Vec<SlideBlock>, TileTableError> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for name in &self.wsi {
            *counts.entry(name.as_str()).or_default() += 1;
        }

        let mut blocks = Vec::with_capacity(counts.len());
        let mut start = 0usize;
        while start < self.len() {
            let name = &self.wsi[start];
            let end = start + counts[name.as_str()];
            let partition_error = || TileTableError::SlidePartition {
                wsi: name.clone(),
                start,
            };
            if end > self.len() {
                return Err(partition_error());
            }
            if self.wsi[start..end].iter().any(|other| other != name) {
                return Err(partition_error());
            }
            blocks.push(SlideBlock {
                wsi: name.clone(),
                rows: start..end,
            });
            start = end;
        }
        Ok(blocks)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn record(wsi: &str, class: usize, label: usize, unlabeled: bool) -> TileRecord {
        TileRecord {
            wsi: wsi.to_string(),
            class: Some(class),
            wsi_primary_label: None,
            wsi_secondary_label: None,
            wsi_label: Some(label),
            wsi_contains_unlabeled: Some(unlabeled),
        }
    }

    #[test]
    fn splits_contiguous_slides_into_blocks() {
        let table = TileTable::from_records(vec![
            record("a", 0, 1, true),
            record("a", 0, 1, true),
            record("b", 2, 2, false),
        ])
        .unwrap();
        let blocks = table.slide_blocks().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].rows, 0..2);
        assert_eq!(blocks[1].wsi, "b");
        assert_eq!(blocks[1].rows, 2..3);
    }

    #[test]
    fn scattered_slide_is_a_partition_error() {
        let table = TileTable::from_records(vec![
            record("a", 0, 1, true),
            record("b", 0, 1, true),
            record("a", 0, 1, true),
        ])
        .unwrap();
        let err = table.slide_blocks().unwrap_err();
        assert!(matches!(err, TileTableError::SlidePartition { start: 0, .. }));
    }

    #[test]
    fn missing_weak_label_names_column_and_row() {
        let mut bad = record("a", 0, 1, true);
        bad.wsi_label = None;
        let err = TileTable::from_records(vec![record("a", 0, 1, true), bad]).unwrap_err();
        match err {
            TileTableError::MissingColumn { column, row } => {
                assert_eq!(column, "wsi_label");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn paired_layout_requires_secondary_label() {
        let mut row = record("a", 0, 0, true);
        row.wsi_label = None;
        row.wsi_primary_label = Some(2);
        let err = TileTable::from_records(vec![row]).unwrap_err();
        assert!(matches!(
            err,
            TileTableError::MissingColumn {
                column: "wsi_secondary_label",
                row: 0
            }
        ));
    }

    #[test]
    fn loads_jsonl_with_paired_labels() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"wsi":"s1","class":4,"wsi_primary_label":3,"wsi_secondary_label":2,"wsi_contains_unlabeled":true}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"wsi":"s1","class":0,"wsi_primary_label":3,"wsi_secondary_label":2,"wsi_contains_unlabeled":true}}"#
        )
        .unwrap();
        let table = TileTable::load_jsonl(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.class(), &[4, 0]);
        assert_eq!(table.weak_labels().labels_at(1), Some(vec![3, 2]));
        assert_eq!(table.weak_labels().labels_at(2), None);
    }

    #[test]
    fn mismatched_column_lengths_are_rejected() {
        let err = TileTable::new(
            vec!["a".into(), "b".into()],
            vec![2, 2],
            WeakLabelColumns::Single(vec![1, 1]),
            vec![true],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TileTableError::ColumnLength {
                column: "wsi_contains_unlabeled",
                expected: 2,
                actual: 1
            }
        ));

        let err = TileTable::new(
            vec!["a".into(), "b".into()],
            vec![2, 2],
            WeakLabelColumns::PrimarySecondary {
                primary: vec![1, 1],
                secondary: vec![2],
            },
            vec![true, true],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TileTableError::ColumnLength {
                column: "wsi_secondary_label",
                ..
            }
        ));
    }

    #[test]
    fn empty_table_is_rejected() {
        assert!(matches!(
            TileTable::from_records(Vec::new()),
            Err(TileTableError::Empty)
        ));
    }
}
