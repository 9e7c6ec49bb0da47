//! Static per-sheet tables loaded once at startup.
//!
//! The source is a JSON export of the workbook: an object keyed by sheet name
//! whose values are arrays of row objects. Cells are stringified on load so
//! the rest of the bot only ever sees text.
use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Columns the bot knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    FullName,
    Phone,
    DaysOverdue,
    TotalDebt,
}

impl RecordField {
    /// Column header as it appears in the source sheet.
    pub fn column(&self) -> &'static str {
        match self {
            RecordField::FullName => "Имя Фамилия",
            RecordField::Phone => "Телефон",
            RecordField::DaysOverdue => "Просрочено дней",
            RecordField::TotalDebt => "Суммарная задолженность",
        }
    }
}

/// One row of a sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Record {
            fields: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Typed accessor; absent columns read as "".
    pub fn field(&self, field: RecordField) -> &str {
        self.get(field.column())
    }

    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }

    fn is_blank(&self) -> bool {
        self.fields.values().all(|value| value.trim().is_empty())
    }
}

/// Ordered, 0-indexed rows of one sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    records: Vec<Record>,
}

impl Table {
    pub fn new(records: Vec<Record>) -> Self {
        Table { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The cursor points past the end of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotFound {
    pub index: usize,
    pub len: usize,
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no record at index {} (table has {})", self.index, self.len)
    }
}

impl std::error::Error for NotFound {}

pub fn record_at(table: &Table, index: usize) -> Result<&Record, NotFound> {
    table.records.get(index).ok_or(NotFound {
        index,
        len: table.len(),
    })
}

/// Ingestion knobs for [`TableStore::load`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Drop rows whose every cell is empty.
    pub skip_blank_rows: bool,
}

/// All sheets, keyed by partition key. Immutable after load.
#[derive(Debug, Clone, Default)]
pub struct TableStore {
    tables: BTreeMap<String, Table>,
}

impl TableStore {
    /// Load the JSON sheet export at `path`.
    pub fn load(path: &Path, options: LoadOptions) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("read tables {}", path.display()))?;
        let value: Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse tables JSON {}", path.display()))?;
        let store = Self::from_json(value, options)?;
        for (sheet, table) in &store.tables {
            if table.is_empty() {
                tracing::warn!(sheet = %sheet, "sheet has no records");
            } else {
                tracing::info!(sheet = %sheet, records = table.len(), "sheet loaded");
            }
        }
        Ok(store)
    }

    pub fn from_json(value: Value, options: LoadOptions) -> Result<Self> {
        let Value::Object(sheets) = value else {
            return Err(anyhow!("tables JSON must be an object keyed by sheet name"));
        };
        let mut tables = BTreeMap::new();
        for (sheet, rows) in sheets {
            let Value::Array(rows) = rows else {
                return Err(anyhow!("sheet {sheet:?} must be an array of rows"));
            };
            let mut records = Vec::with_capacity(rows.len());
            for (idx, row) in rows.into_iter().enumerate() {
                let Value::Object(cells) = row else {
                    return Err(anyhow!("sheet {sheet:?} row {} is not an object", idx + 1));
                };
                let record = record_from_cells(cells);
                if options.skip_blank_rows && record.is_blank() {
                    continue;
                }
                records.push(record);
            }
            tables.insert(sheet, Table::new(records));
        }
        Ok(TableStore { tables })
    }

    pub fn table_for(&self, sheet: &str) -> Option<&Table> {
        self.tables.get(sheet)
    }

    pub fn contains(&self, sheet: &str) -> bool {
        self.tables.contains_key(sheet)
    }

    pub fn sheets(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.tables
            .iter()
            .map(|(sheet, table)| (sheet.as_str(), table))
    }
}

fn record_from_cells(cells: Map<String, Value>) -> Record {
    Record::from_pairs(
        cells
            .into_iter()
            .map(|(column, value)| (column, cell_text(value))),
    )
}

fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => match number.as_f64() {
            // Spreadsheet exports write integral cells as floats.
            Some(float) if float.fract() == 0.0 && float.abs() < 1e15 => {
                (float as i64).to_string()
            }
            _ => number.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cells_are_stringified() {
        let store = TableStore::from_json(
            json!({
                "Sheet1": [
                    {"Имя Фамилия": "Aliyev Vali", "Телефон": 998901234567u64, "Просрочено дней": 12.0, "Суммарная задолженность": 1500.5}
                ]
            }),
            LoadOptions::default(),
        )
        .expect("load tables");
        let table = store.table_for("Sheet1").expect("sheet present");
        let record = record_at(table, 0).expect("first row");
        assert_eq!(record.field(RecordField::FullName), "Aliyev Vali");
        assert_eq!(record.field(RecordField::Phone), "998901234567");
        assert_eq!(record.field(RecordField::DaysOverdue), "12");
        assert_eq!(record.field(RecordField::TotalDebt), "1500.5");
    }

    #[test]
    fn absent_fields_read_empty() {
        let record = Record::from_pairs([("other", "x")]);
        assert_eq!(record.field(RecordField::Phone), "");
        assert_eq!(record.get("missing"), "");
    }

    #[test]
    fn blank_rows_are_kept_unless_requested() {
        let raw = json!({"S": [{"a": "1"}, {"a": "", "b": "  "}, {"a": "3"}]});
        let kept = TableStore::from_json(raw.clone(), LoadOptions::default()).expect("load");
        assert_eq!(kept.table_for("S").map(Table::len), Some(3));

        let skipped = TableStore::from_json(
            raw,
            LoadOptions {
                skip_blank_rows: true,
            },
        )
        .expect("load");
        assert_eq!(skipped.table_for("S").map(Table::len), Some(2));
    }

    #[test]
    fn record_past_end_is_not_found() {
        let table = Table::new(vec![Record::default()]);
        assert_eq!(record_at(&table, 1), Err(NotFound { index: 1, len: 1 }));
    }

    #[test]
    fn non_object_root_is_rejected() {
        assert!(TableStore::from_json(json!([1, 2]), LoadOptions::default()).is_err());
        assert!(TableStore::from_json(json!({"S": [1]}), LoadOptions::default()).is_err());
    }
}
