use std::collections::HashMap;
use std::path::Path;

use crate::dataset::Dataset;
use crate::error::{DashboardError, Result};
use crate::record::{Column, IncidentRecord};

/// Backing file formats the store can read and write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Xlsx,
    Csv,
}

impl FileFormat {
    /// Picks the format from the file extension (case-insensitive).
    ///
    /// # Errors
    /// * `DataUnavailable` when the extension is missing or unsupported
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("xlsx") => Ok(FileFormat::Xlsx),
            Some("csv") => Ok(FileFormat::Csv),
            Some(ext) => Err(DashboardError::DataUnavailable(format!(
                "unsupported file extension: {ext}"
            ))),
            None => Err(DashboardError::DataUnavailable(
                "dataset file has no extension".to_string(),
            )),
        }
    }
}

/// Load the station dataset from a spreadsheet file
///
/// Detects the format from the extension and reads every row into memory.
/// Columns are matched by header name, so their order in the file does not
/// matter. Columns that are not part of the incident schema are skipped.
///
/// # Arguments
/// * `filepath` - Path to the `.xlsx` or `.csv` file
///
/// # Returns
/// * `Result<Dataset>` - The loaded dataset
///
/// # Errors
/// * `DataUnavailable` if the file is missing, unreadable, lacks one of the
///   nine required headers, or holds a non-integer where an integer is expected
///
/// # Examples
/// ```no_run
/// use station_dashboard::loader::load_dataset;
///
/// match load_dataset("dataset.xlsx") {
///     Ok(data) => println!("Loaded {} incidents", data.len()),
///     Err(e) => eprintln!("Error loading dataset: {}", e),
/// }
/// ```
pub fn load_dataset(filepath: impl AsRef<Path>) -> Result<Dataset> {
    let path = filepath.as_ref();
    let rows = match FileFormat::from_path(path)? {
        FileFormat::Xlsx => read_excel_rows(path)?,
        FileFormat::Csv => read_csv_rows(path)?,
    };
    let dataset = rows_to_dataset(rows)?;
    log::info!("Loaded {} incident rows from {}", dataset.len(), path.display());
    Ok(dataset)
}

/// Reads the first worksheet of an Excel workbook as rows of text cells.
fn read_excel_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    use calamine::{Reader, Xlsx, open_workbook};

    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| {
        DashboardError::DataUnavailable(format!("cannot open {}: {e}", path.display()))
    })?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| DashboardError::DataUnavailable("no sheets found in workbook".into()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| DashboardError::DataUnavailable(format!("cannot read {sheet_name}: {e}")))?;

    range
        .rows()
        .enumerate()
        .map(|(r, row)| {
            row.iter()
                .map(cell_to_text)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| DashboardError::DataUnavailable(format!("row {}: {e}", r + 1)))
        })
        .collect()
}

/// Renders an Excel cell the way it should compare as text. Whole floats lose
/// their fraction so a numeric KGID `7` matches the string `"7"`.
fn cell_to_text(cell: &calamine::Data) -> std::result::Result<String, String> {
    use calamine::{Data, DataType};

    match cell {
        Data::Empty => Ok(String::new()),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Ok(s.clone()),
        Data::Int(i) => Ok(i.to_string()),
        Data::Float(f) => Ok(float_to_text(*f)),
        Data::Bool(b) => Ok(b.to_string()),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format(crate::record::TIMESTAMP_FORMAT).to_string())
            .ok_or_else(|| "unreadable date cell".to_string()),
        Data::Error(e) => Err(format!("cell error {e:?}")),
    }
}

fn float_to_text(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| {
            DashboardError::DataUnavailable(format!("cannot open {}: {e}", path.display()))
        })?;

    reader
        .records()
        .map(|row| {
            row.map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| DashboardError::DataUnavailable(e.to_string()))
        })
        .collect()
}

/// Maps the header row to columns and parses every following row.
fn rows_to_dataset(rows: Vec<Vec<String>>) -> Result<Dataset> {
    let mut rows = rows.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| DashboardError::DataUnavailable("dataset file is empty".to_string()))?;

    let mut positions: HashMap<Column, usize> = HashMap::new();
    for (i, name) in header.iter().enumerate() {
        match Column::from_header(name) {
            Some(column) => {
                positions.entry(column).or_insert(i);
            }
            None if name.trim().is_empty() => {}
            None => log::warn!("Ignoring unknown column {name:?}"),
        }
    }

    let missing: Vec<&str> = Column::ALL
        .iter()
        .filter(|c| !positions.contains_key(*c))
        .map(|c| c.header())
        .collect();
    if !missing.is_empty() {
        return Err(DashboardError::DataUnavailable(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }

    let mut records = Vec::new();
    for (r, row) in rows.enumerate() {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let cell = |column: Column| {
            row.get(positions[&column])
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };
        let record = IncidentRecord::from_cells(cell).map_err(|errors| {
            let detail: Vec<String> = errors.iter().map(ToString::to_string).collect();
            // +2: one for the header, one for 1-based numbering
            DashboardError::DataUnavailable(format!("row {}: {}", r + 2, detail.join(", ")))
        })?;
        records.push(record);
    }

    Ok(Dataset::new(records))
}
