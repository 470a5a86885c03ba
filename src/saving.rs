use std::fs;
use std::io::Write;
use std::path::Path;

use rust_xlsxwriter::{Workbook, XlsxError};
use tempfile::NamedTempFile;

use crate::dataset::Dataset;
use crate::error::{DashboardError, Result};
use crate::loader::FileFormat;
use crate::record::{Column, FieldValue};

/// Overwrite the backing file with the full dataset
///
/// The whole table is serialized into a temporary file next to `filename`
/// and then renamed over it, so readers see either the old or the new file.
///
/// # Arguments
/// * `dataset` - The rows to write, in order
/// * `filename` - Destination `.xlsx` or `.csv` path
///
/// # Errors
/// * `DataUnavailable` if the extension is not supported
/// * `Persist` if serialization or any filesystem step fails
pub fn save_dataset(dataset: &Dataset, filename: impl AsRef<Path>) -> Result<()> {
    let path = filename.as_ref();
    let bytes = match FileFormat::from_path(path)? {
        FileFormat::Xlsx => to_xlsx(dataset).map_err(|e| DashboardError::Persist(e.to_string()))?,
        FileFormat::Csv => to_csv(dataset)?,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(persist_error)?;
    file.write_all(&bytes).map_err(persist_error)?;
    file.as_file().sync_all().map_err(persist_error)?;
    // The temp file starts owner-only; keep whatever mode the target had
    if let Ok(metadata) = fs::metadata(path) {
        file.as_file()
            .set_permissions(metadata.permissions())
            .map_err(persist_error)?;
    }
    file.persist(path)
        .map_err(|e| DashboardError::Persist(format!("{}: {}", path.display(), e.error)))?;

    log::info!("Wrote {} incident rows to {}", dataset.len(), path.display());
    Ok(())
}

fn persist_error(e: std::io::Error) -> DashboardError {
    DashboardError::Persist(e.to_string())
}

/// Serializes the dataset as a single-sheet workbook with a header row.
pub fn to_xlsx(dataset: &Dataset) -> std::result::Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (c, column) in Column::ALL.iter().enumerate() {
        worksheet.write_string(0, c as u16, column.header())?;
    }

    for (r, record) in dataset.records().iter().enumerate() {
        let row = (r + 1) as u32;
        for (c, column) in Column::ALL.iter().enumerate() {
            match record.get(*column) {
                FieldValue::Integer(v) => {
                    worksheet.write_number(row, c as u16, f64::from(v))?;
                }
                // Leave empty cells blank rather than writing empty strings
                FieldValue::Text(s) if s.is_empty() => {}
                FieldValue::Text(s) => {
                    worksheet.write_string(row, c as u16, s.as_str())?;
                }
            }
        }
    }

    workbook.save_to_buffer()
}

/// Serializes the dataset as CSV with the spreadsheet header names.
pub fn to_csv(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(Column::ALL.iter().map(|c| c.header()))
        .map_err(|e| DashboardError::Persist(e.to_string()))?;

    for record in dataset.records() {
        writer
            .write_record(Column::ALL.iter().map(|c| record.get(*c).to_string()))
            .map_err(|e| DashboardError::Persist(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| DashboardError::Persist(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_dataset;
    use crate::record::IncidentRecord;

    fn sample() -> Dataset {
        Dataset::new(vec![
            IncidentRecord {
                city: "Pune, East".to_string(),
                response_time_rating: 7,
                cases: 5,
                security_type: "Patrol".to_string(),
                station_dashboard_score: 3,
                case_number: "C100".to_string(),
                kgid: "007".to_string(),
                report_time: "2024-01-02 10:00:00".to_string(),
                reported: String::new(),
            },
            IncidentRecord {
                city: "Delhi".to_string(),
                response_time_rating: 10,
                cases: 0,
                security_type: "CCTV".to_string(),
                station_dashboard_score: 0,
                case_number: "C7".to_string(),
                kgid: "K2".to_string(),
                report_time: "2024-01-03 11:00:00".to_string(),
                reported: "2024-01-04 12:00:00".to_string(),
            },
        ])
    }

    #[test]
    fn xlsx_file_reads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.xlsx");

        save_dataset(&sample(), &path).unwrap();
        let loaded = load_dataset(&path).unwrap();

        assert_eq!(loaded, sample());
    }

    #[test]
    fn csv_file_reads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.csv");

        save_dataset(&sample(), &path).unwrap();
        assert_eq!(load_dataset(&path).unwrap(), sample());

        // A second write replaces the file rather than appending to it
        save_dataset(&Dataset::default(), &path).unwrap();
        assert!(load_dataset(&path).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_keeps_existing_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.csv");
        save_dataset(&sample(), &path).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let data = load_dataset(&path).unwrap();
        save_dataset(&data, &path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn unknown_columns_are_gone_after_a_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.csv");
        fs::write(
            &path,
            "Notes,City,Response time Rating,Cases,Security Type,Station Dashboard,Case Number,KGID,Report time,Reported\n\
             keep out,Pune,7,5,Patrol,3,C100,K1,2024-01-02 10:00:00,\n",
        )
        .unwrap();

        let data = load_dataset(&path).unwrap();
        save_dataset(&data, &path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let header = contents.lines().next().unwrap();
        assert!(!header.contains("Notes"));
        assert!(!contents.contains("keep out"));
        assert_eq!(load_dataset(&path).unwrap(), data);
    }

    #[test]
    fn unsupported_extension_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        assert!(save_dataset(&sample(), &path).is_err());
        assert!(!path.exists());
    }
}
