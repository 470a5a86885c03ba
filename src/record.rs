use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DashboardError, FieldError, Result};

/// Highest value accepted for the two 0..=10 rating columns.
pub const MAX_RATING: u8 = 10;

/// Layout used for `Report time` and `Reported` cells.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    City,
    ResponseTimeRating,
    Cases,
    SecurityType,
    StationDashboardScore,
    CaseNumber,
    Kgid,
    ReportTime,
    Reported,
}

impl Column {
    pub const ALL: [Column; 9] = [
        Column::City,
        Column::ResponseTimeRating,
        Column::Cases,
        Column::SecurityType,
        Column::StationDashboardScore,
        Column::CaseNumber,
        Column::Kgid,
        Column::ReportTime,
        Column::Reported,
    ];

    /// Header text used in the backing spreadsheet.
    pub fn header(self) -> &'static str {
        match self {
            Column::City => "City",
            Column::ResponseTimeRating => "Response time Rating",
            Column::Cases => "Cases",
            Column::SecurityType => "Security Type",
            Column::StationDashboardScore => "Station Dashboard",
            Column::CaseNumber => "Case Number",
            Column::Kgid => "KGID",
            Column::ReportTime => "Report time",
            Column::Reported => "Reported",
        }
    }

    pub fn from_header(header: &str) -> Option<Self> {
        let header = header.trim();
        Column::ALL.into_iter().find(|c| c.header() == header)
    }

    /// Field name used in forms and API payloads.
    pub fn field_name(self) -> &'static str {
        match self {
            Column::City => "city",
            Column::ResponseTimeRating => "response_time_rating",
            Column::Cases => "cases",
            Column::SecurityType => "security_type",
            Column::StationDashboardScore => "station_dashboard_score",
            Column::CaseNumber => "case_number",
            Column::Kgid => "kgid",
            Column::ReportTime => "report_time",
            Column::Reported => "reported",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Column::ResponseTimeRating | Column::Cases | Column::StationDashboardScore
        )
    }

    /// Parses `raw` into a value suitable for this column.
    pub fn parse_value(self, raw: &str) -> std::result::Result<FieldValue, FieldError> {
        let raw = raw.trim();
        match self {
            Column::ResponseTimeRating | Column::StationDashboardScore => match raw.parse::<u8>() {
                Ok(v) if v <= MAX_RATING => Ok(FieldValue::Integer(u32::from(v))),
                _ => Err(FieldError::new(
                    self.field_name(),
                    format!("must be an integer between 0 and {MAX_RATING}"),
                )),
            },
            Column::Cases => raw.parse::<u32>().map(FieldValue::Integer).map_err(|_| {
                FieldError::new(self.field_name(), "must be a non-negative integer")
            }),
            _ => Ok(FieldValue::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// The value held by one cell of an incident row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(u32),
}

impl FieldValue {
    pub fn as_integer(&self) -> Option<u32> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(v) => write!(f, "{v}"),
        }
    }
}

/// One row of the station dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub city: String,
    pub response_time_rating: u8,
    pub cases: u32,
    pub security_type: String,
    pub station_dashboard_score: u8,
    pub case_number: String,
    pub kgid: String,
    pub report_time: String,
    #[serde(default)]
    pub reported: String,
}

impl IncidentRecord {
    pub fn get(&self, column: Column) -> FieldValue {
        match column {
            Column::City => FieldValue::Text(self.city.clone()),
            Column::ResponseTimeRating => FieldValue::Integer(u32::from(self.response_time_rating)),
            Column::Cases => FieldValue::Integer(self.cases),
            Column::SecurityType => FieldValue::Text(self.security_type.clone()),
            Column::StationDashboardScore => {
                FieldValue::Integer(u32::from(self.station_dashboard_score))
            }
            Column::CaseNumber => FieldValue::Text(self.case_number.clone()),
            Column::Kgid => FieldValue::Text(self.kgid.clone()),
            Column::ReportTime => FieldValue::Text(self.report_time.clone()),
            Column::Reported => FieldValue::Text(self.reported.clone()),
        }
    }

    /// Borrowed view of a text column, `None` for integer columns.
    pub fn text(&self, column: Column) -> Option<&str> {
        match column {
            Column::City => Some(&self.city),
            Column::SecurityType => Some(&self.security_type),
            Column::CaseNumber => Some(&self.case_number),
            Column::Kgid => Some(&self.kgid),
            Column::ReportTime => Some(&self.report_time),
            Column::Reported => Some(&self.reported),
            _ => None,
        }
    }

    /// Overwrites one column. The value must already have been parsed for
    /// that column; a mismatched kind is rejected without touching the row.
    pub fn set(&mut self, column: Column, value: FieldValue) -> Result<()> {
        match (column, value) {
            (Column::ResponseTimeRating, FieldValue::Integer(v)) => {
                self.response_time_rating = rating(column, v)?;
            }
            (Column::StationDashboardScore, FieldValue::Integer(v)) => {
                self.station_dashboard_score = rating(column, v)?;
            }
            (Column::Cases, FieldValue::Integer(v)) => self.cases = v,
            (Column::City, FieldValue::Text(s)) => self.city = s,
            (Column::SecurityType, FieldValue::Text(s)) => self.security_type = s,
            (Column::CaseNumber, FieldValue::Text(s)) => self.case_number = s,
            (Column::Kgid, FieldValue::Text(s)) => self.kgid = s,
            (Column::ReportTime, FieldValue::Text(s)) => self.report_time = s,
            (Column::Reported, FieldValue::Text(s)) => self.reported = s,
            (column, _) => {
                return Err(DashboardError::validation(
                    column.field_name(),
                    "value has the wrong type for this column",
                ));
            }
        }
        Ok(())
    }

    /// Rejects ratings outside 0..=10.
    pub fn check(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.response_time_rating > MAX_RATING {
            errors.push(out_of_range(Column::ResponseTimeRating));
        }
        if self.station_dashboard_score > MAX_RATING {
            errors.push(out_of_range(Column::StationDashboardScore));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DashboardError::Validation(errors))
        }
    }

    /// Builds a record from raw cell strings, one per column. Integer columns
    /// must parse; text columns are taken as-is.
    pub fn from_cells(
        cells: impl Fn(Column) -> String,
    ) -> std::result::Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut int = |column: Column| match column.parse_value(&cells(column)) {
            Ok(value) => value.as_integer().unwrap_or_default(),
            Err(e) => {
                errors.push(e);
                0
            }
        };
        let response_time_rating = int(Column::ResponseTimeRating) as u8;
        let cases = int(Column::Cases);
        let station_dashboard_score = int(Column::StationDashboardScore) as u8;

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(IncidentRecord {
            city: cells(Column::City),
            response_time_rating,
            cases,
            security_type: cells(Column::SecurityType),
            station_dashboard_score,
            case_number: cells(Column::CaseNumber),
            kgid: cells(Column::Kgid),
            report_time: cells(Column::ReportTime),
            reported: cells(Column::Reported),
        })
    }
}

fn rating(column: Column, v: u32) -> Result<u8> {
    u8::try_from(v)
        .ok()
        .filter(|r| *r <= MAX_RATING)
        .ok_or_else(|| DashboardError::Validation(vec![out_of_range(column)]))
}

fn out_of_range(column: Column) -> FieldError {
    FieldError::new(
        column.field_name(),
        format!("must be an integer between 0 and {MAX_RATING}"),
    )
}
