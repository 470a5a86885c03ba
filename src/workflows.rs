//! Commissioner data entry and constable report marking.
//!
//! Both workflows check the session's permission first, validate their form
//! at the boundary, and only then touch the [`Store`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, FieldError, Result};
use crate::login::{Operation, Session};
use crate::record::{Column, IncidentRecord, TIMESTAMP_FORMAT};
use crate::store::Store;

/// Raw commissioner form. Every field arrives as optional text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncidentForm {
    pub city: Option<String>,
    pub response_time_rating: Option<String>,
    pub cases: Option<String>,
    pub security_type: Option<String>,
    pub station_dashboard_score: Option<String>,
    pub case_number: Option<String>,
    pub kgid: Option<String>,
    pub report_time: Option<String>,
}

impl IncidentForm {
    /// Turns the form into a record, collecting every failing field.
    /// A blank `report_time` becomes `now`; `reported` always starts empty.
    pub fn validate(&self, now: NaiveDateTime) -> std::result::Result<IncidentRecord, Vec<FieldError>> {
        let mut errors = Vec::new();

        let mut text = |column: Column, value: &Option<String>| match present(value) {
            Some(v) => v.to_string(),
            None => {
                errors.push(FieldError::new(column.field_name(), "is required"));
                String::new()
            }
        };
        let city = text(Column::City, &self.city);
        let security_type = text(Column::SecurityType, &self.security_type);
        let case_number = text(Column::CaseNumber, &self.case_number);
        let kgid = text(Column::Kgid, &self.kgid);

        let mut integer = |column: Column, value: &Option<String>| {
            match column.parse_value(present(value).unwrap_or_default()) {
                Ok(v) => v.as_integer().unwrap_or_default(),
                Err(e) => {
                    errors.push(e);
                    0
                }
            }
        };
        let response_time_rating = integer(Column::ResponseTimeRating, &self.response_time_rating);
        let cases = integer(Column::Cases, &self.cases);
        let station_dashboard_score =
            integer(Column::StationDashboardScore, &self.station_dashboard_score);

        let report_time = match present(&self.report_time) {
            None => now.format(TIMESTAMP_FORMAT).to_string(),
            Some(raw) => match NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
                Ok(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
                Err(_) => {
                    errors.push(FieldError::new(
                        Column::ReportTime.field_name(),
                        "must look like YYYY-MM-DD HH:MM:SS",
                    ));
                    String::new()
                }
            },
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(IncidentRecord {
            city,
            response_time_rating: response_time_rating as u8,
            cases,
            security_type,
            station_dashboard_score: station_dashboard_score as u8,
            case_number,
            kgid,
            report_time,
            reported: String::new(),
        })
    }
}

/// Result of a commissioner submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AppendOutcome {
    Appended { row: usize, record: IncidentRecord },
    Rejected { fields: Vec<FieldError> },
}

/// Validates and appends a commissioner's incident.
///
/// Only a session allowed to append may call this; anything else is an error
/// before the form is even looked at.
pub fn submit_incident(
    store: &Store,
    session: &Session,
    form: &IncidentForm,
    now: NaiveDateTime,
) -> Result<AppendOutcome> {
    session.require(Operation::AppendRecord)?;

    let record = match form.validate(now) {
        Ok(record) => record,
        Err(fields) => {
            log::info!("Rejected incident form: {} invalid field(s)", fields.len());
            return Ok(AppendOutcome::Rejected { fields });
        }
    };

    match store.append(record.clone()) {
        Ok((row, _)) => {
            log::info!("Appended case {} for KGID {} at row {row}", record.case_number, record.kgid);
            Ok(AppendOutcome::Appended { row, record })
        }
        Err(DashboardError::Validation(fields)) => Ok(AppendOutcome::Rejected { fields }),
        Err(e) => Err(e),
    }
}

/// Raw constable submission. The photo is only checked for presence.
#[derive(Debug, Clone, Default)]
pub struct ReportForm {
    pub kgid: Option<String>,
    pub case_number: Option<String>,
    pub photo: Option<Vec<u8>>,
}

/// Result of a constable submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportOutcome {
    Updated { rows: Vec<usize>, reported: String },
    NotFound,
    IncompleteInput { missing: Vec<&'static str> },
}

/// Marks every row matching the KGID and case number as reported at `now`.
pub fn report_incident(
    store: &Store,
    session: &Session,
    form: &ReportForm,
    now: NaiveDateTime,
) -> Result<ReportOutcome> {
    session.require(Operation::UpdateReported)?;

    let kgid = present(&form.kgid);
    let case_number = present(&form.case_number);
    let has_photo = form.photo.as_ref().is_some_and(|p| !p.is_empty());

    let (Some(kgid), Some(case_number), true) = (kgid, case_number, has_photo) else {
        let mut missing = Vec::new();
        if kgid.is_none() {
            missing.push("kgid");
        }
        if case_number.is_none() {
            missing.push("case_number");
        }
        if !has_photo {
            missing.push("photo");
        }
        return Ok(ReportOutcome::IncompleteInput { missing });
    };

    let reported = now.format(TIMESTAMP_FORMAT).to_string();
    let rows = store.mark_reported(kgid, case_number, &reported)?;
    if rows.is_empty() {
        log::info!("No record for KGID {kgid} and case {case_number}");
        return Ok(ReportOutcome::NotFound);
    }
    log::info!("Marked {} row(s) reported for KGID {kgid}", rows.len());

    Ok(ReportOutcome::Updated { rows, reported })
}

/// Rows belonging to one officer, as shown on the constable dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KgidView {
    pub kgid: String,
    pub rows: Vec<IncidentRecord>,
    /// Set when no row matches
    pub notice: Option<String>,
}

/// Read-only list of every row whose KGID equals `kgid` as text.
pub fn records_for_kgid(store: &Store, session: &Session, kgid: &str) -> Result<KgidView> {
    session.require(Operation::ViewByKgid)?;

    let kgid = kgid.trim();
    if kgid.is_empty() {
        return Err(DashboardError::validation(Column::Kgid.field_name(), "is required"));
    }

    let dataset = store.load()?;
    let rows: Vec<IncidentRecord> = dataset
        .filter_by_kgid(kgid)
        .into_iter()
        .map(|(_, r)| r.clone())
        .collect();
    let notice = rows
        .is_empty()
        .then(|| "No data found for the entered KGID.".to_string());

    Ok(KgidView {
        kgid: kgid.to_string(),
        rows,
        notice,
    })
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::login::{CredentialStore, Role};
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap()
    }

    fn session(role: Role) -> Session {
        Session {
            authenticated: true,
            role: Some(role),
        }
    }

    fn form() -> IncidentForm {
        IncidentForm {
            city: Some("Pune".into()),
            response_time_rating: Some("7".into()),
            cases: Some("5".into()),
            security_type: Some("Patrol".into()),
            station_dashboard_score: Some("3".into()),
            case_number: Some("C100".into()),
            kgid: Some("K1".into()),
            report_time: None,
        }
    }

    fn empty_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::create(dir.path().join("dataset.csv"), Dataset::default()).unwrap();
        (dir, store)
    }

    #[test]
    fn blank_report_time_defaults_to_now() {
        let record = form().validate(now()).unwrap();
        assert_eq!(record.report_time, "2024-05-06 07:08:09");
        assert!(record.reported.is_empty());
    }

    #[test]
    fn validation_collects_every_bad_field() {
        let bad = IncidentForm {
            city: Some("  ".into()),
            response_time_rating: Some("11".into()),
            cases: Some("-2".into()),
            kgid: None,
            report_time: Some("yesterday".into()),
            ..form()
        };
        let fields: Vec<_> = bad.validate(now()).unwrap_err().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["city", "kgid", "response_time_rating", "cases", "report_time"]
        );
    }

    #[test]
    fn rejected_form_does_not_touch_the_store() {
        let (_dir, store) = empty_store();
        let before = store.generation();
        let bad = IncidentForm {
            cases: Some("many".into()),
            ..form()
        };

        let outcome = submit_incident(&store, &session(Role::Commissioner), &bad, now()).unwrap();

        assert!(matches!(outcome, AppendOutcome::Rejected { .. }));
        assert_eq!(store.generation(), before);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn only_commissioners_may_append() {
        let (_dir, store) = empty_store();
        for role in [Role::Admin, Role::Constable] {
            let err = submit_incident(&store, &session(role), &form(), now()).unwrap_err();
            assert!(matches!(err, DashboardError::Forbidden { .. }));
        }
        assert!(matches!(
            submit_incident(&store, &Session::default(), &form(), now()),
            Err(DashboardError::Auth(_))
        ));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn report_requires_all_three_inputs() {
        let (_dir, store) = empty_store();
        let outcome = report_incident(
            &store,
            &session(Role::Constable),
            &ReportForm {
                kgid: Some("K1".into()),
                case_number: Some(" ".into()),
                photo: Some(Vec::new()),
            },
            now(),
        )
        .unwrap();
        assert_eq!(
            outcome,
            ReportOutcome::IncompleteInput {
                missing: vec!["case_number", "photo"]
            }
        );
    }

    #[test]
    fn kgid_view_reports_no_data() {
        let (_dir, store) = empty_store();
        let view = records_for_kgid(&store, &session(Role::Constable), "K404").unwrap();
        assert!(view.rows.is_empty());
        assert!(view.notice.is_some());

        assert!(matches!(
            records_for_kgid(&store, &session(Role::Commissioner), "K1"),
            Err(DashboardError::Forbidden { .. })
        ));
    }

    #[test]
    fn default_credentials_drive_the_commissioner_flow() {
        let (_dir, store) = empty_store();
        let credentials = CredentialStore::with_defaults().unwrap();
        let mut session = Session::default();
        session.login(&credentials, "commissioner", "commish123").unwrap();

        let outcome = submit_incident(&store, &session, &form(), now()).unwrap();
        assert!(matches!(outcome, AppendOutcome::Appended { row: 0, .. }));
    }
}
