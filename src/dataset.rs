use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;

use crate::error::{DashboardError, Result};
use crate::record::{Column, FieldValue, IncidentRecord};

/// In-memory copy of the whole backing spreadsheet, in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Dataset {
    records: Vec<IncidentRecord>,
}

/// Headline numbers and distributions shown on the dashboard.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_cases: u64,
    pub average_response_time_rating: Option<f64>,
    pub total_station_dashboard_score: u64,
    pub average_station_dashboard_score: Option<f64>,
    pub security_type_distribution: Vec<(FieldValue, usize)>,
    pub response_time_rating_distribution: Vec<(FieldValue, usize)>,
    pub cases_by_city: Vec<(FieldValue, u64)>,
}

impl Dataset {
    pub fn new(records: Vec<IncidentRecord>) -> Self {
        Dataset { records }
    }

    pub fn records(&self) -> &[IncidentRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&IncidentRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every value of `column`, top to bottom.
    pub fn column(&self, column: Column) -> impl Iterator<Item = FieldValue> + '_ {
        self.records.iter().map(move |r| r.get(column))
    }

    /// Groups rows by the exact value of `column`. Distinct values keep the
    /// order in which they first appear.
    pub fn aggregate_count(&self, column: Column) -> Vec<(FieldValue, usize)> {
        let mut slots: HashMap<FieldValue, usize> = HashMap::new();
        let mut groups: Vec<(FieldValue, usize)> = Vec::new();

        for value in self.column(column) {
            match slots.get(&value) {
                Some(&slot) => groups[slot].1 += 1,
                None => {
                    slots.insert(value.clone(), groups.len());
                    groups.push((value, 1));
                }
            }
        }

        groups
    }

    /// Sums `sum_column` per distinct value of `group_column`, first-seen order.
    pub fn aggregate_sum(
        &self,
        group_column: Column,
        sum_column: Column,
    ) -> Result<Vec<(FieldValue, u64)>> {
        if !sum_column.is_integer() {
            return Err(DashboardError::validation(
                sum_column.field_name(),
                "only integer columns can be summed",
            ));
        }

        let mut slots: HashMap<FieldValue, usize> = HashMap::new();
        let mut groups: Vec<(FieldValue, u64)> = Vec::new();

        for record in &self.records {
            let key = record.get(group_column);
            let amount = u64::from(record.get(sum_column).as_integer().unwrap_or_default());
            match slots.get(&key) {
                Some(&slot) => groups[slot].1 += amount,
                None => {
                    slots.insert(key.clone(), groups.len());
                    groups.push((key, amount));
                }
            }
        }

        Ok(groups)
    }

    /// Adds `record` after the last row. Duplicate keys are allowed.
    pub fn append(&mut self, record: IncidentRecord) -> Result<usize> {
        record.check()?;
        self.records.push(record);
        Ok(self.records.len() - 1)
    }

    /// Row indices whose KGID and case number equal the given values once
    /// everything is compared as text.
    pub fn find(&self, kgid: impl Display, case_number: impl Display) -> Vec<usize> {
        let kgid = kgid.to_string();
        let case_number = case_number.to_string();
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kgid == kgid && r.case_number == case_number)
            .map(|(i, _)| i)
            .collect()
    }

    /// Rows whose KGID equals `kgid` as text, with their indices.
    pub fn filter_by_kgid(&self, kgid: impl Display) -> Vec<(usize, &IncidentRecord)> {
        let kgid = kgid.to_string();
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kgid == kgid)
            .collect()
    }

    /// Sets `column` to `raw` on every listed row. Either every row is
    /// updated or none is.
    pub fn update_field(&mut self, rows: &[usize], column: Column, raw: &str) -> Result<()> {
        if rows.is_empty() {
            return Err(DashboardError::NotFound(
                "no rows selected for update".to_string(),
            ));
        }
        if let Some(bad) = rows.iter().find(|&&i| i >= self.records.len()) {
            return Err(DashboardError::NotFound(format!("row {bad} does not exist")));
        }

        let value = column
            .parse_value(raw)
            .map_err(|e| DashboardError::Validation(vec![e]))?;

        let mut updated = Vec::with_capacity(rows.len());
        for &i in rows {
            let mut record = self.records[i].clone();
            record.set(column, value.clone())?;
            updated.push((i, record));
        }
        for (i, record) in updated {
            self.records[i] = record;
        }

        Ok(())
    }

    pub fn total(&self, column: Column) -> u64 {
        self.column(column)
            .filter_map(|v| v.as_integer())
            .map(u64::from)
            .sum()
    }

    pub fn mean(&self, column: Column) -> Option<f64> {
        if self.records.is_empty() || !column.is_integer() {
            return None;
        }
        Some(self.total(column) as f64 / self.records.len() as f64)
    }

    pub fn summary(&self) -> DashboardSummary {
        DashboardSummary {
            total_cases: self.total(Column::Cases),
            average_response_time_rating: self.mean(Column::ResponseTimeRating),
            total_station_dashboard_score: self.total(Column::StationDashboardScore),
            average_station_dashboard_score: self.mean(Column::StationDashboardScore),
            security_type_distribution: self.aggregate_count(Column::SecurityType),
            response_time_rating_distribution: self.aggregate_count(Column::ResponseTimeRating),
            cases_by_city: self
                .aggregate_sum(Column::City, Column::Cases)
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(city: &str, rating: u8, cases: u32, security: &str, kgid: &str, case: &str) -> IncidentRecord {
        IncidentRecord {
            city: city.to_string(),
            response_time_rating: rating,
            cases,
            security_type: security.to_string(),
            station_dashboard_score: 4,
            case_number: case.to_string(),
            kgid: kgid.to_string(),
            report_time: "2024-03-01 09:30:00".to_string(),
            reported: String::new(),
        }
    }

    fn sample() -> Dataset {
        Dataset::new(vec![
            record("Pune", 7, 5, "Patrol", "K1", "C100"),
            record("Mumbai", 3, 2, "CCTV", "7", "C1"),
            record("Pune", 7, 4, "CCTV", "K2", "C200"),
            record("Delhi", 9, 1, "Patrol", "K1", "C101"),
        ])
    }

    #[test]
    fn aggregate_count_keeps_first_seen_order_and_partitions_rows() {
        let data = sample();
        let groups = data.aggregate_count(Column::SecurityType);
        assert_eq!(
            groups,
            vec![
                (FieldValue::Text("Patrol".into()), 2),
                (FieldValue::Text("CCTV".into()), 2),
            ]
        );

        for column in Column::ALL {
            let total: usize = data.aggregate_count(column).iter().map(|(_, n)| n).sum();
            assert_eq!(total, data.len(), "column {column}");
        }
    }

    #[test]
    fn aggregate_sum_totals_cases_by_city() {
        let groups = sample().aggregate_sum(Column::City, Column::Cases).unwrap();
        assert_eq!(
            groups,
            vec![
                (FieldValue::Text("Pune".into()), 9),
                (FieldValue::Text("Mumbai".into()), 2),
                (FieldValue::Text("Delhi".into()), 1),
            ]
        );
    }

    #[test]
    fn aggregate_sum_rejects_text_columns() {
        let err = sample().aggregate_sum(Column::City, Column::Kgid).unwrap_err();
        assert!(matches!(err, DashboardError::Validation(_)));
    }

    #[test]
    fn find_compares_as_text() {
        let data = sample();
        assert_eq!(data.find(7, "C1"), vec![1]);
        assert_eq!(data.find("7", "C1"), data.find(7, "C1"));
        assert!(data.find("007", "C1").is_empty());
        assert_eq!(data.find("K1", "C100"), vec![0]);
    }

    #[test]
    fn update_field_with_no_rows_is_not_found() {
        let mut data = sample();
        let err = data.update_field(&[], Column::Reported, "2024-03-02 10:00:00").unwrap_err();
        assert!(matches!(err, DashboardError::NotFound(_)));
        assert_eq!(data, sample());
    }

    #[test]
    fn update_field_is_all_or_nothing() {
        let mut data = sample();
        assert!(data.update_field(&[0, 9], Column::Reported, "x").is_err());
        assert!(data.update_field(&[0, 2], Column::Cases, "lots").is_err());
        assert_eq!(data, sample());

        data.update_field(&[0, 3], Column::Reported, "2024-03-02 10:00:00")
            .unwrap();
        assert_eq!(data.get(0).unwrap().reported, "2024-03-02 10:00:00");
        assert_eq!(data.get(3).unwrap().reported, "2024-03-02 10:00:00");
        assert!(data.get(1).unwrap().reported.is_empty());
    }

    #[test]
    fn append_adds_to_the_end_without_dedup() {
        let mut data = sample();
        let idx = data.append(record("Pune", 7, 5, "Patrol", "K1", "C100")).unwrap();
        assert_eq!(idx, 4);
        assert_eq!(data.find("K1", "C100"), vec![0, 4]);

        let mut bad = record("Pune", 7, 5, "Patrol", "K9", "C9");
        bad.response_time_rating = 11;
        assert!(data.append(bad).is_err());
        assert_eq!(data.len(), 5);
    }

    #[test]
    fn summary_matches_headline_metrics() {
        let summary = sample().summary();
        assert_eq!(summary.total_cases, 12);
        assert_eq!(summary.total_station_dashboard_score, 16);
        assert_eq!(summary.average_response_time_rating, Some(6.5));
        assert_eq!(summary.average_station_dashboard_score, Some(4.0));
        assert_eq!(summary.cases_by_city.len(), 3);

        let empty = Dataset::default().summary();
        assert_eq!(empty.average_response_time_rating, None);
        assert!(empty.security_type_distribution.is_empty());
    }
}
