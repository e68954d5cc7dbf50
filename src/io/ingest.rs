//! Response-matrix and configuration ingest.
//!
//! Two response layouts are accepted, picked by file extension:
//!
//! - `.json`: `[{"student_id": "...", "responses": {"q1": 1, ...}}, ...]`
//! - anything else is read as CSV: a `student_id` column followed by one
//!   column per item, one row per student
//!
//! Both layouts go through `ResponseMatrix::from_records`, so items end up
//! ordered by id and every structural problem is an `InvalidInput` error.
//! Bad rows are not skipped: a matrix with holes cannot be analyzed.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use crate::domain::{AnalysisConfig, ResponseMatrix, StudentRecord};
use crate::error::{AnalysisError, AnalysisResult};

const ID_COLUMN: &str = "student_id";

/// Input file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// Load a response matrix from a CSV or JSON file.
pub fn load_responses(path: &Path) -> AnalysisResult<ResponseMatrix> {
    let file = File::open(path).map_err(|e| {
        AnalysisError::invalid_input(format!("failed to open '{}': {e}", path.display()))
    })?;
    let reader = BufReader::new(file);

    let records = match InputFormat::from_path(path) {
        InputFormat::Json => read_json_records(reader)?,
        InputFormat::Csv => read_csv_records(reader)?,
    };
    let matrix = ResponseMatrix::from_records(&records)?;
    debug!(
        path = %path.display(),
        respondents = matrix.n_respondents(),
        items = matrix.n_items(),
        "loaded responses"
    );
    Ok(matrix)
}

pub fn read_json_records(reader: impl Read) -> AnalysisResult<Vec<StudentRecord>> {
    serde_json::from_reader(reader)
        .map_err(|e| AnalysisError::invalid_input(format!("invalid response JSON: {e}")))
}

pub fn read_csv_records(reader: impl Read) -> AnalysisResult<Vec<StudentRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AnalysisError::invalid_input(format!("failed to read CSV headers: {e}")))?
        .clone();
    let (id_column, items) = parse_headers(&headers)?;

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let record = result
            .map_err(|e| AnalysisError::invalid_input(format!("line {line}: CSV parse error: {e}")))?;
        records.push(parse_row(&record, id_column, &items, line)?);
    }
    Ok(records)
}

/// Position of the id column plus `(column, item id)` for every item column.
fn parse_headers(headers: &StringRecord) -> AnalysisResult<(usize, Vec<(usize, String)>)> {
    let names: Vec<String> = headers.iter().map(normalize_header_name).collect();
    let id_column = names
        .iter()
        .position(|n| n.eq_ignore_ascii_case(ID_COLUMN))
        .ok_or_else(|| {
            AnalysisError::invalid_input(format!("CSV has no '{ID_COLUMN}' column"))
        })?;

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for (col, name) in names.into_iter().enumerate() {
        if col == id_column {
            continue;
        }
        if name.is_empty() {
            return Err(AnalysisError::invalid_input(format!(
                "CSV column {} has an empty item id",
                col + 1
            )));
        }
        if !seen.insert(name.clone()) {
            return Err(AnalysisError::invalid_input(format!("duplicate item id '{name}'")));
        }
        items.push((col, name));
    }
    if items.is_empty() {
        return Err(AnalysisError::invalid_input("CSV has no item columns"));
    }
    Ok((id_column, items))
}

fn parse_row(
    record: &StringRecord,
    id_column: usize,
    items: &[(usize, String)],
    line: usize,
) -> AnalysisResult<StudentRecord> {
    let student_id = record
        .get(id_column)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AnalysisError::invalid_input(format!("line {line}: missing student id")))?
        .to_string();

    let mut responses = BTreeMap::new();
    for (col, item) in items {
        let raw = record.get(*col).unwrap_or("");
        let value: u32 = raw.parse().map_err(|_| {
            AnalysisError::invalid_input(format!(
                "line {line}: response '{raw}' for item '{item}' is not a non-negative integer"
            ))
        })?;
        responses.insert(item.clone(), value);
    }
    Ok(StudentRecord {
        student_id,
        responses,
    })
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

/// Load an analysis configuration from JSON; missing sections keep defaults.
pub fn load_config(path: &Path) -> AnalysisResult<AnalysisConfig> {
    let file = File::open(path).map_err(|e| {
        AnalysisError::invalid_input(format!("failed to open config '{}': {e}", path.display()))
    })?;
    let config: AnalysisConfig = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AnalysisError::invalid_input(format!("invalid config JSON: {e}")))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_rows_become_records_with_sorted_items() {
        let csv = "\u{feff}student_id,q2,q1\ns1,1,0\ns2,0,1\ns3,1,1\n";
        let records = read_csv_records(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].responses["q2"], 1);

        let m = ResponseMatrix::from_records(&records).unwrap();
        assert_eq!(m.item_ids(), &["q1".to_string(), "q2".to_string()]);
        assert_eq!(m.row(0), &[0, 1]);
    }

    #[test]
    fn csv_problems_are_invalid_input() {
        let cases = [
            "id,q1\na,1\n",
            "student_id,q1,q1\na,1,0\n",
            "student_id,q1\na,x\n",
            "student_id,q1\na,-1\n",
            "student_id\na\n",
            "student_id,q1,q2\na,1\n",
        ];
        for csv in cases {
            let err = read_csv_records(csv.as_bytes()).unwrap_err();
            assert_eq!(err.code(), "invalid_input", "{csv:?}");
        }
    }

    #[test]
    fn json_records_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("responses.json");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"student_id":"a","responses":{{"q1":1,"q2":0}}}},
                {{"student_id":"b","responses":{{"q1":0,"q2":1}}}}]"#
        )
        .unwrap();

        let m = load_responses(&path).unwrap();
        assert_eq!(m.n_respondents(), 2);
        assert_eq!(m.respondent_ids(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_file_is_invalid_input() {
        let err = load_responses(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"estimation": {"max_iterations": 250}}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.estimation.max_iterations, 250);
        assert_eq!(config.estimation.quadrature_points, 41);
        assert_eq!(config.diagnostics.strata, 10);

        std::fs::write(&path, r#"{"estimation": {"tolerance": -1.0}}"#).unwrap();
        assert_eq!(load_config(&path).unwrap_err().code(), "invalid_configuration");
    }
}
