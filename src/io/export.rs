//! Export analysis results.
//!
//! - the full run as pretty JSON (any serializable report)
//! - calibrated items as CSV, one row per item, for spreadsheets
//! - response matrices as CSV in the layout `ingest` reads back

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::domain::{IrtModel, ResponseMatrix};
use crate::error::{AnalysisError, AnalysisResult};

/// Write `report` as pretty-printed JSON.
///
/// Non-finite numbers (an infinite eigenvalue ratio, for example) become
/// `null`.
pub fn write_report_json<T: Serialize>(path: &Path, report: &T) -> AnalysisResult<()> {
    let file = File::create(path).map_err(|e| {
        AnalysisError::invalid_input(format!("failed to create '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(file, report)
        .map_err(|e| AnalysisError::invalid_input(format!("failed to write report JSON: {e}")))
}

#[derive(Debug, Serialize)]
struct ItemRow<'a> {
    item_id: &'a str,
    difficulty: f64,
    discrimination: f64,
    difficulty_se: Option<f64>,
    discrimination_se: Option<f64>,
    chi_square: Option<f64>,
    df: Option<usize>,
    p_value: Option<f64>,
}

/// Write per-item estimates (and fit, when attached) to CSV.
pub fn write_items_csv(path: &Path, model: &IrtModel) -> AnalysisResult<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        AnalysisError::invalid_input(format!("failed to create '{}': {e}", path.display()))
    })?;
    for item in &model.items {
        let fit = item.fit.as_ref();
        writer
            .serialize(ItemRow {
                item_id: &item.id,
                difficulty: item.difficulty,
                discrimination: item.discrimination,
                difficulty_se: item.difficulty_se,
                discrimination_se: item.discrimination_se,
                chi_square: fit.map(|f| f.chi_square),
                df: fit.map(|f| f.df),
                p_value: fit.and_then(|f| f.p_value),
            })
            .map_err(|e| AnalysisError::invalid_input(format!("failed to write item row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AnalysisError::invalid_input(format!("failed to flush item CSV: {e}")))
}

/// Write `student_id,<items…>` rows.
pub fn write_responses_csv(path: &Path, matrix: &ResponseMatrix) -> AnalysisResult<()> {
    let write_err = |e: csv::Error| AnalysisError::invalid_input(format!("failed to write responses CSV: {e}"));
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        AnalysisError::invalid_input(format!("failed to create '{}': {e}", path.display()))
    })?;

    let mut header = vec!["student_id"];
    header.extend(matrix.item_ids().iter().map(String::as_str));
    writer.write_record(&header).map_err(write_err)?;

    for (id, row) in matrix.respondent_ids().iter().zip(matrix.rows()) {
        let mut record = vec![id.clone()];
        record.extend(row.iter().map(u32::to_string));
        writer.write_record(&record).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| AnalysisError::invalid_input(format!("failed to flush responses CSV: {e}")))
}
