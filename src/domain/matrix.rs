//! The response matrix: a validated respondent × item table.
//!
//! Construction enforces the structural invariants once, so every stage can
//! index freely:
//!
//! - at least one respondent and one item
//! - unique item ids and unique respondent ids
//! - every respondent answered every item (rectangular table)

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::ConstantItemPolicy;
use crate::error::{AnalysisError, AnalysisResult};

/// Response scale of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResponseType {
    Dichotomous,
    /// Ordered categories `0..categories`.
    Polytomous { categories: u32 },
}

/// One student's answers, keyed by item id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub student_id: String,
    pub responses: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMatrix {
    item_ids: Vec<String>,
    respondent_ids: Vec<String>,
    response_types: Vec<ResponseType>,
    /// Row-major `n_respondents × n_items`.
    data: Vec<u32>,
}

/// A matrix after constant-item screening.
#[derive(Debug, Clone)]
pub struct ScreenedMatrix<'a> {
    pub matrix: Cow<'a, ResponseMatrix>,
    pub excluded: Vec<String>,
}

impl ResponseMatrix {
    /// Build from keyed student records.
    ///
    /// Items are ordered by id; every record must carry the same id set.
    pub fn from_records(records: &[StudentRecord]) -> AnalysisResult<Self> {
        let Some(first) = records.first() else {
            return Err(AnalysisError::invalid_input("response matrix has no records"));
        };
        let item_ids: Vec<String> = first.responses.keys().cloned().collect();

        let mut respondent_ids = Vec::with_capacity(records.len());
        let mut data = Vec::with_capacity(records.len() * item_ids.len());
        for record in records {
            if record.responses.len() != item_ids.len()
                || !record.responses.keys().zip(&item_ids).all(|(a, b)| a == b)
            {
                return Err(AnalysisError::invalid_input(format!(
                    "student '{}' does not answer the same item set as student '{}'",
                    record.student_id, first.student_id
                )));
            }
            respondent_ids.push(record.student_id.clone());
            data.extend(record.responses.values().copied());
        }

        Self::build(item_ids, respondent_ids, data)
    }

    /// Build from positional rows; respondents are numbered from 1.
    pub fn from_rows(item_ids: Vec<String>, rows: &[Vec<u32>]) -> AnalysisResult<Self> {
        let respondent_ids = (1..=rows.len()).map(|i| i.to_string()).collect();
        Self::from_rows_with_ids(item_ids, respondent_ids, rows)
    }

    pub fn from_rows_with_ids(
        item_ids: Vec<String>,
        respondent_ids: Vec<String>,
        rows: &[Vec<u32>],
    ) -> AnalysisResult<Self> {
        if respondent_ids.len() != rows.len() {
            return Err(AnalysisError::invalid_input(format!(
                "{} respondent ids for {} rows",
                respondent_ids.len(),
                rows.len()
            )));
        }
        let mut data = Vec::with_capacity(rows.len() * item_ids.len());
        for (row, id) in rows.iter().zip(&respondent_ids) {
            if row.len() != item_ids.len() {
                return Err(AnalysisError::invalid_input(format!(
                    "respondent '{id}' has {} responses, expected {}",
                    row.len(),
                    item_ids.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::build(item_ids, respondent_ids, data)
    }

    fn build(
        item_ids: Vec<String>,
        respondent_ids: Vec<String>,
        data: Vec<u32>,
    ) -> AnalysisResult<Self> {
        if item_ids.is_empty() {
            return Err(AnalysisError::invalid_input("response matrix has no items"));
        }
        if respondent_ids.is_empty() {
            return Err(AnalysisError::invalid_input("response matrix has no respondents"));
        }
        ensure_unique("item", &item_ids)?;
        ensure_unique("respondent", &respondent_ids)?;

        let n_items = item_ids.len();
        let response_types = (0..n_items)
            .map(|j| {
                let max = data.iter().skip(j).step_by(n_items).copied().max().unwrap_or(0);
                if max <= 1 {
                    ResponseType::Dichotomous
                } else {
                    ResponseType::Polytomous { categories: max + 1 }
                }
            })
            .collect();

        Ok(Self {
            item_ids,
            respondent_ids,
            response_types,
            data,
        })
    }

    pub fn n_items(&self) -> usize {
        self.item_ids.len()
    }

    pub fn n_respondents(&self) -> usize {
        self.respondent_ids.len()
    }

    pub fn item_ids(&self) -> &[String] {
        &self.item_ids
    }

    pub fn respondent_ids(&self) -> &[String] {
        &self.respondent_ids
    }

    pub fn response_type(&self, item: usize) -> ResponseType {
        self.response_types[item]
    }

    pub fn is_dichotomous(&self) -> bool {
        self.response_types
            .iter()
            .all(|t| *t == ResponseType::Dichotomous)
    }

    pub fn response(&self, respondent: usize, item: usize) -> u32 {
        self.data[respondent * self.n_items() + item]
    }

    pub fn row(&self, respondent: usize) -> &[u32] {
        let n = self.n_items();
        &self.data[respondent * n..(respondent + 1) * n]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u32]> {
        self.data.chunks_exact(self.n_items())
    }

    pub fn column(&self, item: usize) -> impl Iterator<Item = u32> + '_ {
        self.data.iter().skip(item).step_by(self.n_items()).copied()
    }

    pub fn item_mean(&self, item: usize) -> f64 {
        let sum: f64 = self.column(item).map(f64::from).sum();
        sum / self.n_respondents() as f64
    }

    /// Indices of items whose responses never vary.
    pub fn constant_items(&self) -> Vec<usize> {
        (0..self.n_items())
            .filter(|&j| {
                let mut col = self.column(j);
                let first = col.next();
                col.all(|x| Some(x) == first)
            })
            .collect()
    }

    /// New matrix restricted to the given item indices (in the given order).
    pub fn select_items(&self, items: &[usize]) -> AnalysisResult<Self> {
        let item_ids = items.iter().map(|&j| self.item_ids[j].clone()).collect();
        let mut data = Vec::with_capacity(self.n_respondents() * items.len());
        for row in self.rows() {
            data.extend(items.iter().map(|&j| row[j]));
        }
        Self::build(item_ids, self.respondent_ids.clone(), data)
    }

    /// Apply the constant-item policy.
    ///
    /// `Reject` fails on the first constant item (in item order); `Exclude`
    /// returns a reduced copy and the ids that were dropped.
    pub fn screen_constant_items(
        &self,
        policy: ConstantItemPolicy,
    ) -> AnalysisResult<ScreenedMatrix<'_>> {
        let constant = self.constant_items();
        if constant.is_empty() {
            return Ok(ScreenedMatrix {
                matrix: Cow::Borrowed(self),
                excluded: Vec::new(),
            });
        }

        match policy {
            ConstantItemPolicy::Reject => Err(AnalysisError::DegenerateItem {
                item_id: self.item_ids[constant[0]].clone(),
            }),
            ConstantItemPolicy::Exclude => {
                let keep: Vec<usize> = (0..self.n_items())
                    .filter(|j| !constant.contains(j))
                    .collect();
                if keep.is_empty() {
                    return Err(AnalysisError::insufficient(
                        "every item is constant; nothing left to analyze",
                    ));
                }
                let excluded = constant.iter().map(|&j| self.item_ids[j].clone()).collect();
                Ok(ScreenedMatrix {
                    matrix: Cow::Owned(self.select_items(&keep)?),
                    excluded,
                })
            }
        }
    }

    /// Convert back into keyed records.
    pub fn to_records(&self) -> Vec<StudentRecord> {
        self.rows()
            .zip(&self.respondent_ids)
            .map(|(row, id)| StudentRecord {
                student_id: id.clone(),
                responses: self.item_ids.iter().cloned().zip(row.iter().copied()).collect(),
            })
            .collect()
    }
}

fn ensure_unique(what: &str, ids: &[String]) -> AnalysisResult<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(AnalysisError::invalid_input(format!("duplicate {what} id '{id}'")));
        }
    }
    Ok(())
}
