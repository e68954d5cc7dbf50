//! Response-pattern frequency table.
//!
//! Respondents with the same answer vector share a posterior, so the E-step
//! runs once per distinct pattern and weights by the pattern count.

use std::collections::BTreeMap;

use crate::domain::ResponseMatrix;

#[derive(Debug, Clone, PartialEq)]
pub struct PatternTable {
    /// Distinct response vectors in lexicographic order.
    pub patterns: Vec<Vec<u32>>,
    /// How many respondents gave each pattern.
    pub counts: Vec<f64>,
    /// Pattern index of every respondent, in matrix row order.
    pub respondent_pattern: Vec<usize>,
}

impl PatternTable {
    pub fn from_matrix(matrix: &ResponseMatrix) -> Self {
        let mut index: BTreeMap<&[u32], usize> = BTreeMap::new();
        for row in matrix.rows() {
            *index.entry(row).or_insert(0) += 1;
        }

        let mut patterns = Vec::with_capacity(index.len());
        let mut counts = Vec::with_capacity(index.len());
        let mut position: BTreeMap<&[u32], usize> = BTreeMap::new();
        for (i, (&pattern, &count)) in index.iter().enumerate() {
            patterns.push(pattern.to_vec());
            counts.push(count as f64);
            position.insert(pattern, i);
        }

        let respondent_pattern = matrix
            .rows()
            .map(|row| position.get(row).copied().unwrap_or_default())
            .collect();

        Self {
            patterns,
            counts,
            respondent_pattern,
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn n_items(&self) -> usize {
        self.patterns.first().map_or(0, Vec::len)
    }

    /// Total number of respondents.
    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }
}
