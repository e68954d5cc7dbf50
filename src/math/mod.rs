//! Mathematical utilities: logistic helpers, quadrature grids and small dense
//! linear algebra.

pub mod linalg;
pub mod logistic;
pub mod quadrature;

pub use linalg::*;
pub use logistic::*;
pub use quadrature::*;
