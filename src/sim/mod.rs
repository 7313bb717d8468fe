//! Thermal simulation of a [`StackDescription`](crate::stack::StackDescription).
//!
//! ```text
//! StackDescription ──► ThermalGridData ──► SystemMatrix ──► SparseSolver
//!        │              (per-cell stencil)    (CCS)          (factors)
//!        └──► sources ───────────────────────────────┐          │
//!                                                    ▼          ▼
//!                         ThermalData: rhs = sources + C/dt * T ─► T
//!                                       │
//!                                       └──► queries (cells, floorplans, outlets, maps)
//! ```

pub mod analysis;
pub mod cell;
pub mod error;
pub mod grid;
pub mod query;
pub mod solver_sparse;
pub mod sources;
pub mod system_matrix;
pub mod thermal_data;

pub use analysis::{Analysis, AnalysisType};
pub use error::{EmulationError, QueryError, SolverError};
pub use grid::{LayerKind, ThermalGridData};
pub use solver_sparse::{SparseLu, SparseSolver};
pub use system_matrix::{CompressedRows, SystemMatrix};
pub use thermal_data::{Factorization, SimResult, StackChanges, ThermalData};
