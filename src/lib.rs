//! Thermal simulation of 3D-stacked chips with inter-tier liquid cooling.
//!
//! A [`StackDescription`] composes dies, plain layers and at most one
//! cooling cavity on a shared grid. [`ThermalData`] discretizes it into a
//! sparse linear system, factorizes it once and then advances the
//! temperatures in time (or solves the steady state) as the floorplan power
//! traces are consumed.

pub mod io;
pub mod sim;
pub mod stack;

// Prelude
pub use sim::{Analysis, AnalysisType, SimResult, StackChanges, ThermalData};
pub use stack::{
    Channel, ConventionalHeatSink, Coolant, Die, Dimensions, Floorplan, Layer, Material,
    StackDescription,
};
