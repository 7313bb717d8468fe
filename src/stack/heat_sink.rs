use crate::sim::cell::parallel;
use crate::sim::grid::ThermalGridData;
use crate::stack::Dimensions;
use serde::{Deserialize, Serialize};

/// Convective boundary on the top face of the stack:
/// `q = h * (T_ambient - T_surface)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConventionalHeatSink {
    /// Heat transfer coefficient to ambient [W/(m^2*K)].
    pub ambient_htc: f64,
    /// Ambient temperature [K].
    pub ambient_temperature: f64,
}

impl ConventionalHeatSink {
    pub fn new(ambient_htc: f64, ambient_temperature: f64) -> Self {
        Self {
            ambient_htc,
            ambient_temperature,
        }
    }

    /// Replaces the top half conductance of every top-layer cell with the
    /// series combination of that half cell and the film `h * A`.
    pub(crate) fn fill_grid_data(&self, grid: &mut ThermalGridData, dimensions: &Dimensions) {
        let layer = dimensions.n_layers() - 1;
        for row in 0..dimensions.n_rows() {
            for col in 0..dimensions.n_columns() {
                let index = dimensions.cell_index(layer, row, col);
                let h_a = self.ambient_htc * dimensions.cell_area(row, col);
                let cell = grid.cell_mut(index);
                cell.conductances.top = parallel(cell.conductances.top, h_a);
            }
        }
    }

    /// Adds `G_top * T_ambient` to every top-layer cell.
    pub(crate) fn fill_sources(
        &self,
        sources: &mut [f64],
        grid: &ThermalGridData,
        dimensions: &Dimensions,
    ) {
        let layer = dimensions.n_layers() - 1;
        for row in 0..dimensions.n_rows() {
            for col in 0..dimensions.n_columns() {
                let index = dimensions.cell_index(layer, row, col);
                sources[index] += grid.cell(index).conductances.top * self.ambient_temperature;
            }
        }
    }
}
