use crate::sim::cell::solid_cell;
use crate::sim::grid::{LayerKind, ThermalGridData};
use crate::stack::{Dimensions, Material};
use anyhow::{Result, ensure};
use std::sync::Arc;

/// A homogeneous slab of one material spanning the whole chip footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: String,
    /// Height in m.
    pub height: f64,
    pub material: Arc<Material>,
}

impl Layer {
    pub fn new(id: &str, height: f64, material: Arc<Material>) -> Result<Self> {
        ensure!(
            height.is_finite() && height > 0.0,
            "layer '{id}': height must be > 0 (got {height})"
        );
        Ok(Self {
            id: id.to_string(),
            height,
            material,
        })
    }

    /// Writes the solid stencil of every cell of grid layer `layer`.
    pub(crate) fn fill_grid_data(
        &self,
        grid: &mut ThermalGridData,
        dimensions: &Dimensions,
        layer: usize,
        delta_time: Option<f64>,
    ) {
        grid.set_layer_kind(layer, LayerKind::Solid);
        for row in 0..dimensions.n_rows() {
            for col in 0..dimensions.n_columns() {
                let cell = solid_cell(
                    dimensions.cell_length(col),
                    dimensions.cell_width(row),
                    self.height,
                    &self.material,
                    delta_time,
                );
                grid.set_cell(dimensions.cell_index(layer, row, col), cell);
            }
        }
    }
}
