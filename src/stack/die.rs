use crate::sim::grid::ThermalGridData;
use crate::stack::{Dimensions, Layer};
use anyhow::{Result, ensure};

/// A die: an ordered sequence of layers (bottom to top), one of which
/// dissipates the power described by a floorplan.
#[derive(Debug, Clone, PartialEq)]
pub struct Die {
    pub id: String,
    layers: Vec<Layer>,
    /// Index into `layers` of the layer where heat is generated.
    source_layer: usize,
}

impl Die {
    pub fn new(id: &str, layers: Vec<Layer>, source_layer: usize) -> Result<Self> {
        ensure!(!layers.is_empty(), "die '{id}' has no layers");
        ensure!(
            source_layer < layers.len(),
            "die '{id}': source layer {source_layer} out of range ({} layers)",
            layers.len()
        );
        Ok(Self {
            id: id.to_string(),
            layers,
            source_layer,
        })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn source_layer(&self) -> usize {
        self.source_layer
    }

    /// Total die height in m.
    pub fn height(&self) -> f64 {
        self.layers.iter().map(|l| l.height).sum()
    }

    /// Fills the grid layers `offset .. offset + n_layers()`.
    pub(crate) fn fill_grid_data(
        &self,
        grid: &mut ThermalGridData,
        dimensions: &Dimensions,
        offset: usize,
        delta_time: Option<f64>,
    ) {
        for (i, layer) in self.layers.iter().enumerate() {
            layer.fill_grid_data(grid, dimensions, offset + i, delta_time);
        }
    }
}
