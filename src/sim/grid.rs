use crate::sim::cell::ThermalCell;
use crate::sim::error::EmulationError;
use crate::stack::{Dimensions, StackDescription, StackElementKind};
use log::debug;

/// Role of a grid layer in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Solid,
    /// Discrete microchannels: odd columns hold coolant, even columns walls.
    Microchannel4Rm,
    /// Floor of a porous cavity.
    BottomWall,
    /// Fins or pins of a porous cavity.
    VirtualWall,
    /// Coolant of a porous cavity.
    Liquid,
    /// Ceiling of a porous cavity.
    TopWall,
}

impl LayerKind {
    /// The cell links to the layer two above it.
    pub fn bypasses_up(self) -> bool {
        matches!(self, Self::BottomWall | Self::VirtualWall)
    }

    /// The cell links to the layer two below it.
    pub fn bypasses_down(self) -> bool {
        matches!(self, Self::Liquid | Self::TopWall)
    }
}

/// Conductances and capacities of every cell of the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalGridData {
    cells: Vec<ThermalCell>,
    layer_kinds: Vec<LayerKind>,
    /// The top layer exchanges heat with ambient through a heat sink.
    heat_sink_on_top: bool,
}

impl ThermalGridData {
    /// Zeroed grid data sized for `dimensions`.
    pub fn allocate(dimensions: &Dimensions) -> Result<Self, EmulationError> {
        let n_cells = dimensions.n_cells();
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(n_cells)
            .map_err(|_| EmulationError::Allocation {
                what: "thermal grid",
                len: n_cells,
            })?;
        cells.resize(n_cells, ThermalCell::default());
        Ok(Self {
            cells,
            layer_kinds: vec![LayerKind::Solid; dimensions.n_layers()],
            heat_sink_on_top: false,
        })
    }

    /// Builds the grid data of the whole stack. `delta_time` is `None` for
    /// steady analyses (no capacity terms).
    pub fn build(
        stack: &StackDescription,
        delta_time: Option<f64>,
    ) -> Result<Self, EmulationError> {
        let dimensions = stack.dimensions();
        if stack.elements().is_empty() {
            return Err(EmulationError::EmptyStack);
        }
        let mut grid = Self::allocate(dimensions)?;

        for element in stack.elements() {
            let offset = element.offset();
            match &element.kind {
                StackElementKind::Layer(layer) => {
                    layer.fill_grid_data(&mut grid, dimensions, offset, delta_time)
                }
                StackElementKind::Die { .. } => {
                    if let Some(die) = stack.die_of(element) {
                        die.fill_grid_data(&mut grid, dimensions, offset, delta_time);
                    }
                }
                StackElementKind::Channel => {
                    let channel = stack.channel().ok_or(EmulationError::NoChannel)?;
                    channel.fill_grid_data(&mut grid, dimensions, offset, delta_time);
                }
            }
        }

        if let Some(heat_sink) = stack.heat_sink() {
            heat_sink.fill_grid_data(&mut grid, dimensions);
            grid.heat_sink_on_top = true;
        }

        debug!(
            "thermal grid: {} layers x {} rows x {} columns",
            dimensions.n_layers(),
            dimensions.n_rows(),
            dimensions.n_columns()
        );
        Ok(grid)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, index: usize) -> &ThermalCell {
        &self.cells[index]
    }

    pub(crate) fn cell_mut(&mut self, index: usize) -> &mut ThermalCell {
        &mut self.cells[index]
    }

    pub(crate) fn set_cell(&mut self, index: usize, cell: ThermalCell) {
        self.cells[index] = cell;
    }

    pub fn capacities(&self) -> impl Iterator<Item = f64> + '_ {
        self.cells.iter().map(|c| c.capacity)
    }

    pub fn n_layers(&self) -> usize {
        self.layer_kinds.len()
    }

    pub fn layer_kind(&self, layer: usize) -> LayerKind {
        self.layer_kinds[layer]
    }

    pub(crate) fn set_layer_kind(&mut self, layer: usize, kind: LayerKind) {
        self.layer_kinds[layer] = kind;
    }

    pub fn heat_sink_on_top(&self) -> bool {
        self.heat_sink_on_top
    }

    /// Whether the cell at (`layer`, any row, `col`) holds moving coolant.
    pub fn is_liquid(&self, layer: usize, col: usize) -> bool {
        match self.layer_kinds[layer] {
            LayerKind::Liquid => true,
            LayerKind::Microchannel4Rm => col % 2 == 1,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{Die, Floorplan, Layer, Material};
    use std::sync::Arc;

    #[test]
    fn test_build_rejects_empty_stack() {
        let dims = Dimensions::new(1e-3, 1e-3, 0.5e-3, 0.5e-3).unwrap();
        let stack = StackDescription::new(dims);
        assert_eq!(
            ThermalGridData::build(&stack, None),
            Err(EmulationError::EmptyStack)
        );
    }

    #[test]
    fn test_build_fills_every_cell() {
        let dims = Dimensions::new(1e-3, 1e-3, 0.5e-3, 0.5e-3).unwrap();
        let mut stack = StackDescription::new(dims);
        let si = stack.add_material(Material::silicon()).unwrap();
        let die = Die::new(
            "D",
            vec![
                Layer::new("a", 10e-6, Arc::clone(&si)).unwrap(),
                Layer::new("b", 20e-6, si).unwrap(),
            ],
            0,
        )
        .unwrap();
        stack.add_die(die).unwrap();
        stack.push_die("d", "D", Floorplan::new()).unwrap();

        let grid = ThermalGridData::build(&stack, Some(1e-3)).unwrap();
        assert_eq!(grid.len(), 8);
        assert_eq!(grid.n_layers(), 2);
        assert!(grid.capacities().all(|c| c > 0.0));
        assert!(!grid.heat_sink_on_top());
        // Thicker layer conducts less vertically.
        assert!(grid.cell(4).conductances.top < grid.cell(0).conductances.top);
    }
}
