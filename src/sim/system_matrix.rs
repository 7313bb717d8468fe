//! Assembly of the conductance matrix in compressed-column storage.
//!
//! One column per cell, cells in (layer, row, column) order. Within a column
//! the rows appear in ascending order:
//!
//! ```text
//! bypass down (-2 layers), bottom (-1 layer), south (-1 row), west (-1),
//! diagonal, east (+1), north (+1 row), top (+1 layer), bypass up (+2 layers)
//! ```
//!
//! Conduction entries are `-parallel(half, half)` and are summed into the
//! diagonal together with the cell capacity. Coolant cells carry raw `+C` /
//! `-C` advection entries towards their south / north neighbours that are
//! not part of the diagonal sum, except for the `+C` closing the inlet and
//! outlet rows.

use crate::sim::cell::parallel;
use crate::sim::error::EmulationError;
use crate::sim::grid::ThermalGridData;
use crate::stack::Dimensions;
use log::debug;

/// Sparse square matrix in compressed-column storage.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMatrix {
    size: usize,
    /// `column_pointers[j]..column_pointers[j + 1]` spans column `j`.
    column_pointers: Vec<usize>,
    row_indices: Vec<usize>,
    values: Vec<f64>,
}

/// Row-major view of a [`SystemMatrix`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedRows {
    pub row_pointers: Vec<usize>,
    pub column_indices: Vec<usize>,
    pub values: Vec<f64>,
}

/// Appends the entries of one column and accumulates its diagonal.
struct ColumnBuilder<'a> {
    row_indices: &'a mut Vec<usize>,
    values: &'a mut Vec<f64>,
    diagonal: f64,
}

impl ColumnBuilder<'_> {
    /// Conduction link of conductance `g` to cell `row`.
    fn link(&mut self, row: usize, g: f64) {
        self.row_indices.push(row);
        self.values.push(-g);
        self.diagonal += g;
    }

    /// Stores `value` as is; returns its position.
    fn raw(&mut self, row: usize, value: f64) -> usize {
        self.row_indices.push(row);
        self.values.push(value);
        self.values.len() - 1
    }
}

impl SystemMatrix {
    /// Assembles the matrix of the grid described by `grid`.
    pub fn assemble(
        dimensions: &Dimensions,
        grid: &ThermalGridData,
    ) -> Result<Self, EmulationError> {
        let n = dimensions.n_cells();
        if grid.len() != n || grid.n_layers() != dimensions.n_layers() {
            return Err(EmulationError::WrongConfig(format!(
                "grid data holds {} cells in {} layers, dimensions describe {n} cells in {} layers",
                grid.len(),
                grid.n_layers(),
                dimensions.n_layers()
            )));
        }

        let mut column_pointers = Vec::new();
        column_pointers
            .try_reserve_exact(n + 1)
            .map_err(|_| EmulationError::Allocation {
                what: "column pointers",
                len: n + 1,
            })?;
        let estimate = 7 * n;
        let mut row_indices = Vec::new();
        let mut values = Vec::new();
        row_indices
            .try_reserve(estimate)
            .and_then(|_| values.try_reserve(estimate))
            .map_err(|_| EmulationError::Allocation {
                what: "system matrix",
                len: estimate,
            })?;

        let n_layers = dimensions.n_layers();
        let (n_rows, n_columns) = (dimensions.n_rows(), dimensions.n_columns());
        let area = dimensions.layer_area();
        column_pointers.push(0);

        for layer in 0..n_layers {
            let kind = grid.layer_kind(layer);
            for row in 0..n_rows {
                for col in 0..n_columns {
                    let j = dimensions.cell_index(layer, row, col);
                    let cell = grid.cell(j);
                    let g = &cell.conductances;
                    let liquid = grid.is_liquid(layer, col);
                    let mut column = ColumnBuilder {
                        row_indices: &mut row_indices,
                        values: &mut values,
                        diagonal: cell.capacity,
                    };

                    if layer >= 2 && kind.bypasses_down() {
                        let i = j - 2 * area;
                        column.link(i, parallel(grid.cell(i).bypass, cell.bypass));
                    }
                    if layer > 0 {
                        let i = j - area;
                        column.link(i, parallel(grid.cell(i).conductances.top, g.bottom));
                    }
                    if row > 0 {
                        let i = j - n_columns;
                        if liquid {
                            column.raw(i, g.north);
                        } else {
                            column.link(i, parallel(grid.cell(i).conductances.north, g.south));
                        }
                    }
                    if col > 0 {
                        let i = j - 1;
                        column.link(i, parallel(grid.cell(i).conductances.east, g.west));
                    }

                    let diagonal_position = column.raw(j, 0.0);

                    if col + 1 < n_columns {
                        let i = j + 1;
                        column.link(i, parallel(g.east, grid.cell(i).conductances.west));
                    }
                    if row + 1 < n_rows {
                        let i = j + n_columns;
                        if liquid {
                            column.raw(i, g.south);
                        } else {
                            column.link(i, parallel(g.north, grid.cell(i).conductances.south));
                        }
                    }
                    if layer + 1 < n_layers {
                        let i = j + area;
                        column.link(i, parallel(g.top, grid.cell(i).conductances.bottom));
                    }
                    if layer + 2 < n_layers && kind.bypasses_up() {
                        let i = j + 2 * area;
                        column.link(i, parallel(cell.bypass, grid.cell(i).bypass));
                    }

                    if layer + 1 == n_layers && grid.heat_sink_on_top() {
                        column.diagonal += g.top;
                    }
                    if liquid {
                        // Inlet and outlet closures; a single row is both.
                        if row == 0 {
                            column.diagonal += g.north;
                        }
                        if row + 1 == n_rows {
                            column.diagonal += g.north;
                        }
                    }

                    let diagonal = column.diagonal;
                    values[diagonal_position] = diagonal;
                    column_pointers.push(row_indices.len());
                }
            }
        }

        debug!("system matrix: {n} x {n}, {} non-zeros", values.len());
        Ok(Self {
            size: n,
            column_pointers,
            row_indices,
            values,
        })
    }

    /// Builds a matrix from raw compressed-column arrays.
    pub fn from_parts(
        size: usize,
        column_pointers: Vec<usize>,
        row_indices: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, EmulationError> {
        let consistent = column_pointers.len() == size + 1
            && column_pointers.first() == Some(&0)
            && column_pointers.windows(2).all(|w| w[0] <= w[1])
            && column_pointers.last() == Some(&row_indices.len())
            && row_indices.len() == values.len()
            && row_indices.iter().all(|&i| i < size);
        if !consistent {
            return Err(EmulationError::WrongConfig(
                "inconsistent compressed-column arrays".to_string(),
            ));
        }
        Ok(Self {
            size,
            column_pointers,
            row_indices,
            values,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn column_pointers(&self) -> &[usize] {
        &self.column_pointers
    }

    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Stored (row, value) pairs of column `col`.
    pub fn column(&self, col: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.column_pointers[col]..self.column_pointers[col + 1];
        self.row_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Entry (row, col); zero when not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let range = self.column_pointers[col]..self.column_pointers[col + 1];
        match self.row_indices[range.clone()].binary_search(&row) {
            Ok(k) => self.values[range.start + k],
            Err(_) => 0.0,
        }
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.size).map(|j| self.get(j, j)).collect()
    }

    /// `A * x`.
    pub fn multiply(&self, x: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; self.size];
        for (j, &xj) in x.iter().enumerate().take(self.size) {
            for (i, a_ij) in self.column(j) {
                y[i] += a_ij * xj;
            }
        }
        y
    }

    /// Same size and same sparsity pattern as `other`.
    pub fn same_pattern(&self, other: &Self) -> bool {
        self.size == other.size
            && self.column_pointers == other.column_pointers
            && self.row_indices == other.row_indices
    }

    /// Largest absolute entry.
    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    /// Transposes the storage into compressed rows of the same matrix.
    pub fn to_compressed_rows(&self) -> CompressedRows {
        let mut row_pointers = vec![0; self.size + 1];
        for &i in &self.row_indices {
            row_pointers[i + 1] += 1;
        }
        for i in 0..self.size {
            row_pointers[i + 1] += row_pointers[i];
        }
        let mut next = row_pointers.clone();
        let mut column_indices = vec![0; self.nnz()];
        let mut values = vec![0.0; self.nnz()];
        for j in 0..self.size {
            for (i, v) in self.column(j) {
                let k = next[i];
                column_indices[k] = j;
                values[k] = v;
                next[i] += 1;
            }
        }
        CompressedRows {
            row_pointers,
            column_indices,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{
        Channel, ConventionalHeatSink, Coolant, Die, Floorplan, Layer, Material, StackDescription,
    };
    use std::sync::Arc;

    fn solid_stack(heat_sink: bool) -> StackDescription {
        let dims = Dimensions::new(3e-3, 3e-3, 1e-3, 1e-3).unwrap();
        let mut stack = StackDescription::new(dims);
        let si = stack.add_material(Material::silicon()).unwrap();
        let die = Die::new(
            "D",
            vec![
                Layer::new("a", 100e-6, Arc::clone(&si)).unwrap(),
                Layer::new("b", 100e-6, Arc::clone(&si)).unwrap(),
                Layer::new("c", 100e-6, si).unwrap(),
            ],
            0,
        )
        .unwrap();
        stack.add_die(die).unwrap();
        stack.push_die("d", "D", Floorplan::new()).unwrap();
        if heat_sink {
            stack.set_heat_sink(ConventionalHeatSink::new(1e4, 300.0));
        }
        stack
    }

    fn assemble(stack: &StackDescription, dt: Option<f64>) -> SystemMatrix {
        let grid = ThermalGridData::build(stack, dt).unwrap();
        SystemMatrix::assemble(stack.dimensions(), &grid).unwrap()
    }

    #[test]
    fn test_column_pointers_and_sorted_rows() {
        let stack = solid_stack(false);
        let m = assemble(&stack, None);
        assert_eq!(m.size(), 27);
        // 27 diagonals + 2 * (18 vertical + 18 north-south + 18 east-west) links.
        assert_eq!(m.nnz(), 27 + 2 * 54);
        assert_eq!(m.column_pointers()[0], 0);
        assert_eq!(*m.column_pointers().last().unwrap(), m.nnz());
        for j in 0..m.size() {
            let rows: Vec<usize> = m.column(j).map(|(i, _)| i).collect();
            assert!(rows.windows(2).all(|w| w[0] < w[1]), "column {j}: {rows:?}");
        }
    }

    #[test]
    fn test_solid_matrix_is_symmetric_and_diagonally_dominant() {
        let stack = solid_stack(false);
        let m = assemble(&stack, Some(1e-3));
        let grid = ThermalGridData::build(&stack, Some(1e-3)).unwrap();
        for j in 0..m.size() {
            let mut off = 0.0;
            for (i, v) in m.column(j) {
                if i != j {
                    assert!((v - m.get(j, i)).abs() <= 1e-12 * v.abs(), "({i},{j})");
                    off += v.abs();
                }
            }
            let expected = off + grid.cell(j).capacity;
            assert!(
                (m.get(j, j) - expected).abs() <= 1e-9 * expected,
                "diag {j}"
            );
        }
    }

    #[test]
    fn test_heat_sink_only_touches_top_diagonal() {
        let without = assemble(&solid_stack(false), None);
        let with = assemble(&solid_stack(true), None);
        assert!(without.same_pattern(&with));
        let dims = solid_stack(true).dimensions().clone();
        for j in 0..with.size() {
            for (i, v) in with.column(j) {
                let before = without.get(i, j);
                let top_diagonal = i == j && j >= 2 * dims.layer_area();
                if top_diagonal {
                    assert!(v > before, "cell {j}");
                } else {
                    assert_eq!(v, before, "entry ({i},{j})");
                }
            }
        }
    }

    #[test]
    fn test_liquid_columns_carry_antisymmetric_advection() {
        let dims =
            Dimensions::with_microchannels(1e-3, 0.25e-3, 2, 50e-6, 50e-6, 50e-6, 50e-6).unwrap();
        let mut stack = StackDescription::new(dims);
        let si = stack.add_material(Material::silicon()).unwrap();
        let channel =
            Channel::microchannel_4rm("CH", 100e-6, Coolant::water(300.0), 1e-6, si).unwrap();
        let cconv = channel.cconv(stack.dimensions(), 1);
        stack.set_channel(channel).unwrap();
        stack.push_channel("cavity").unwrap();

        let m = assemble(&stack, None);
        let d = stack.dimensions().clone();
        let j = d.cell_index(0, 1, 1);
        assert!((m.get(d.cell_index(0, 0, 1), j) - cconv).abs() < 1e-12);
        assert!((m.get(d.cell_index(0, 2, 1), j) + cconv).abs() < 1e-12);

        // Interior row: diagonal holds only the lateral and vertical links.
        let lateral: f64 = m
            .column(j)
            .filter(|&(i, _)| i == j - 1 || i == j + 1)
            .map(|(_, v)| -v)
            .sum();
        assert!((m.get(j, j) - lateral).abs() < 1e-12 * lateral);

        // Inlet row adds +C once.
        let inlet = d.cell_index(0, 0, 1);
        let lateral_inlet: f64 = m
            .column(inlet)
            .filter(|&(i, _)| i == inlet - 1 || i == inlet + 1)
            .map(|(_, v)| -v)
            .sum();
        assert!((m.get(inlet, inlet) - lateral_inlet - cconv).abs() < 1e-9 * cconv);
    }

    #[test]
    fn test_single_row_liquid_closes_inlet_and_outlet() {
        let dims =
            Dimensions::with_microchannels(2.5e-4, 2.5e-4, 2, 5e-5, 5e-5, 5e-5, 5e-5).unwrap();
        let mut stack = StackDescription::new(dims);
        let si = stack.add_material(Material::silicon()).unwrap();
        let channel =
            Channel::microchannel_4rm("CH", 100e-6, Coolant::water(300.0), 1e-6, si).unwrap();
        let cconv = channel.cconv(stack.dimensions(), 1);
        stack.set_channel(channel).unwrap();
        stack.push_channel("cavity").unwrap();
        assert_eq!(stack.dimensions().n_rows(), 1);

        let m = assemble(&stack, None);
        let j = stack.dimensions().cell_index(0, 0, 1);
        let lateral: f64 = m.column(j).filter(|&(i, _)| i != j).map(|(_, v)| -v).sum();
        assert!((m.get(j, j) - lateral - 2.0 * cconv).abs() < 1e-9 * cconv);
    }

    #[test]
    fn test_compressed_rows_match_entries() {
        let m = assemble(&solid_stack(true), None);
        let crs = m.to_compressed_rows();
        assert_eq!(crs.row_pointers.len(), m.size() + 1);
        for i in 0..m.size() {
            for k in crs.row_pointers[i]..crs.row_pointers[i + 1] {
                assert_eq!(crs.values[k], m.get(i, crs.column_indices[k]));
            }
        }
    }

    #[test]
    fn test_multiply_uniform_field_gives_capacity_plus_ambient() {
        // Uniform T: conduction cancels, leaving capacity and heat-sink terms.
        let stack = solid_stack(true);
        let grid = ThermalGridData::build(&stack, Some(1e-3)).unwrap();
        let m = SystemMatrix::assemble(stack.dimensions(), &grid).unwrap();
        let y = m.multiply(&vec![2.0; m.size()]);
        let area = stack.dimensions().layer_area();
        for (j, yj) in y.iter().enumerate() {
            let mut expected = 2.0 * grid.cell(j).capacity;
            if j >= 2 * area {
                expected += 2.0 * grid.cell(j).conductances.top;
            }
            assert!(
                (yj - expected).abs() < 1e-9 * expected.abs().max(1.0),
                "cell {j}"
            );
        }
    }

    #[test]
    fn test_rejects_mismatched_grid() {
        let stack = solid_stack(false);
        let grid = ThermalGridData::build(&stack, None).unwrap();
        let other = Dimensions::new(1e-3, 1e-3, 0.5e-3, 0.5e-3).unwrap();
        assert!(SystemMatrix::assemble(&other, &grid).is_err());
        assert!(SystemMatrix::from_parts(2, vec![0, 1], vec![0], vec![1.0]).is_err());
    }
}
