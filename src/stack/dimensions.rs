use anyhow::{Result, ensure};

/// Geometry of the thermal grid shared by every layer of the stack.
///
/// Columns run along the chip length (x), rows along the chip width (y).
/// Coolant flows from row 0 towards the last row. Layers are counted from
/// the bottom of the stack and are assigned while the stack is composed.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimensions {
    /// Cell length of each column in m.
    cell_lengths: Vec<f64>,
    /// Cell width of each row in m.
    cell_widths: Vec<f64>,
    n_layers: usize,
}

impl Dimensions {
    /// Uniform grid covering a `chip_length` x `chip_width` die.
    ///
    /// The number of columns (rows) is `chip_length / cell_length` rounded
    /// to the nearest integer. The cell size is then re-derived so that the
    /// grid covers the chip exactly.
    pub fn new(
        chip_length: f64,
        chip_width: f64,
        cell_length: f64,
        cell_width: f64,
    ) -> Result<Self> {
        for (name, value) in [
            ("chip length", chip_length),
            ("chip width", chip_width),
            ("cell length", cell_length),
            ("cell width", cell_width),
        ] {
            ensure!(
                value.is_finite() && value > 0.0,
                "{name} must be > 0 (got {value})"
            );
        }
        let n_columns = ((chip_length / cell_length).round() as usize).max(1);
        let n_rows = ((chip_width / cell_width).round() as usize).max(1);

        Self::from_cells(
            vec![chip_length / n_columns as f64; n_columns],
            vec![chip_width / n_rows as f64; n_rows],
        )
    }

    /// Non-uniform grid from explicit per-column lengths and per-row widths.
    pub fn from_cells(cell_lengths: Vec<f64>, cell_widths: Vec<f64>) -> Result<Self> {
        ensure!(!cell_lengths.is_empty(), "grid needs at least one column");
        ensure!(!cell_widths.is_empty(), "grid needs at least one row");
        for (col, &l) in cell_lengths.iter().enumerate() {
            ensure!(
                l.is_finite() && l > 0.0,
                "cell length of column {col} must be > 0 (got {l})"
            );
        }
        for (row, &w) in cell_widths.iter().enumerate() {
            ensure!(
                w.is_finite() && w > 0.0,
                "cell width of row {row} must be > 0 (got {w})"
            );
        }

        Ok(Self {
            cell_lengths,
            cell_widths,
            n_layers: 0,
        })
    }

    /// Grid for a cavity of `n_channels` discrete microchannels.
    ///
    /// Columns alternate wall and channel:
    /// `[first wall, channel, wall, channel, ..., channel, last wall]`,
    /// so every odd column is a channel column.
    pub fn with_microchannels(
        chip_width: f64,
        cell_width: f64,
        n_channels: usize,
        first_wall_length: f64,
        wall_length: f64,
        channel_length: f64,
        last_wall_length: f64,
    ) -> Result<Self> {
        ensure!(
            n_channels > 0,
            "a microchannel cavity needs at least one channel"
        );
        ensure!(
            chip_width.is_finite() && chip_width > 0.0,
            "chip width must be > 0 (got {chip_width})"
        );
        ensure!(
            cell_width.is_finite() && cell_width > 0.0,
            "cell width must be > 0 (got {cell_width})"
        );

        let mut cell_lengths = Vec::with_capacity(2 * n_channels + 1);
        cell_lengths.push(first_wall_length);
        for ch in 0..n_channels {
            cell_lengths.push(channel_length);
            if ch + 1 < n_channels {
                cell_lengths.push(wall_length);
            }
        }
        cell_lengths.push(last_wall_length);

        let n_rows = ((chip_width / cell_width).round() as usize).max(1);
        Self::from_cells(cell_lengths, vec![chip_width / n_rows as f64; n_rows])
    }

    pub fn n_rows(&self) -> usize {
        self.cell_widths.len()
    }

    pub fn n_columns(&self) -> usize {
        self.cell_lengths.len()
    }

    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    pub(crate) fn set_n_layers(&mut self, n_layers: usize) {
        self.n_layers = n_layers;
    }

    /// Number of cells in one layer.
    pub fn layer_area(&self) -> usize {
        self.n_rows() * self.n_columns()
    }

    /// Total number of cells (= order of the system matrix).
    pub fn n_cells(&self) -> usize {
        self.n_layers * self.layer_area()
    }

    /// Length of the cells in column `col` [m].
    pub fn cell_length(&self, col: usize) -> f64 {
        self.cell_lengths[col]
    }

    /// Width of the cells in row `row` [m].
    pub fn cell_width(&self, row: usize) -> f64 {
        self.cell_widths[row]
    }

    /// Footprint of cell (row, col) [m^2].
    pub fn cell_area(&self, row: usize, col: usize) -> f64 {
        self.cell_lengths[col] * self.cell_widths[row]
    }

    pub fn chip_length(&self) -> f64 {
        self.cell_lengths.iter().sum()
    }

    pub fn chip_width(&self) -> f64 {
        self.cell_widths.iter().sum()
    }

    /// x coordinate of the centre of column `col` [m].
    pub fn cell_center_x(&self, col: usize) -> f64 {
        self.cell_lengths[..col].iter().sum::<f64>() + self.cell_lengths[col] / 2.0
    }

    /// y coordinate of the centre of row `row` [m].
    pub fn cell_center_y(&self, row: usize) -> f64 {
        self.cell_widths[..row].iter().sum::<f64>() + self.cell_widths[row] / 2.0
    }

    /// Channel columns of a microchannel cavity are the odd ones.
    pub fn is_channel_column(&self, col: usize) -> bool {
        col % 2 == 1
    }

    /// Flat index of cell (layer, row, col): layer-major, then row, then column.
    pub fn cell_index(&self, layer: usize, row: usize, col: usize) -> usize {
        debug_assert!(
            layer < self.n_layers,
            "layer {layer} out of range ({})",
            self.n_layers
        );
        debug_assert!(
            row < self.n_rows(),
            "row {row} out of range ({})",
            self.n_rows()
        );
        debug_assert!(
            col < self.n_columns(),
            "column {col} out of range ({})",
            self.n_columns()
        );
        layer * self.layer_area() + row * self.n_columns() + col
    }

    /// True when (layer, row, col) addresses a cell of the grid.
    pub fn contains(&self, layer: usize, row: usize, col: usize) -> bool {
        layer < self.n_layers && row < self.n_rows() && col < self.n_columns()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_grid_preserves_chip_size() {
        let d = Dimensions::new(10e-3, 5e-3, 1.1e-3, 0.5e-3).unwrap();
        assert_eq!(d.n_columns(), 9);
        assert_eq!(d.n_rows(), 10);
        assert!((d.chip_length() - 10e-3).abs() < 1e-15);
        assert!((d.chip_width() - 5e-3).abs() < 1e-15);
    }

    #[test]
    fn test_cell_index_is_layer_major() {
        let mut d = Dimensions::new(4.0, 3.0, 1.0, 1.0).unwrap();
        d.set_n_layers(2);
        assert_eq!(d.layer_area(), 12);
        assert_eq!(d.n_cells(), 24);
        assert_eq!(d.cell_index(0, 0, 0), 0);
        assert_eq!(d.cell_index(0, 1, 0), 4);
        assert_eq!(d.cell_index(1, 2, 3), 12 + 8 + 3);
    }

    #[test]
    fn test_microchannel_layout() {
        let d =
            Dimensions::with_microchannels(1e-3, 0.1e-3, 3, 50e-6, 100e-6, 50e-6, 60e-6).unwrap();
        assert_eq!(d.n_columns(), 7);
        assert!((d.cell_length(0) - 50e-6).abs() < 1e-18);
        assert!((d.cell_length(1) - 50e-6).abs() < 1e-18);
        assert!((d.cell_length(2) - 100e-6).abs() < 1e-18);
        assert!((d.cell_length(6) - 60e-6).abs() < 1e-18);
        assert!(d.is_channel_column(5));
        assert!(!d.is_channel_column(6));
        assert!((d.chip_length() - 460e-6).abs() < 1e-15);
    }

    #[test]
    fn test_cell_centers() {
        let d = Dimensions::from_cells(vec![1.0, 2.0, 3.0], vec![0.5, 0.5]).unwrap();
        assert!((d.cell_center_x(2) - 4.5).abs() < 1e-12);
        assert!((d.cell_center_y(1) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(Dimensions::new(1.0, 1.0, 0.0, 1.0).is_err());
        assert!(Dimensions::from_cells(vec![], vec![1.0]).is_err());
        assert!(Dimensions::from_cells(vec![1.0, -1.0], vec![1.0]).is_err());
        assert!(Dimensions::with_microchannels(1.0, 0.1, 0, 0.1, 0.1, 0.1, 0.1).is_err());
    }
}
