use crate::stack::{Dimensions, PowersQueue};
use anyhow::{Result, bail, ensure};

/// Relative slack when checking that an element lies inside the chip.
const LOCATION_TOLERANCE: f64 = 1e-9;

/// A rectangular power source on the active layer of a die.
#[derive(Debug, Clone, PartialEq)]
pub struct FloorplanElement {
    pub id: String,
    /// South-west corner [m].
    pub sw_x: f64,
    pub sw_y: f64,
    /// Extent along x [m].
    pub length: f64,
    /// Extent along y [m].
    pub width: f64,
    /// First and last covered row/column (inclusive).
    pub sw_row: usize,
    pub sw_column: usize,
    pub ne_row: usize,
    pub ne_column: usize,
    /// Summed footprint of the covered cells [m^2].
    pub effective_area: f64,
    pub power_values: PowersQueue,
    /// Power dissipated during the current slot [W].
    pub current_power: f64,
}

impl FloorplanElement {
    /// Covered (row, column) pairs in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.sw_row..=self.ne_row)
            .flat_map(move |row| (self.sw_column..=self.ne_column).map(move |col| (row, col)))
    }

    pub fn n_cells(&self) -> usize {
        (self.ne_row - self.sw_row + 1) * (self.ne_column - self.sw_column + 1)
    }

    fn overlaps(&self, sw_x: f64, sw_y: f64, length: f64, width: f64) -> bool {
        self.sw_x < sw_x + length
            && sw_x < self.sw_x + self.length
            && self.sw_y < sw_y + width
            && sw_y < self.sw_y + self.width
    }
}

/// Power map of one die instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Floorplan {
    elements: Vec<FloorplanElement>,
}

impl Floorplan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rectangle with south-west corner (`sw_x`, `sw_y`) and aligns it
    /// to the grid: it covers every cell whose centre lies inside it.
    pub fn add_element(
        &mut self,
        dimensions: &Dimensions,
        id: &str,
        sw_x: f64,
        sw_y: f64,
        length: f64,
        width: f64,
    ) -> Result<()> {
        ensure!(
            self.element(id).is_none(),
            "floorplan element '{id}' is defined twice"
        );
        ensure!(
            length > 0.0 && width > 0.0,
            "floorplan element '{id}': size must be > 0 (got {length} x {width})"
        );
        let slack_x = LOCATION_TOLERANCE * dimensions.chip_length();
        let slack_y = LOCATION_TOLERANCE * dimensions.chip_width();
        ensure!(
            sw_x >= -slack_x
                && sw_y >= -slack_y
                && sw_x + length <= dimensions.chip_length() + slack_x
                && sw_y + width <= dimensions.chip_width() + slack_y,
            "floorplan element '{id}' lies outside the {} x {} chip",
            dimensions.chip_length(),
            dimensions.chip_width()
        );
        if let Some(other) = self
            .elements
            .iter()
            .find(|e| e.overlaps(sw_x, sw_y, length, width))
        {
            bail!("floorplan element '{id}' intersects '{}'", other.id);
        }

        let columns: Vec<usize> = (0..dimensions.n_columns())
            .filter(|&c| {
                let cx = dimensions.cell_center_x(c);
                cx >= sw_x && cx <= sw_x + length
            })
            .collect();
        let rows: Vec<usize> = (0..dimensions.n_rows())
            .filter(|&r| {
                let cy = dimensions.cell_center_y(r);
                cy >= sw_y && cy <= sw_y + width
            })
            .collect();
        let (Some(&sw_column), Some(&ne_column)) = (columns.first(), columns.last()) else {
            bail!("floorplan element '{id}' covers no cell centre along x");
        };
        let (Some(&sw_row), Some(&ne_row)) = (rows.first(), rows.last()) else {
            bail!("floorplan element '{id}' covers no cell centre along y");
        };

        let mut element = FloorplanElement {
            id: id.to_string(),
            sw_x,
            sw_y,
            length,
            width,
            sw_row,
            sw_column,
            ne_row,
            ne_column,
            effective_area: 0.0,
            power_values: PowersQueue::new(),
            current_power: 0.0,
        };
        element.effective_area = element
            .cells()
            .map(|(row, col)| dimensions.cell_area(row, col))
            .sum();
        self.elements.push(element);
        Ok(())
    }

    pub fn elements(&self) -> &[FloorplanElement] {
        &self.elements
    }

    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn element(&self, id: &str) -> Option<&FloorplanElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn element_mut(&mut self, id: &str) -> Option<&mut FloorplanElement> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    /// Appends one power value per element, in element order.
    pub fn push_power_values(&mut self, powers: &[f64]) -> Result<()> {
        ensure!(
            powers.len() == self.elements.len(),
            "expected {} power values, got {}",
            self.elements.len(),
            powers.len()
        );
        for (element, &power) in self.elements.iter_mut().zip(powers) {
            element.power_values.push(power)?;
        }
        Ok(())
    }

    /// Moves the next queued value of every element into `current_power`.
    ///
    /// Returns false, leaving all queues untouched, when any queue is empty.
    pub fn pop_power_values(&mut self) -> bool {
        if self.elements.iter().any(|e| e.power_values.is_empty()) {
            return false;
        }
        for element in &mut self.elements {
            if let Some(power) = element.power_values.pop() {
                element.current_power = power;
            }
        }
        true
    }

    /// Total power of the current slot [W].
    pub fn total_power(&self) -> f64 {
        self.elements.iter().map(|e| e.current_power).sum()
    }

    /// Spreads each element's current power over its cells, proportionally
    /// to cell area, on grid layer `layer`.
    pub(crate) fn fill_sources(&self, sources: &mut [f64], dimensions: &Dimensions, layer: usize) {
        for element in &self.elements {
            let density = element.current_power / element.effective_area;
            for (row, col) in element.cells() {
                sources[dimensions.cell_index(layer, row, col)] +=
                    density * dimensions.cell_area(row, col);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Dimensions {
        let mut d = Dimensions::new(10e-3, 10e-3, 1e-3, 1e-3).unwrap();
        d.set_n_layers(1);
        d
    }

    #[test]
    fn test_alignment_by_cell_centres() {
        let d = grid();
        let mut fp = Floorplan::new();
        fp.add_element(&d, "core", 2e-3, 3e-3, 4e-3, 2e-3).unwrap();
        let e = fp.element("core").unwrap();
        assert_eq!((e.sw_column, e.ne_column), (2, 5));
        assert_eq!((e.sw_row, e.ne_row), (3, 4));
        assert_eq!(e.n_cells(), 8);
        assert!((e.effective_area - 8e-6).abs() < 1e-15);
    }

    #[test]
    fn test_rejects_outside_overlap_and_empty() {
        let d = grid();
        let mut fp = Floorplan::new();
        fp.add_element(&d, "a", 0.0, 0.0, 5e-3, 5e-3).unwrap();
        assert!(fp.add_element(&d, "b", 4e-3, 4e-3, 2e-3, 2e-3).is_err());
        assert!(fp.add_element(&d, "c", 8e-3, 8e-3, 3e-3, 1e-3).is_err());
        let off_centre = fp.add_element(&d, "d", 6.1e-3, 6.1e-3, 0.2e-3, 0.2e-3);
        assert!(off_centre.is_err());
        assert!(fp.add_element(&d, "a", 6e-3, 6e-3, 1e-3, 1e-3).is_err());
        // Touching edges is not an intersection.
        fp.add_element(&d, "e", 5e-3, 0.0, 5e-3, 5e-3).unwrap();
        assert_eq!(fp.n_elements(), 2);
    }

    #[test]
    fn test_power_distribution_conserves_total() {
        let d = grid();
        let mut fp = Floorplan::new();
        fp.add_element(&d, "a", 0.0, 0.0, 3e-3, 2e-3).unwrap();
        fp.add_element(&d, "b", 5e-3, 5e-3, 5e-3, 5e-3).unwrap();
        fp.push_power_values(&[6.0, 2.5]).unwrap();
        assert!(fp.pop_power_values());

        let mut sources = vec![0.0; d.n_cells()];
        fp.fill_sources(&mut sources, &d, 0);
        let total: f64 = sources.iter().sum();
        assert!((total - 8.5).abs() < 1e-12, "total={total}");
        assert!((sources[d.cell_index(0, 0, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pop_is_all_or_nothing() {
        let d = grid();
        let mut fp = Floorplan::new();
        fp.add_element(&d, "a", 0.0, 0.0, 1e-3, 1e-3).unwrap();
        fp.add_element(&d, "b", 2e-3, 2e-3, 1e-3, 1e-3).unwrap();
        assert!(fp.push_power_values(&[1.0]).is_err());
        fp.push_power_values(&[1.0, 2.0]).unwrap();
        fp.element_mut("a").unwrap().power_values.push(3.0).unwrap();
        assert!(fp.pop_power_values());
        assert!(!fp.pop_power_values());
        assert_eq!(fp.element("a").unwrap().power_values.len(), 1);
        assert_eq!(fp.element("b").unwrap().current_power, 2.0);
    }
}
