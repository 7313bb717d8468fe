//! Read-only temperature queries on a [`ThermalData`].

use crate::sim::error::QueryError;
use crate::sim::solver_sparse::SparseSolver;
use crate::sim::thermal_data::ThermalData;
use crate::stack::{FloorplanElement, StackDescription, StackElement, StackElementKind};
use std::io::Write;

/// Reduction applied to the cells of a floorplan element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reduction {
    Min,
    Avg,
    Max,
}

impl<S: SparseSolver> ThermalData<S> {
    /// Temperature of cell (`layer`, `row`, `column`) [K].
    pub fn cell_temperature(
        &self,
        stack: &StackDescription,
        layer: usize,
        row: usize,
        column: usize,
    ) -> Result<f64, QueryError> {
        let dimensions = stack.dimensions();
        if !dimensions.contains(layer, row, column) {
            return Err(QueryError::CellOutOfRange { layer, row, column });
        }
        self.temperatures()
            .get(dimensions.cell_index(layer, row, column))
            .copied()
            .ok_or(QueryError::CellOutOfRange { layer, row, column })
    }

    pub fn min_temperature_of_floorplan_element(
        &self,
        stack: &StackDescription,
        die_id: &str,
        element_id: &str,
    ) -> Result<f64, QueryError> {
        self.floorplan_element_temperature(stack, die_id, element_id, Reduction::Min)
    }

    /// Area-weighted mean temperature of the element's cells [K].
    pub fn avg_temperature_of_floorplan_element(
        &self,
        stack: &StackDescription,
        die_id: &str,
        element_id: &str,
    ) -> Result<f64, QueryError> {
        self.floorplan_element_temperature(stack, die_id, element_id, Reduction::Avg)
    }

    pub fn max_temperature_of_floorplan_element(
        &self,
        stack: &StackDescription,
        die_id: &str,
        element_id: &str,
    ) -> Result<f64, QueryError> {
        self.floorplan_element_temperature(stack, die_id, element_id, Reduction::Max)
    }

    /// Minimum temperature of every element, in floorplan order.
    pub fn all_min_temperatures_of_floorplan(
        &self,
        stack: &StackDescription,
        die_id: &str,
    ) -> Result<Vec<f64>, QueryError> {
        self.floorplan_temperatures(stack, die_id, Reduction::Min)
    }

    pub fn all_avg_temperatures_of_floorplan(
        &self,
        stack: &StackDescription,
        die_id: &str,
    ) -> Result<Vec<f64>, QueryError> {
        self.floorplan_temperatures(stack, die_id, Reduction::Avg)
    }

    pub fn all_max_temperatures_of_floorplan(
        &self,
        stack: &StackDescription,
        die_id: &str,
    ) -> Result<Vec<f64>, QueryError> {
        self.floorplan_temperatures(stack, die_id, Reduction::Max)
    }

    /// Coolant temperature in the last row of outlet `index` [K].
    ///
    /// Outlets are the channels of a four-resistor cavity and the grid
    /// columns of a porous one.
    pub fn channel_outlet_temperature(
        &self,
        stack: &StackDescription,
        channel_id: &str,
        index: usize,
    ) -> Result<f64, QueryError> {
        let element = find_element(stack, channel_id)?;
        let (StackElementKind::Channel, Some(channel)) = (&element.kind, stack.channel()) else {
            return Err(QueryError::NotAChannel(channel_id.to_string()));
        };
        let dimensions = stack.dimensions();
        let column = channel
            .outlet_column(dimensions, index)
            .ok_or_else(|| QueryError::OutletOutOfRange {
                index,
                count: channel.n_outlets(dimensions),
            })?;
        let layer = element.offset() + channel.liquid_layer();
        self.cell_temperature(stack, layer, dimensions.n_rows() - 1, column)
    }

    /// Temperatures of the grid layer representing `element_id`, one
    /// `Vec` per row: the source layer of a die, the coolant layer of a
    /// channel, the layer itself otherwise.
    pub fn thermal_map(
        &self,
        stack: &StackDescription,
        element_id: &str,
    ) -> Result<Vec<Vec<f64>>, QueryError> {
        let element = find_element(stack, element_id)?;
        let layer = match &element.kind {
            StackElementKind::Die { .. } => stack
                .source_layer_of(element)
                .ok_or_else(|| QueryError::NotADie(element_id.to_string()))?,
            StackElementKind::Channel => {
                element.offset() + stack.channel().map_or(0, |c| c.liquid_layer())
            }
            StackElementKind::Layer(_) => element.offset(),
        };
        let dimensions = stack.dimensions();
        (0..dimensions.n_rows())
            .map(|row| {
                (0..dimensions.n_columns())
                    .map(|col| self.cell_temperature(stack, layer, row, col))
                    .collect()
            })
            .collect()
    }

    /// Writes the thermal map of `element_id`: one grid row per line, row 0
    /// first, values with three decimals separated by a space.
    pub fn print_thermal_map<W: Write>(
        &self,
        stack: &StackDescription,
        element_id: &str,
        out: &mut W,
    ) -> Result<(), QueryError> {
        for row in self.thermal_map(stack, element_id)? {
            let line: Vec<String> = row.iter().map(|t| format!("{t:.3}")).collect();
            writeln!(out, "{}", line.join(" "))?;
        }
        Ok(())
    }

    fn floorplan_element_temperature(
        &self,
        stack: &StackDescription,
        die_id: &str,
        element_id: &str,
        reduction: Reduction,
    ) -> Result<f64, QueryError> {
        let (element, layer) = die_with_layer(stack, die_id)?;
        let floorplan = element
            .floorplan()
            .ok_or_else(|| QueryError::NotADie(die_id.to_string()))?;
        let fp_element = floorplan
            .element(element_id)
            .ok_or_else(|| QueryError::UnknownFloorplanElement {
                die: die_id.to_string(),
                element: element_id.to_string(),
            })?;
        Ok(self.reduce(stack, fp_element, layer, reduction))
    }

    fn floorplan_temperatures(
        &self,
        stack: &StackDescription,
        die_id: &str,
        reduction: Reduction,
    ) -> Result<Vec<f64>, QueryError> {
        let (element, layer) = die_with_layer(stack, die_id)?;
        let floorplan = element
            .floorplan()
            .ok_or_else(|| QueryError::NotADie(die_id.to_string()))?;
        Ok(floorplan
            .elements()
            .iter()
            .map(|e| self.reduce(stack, e, layer, reduction))
            .collect())
    }

    fn reduce(
        &self,
        stack: &StackDescription,
        element: &FloorplanElement,
        layer: usize,
        reduction: Reduction,
    ) -> f64 {
        let dimensions = stack.dimensions();
        let temperatures = self.temperatures();
        let cells = element
            .cells()
            .map(|(row, col)| (temperatures[dimensions.cell_index(layer, row, col)], row, col));
        match reduction {
            Reduction::Min => cells.fold(f64::INFINITY, |m, (t, _, _)| m.min(t)),
            Reduction::Max => cells.fold(f64::NEG_INFINITY, |m, (t, _, _)| m.max(t)),
            Reduction::Avg => {
                let weighted: f64 = cells
                    .map(|(t, row, col)| t * dimensions.cell_area(row, col))
                    .sum();
                weighted / element.effective_area
            }
        }
    }
}

fn find_element<'a>(stack: &'a StackDescription, id: &str) -> Result<&'a StackElement, QueryError> {
    stack
        .element(id)
        .ok_or_else(|| QueryError::UnknownStackElement(id.to_string()))
}

fn die_with_layer<'a>(
    stack: &'a StackDescription,
    die_id: &str,
) -> Result<(&'a StackElement, usize), QueryError> {
    let element = find_element(stack, die_id)?;
    let layer = stack
        .source_layer_of(element)
        .ok_or_else(|| QueryError::NotADie(die_id.to_string()))?;
    Ok((element, layer))
}
