//! Per-cell stencils.
//!
//! Every cell stores one *half-cell* conductance per neighbour direction:
//! the conductance between the cell centre and the shared face. The matrix
//! assembler combines the two facing halves with [`parallel`]. An infinite
//! half conductance marks a zero-thickness surface node, so the link is set
//! entirely by the other side.
//!
//! Liquid cells are the exception: their north/south terms hold the
//! advection coefficient `+C`/`-C` and are used raw by the assembler.

use crate::stack::{Coolant, Material};

/// Half-cell conductances towards the six neighbours [W/K].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Conductances {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub top: f64,
    pub bottom: f64,
}

/// Thermal description of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ThermalCell {
    pub conductances: Conductances,
    /// Half conductance of the link that skips one layer inside a
    /// two-resistor or pin-fin cavity (wall nodes link upwards, the liquid
    /// and the top wall downwards). Zero elsewhere.
    pub bypass: f64,
    /// Heat capacity over the time step, `vhc * V / dt` [W/K]; 0 in steady state.
    pub capacity: f64,
}

/// Series combination of two half-cell conductances.
pub fn parallel(x: f64, y: f64) -> f64 {
    if x.is_infinite() {
        return y;
    }
    if y.is_infinite() {
        return x;
    }
    let sum = x + y;
    if sum == 0.0 { 0.0 } else { x * y / sum }
}

/// `vhc * volume / dt`, or 0 when there is no time step (steady state).
pub fn capacity(volumetric_heat_capacity: f64, volume: f64, delta_time: Option<f64>) -> f64 {
    match delta_time {
        Some(dt) => volumetric_heat_capacity * volume / dt,
        None => 0.0,
    }
}

/// Solid block of `material` with footprint `length` x `width` and `height`.
pub fn solid_cell(
    length: f64,
    width: f64,
    height: f64,
    material: &Material,
    delta_time: Option<f64>,
) -> ThermalCell {
    let k = material.thermal_conductivity;
    let north_south = k * length * height / (width / 2.0);
    let east_west = k * width * height / (length / 2.0);
    let top_bottom = k * length * width / (height / 2.0);

    ThermalCell {
        conductances: Conductances {
            north: north_south,
            south: north_south,
            east: east_west,
            west: east_west,
            top: top_bottom,
            bottom: top_bottom,
        },
        bypass: 0.0,
        capacity: capacity(
            material.volumetric_heat_capacity,
            length * width * height,
            delta_time,
        ),
    }
}

/// Coolant cell of a discrete microchannel, bounded by walls east and west.
pub fn microchannel_liquid_cell(
    length: f64,
    width: f64,
    height: f64,
    coolant: &Coolant,
    cconv: f64,
    delta_time: Option<f64>,
) -> ThermalCell {
    let side = coolant.htc_side * width * height;
    ThermalCell {
        conductances: Conductances {
            north: cconv,
            south: -cconv,
            east: side,
            west: side,
            top: coolant.htc_top * length * width,
            bottom: coolant.htc_bottom * length * width,
        },
        bypass: 0.0,
        capacity: capacity(
            coolant.volumetric_heat_capacity,
            length * width * height,
            delta_time,
        ),
    }
}

/// Surface node at the floor or ceiling of a porous cavity.
///
/// Both the die face and the cavity face are zero-thickness, so every
/// vertical half conductance is infinite and the node carries no capacity.
pub fn cavity_surface_cell() -> ThermalCell {
    ThermalCell {
        conductances: Conductances {
            top: f64::INFINITY,
            bottom: f64::INFINITY,
            ..Conductances::default()
        },
        bypass: f64::INFINITY,
        capacity: 0.0,
    }
}

/// Solid fraction of a porous cavity, lumped at mid-height.
///
/// `fins_along_flow` enables conduction along the flow direction through
/// continuous channel walls; pin fins are disconnected laterally.
pub fn virtual_wall_cell(
    length: f64,
    width: f64,
    height: f64,
    porosity: f64,
    wall: &Material,
    fins_along_flow: bool,
    delta_time: Option<f64>,
) -> ThermalCell {
    let solid = 1.0 - porosity;
    let area = length * width;
    let fin = solid * wall.thermal_conductivity * area / (height / 2.0);
    let along_flow = if fins_along_flow {
        solid * wall.thermal_conductivity * length * height / (width / 2.0)
    } else {
        0.0
    };

    ThermalCell {
        conductances: Conductances {
            north: along_flow,
            south: along_flow,
            east: 0.0,
            west: 0.0,
            top: f64::INFINITY,
            bottom: fin,
        },
        bypass: fin,
        capacity: capacity(
            wall.volumetric_heat_capacity,
            solid * area * height,
            delta_time,
        ),
    }
}

/// Coolant fraction of a porous cavity.
///
/// `wetted_side_area` is the fin or pin surface in contact with the
/// coolant inside the cell [m^2].
#[allow(clippy::too_many_arguments)]
pub fn cavity_liquid_cell(
    length: f64,
    width: f64,
    height: f64,
    porosity: f64,
    wetted_side_area: f64,
    coolant: &Coolant,
    cconv: f64,
    delta_time: Option<f64>,
) -> ThermalCell {
    let wetted_floor = porosity * length * width;
    ThermalCell {
        conductances: Conductances {
            north: cconv,
            south: -cconv,
            east: 0.0,
            west: 0.0,
            top: coolant.htc_top * wetted_floor,
            bottom: coolant.htc_side * wetted_side_area,
        },
        bypass: coolant.htc_bottom * wetted_floor,
        capacity: capacity(
            coolant.volumetric_heat_capacity,
            porosity * length * width * height,
            delta_time,
        ),
    }
}
