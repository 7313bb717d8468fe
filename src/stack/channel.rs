use crate::sim::cell::{
    cavity_liquid_cell, cavity_surface_cell, microchannel_liquid_cell, solid_cell,
    virtual_wall_cell,
};
use crate::sim::grid::{LayerKind, ThermalGridData};
use crate::stack::{Dimensions, Material};
use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Converts a flow rate from ml/min to m^3/s.
pub fn flow_rate_from_ml_per_min(ml_per_min: f64) -> f64 {
    ml_per_min * 1e-6 / 60.0
}

/// How a cooling cavity is discretized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelModel {
    /// Discrete microchannels, one grid column per channel and per wall.
    FourResistor,
    /// Microchannels homogenized into a porous layer.
    TwoResistor,
    /// Pin-fin array on a square lattice.
    PinFinInline,
    /// Pin-fin array on a staggered (equilateral) lattice.
    PinFinStaggered,
}

impl ChannelModel {
    pub fn is_pin_fin(self) -> bool {
        matches!(self, Self::PinFinInline | Self::PinFinStaggered)
    }
}

/// Coolant properties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coolant {
    /// Heat transfer coefficient towards the channel side walls [W/(m^2*K)].
    pub htc_side: f64,
    /// Heat transfer coefficient towards the cavity ceiling [W/(m^2*K)].
    pub htc_top: f64,
    /// Heat transfer coefficient towards the cavity floor [W/(m^2*K)].
    pub htc_bottom: f64,
    /// Volumetric heat capacity [J/(m^3*K)].
    pub volumetric_heat_capacity: f64,
    /// Temperature at the inlet [K].
    pub inlet_temperature: f64,
}

impl Coolant {
    /// Water with coefficients typical of 100 um microchannels.
    pub fn water(inlet_temperature: f64) -> Self {
        Self {
            htc_side: 2.7132e4,
            htc_top: 5.7132e4,
            htc_bottom: 4.7132e4,
            volumetric_heat_capacity: 4.172638e6,
            inlet_temperature,
        }
    }
}

/// Liquid-cooled cavity between two dies.
///
/// Coolant enters at row 0 and leaves at the last row.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: String,
    model: ChannelModel,
    /// Cavity height [m].
    height: f64,
    /// Channel width (microchannels) or pin diameter (pin fins) [m].
    length: f64,
    /// Channel or pin pitch [m]; unused by the four-resistor model.
    pitch: f64,
    coolant: Coolant,
    /// Volumetric flow rate through the whole cavity [m^3/s].
    flow_rate: f64,
    wall_material: Arc<Material>,
}

impl Channel {
    /// Discrete microchannels laid out by the grid columns
    /// (see [`Dimensions::with_microchannels`]).
    pub fn microchannel_4rm(
        id: &str,
        height: f64,
        coolant: Coolant,
        flow_rate: f64,
        wall_material: Arc<Material>,
    ) -> Result<Self> {
        Self::checked(Self {
            id: id.to_string(),
            model: ChannelModel::FourResistor,
            height,
            length: 0.0,
            pitch: 0.0,
            coolant,
            flow_rate,
            wall_material,
        })
    }

    /// Homogenized microchannels of width `channel_length` repeated every `pitch`.
    pub fn microchannel_2rm(
        id: &str,
        height: f64,
        channel_length: f64,
        pitch: f64,
        coolant: Coolant,
        flow_rate: f64,
        wall_material: Arc<Material>,
    ) -> Result<Self> {
        Self::checked(Self {
            id: id.to_string(),
            model: ChannelModel::TwoResistor,
            height,
            length: channel_length,
            pitch,
            coolant,
            flow_rate,
            wall_material,
        })
    }

    /// Pin fins of diameter `diameter` on a lattice of spacing `pitch`.
    #[allow(clippy::too_many_arguments)]
    pub fn pin_fin(
        id: &str,
        staggered: bool,
        height: f64,
        diameter: f64,
        pitch: f64,
        coolant: Coolant,
        flow_rate: f64,
        wall_material: Arc<Material>,
    ) -> Result<Self> {
        let model = if staggered {
            ChannelModel::PinFinStaggered
        } else {
            ChannelModel::PinFinInline
        };
        Self::checked(Self {
            id: id.to_string(),
            model,
            height,
            length: diameter,
            pitch,
            coolant,
            flow_rate,
            wall_material,
        })
    }

    fn checked(channel: Self) -> Result<Self> {
        let id = &channel.id;
        ensure!(
            channel.height.is_finite() && channel.height > 0.0,
            "channel '{id}': height must be > 0 (got {})",
            channel.height
        );
        ensure!(
            channel.flow_rate.is_finite() && channel.flow_rate >= 0.0,
            "channel '{id}': flow rate must be >= 0 (got {})",
            channel.flow_rate
        );
        let c = &channel.coolant;
        for (name, value) in [
            ("side heat transfer coefficient", c.htc_side),
            ("top heat transfer coefficient", c.htc_top),
            ("bottom heat transfer coefficient", c.htc_bottom),
            ("volumetric heat capacity", c.volumetric_heat_capacity),
        ] {
            ensure!(
                value.is_finite() && value >= 0.0,
                "channel '{id}': coolant {name} must be >= 0 (got {value})"
            );
        }
        if channel.model != ChannelModel::FourResistor {
            ensure!(
                channel.length > 0.0 && channel.pitch > channel.length,
                "channel '{id}': need 0 < length < pitch (got {} and {})",
                channel.length,
                channel.pitch
            );
            let porosity = channel.porosity();
            ensure!(
                porosity > 0.0 && porosity < 1.0,
                "channel '{id}': porosity {porosity} outside (0, 1)"
            );
        }
        Ok(channel)
    }

    pub fn model(&self) -> ChannelModel {
        self.model
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn coolant(&self) -> &Coolant {
        &self.coolant
    }

    pub fn wall_material(&self) -> &Arc<Material> {
        &self.wall_material
    }

    /// Volumetric flow rate [m^3/s].
    pub fn flow_rate(&self) -> f64 {
        self.flow_rate
    }

    pub fn set_flow_rate(&mut self, flow_rate: f64) -> Result<()> {
        ensure!(
            flow_rate.is_finite() && flow_rate >= 0.0,
            "channel '{}': flow rate must be >= 0 (got {flow_rate})",
            self.id
        );
        self.flow_rate = flow_rate;
        Ok(())
    }

    /// Grid layers spanned by the cavity.
    pub fn n_layers(&self) -> usize {
        match self.model {
            ChannelModel::FourResistor => 1,
            _ => 4,
        }
    }

    /// Index of the coolant layer relative to the first cavity layer.
    pub fn liquid_layer(&self) -> usize {
        match self.model {
            ChannelModel::FourResistor => 0,
            _ => 2,
        }
    }

    /// Pins per unit footprint area [1/m^2]; zero for microchannels.
    pub fn pin_density(&self) -> f64 {
        match self.model {
            ChannelModel::PinFinInline => 1.0 / (self.pitch * self.pitch),
            ChannelModel::PinFinStaggered => 2.0 / (3f64.sqrt() * self.pitch * self.pitch),
            _ => 0.0,
        }
    }

    /// Fraction of the cavity volume filled by coolant.
    ///
    /// The four-resistor model resolves walls explicitly and reports 1.
    pub fn porosity(&self) -> f64 {
        match self.model {
            ChannelModel::FourResistor => 1.0,
            ChannelModel::TwoResistor => self.length / self.pitch,
            ChannelModel::PinFinInline | ChannelModel::PinFinStaggered => {
                1.0 - self.pin_density() * PI * self.length * self.length / 4.0
            }
        }
    }

    /// Number of parallel microchannels; zero for pin fins.
    pub fn n_channels(&self, dimensions: &Dimensions) -> usize {
        match self.model {
            ChannelModel::FourResistor => (dimensions.n_columns() - 1) / 2,
            ChannelModel::TwoResistor => {
                ((dimensions.chip_length() / self.pitch).round() as usize).max(1)
            }
            _ => 0,
        }
    }

    /// Superficial coolant velocity through a pin-fin cavity [m/s].
    pub fn darcy_velocity(&self, dimensions: &Dimensions) -> f64 {
        self.flow_rate / (dimensions.chip_length() * self.height)
    }

    /// Advection coefficient `C` of the coolant cells in column `col` [W/K].
    ///
    /// Half the heat capacity rate carried through one cell row.
    pub fn cconv(&self, dimensions: &Dimensions, col: usize) -> f64 {
        let vhc = self.coolant.volumetric_heat_capacity;
        match self.model {
            ChannelModel::FourResistor => {
                vhc * self.flow_rate / (2.0 * self.n_channels(dimensions) as f64)
            }
            ChannelModel::TwoResistor => {
                vhc * self.flow_rate * self.porosity() * dimensions.cell_length(col)
                    / (2.0 * self.length * self.n_channels(dimensions) as f64)
            }
            ChannelModel::PinFinInline | ChannelModel::PinFinStaggered => {
                vhc * self.darcy_velocity(dimensions) * dimensions.cell_length(col) * self.height
                    / 2.0
            }
        }
    }

    /// Whether the cells of column `col` in the coolant layer hold coolant.
    pub fn is_liquid_column(&self, dimensions: &Dimensions, col: usize) -> bool {
        match self.model {
            ChannelModel::FourResistor => dimensions.is_channel_column(col),
            _ => true,
        }
    }

    /// Number of outlets that can be queried.
    pub fn n_outlets(&self, dimensions: &Dimensions) -> usize {
        match self.model {
            ChannelModel::FourResistor => self.n_channels(dimensions),
            _ => dimensions.n_columns(),
        }
    }

    /// Grid column of outlet `index`.
    pub fn outlet_column(&self, dimensions: &Dimensions, index: usize) -> Option<usize> {
        if index >= self.n_outlets(dimensions) {
            return None;
        }
        match self.model {
            ChannelModel::FourResistor => Some(2 * index + 1),
            _ => Some(index),
        }
    }

    /// Wetted fin or pin surface inside a cell of footprint `length` x `width`.
    fn wetted_side_area(&self, length: f64, width: f64) -> f64 {
        match self.model {
            ChannelModel::TwoResistor => {
                2.0 * self.height * width * self.porosity() * length / self.length
            }
            ChannelModel::PinFinInline | ChannelModel::PinFinStaggered => {
                length * width * self.pin_density() * PI * self.length * self.height
            }
            ChannelModel::FourResistor => 0.0,
        }
    }

    /// Fills the grid layers `offset .. offset + n_layers()`.
    pub(crate) fn fill_grid_data(
        &self,
        grid: &mut ThermalGridData,
        dimensions: &Dimensions,
        offset: usize,
        delta_time: Option<f64>,
    ) {
        if self.model == ChannelModel::FourResistor {
            grid.set_layer_kind(offset, LayerKind::Microchannel4Rm);
            for row in 0..dimensions.n_rows() {
                for col in 0..dimensions.n_columns() {
                    let (l, w) = (dimensions.cell_length(col), dimensions.cell_width(row));
                    let cell = if dimensions.is_channel_column(col) {
                        let cconv = self.cconv(dimensions, col);
                        microchannel_liquid_cell(
                            l,
                            w,
                            self.height,
                            &self.coolant,
                            cconv,
                            delta_time,
                        )
                    } else {
                        solid_cell(l, w, self.height, &self.wall_material, delta_time)
                    };
                    grid.set_cell(dimensions.cell_index(offset, row, col), cell);
                }
            }
            return;
        }

        grid.set_layer_kind(offset, LayerKind::BottomWall);
        grid.set_layer_kind(offset + 1, LayerKind::VirtualWall);
        grid.set_layer_kind(offset + 2, LayerKind::Liquid);
        grid.set_layer_kind(offset + 3, LayerKind::TopWall);

        let porosity = self.porosity();
        let fins_along_flow = self.model == ChannelModel::TwoResistor;
        for row in 0..dimensions.n_rows() {
            for col in 0..dimensions.n_columns() {
                let (l, w) = (dimensions.cell_length(col), dimensions.cell_width(row));
                let fins = virtual_wall_cell(
                    l,
                    w,
                    self.height,
                    porosity,
                    &self.wall_material,
                    fins_along_flow,
                    delta_time,
                );
                let liquid = cavity_liquid_cell(
                    l,
                    w,
                    self.height,
                    porosity,
                    self.wetted_side_area(l, w),
                    &self.coolant,
                    self.cconv(dimensions, col),
                    delta_time,
                );
                let index = |layer: usize| dimensions.cell_index(offset + layer, row, col);
                grid.set_cell(index(0), cavity_surface_cell());
                grid.set_cell(index(1), fins);
                grid.set_cell(index(2), liquid);
                grid.set_cell(index(3), cavity_surface_cell());
            }
        }
    }

    /// Adds the inlet enthalpy `2 * C * T_in` to the first coolant row.
    pub(crate) fn fill_sources(&self, sources: &mut [f64], dimensions: &Dimensions, offset: usize) {
        let layer = offset + self.liquid_layer();
        for col in 0..dimensions.n_columns() {
            if !self.is_liquid_column(dimensions, col) {
                continue;
            }
            let cconv = self.cconv(dimensions, col);
            sources[dimensions.cell_index(layer, 0, col)] +=
                2.0 * cconv * self.coolant.inlet_temperature;
        }
    }
}
