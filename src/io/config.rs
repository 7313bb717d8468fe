//! JSON description of a chip stack and its analysis.
//!
//! A configuration lists the materials, the grid, the optional heat sink
//! and cavity, the die definitions and finally the stack itself from the
//! bottom element to the top one:
//!
//! ```json
//! {
//!   "materials": [{ "id": "SILICON", "thermal_conductivity": 130.0, "volumetric_heat_capacity": 1.628e6 }],
//!   "dimensions": { "type": "uniform", "chip_length": 1e-2, "chip_width": 1e-2, "cell_length": 1e-3, "cell_width": 1e-3 },
//!   "heat_sink": { "ambient_htc": 1e4, "ambient_temperature": 300.0 },
//!   "dies": [{ "id": "CORE", "layers": [{ "id": "active", "height": 5e-5, "material": "SILICON" }], "source_layer": 0 }],
//!   "stack": [{ "type": "die", "id": "core0", "die": "CORE",
//!               "floorplan": [{ "id": "cpu", "sw_x": 0.0, "sw_y": 0.0, "length": 1e-2, "width": 1e-2, "powers": [10.0] }] }],
//!   "analysis": { "kind": { "type": "steady" }, "initial_temperature": 300.0 }
//! }
//! ```

use crate::sim::{Analysis, AnalysisType};
use crate::stack::{
    Channel, ChannelModel, ConventionalHeatSink, Coolant, Die, Dimensions, Floorplan, Layer,
    Material, StackDescription, flow_rate_from_ml_per_min,
};
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Grid of the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DimensionsConfig {
    /// Cells of equal size.
    Uniform {
        chip_length: f64,
        chip_width: f64,
        cell_length: f64,
        cell_width: f64,
    },
    /// Columns alternating wall and microchannel.
    Microchannel {
        chip_width: f64,
        cell_width: f64,
        n_channels: usize,
        first_wall_length: f64,
        wall_length: f64,
        channel_length: f64,
        last_wall_length: f64,
    },
}

impl DimensionsConfig {
    fn build(&self) -> Result<Dimensions> {
        match *self {
            Self::Uniform {
                chip_length,
                chip_width,
                cell_length,
                cell_width,
            } => Dimensions::new(chip_length, chip_width, cell_length, cell_width),
            Self::Microchannel {
                chip_width,
                cell_width,
                n_channels,
                first_wall_length,
                wall_length,
                channel_length,
                last_wall_length,
            } => Dimensions::with_microchannels(
                chip_width,
                cell_width,
                n_channels,
                first_wall_length,
                wall_length,
                channel_length,
                last_wall_length,
            ),
        }
    }
}

/// Layer made of a material declared in [`StackConfig::materials`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub id: String,
    /// [m]
    pub height: f64,
    pub material: String,
}

impl LayerConfig {
    fn build(&self, stack: &StackDescription) -> Result<Layer> {
        let material = stack
            .material(&self.material)
            .with_context(|| format!("in layer '{}'", self.id))?;
        Layer::new(&self.id, self.height, material)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DieConfig {
    pub id: String,
    /// Bottom to top.
    pub layers: Vec<LayerConfig>,
    pub source_layer: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub model: ChannelModel,
    /// Cavity height [m].
    pub height: f64,
    /// Channel width (2RM) or pin diameter (pin fins) [m].
    #[serde(default)]
    pub length: f64,
    /// Channel or pin pitch [m].
    #[serde(default)]
    pub pitch: f64,
    pub coolant: Coolant,
    pub flow_rate_ml_per_min: f64,
    pub wall_material: String,
}

impl ChannelConfig {
    fn build(&self, stack: &StackDescription) -> Result<Channel> {
        let wall = stack
            .material(&self.wall_material)
            .with_context(|| format!("in channel '{}'", self.id))?;
        let flow_rate = flow_rate_from_ml_per_min(self.flow_rate_ml_per_min);
        match self.model {
            ChannelModel::FourResistor => {
                Channel::microchannel_4rm(&self.id, self.height, self.coolant, flow_rate, wall)
            }
            ChannelModel::TwoResistor => Channel::microchannel_2rm(
                &self.id,
                self.height,
                self.length,
                self.pitch,
                self.coolant,
                flow_rate,
                wall,
            ),
            ChannelModel::PinFinInline | ChannelModel::PinFinStaggered => Channel::pin_fin(
                &self.id,
                self.model == ChannelModel::PinFinStaggered,
                self.height,
                self.length,
                self.pitch,
                self.coolant,
                flow_rate,
                wall,
            ),
        }
    }
}

/// Rectangle of a floorplan with its power trace, one value per slot [W].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorplanElementConfig {
    pub id: String,
    pub sw_x: f64,
    pub sw_y: f64,
    pub length: f64,
    pub width: f64,
    #[serde(default)]
    pub powers: Vec<f64>,
}

/// One element of the stack, listed from the bottom up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StackElementConfig {
    Layer(LayerConfig),
    Die {
        id: String,
        die: String,
        floorplan: Vec<FloorplanElementConfig>,
    },
    Channel { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub kind: AnalysisType,
    /// [K]
    pub initial_temperature: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            kind: AnalysisType::Steady,
            initial_temperature: 300.0,
        }
    }
}

/// Complete simulation input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub materials: Vec<Material>,
    pub dimensions: DimensionsConfig,
    #[serde(default)]
    pub heat_sink: Option<ConventionalHeatSink>,
    #[serde(default)]
    pub channel: Option<ChannelConfig>,
    #[serde(default)]
    pub dies: Vec<DieConfig>,
    pub stack: Vec<StackElementConfig>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl StackConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize stack configuration")
    }

    /// Validates the configuration and builds the stack it describes.
    pub fn build(&self) -> Result<(StackDescription, Analysis)> {
        let mut stack = StackDescription::new(self.dimensions.build()?);

        for material in &self.materials {
            stack.add_material(material.clone())?;
        }
        if let Some(heat_sink) = self.heat_sink {
            stack.set_heat_sink(heat_sink);
        }
        if let Some(channel) = &self.channel {
            let channel = channel.build(&stack)?;
            stack.set_channel(channel)?;
        }
        for die in &self.dies {
            let layers = die
                .layers
                .iter()
                .map(|layer| layer.build(&stack))
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("in die '{}'", die.id))?;
            stack.add_die(Die::new(&die.id, layers, die.source_layer)?)?;
        }

        for element in &self.stack {
            match element {
                StackElementConfig::Layer(layer) => {
                    let layer = layer.build(&stack)?;
                    stack.push_layer(layer)?;
                }
                StackElementConfig::Die { id, die, floorplan } => {
                    let floorplan = build_floorplan(stack.dimensions(), floorplan)
                        .with_context(|| format!("in floorplan of '{id}'"))?;
                    stack.push_die(id, die, floorplan)?;
                }
                StackElementConfig::Channel { id } => stack.push_channel(id)?,
            }
        }

        let analysis = Analysis::from_type(self.analysis.kind, self.analysis.initial_temperature)?;
        info!(
            "Stack built: {} elements, {} layers, {}x{} cells per layer",
            stack.elements().len(),
            stack.n_layers(),
            stack.dimensions().n_rows(),
            stack.dimensions().n_columns()
        );
        Ok((stack, analysis))
    }
}

fn build_floorplan(
    dimensions: &Dimensions,
    elements: &[FloorplanElementConfig],
) -> Result<Floorplan> {
    let mut floorplan = Floorplan::new();
    for e in elements {
        floorplan.add_element(dimensions, &e.id, e.sw_x, e.sw_y, e.length, e.width)?;
        if let Some(element) = floorplan.element_mut(&e.id) {
            for &power in &e.powers {
                element
                    .power_values
                    .push(power)
                    .with_context(|| format!("power trace of '{}'", e.id))?;
            }
        }
    }
    Ok(floorplan)
}

/// Reads a stack configuration from a JSON file.
pub fn read_config(path: &Path) -> Result<StackConfig> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let config: StackConfig = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;

    Ok(config)
}
