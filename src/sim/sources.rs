use crate::sim::grid::ThermalGridData;
use crate::stack::{StackDescription, StackElementKind};

/// Rebuilds the source vector [W]: floorplan powers on the source layer of
/// every die, inlet enthalpy of the coolant and the ambient term of the heat
/// sink.
pub fn fill_sources(stack: &StackDescription, grid: &ThermalGridData, sources: &mut [f64]) {
    let dimensions = stack.dimensions();
    sources.fill(0.0);

    for element in stack.elements() {
        match &element.kind {
            StackElementKind::Die { floorplan, .. } => {
                if let Some(layer) = stack.source_layer_of(element) {
                    floorplan.fill_sources(sources, dimensions, layer);
                }
            }
            StackElementKind::Channel => {
                if let Some(channel) = stack.channel() {
                    channel.fill_sources(sources, dimensions, element.offset());
                }
            }
            StackElementKind::Layer(_) => {}
        }
    }

    if let Some(heat_sink) = stack.heat_sink() {
        heat_sink.fill_sources(sources, grid, dimensions);
    }
}
