use crate::stack::{
    Channel, ChannelModel, ConventionalHeatSink, Die, Dimensions, Floorplan, Layer, Material,
    MaterialLibrary,
};
use anyhow::{Context, Result, bail, ensure};
use std::sync::Arc;

/// What a stack element is made of.
#[derive(Debug, Clone, PartialEq)]
pub enum StackElementKind {
    /// A single slab, e.g. a thermal interface material.
    Layer(Layer),
    /// An instance of a die definition with its own floorplan.
    Die { die: usize, floorplan: Floorplan },
    /// The cooling cavity.
    Channel,
}

/// One entry of the vertical stack.
#[derive(Debug, Clone, PartialEq)]
pub struct StackElement {
    pub id: String,
    pub kind: StackElementKind,
    /// Index of the first grid layer of the element.
    offset: usize,
    n_layers: usize,
}

impl StackElement {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    pub fn floorplan(&self) -> Option<&Floorplan> {
        match &self.kind {
            StackElementKind::Die { floorplan, .. } => Some(floorplan),
            _ => None,
        }
    }

    pub fn floorplan_mut(&mut self) -> Option<&mut Floorplan> {
        match &mut self.kind {
            StackElementKind::Die { floorplan, .. } => Some(floorplan),
            _ => None,
        }
    }
}

/// Full description of a chip stack: grid, materials, building blocks and
/// their vertical order.
///
/// Elements are pushed from the bottom of the stack to the top. Each push
/// assigns the element its range of grid layers.
#[derive(Debug, Clone)]
pub struct StackDescription {
    dimensions: Dimensions,
    materials: MaterialLibrary,
    dies: Vec<Die>,
    channel: Option<Channel>,
    heat_sink: Option<ConventionalHeatSink>,
    elements: Vec<StackElement>,
}

impl StackDescription {
    pub fn new(dimensions: Dimensions) -> Self {
        let mut dimensions = dimensions;
        dimensions.set_n_layers(0);
        Self {
            dimensions,
            materials: MaterialLibrary::new(),
            dies: Vec::new(),
            channel: None,
            heat_sink: None,
            elements: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    pub fn add_material(&mut self, material: Material) -> Result<Arc<Material>> {
        self.materials.insert(material)
    }

    pub fn material(&self, id: &str) -> Result<Arc<Material>> {
        self.materials
            .get(id)
            .with_context(|| format!("unknown material '{id}'"))
    }

    pub fn add_die(&mut self, die: Die) -> Result<()> {
        ensure!(
            self.die(&die.id).is_none(),
            "die '{}' is defined twice",
            die.id
        );
        self.dies.push(die);
        Ok(())
    }

    pub fn die(&self, id: &str) -> Option<&Die> {
        self.dies.iter().find(|d| d.id == id)
    }

    pub fn set_channel(&mut self, channel: Channel) -> Result<()> {
        ensure!(
            self.channel.is_none(),
            "only one channel definition is supported per stack"
        );
        self.channel = Some(channel);
        Ok(())
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn channel_mut(&mut self) -> Option<&mut Channel> {
        self.channel.as_mut()
    }

    pub fn set_heat_sink(&mut self, heat_sink: ConventionalHeatSink) {
        self.heat_sink = Some(heat_sink);
    }

    pub fn heat_sink(&self) -> Option<&ConventionalHeatSink> {
        self.heat_sink.as_ref()
    }

    pub fn elements(&self) -> &[StackElement] {
        &self.elements
    }

    pub fn element(&self, id: &str) -> Option<&StackElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn element_mut(&mut self, id: &str) -> Option<&mut StackElement> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    /// Die definition instantiated by `element`, if it is a die.
    pub fn die_of(&self, element: &StackElement) -> Option<&Die> {
        match element.kind {
            StackElementKind::Die { die, .. } => self.dies.get(die),
            _ => None,
        }
    }

    /// Grid layer holding the floorplan of a die element.
    pub fn source_layer_of(&self, element: &StackElement) -> Option<usize> {
        self.die_of(element)
            .map(|die| element.offset + die.source_layer())
    }

    pub fn n_layers(&self) -> usize {
        self.dimensions.n_layers()
    }

    pub fn push_layer(&mut self, layer: Layer) -> Result<()> {
        let id = layer.id.clone();
        self.push(id, StackElementKind::Layer(layer), 1)
    }

    pub fn push_die(&mut self, id: &str, die_id: &str, floorplan: Floorplan) -> Result<()> {
        let Some(die) = self.dies.iter().position(|d| d.id == die_id) else {
            bail!("stack element '{id}' refers to unknown die '{die_id}'");
        };
        let (n_rows, n_columns) = (self.dimensions.n_rows(), self.dimensions.n_columns());
        for element in floorplan.elements() {
            ensure!(
                element.ne_row < n_rows && element.ne_column < n_columns,
                "floorplan element '{}' of '{id}' lies outside the {n_rows}x{n_columns} grid",
                element.id
            );
        }
        let n_layers = self.dies[die].n_layers();
        self.push(
            id.to_string(),
            StackElementKind::Die { die, floorplan },
            n_layers,
        )
    }

    pub fn push_channel(&mut self, id: &str) -> Result<()> {
        let Some(channel) = &self.channel else {
            bail!("stack element '{id}' needs a channel definition");
        };
        ensure!(
            !self
                .elements
                .iter()
                .any(|e| matches!(e.kind, StackElementKind::Channel)),
            "the channel can be placed only once in the stack"
        );
        if channel.model() == ChannelModel::FourResistor {
            let n_columns = self.dimensions.n_columns();
            ensure!(
                n_columns >= 3 && n_columns % 2 == 1,
                "four-resistor channels need an odd number (>= 3) of columns, got {n_columns}"
            );
        }
        let n_layers = channel.n_layers();
        self.push(id.to_string(), StackElementKind::Channel, n_layers)
    }

    fn push(&mut self, id: String, kind: StackElementKind, n_layers: usize) -> Result<()> {
        ensure!(
            self.element(&id).is_none(),
            "stack element '{id}' is defined twice"
        );
        let offset = self.dimensions.n_layers();
        self.elements.push(StackElement {
            id,
            kind,
            offset,
            n_layers,
        });
        self.dimensions.set_n_layers(offset + n_layers);
        Ok(())
    }

    /// Queues one power value per floorplan element of die `element_id`.
    pub fn push_power_values(&mut self, element_id: &str, powers: &[f64]) -> Result<()> {
        let element = self
            .element_mut(element_id)
            .with_context(|| format!("unknown stack element '{element_id}'"))?;
        let Some(floorplan) = element.floorplan_mut() else {
            bail!("stack element '{element_id}' is not a die");
        };
        floorplan.push_power_values(powers)
    }

    /// Advances every floorplan to its next slot of power values.
    ///
    /// Returns false, without popping anything, if any queue is exhausted
    /// or the stack has no floorplan element at all.
    pub fn pop_power_values(&mut self) -> bool {
        let mut queues = self
            .elements
            .iter()
            .filter_map(StackElement::floorplan)
            .flat_map(|fp| fp.elements().iter().map(|e| &e.power_values))
            .peekable();
        let exhausted = queues.peek().is_none() || queues.any(|q| q.is_empty());
        if exhausted {
            return false;
        }
        for floorplan in self
            .elements
            .iter_mut()
            .filter_map(StackElement::floorplan_mut)
        {
            floorplan.pop_power_values();
        }
        true
    }

    /// Power dissipated by all dies during the current slot [W].
    pub fn total_power(&self) -> f64 {
        self.elements
            .iter()
            .filter_map(StackElement::floorplan)
            .map(Floorplan::total_power)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Coolant;

    fn simple_die(stack: &StackDescription) -> Die {
        let si = stack.material("SILICON").unwrap();
        Die::new(
            "DIE",
            vec![
                Layer::new("bulk", 50e-6, Arc::clone(&si)).unwrap(),
                Layer::new("active", 2e-6, si).unwrap(),
            ],
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_offsets_follow_push_order() {
        let dims = Dimensions::new(1e-3, 1e-3, 0.5e-3, 0.5e-3).unwrap();
        let mut stack = StackDescription::new(dims);
        stack.add_material(Material::silicon()).unwrap();
        let die = simple_die(&stack);
        stack.add_die(die).unwrap();
        let coolant = Coolant::water(300.0);
        let wall = stack.material("SILICON").unwrap();
        stack
            .set_channel(
                Channel::microchannel_2rm("CH", 1e-4, 5e-5, 1e-4, coolant, 1e-6, wall).unwrap(),
            )
            .unwrap();

        stack.push_die("bottom", "DIE", Floorplan::new()).unwrap();
        stack.push_channel("cavity").unwrap();
        stack.push_die("top", "DIE", Floorplan::new()).unwrap();

        assert_eq!(stack.n_layers(), 8);
        assert_eq!(stack.element("cavity").unwrap().offset(), 2);
        let top = stack.element("top").unwrap();
        assert_eq!(top.offset(), 6);
        assert_eq!(stack.source_layer_of(top), Some(7));
        assert!(stack.push_channel("again").is_err());
        assert!(stack.push_die("top", "DIE", Floorplan::new()).is_err());
        assert!(stack.push_die("x", "NOPE", Floorplan::new()).is_err());
    }

    #[test]
    fn test_four_resistor_needs_odd_columns() {
        let dims = Dimensions::new(1e-3, 1e-3, 0.25e-3, 0.5e-3).unwrap();
        let mut stack = StackDescription::new(dims);
        let si = stack.add_material(Material::silicon()).unwrap();
        stack
            .set_channel(
                Channel::microchannel_4rm("CH", 1e-4, Coolant::water(300.0), 1e-6, si).unwrap(),
            )
            .unwrap();
        assert!(stack.push_channel("cavity").is_err());
    }

    #[test]
    fn test_pop_power_values_across_dies() {
        let dims = Dimensions::new(1e-3, 1e-3, 0.5e-3, 0.5e-3).unwrap();
        let mut stack = StackDescription::new(dims);
        stack.add_material(Material::silicon()).unwrap();
        let die = simple_die(&stack);
        stack.add_die(die).unwrap();

        let mut fp = Floorplan::new();
        fp.add_element(stack.dimensions(), "core", 0.0, 0.0, 1e-3, 1e-3)
            .unwrap();
        stack.push_die("d0", "DIE", fp.clone()).unwrap();
        stack.push_die("d1", "DIE", fp).unwrap();

        stack.push_power_values("d0", &[1.0]).unwrap();
        assert!(!stack.pop_power_values());
        stack.push_power_values("d1", &[2.0]).unwrap();
        assert!(stack.pop_power_values());
        assert!((stack.total_power() - 3.0).abs() < 1e-12);
        assert!(stack.push_power_values("nope", &[1.0]).is_err());
        // One element, two values: nothing is queued.
        assert!(stack.push_power_values("d0", &[1.0, 1.0]).is_err());
        stack.push_power_values("d1", &[2.0]).unwrap();
        assert!(!stack.pop_power_values());
    }

    #[test]
    fn test_floorplan_from_a_larger_grid_is_rejected() {
        let dims = Dimensions::new(1e-3, 1e-3, 0.5e-3, 0.5e-3).unwrap();
        let mut stack = StackDescription::new(dims);
        stack.add_material(Material::silicon()).unwrap();
        let die = simple_die(&stack);
        stack.add_die(die).unwrap();

        let larger = Dimensions::new(2e-3, 2e-3, 0.5e-3, 0.5e-3).unwrap();
        let mut fp = Floorplan::new();
        fp.add_element(&larger, "far", 1.0e-3, 1.0e-3, 1e-3, 1e-3)
            .unwrap();
        let err = stack.push_die("d0", "DIE", fp).unwrap_err();
        assert!(err.to_string().contains("outside"), "{err}");
        assert!(stack.element("d0").is_none());
        assert_eq!(stack.n_layers(), 0);

        let mut fp = Floorplan::new();
        fp.add_element(&larger, "near", 0.0, 0.0, 1e-3, 1e-3)
            .unwrap();
        stack.push_die("d0", "DIE", fp).unwrap();
    }
}
