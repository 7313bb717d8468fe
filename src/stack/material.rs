use anyhow::{Result, bail, ensure};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Isotropic solid material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: String,
    /// Thermal conductivity in W/(m*K).
    pub thermal_conductivity: f64,
    /// Volumetric heat capacity (density * specific heat) in J/(m^3*K).
    pub volumetric_heat_capacity: f64,
}

impl Material {
    pub fn new(id: &str, thermal_conductivity: f64, volumetric_heat_capacity: f64) -> Self {
        Self {
            id: id.to_string(),
            thermal_conductivity,
            volumetric_heat_capacity,
        }
    }

    /// Silicon at room temperature.
    pub fn silicon() -> Self {
        Self::new("SILICON", 130.0, 1.628e6)
    }

    /// Back-end-of-line dielectric.
    pub fn beol() -> Self {
        Self::new("BEOL", 2.25, 2.175e6)
    }
}

/// Registry of materials keyed by id.
///
/// Layers and channel walls hold a shared handle to the registered material,
/// so every reference to one id sees the same definition.
#[derive(Debug, Clone, Default)]
pub struct MaterialLibrary {
    materials: HashMap<String, Arc<Material>>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `material` and returns its shared handle.
    pub fn insert(&mut self, material: Material) -> Result<Arc<Material>> {
        ensure!(
            material.thermal_conductivity.is_finite() && material.thermal_conductivity > 0.0,
            "material '{}': thermal conductivity must be > 0 (got {})",
            material.id,
            material.thermal_conductivity
        );
        ensure!(
            material.volumetric_heat_capacity.is_finite()
                && material.volumetric_heat_capacity > 0.0,
            "material '{}': volumetric heat capacity must be > 0 (got {})",
            material.id,
            material.volumetric_heat_capacity
        );
        if self.materials.contains_key(&material.id) {
            bail!("material '{}' is defined twice", material.id);
        }
        let id = material.id.clone();
        let handle = Arc::new(material);
        self.materials.insert(id, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Material>> {
        self.materials.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}
