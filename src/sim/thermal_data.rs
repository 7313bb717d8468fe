use crate::sim::analysis::Analysis;
use crate::sim::error::EmulationError;
use crate::sim::grid::ThermalGridData;
use crate::sim::solver_sparse::{SparseLu, SparseSolver};
use crate::sim::sources::fill_sources;
use crate::sim::system_matrix::SystemMatrix;
use crate::stack::{StackDescription, flow_rate_from_ml_per_min};
use log::{debug, info};

/// Outcome of a simulation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimResult {
    /// One time step was solved; the slot continues.
    StepDone,
    /// The last step of a slot (or a steady solve) was completed.
    SlotDone,
    /// No power values are left; nothing was solved.
    EndOfSimulation,
}

/// What changed in the stack since the last fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackChanges {
    /// Coolant flow rate; forces a rebuild of grid data and matrix.
    pub flow_rate: bool,
    /// Floorplan powers; forces a rebuild of the source vector.
    pub power_values: bool,
}

impl StackChanges {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            flow_rate: true,
            power_values: true,
        }
    }
}

/// State of the factorization held by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factorization {
    /// Order and factorize from scratch.
    DoFact,
    /// New values on the known pattern.
    SamePattern,
    Factored,
}

/// Live state of a simulation: temperatures, sources, matrix and factors.
///
/// ```text
/// new() ──► fill_thermal_data() ──► emulate_step() / emulate_slot()   (transient)
///                 ▲                 emulate_steady()                  (steady)
///                 └── change_coolant_flow_rate()
/// ```
#[derive(Debug)]
pub struct ThermalData<S: SparseSolver = SparseLu> {
    temperatures: Vec<f64>,
    sources: Vec<f64>,
    rhs: Vec<f64>,
    grid: Option<ThermalGridData>,
    matrix: Option<SystemMatrix>,
    solver: S,
    factorization: Factorization,
    analysis: Analysis,
}

impl ThermalData<SparseLu> {
    /// Allocates the per-cell arrays of `stack`, all cells at the initial
    /// temperature of `analysis`.
    pub fn new(stack: &StackDescription, analysis: Analysis) -> Result<Self, EmulationError> {
        Self::with_solver(stack, analysis, SparseLu::new())
    }
}

impl<S: SparseSolver> ThermalData<S> {
    pub fn with_solver(
        stack: &StackDescription,
        analysis: Analysis,
        solver: S,
    ) -> Result<Self, EmulationError> {
        if stack.elements().is_empty() {
            return Err(EmulationError::EmptyStack);
        }
        let n = stack.dimensions().n_cells();
        let temperatures = allocate(n, analysis.initial_temperature(), "temperatures")?;
        let sources = allocate(n, 0.0, "sources")?;
        let rhs = allocate(n, 0.0, "right-hand side")?;

        Ok(Self {
            temperatures,
            sources,
            rhs,
            grid: None,
            matrix: None,
            solver,
            factorization: Factorization::DoFact,
            analysis,
        })
    }

    /// Brings grid data, matrix, sources and factors up to date with `stack`.
    ///
    /// The first call builds everything. Later calls rebuild grid data and
    /// matrix only on a flow-rate change (refactoring on the known pattern)
    /// and the source vector on any change.
    pub fn fill_thermal_data(
        &mut self,
        stack: &StackDescription,
        changes: StackChanges,
    ) -> Result<(), EmulationError> {
        let first = self.matrix.is_none();

        if first || changes.flow_rate {
            let grid = ThermalGridData::build(stack, self.analysis.delta_time())?;
            let matrix = SystemMatrix::assemble(stack.dimensions(), &grid)?;
            if matrix.size() != self.temperatures.len() {
                return Err(EmulationError::WrongConfig(format!(
                    "stack has {} cells, thermal data was allocated for {}",
                    matrix.size(),
                    self.temperatures.len()
                )));
            }
            info!(
                "system matrix built: {} cells, {} non-zeros",
                matrix.size(),
                matrix.nnz()
            );
            if !first && self.factorization == Factorization::Factored {
                self.factorization = Factorization::SamePattern;
            }
            self.grid = Some(grid);
            self.matrix = Some(matrix);
        }

        if first || changes.flow_rate || changes.power_values {
            self.refresh_sources(stack);
        }

        let Some(matrix) = &self.matrix else {
            return Err(EmulationError::NotFactored);
        };
        match self.factorization {
            Factorization::DoFact => {
                self.solver.factorize(matrix)?;
                info!("system matrix factorized");
            }
            Factorization::SamePattern => {
                self.solver.refactor_same_pattern(matrix)?;
                info!("system matrix refactorized on the same pattern");
            }
            Factorization::Factored => {}
        }
        self.factorization = Factorization::Factored;
        Ok(())
    }

    /// Advances one time step. At a slot boundary the next power values
    /// are popped first.
    pub fn emulate_step(
        &mut self,
        stack: &mut StackDescription,
    ) -> Result<SimResult, EmulationError> {
        if !self.analysis.is_transient() {
            return Err(EmulationError::WrongConfig(
                "time steps need a transient analysis".to_string(),
            ));
        }
        if self.factorization != Factorization::Factored {
            return Err(EmulationError::NotFactored);
        }

        if self.analysis.slot_completed() {
            if !stack.pop_power_values() {
                info!(
                    "power trace exhausted at t = {} s",
                    self.analysis.simulated_time()
                );
                return Ok(SimResult::EndOfSimulation);
            }
            self.refresh_sources(stack);
        }

        self.solve_step()?;
        self.analysis.increase_time();

        if self.analysis.slot_completed() {
            debug!("slot completed at t = {} s", self.analysis.simulated_time());
            Ok(SimResult::SlotDone)
        } else {
            Ok(SimResult::StepDone)
        }
    }

    /// Runs time steps until the current slot is completed.
    pub fn emulate_slot(
        &mut self,
        stack: &mut StackDescription,
    ) -> Result<SimResult, EmulationError> {
        loop {
            match self.emulate_step(stack)? {
                SimResult::StepDone => continue,
                done => return Ok(done),
            }
        }
    }

    /// Solves the steady state for the next power values.
    pub fn emulate_steady(
        &mut self,
        stack: &mut StackDescription,
    ) -> Result<SimResult, EmulationError> {
        if self.analysis.is_transient() {
            return Err(EmulationError::WrongConfig(
                "steady solves need a steady analysis".to_string(),
            ));
        }
        if self.factorization != Factorization::Factored {
            return Err(EmulationError::NotFactored);
        }
        if !stack.pop_power_values() {
            return Ok(SimResult::EndOfSimulation);
        }
        self.refresh_sources(stack);
        self.solve_step()?;
        Ok(SimResult::SlotDone)
    }

    /// Sets the coolant flow rate [m^3/s] and refactors the updated matrix.
    pub fn change_coolant_flow_rate(
        &mut self,
        stack: &mut StackDescription,
        flow_rate: f64,
    ) -> Result<(), EmulationError> {
        let channel = stack.channel_mut().ok_or(EmulationError::NoChannel)?;
        channel
            .set_flow_rate(flow_rate)
            .map_err(|_| EmulationError::InvalidFlowRate(flow_rate))?;
        info!("coolant flow rate set to {flow_rate:e} m^3/s");
        self.fill_thermal_data(
            stack,
            StackChanges {
                flow_rate: true,
                power_values: false,
            },
        )
    }

    /// Same as [`Self::change_coolant_flow_rate`] with the flow rate in ml/min.
    pub fn update_coolant_flow_rate(
        &mut self,
        stack: &mut StackDescription,
        ml_per_min: f64,
    ) -> Result<(), EmulationError> {
        self.change_coolant_flow_rate(stack, flow_rate_from_ml_per_min(ml_per_min))
    }

    /// `T <- A^-1 (sources + capacity * T)`.
    fn solve_step(&mut self) -> Result<(), EmulationError> {
        let grid = self.grid.as_ref().ok_or(EmulationError::NotFactored)?;
        for (((b, &s), c), &t) in self
            .rhs
            .iter_mut()
            .zip(&self.sources)
            .zip(grid.capacities())
            .zip(&self.temperatures)
        {
            *b = s + c * t;
        }
        self.solver.solve(&mut self.rhs)?;
        std::mem::swap(&mut self.temperatures, &mut self.rhs);
        Ok(())
    }

    fn refresh_sources(&mut self, stack: &StackDescription) {
        if let Some(grid) = &self.grid {
            fill_sources(stack, grid, &mut self.sources);
            debug!("sources rebuilt: {} W dissipated", stack.total_power());
        }
    }

    /// Cell temperatures [K], indexed like [`crate::stack::Dimensions::cell_index`].
    pub fn temperatures(&self) -> &[f64] {
        &self.temperatures
    }

    /// Source vector of the current slot [W].
    pub fn sources(&self) -> &[f64] {
        &self.sources
    }

    pub fn system_matrix(&self) -> Option<&SystemMatrix> {
        self.matrix.as_ref()
    }

    pub fn grid_data(&self) -> Option<&ThermalGridData> {
        self.grid.as_ref()
    }

    pub fn factorization(&self) -> Factorization {
        self.factorization
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    pub fn n_cells(&self) -> usize {
        self.temperatures.len()
    }
}

fn allocate(len: usize, value: f64, what: &'static str) -> Result<Vec<f64>, EmulationError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| EmulationError::Allocation { what, len })?;
    v.resize(len, value);
    Ok(v)
}
