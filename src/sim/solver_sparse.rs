//! Direct sparse solver for the system matrix.
//!
//! [`SparseLu`] orders the columns by nested dissection of the symmetrized
//! pattern, then runs a left-looking LU factorization (Gilbert-Peierls) with
//! threshold partial pivoting. Each column of `L` and `U` is found by a
//! sparse triangular solve whose non-zero pattern comes from a depth-first
//! search, so work and storage follow the fill of the factors rather than a
//! band around the diagonal.
//!
//! The column ordering is kept, so a matrix with the same sparsity pattern
//! (e.g. after a flow-rate change) is refactored without reordering.

use crate::sim::error::SolverError;
use crate::sim::system_matrix::SystemMatrix;
use log::{debug, warn};

/// The diagonal is kept as pivot while `|a_kk| >= PIVOT_THRESHOLD * max |a_ik|`.
const PIVOT_THRESHOLD: f64 = 0.01;

/// Pivots below `SINGULAR_TOLERANCE * max |a_ij|` are treated as zero.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Subgraphs up to this size are not dissected further.
const DISSECTION_LEAF: usize = 64;

/// Marks a row that has not been chosen as pivot yet.
const UNPIVOTED: usize = usize::MAX;

/// Factorization backend used by the simulation driver.
pub trait SparseSolver: std::fmt::Debug {
    /// Orders and factorizes `matrix` from scratch.
    fn factorize(&mut self, matrix: &SystemMatrix) -> Result<(), SolverError>;

    /// Factorizes new values of a matrix whose pattern was seen by the last
    /// [`SparseSolver::factorize`], reusing the ordering.
    fn refactor_same_pattern(&mut self, matrix: &SystemMatrix) -> Result<(), SolverError>;

    /// Overwrites `rhs` with the solution of `A x = rhs`.
    fn solve(&self, rhs: &mut [f64]) -> Result<(), SolverError>;
}

/// Triangular factor in compressed-column form.
#[derive(Debug, Clone, Default)]
struct Factor {
    pointers: Vec<usize>,
    rows: Vec<usize>,
    values: Vec<f64>,
}

impl Factor {
    fn reset(&mut self, n: usize, capacity: usize) -> Result<(), SolverError> {
        self.pointers.clear();
        self.rows.clear();
        self.values.clear();
        self.pointers
            .try_reserve(n + 1)
            .and_then(|_| self.rows.try_reserve(capacity))
            .and_then(|_| self.values.try_reserve(capacity))
            .map_err(|_| SolverError::Allocation { entries: capacity })?;
        self.pointers.push(0);
        Ok(())
    }

    fn push(&mut self, row: usize, value: f64) {
        self.rows.push(row);
        self.values.push(value);
    }

    fn close_column(&mut self) {
        self.pointers.push(self.rows.len());
    }

    fn nnz(&self) -> usize {
        self.rows.len()
    }
}

/// Sparse LU factorization `P A Q = L U`.
///
/// `L` is unit lower triangular with its diagonal stored first in each
/// column; `U` keeps its diagonal last.
#[derive(Debug, Clone, Default)]
pub struct SparseLu {
    size: usize,
    /// `ordering[k]` is the matrix column eliminated at step `k`.
    ordering: Vec<usize>,
    /// `row_steps[i]` is the step at which row `i` became pivot.
    row_steps: Vec<usize>,
    lower: Factor,
    upper: Factor,
    pattern: Option<(Vec<usize>, Vec<usize>)>,
    factored: bool,
}

impl SparseLu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column elimination order.
    pub fn ordering(&self) -> &[usize] {
        &self.ordering
    }

    /// Entries stored in `L` and `U` together.
    pub fn factor_entries(&self) -> usize {
        self.lower.nnz() + self.upper.nnz()
    }

    pub fn is_factored(&self) -> bool {
        self.factored
    }

    fn order(&mut self, matrix: &SystemMatrix) {
        self.size = matrix.size();
        self.ordering = nested_dissection(matrix);
        self.pattern = Some((
            matrix.column_pointers().to_vec(),
            matrix.row_indices().to_vec(),
        ));
    }

    fn numeric(&mut self, matrix: &SystemMatrix) -> Result<(), SolverError> {
        self.factored = false;
        let n = self.size;
        let capacity = 4 * matrix.nnz() + n;
        self.lower.reset(n, capacity)?;
        self.upper.reset(n, capacity)?;

        let mut row_steps = vec![UNPIVOTED; n];
        let mut x = vec![0.0; n];
        let mut reach = Reach::new(n);
        let tolerance = SINGULAR_TOLERANCE * matrix.max_abs();

        for k in 0..n {
            let column = self.ordering[k];
            reach.compute(&self.lower, matrix, column, &row_steps);

            // x = L \ A(:, column), visiting rows in topological order.
            for (i, value) in matrix.column(column) {
                x[i] = value;
            }
            for &j in reach.pattern.iter().rev() {
                let step = row_steps[j];
                if step == UNPIVOTED {
                    continue;
                }
                let xj = x[j];
                let (start, end) = (self.lower.pointers[step], self.lower.pointers[step + 1]);
                for p in start + 1..end {
                    x[self.lower.rows[p]] -= self.lower.values[p] * xj;
                }
            }

            let mut candidate = None;
            let mut largest = 0.0;
            for &i in &reach.pattern {
                let step = row_steps[i];
                if step == UNPIVOTED {
                    if x[i].abs() > largest {
                        largest = x[i].abs();
                        candidate = Some(i);
                    }
                } else {
                    self.upper.push(step, x[i]);
                }
            }
            let Some(mut pivot_row) = candidate.filter(|_| largest > tolerance) else {
                warn!("singular pivot at cell {column}");
                return Err(SolverError::SingularPivot { column });
            };
            if row_steps[column] == UNPIVOTED && x[column].abs() >= PIVOT_THRESHOLD * largest {
                pivot_row = column;
            }

            let pivot = x[pivot_row];
            self.upper.push(k, pivot);
            self.upper.close_column();
            row_steps[pivot_row] = k;
            self.lower.push(pivot_row, 1.0);
            for &i in &reach.pattern {
                if row_steps[i] == UNPIVOTED {
                    self.lower.push(i, x[i] / pivot);
                }
                x[i] = 0.0;
            }
            self.lower.close_column();
        }

        for row in &mut self.lower.rows {
            *row = row_steps[*row];
        }
        self.row_steps = row_steps;
        self.factored = true;
        debug!(
            "sparse LU: {n} unknowns, {} matrix entries, {} factor entries",
            matrix.nnz(),
            self.factor_entries()
        );
        Ok(())
    }
}

impl SparseSolver for SparseLu {
    fn factorize(&mut self, matrix: &SystemMatrix) -> Result<(), SolverError> {
        self.order(matrix);
        self.numeric(matrix)
    }

    fn refactor_same_pattern(&mut self, matrix: &SystemMatrix) -> Result<(), SolverError> {
        let same = self.pattern.as_ref().is_some_and(|(pointers, rows)| {
            pointers.as_slice() == matrix.column_pointers()
                && rows.as_slice() == matrix.row_indices()
        });
        if !same {
            debug!("sparsity pattern changed, reordering");
            return self.factorize(matrix);
        }
        self.numeric(matrix)
    }

    fn solve(&self, rhs: &mut [f64]) -> Result<(), SolverError> {
        if !self.factored {
            return Err(SolverError::NotFactored);
        }
        let n = self.size;
        if rhs.len() != n {
            return Err(SolverError::DimensionMismatch {
                expected: n,
                actual: rhs.len(),
            });
        }

        let mut x = vec![0.0; n];
        for (i, &b) in rhs.iter().enumerate() {
            x[self.row_steps[i]] = b;
        }
        let (lower, upper) = (&self.lower, &self.upper);
        for j in 0..n {
            let xj = x[j];
            if xj != 0.0 {
                for p in lower.pointers[j] + 1..lower.pointers[j + 1] {
                    x[lower.rows[p]] -= lower.values[p] * xj;
                }
            }
        }
        for j in (0..n).rev() {
            let (start, end) = (upper.pointers[j], upper.pointers[j + 1]);
            x[j] /= upper.values[end - 1];
            let xj = x[j];
            if xj != 0.0 {
                for p in start..end - 1 {
                    x[upper.rows[p]] -= upper.values[p] * xj;
                }
            }
        }

        for (k, &column) in self.ordering.iter().enumerate() {
            rhs[column] = x[k];
        }
        Ok(())
    }
}

/// Rows reachable from one column of `A` in the graph of the partial `L`.
struct Reach {
    marked: Vec<bool>,
    /// Next entry of `L` to visit, per row on the stack.
    positions: Vec<usize>,
    stack: Vec<usize>,
    /// Reached rows in depth-first postorder.
    pattern: Vec<usize>,
}

impl Reach {
    fn new(n: usize) -> Self {
        Self {
            marked: vec![false; n],
            positions: vec![0; n],
            stack: Vec::new(),
            pattern: Vec::new(),
        }
    }

    fn compute(&mut self, lower: &Factor, matrix: &SystemMatrix, column: usize, steps: &[usize]) {
        for &i in &self.pattern {
            self.marked[i] = false;
        }
        self.pattern.clear();
        for (i, _) in matrix.column(column) {
            if !self.marked[i] {
                self.search(lower, i, steps);
            }
        }
    }

    /// Non-recursive depth-first search from row `root`.
    fn search(&mut self, lower: &Factor, root: usize, steps: &[usize]) {
        self.stack.push(root);
        while let Some(&v) = self.stack.last() {
            let step = steps[v];
            let end = if step == UNPIVOTED {
                0
            } else {
                lower.pointers[step + 1]
            };
            if !self.marked[v] {
                self.marked[v] = true;
                self.positions[v] = if step == UNPIVOTED {
                    0
                } else {
                    lower.pointers[step]
                };
            }

            let mut descended = false;
            while self.positions[v] < end {
                let w = lower.rows[self.positions[v]];
                self.positions[v] += 1;
                if !self.marked[w] {
                    self.stack.push(w);
                    descended = true;
                    break;
                }
            }
            if !descended {
                self.stack.pop();
                self.pattern.push(v);
            }
        }
    }
}

/// Nested dissection ordering of the symmetrized pattern of `matrix`.
///
/// Breadth-first level structures from a pseudo-peripheral vertex supply the
/// separators: the middle level splits a connected subgraph in two, both
/// halves are ordered first and the separator last.
fn nested_dissection(matrix: &SystemMatrix) -> Vec<usize> {
    let n = matrix.size();
    let mut adjacency = vec![Vec::new(); n];
    for j in 0..n {
        for (i, _) in matrix.column(j) {
            if i != j {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }
    for neighbours in &mut adjacency {
        neighbours.sort_unstable();
        neighbours.dedup();
    }

    let mut dissection = Dissection {
        adjacency,
        part: vec![0; n],
        seen: vec![false; n],
        grouped: vec![false; n],
        parts: 1,
        order: Vec::with_capacity(n),
    };
    dissection.dissect((0..n).collect(), 0);
    dissection.order
}

struct Dissection {
    adjacency: Vec<Vec<usize>>,
    /// Subgraph label of every vertex.
    part: Vec<usize>,
    seen: Vec<bool>,
    grouped: Vec<bool>,
    parts: usize,
    order: Vec<usize>,
}

impl Dissection {
    fn dissect(&mut self, mut vertices: Vec<usize>, part: usize) {
        if vertices.len() <= DISSECTION_LEAF {
            vertices.sort_unstable();
            self.order.extend(vertices);
            return;
        }

        let components = self.components(&vertices, part);
        if components.len() > 1 {
            for component in components {
                let label = self.relabel(&component);
                self.dissect(component, label);
            }
            return;
        }

        let levels = self.pseudo_peripheral_levels(vertices[0], part);
        if levels.len() < 3 {
            vertices.sort_unstable();
            self.order.extend(vertices);
            return;
        }

        let half = vertices.len() / 2;
        let mut below = 0;
        let mut middle = levels.len() - 2;
        for (depth, level) in levels.iter().enumerate() {
            if below + level.len() > half {
                middle = depth;
                break;
            }
            below += level.len();
        }
        let middle = middle.clamp(1, levels.len() - 2);

        let first = levels[..middle].concat();
        let second = levels[middle + 1..].concat();
        let separator = levels[middle].clone();
        let (first_label, second_label) = (self.relabel(&first), self.relabel(&second));
        self.relabel(&separator);

        self.dissect(first, first_label);
        self.dissect(second, second_label);
        self.order.extend(separator);
    }

    fn relabel(&mut self, vertices: &[usize]) -> usize {
        let label = self.parts;
        self.parts += 1;
        for &v in vertices {
            self.part[v] = label;
        }
        label
    }

    /// Connected components of the subgraph labelled `part`.
    fn components(&mut self, vertices: &[usize], part: usize) -> Vec<Vec<usize>> {
        let mut components = Vec::new();
        for &v in vertices {
            if self.grouped[v] {
                continue;
            }
            let component = self.levels(v, part).concat();
            for &w in &component {
                self.grouped[w] = true;
            }
            components.push(component);
        }
        for &v in vertices {
            self.grouped[v] = false;
        }
        components
    }

    /// Level structure rooted at a vertex of (nearly) maximal eccentricity.
    fn pseudo_peripheral_levels(&mut self, start: usize, part: usize) -> Vec<Vec<usize>> {
        let mut levels = self.levels(start, part);
        for _ in 0..8 {
            let Some(candidate) = levels.last().and_then(|last| self.min_degree(last)) else {
                break;
            };
            let candidate_levels = self.levels(candidate, part);
            if candidate_levels.len() <= levels.len() {
                break;
            }
            levels = candidate_levels;
        }
        levels
    }

    fn min_degree(&self, vertices: &[usize]) -> Option<usize> {
        vertices
            .iter()
            .copied()
            .min_by_key(|&v| (self.adjacency[v].len(), v))
    }

    /// Breadth-first levels from `root` within the subgraph labelled `part`.
    fn levels(&mut self, root: usize, part: usize) -> Vec<Vec<usize>> {
        let mut levels = Vec::new();
        let mut frontier = vec![root];
        self.seen[root] = true;
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for &v in &frontier {
                for &w in &self.adjacency[v] {
                    if self.part[w] == part && !self.seen[w] {
                        self.seen[w] = true;
                        next.push(w);
                    }
                }
            }
            levels.push(std::mem::replace(&mut frontier, next));
        }
        for &v in levels.iter().flatten() {
            self.seen[v] = false;
        }
        levels
    }
}
