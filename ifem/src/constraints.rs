//! Affine constraints `x_i = Σ_j w_ij x_j + g_i` applied during assembly.
//!
//! Lines without entries are Dirichlet constraints. Lines with entries tie hanging
//! vertices to the edge or face they sit on.

use std::collections::BTreeMap;

use crate::matrix::TripletMatrix;

/// Which side of a merge keeps its value when both constrain the same dof.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MergeConflictBehavior {
    LeftObjectWins,
    RightObjectWins,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstraintLine {
    pub entries: Vec<(usize, f64)>,
    pub inhomogeneity: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AffineConstraints {
    lines: BTreeMap<usize, ConstraintLine>,
    closed: bool,
}

impl AffineConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrains `dof` to zero. Adding an existing line keeps its inhomogeneity.
    pub fn add_line(&mut self, dof: usize) {
        self.lines.entry(dof).or_default();
        self.closed = false;
    }

    /// Adds `weight * x_master` terms to the line of `dof`, creating it if needed.
    pub fn add_entries(&mut self, dof: usize, entries: &[(usize, f64)]) {
        self.lines.entry(dof).or_default().entries.extend_from_slice(entries);
        self.closed = false;
    }

    pub fn set_inhomogeneity(&mut self, dof: usize, value: f64) {
        self.lines.entry(dof).or_default().inhomogeneity = value;
        self.closed = false;
    }

    pub fn is_constrained(&self, dof: usize) -> bool {
        self.lines.contains_key(&dof)
    }

    pub fn inhomogeneity(&self, dof: usize) -> Option<f64> {
        self.lines.get(&dof).map(|line| line.inhomogeneity)
    }

    pub fn entries(&self, dof: usize) -> Option<&[(usize, f64)]> {
        self.lines.get(&dof).map(|line| line.entries.as_slice())
    }

    pub fn n_constraints(&self) -> usize {
        self.lines.len()
    }

    /// Constrained dofs with their inhomogeneities.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.lines.iter().map(|(&d, line)| (d, line.inhomogeneity))
    }

    /// Substitutes constrained entries by their own lines until every entry refers to an
    /// unconstrained dof.
    ///
    /// Chains are resolved one level per pass. A cycle is left as is after as many passes
    /// as there are lines.
    pub fn close(&mut self) {
        for _ in 0..=self.lines.len() {
            let updates: Vec<(usize, ConstraintLine)> = self
                .lines
                .iter()
                .filter_map(|(&dof, line)| self.resolved(dof, line).map(|line| (dof, line)))
                .collect();
            if updates.is_empty() {
                break;
            }
            self.lines.extend(updates);
        }
        self.closed = true;
    }

    /// `line` with constrained entries substituted once, `None` if there are none.
    fn resolved(&self, dof: usize, line: &ConstraintLine) -> Option<ConstraintLine> {
        if !line
            .entries
            .iter()
            .any(|(j, _)| *j != dof && self.lines.contains_key(j))
        {
            return None;
        }
        let mut entries: BTreeMap<usize, f64> = BTreeMap::new();
        let mut inhomogeneity = line.inhomogeneity;
        for &(j, w) in line.entries.iter() {
            match self.lines.get(&j).filter(|_| j != dof) {
                Some(master) => {
                    inhomogeneity += w * master.inhomogeneity;
                    for &(k, v) in master.entries.iter() {
                        *entries.entry(k).or_insert(0.0) += w * v;
                    }
                }
                None => *entries.entry(j).or_insert(0.0) += w,
            }
        }
        Some(ConstraintLine {
            entries: entries.into_iter().collect(),
            inhomogeneity,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.closed = false;
    }

    pub fn copy_from(&mut self, other: &AffineConstraints) {
        self.lines.clone_from(&other.lines);
        self.closed = other.closed;
    }

    /// Adds the lines of `other` and closes the result, so entries pointing at dofs that
    /// `other` constrains are substituted.
    pub fn merge(&mut self, other: &AffineConstraints, behavior: MergeConflictBehavior) {
        for (&dof, line) in other.lines.iter() {
            match behavior {
                MergeConflictBehavior::LeftObjectWins => {
                    self.lines.entry(dof).or_insert_with(|| line.clone());
                }
                MergeConflictBehavior::RightObjectWins => {
                    self.lines.insert(dof, line.clone());
                }
            }
        }
        self.close();
    }

    /// Sets every constrained entry of `v` to the value its line prescribes.
    pub fn distribute(&self, v: &mut [f64]) {
        for (&dof, line) in self.lines.iter() {
            v[dof] = line
                .entries
                .iter()
                .fold(line.inhomogeneity, |acc, &(j, w)| acc + w * v[j]);
        }
    }

    /// Sets every constrained entry of `v` to zero.
    pub fn set_zero(&self, v: &mut [f64]) {
        for &dof in self.lines.keys() {
            v[dof] = 0.0;
        }
    }

    /// Unconstrained dofs `dof` stands for, with weights.
    fn expand(&self, dof: usize) -> Vec<(usize, f64)> {
        match self.lines.get(&dof) {
            Some(line) => line.entries.clone(),
            None => vec![(dof, 1.0)],
        }
    }

    /// Adds a local matrix and right-hand side to the global system, eliminating
    /// constrained dofs.
    ///
    /// Constrained rows receive only a diagonal entry `d` together with the right-hand side
    /// `d * g`. Rows and columns of constrained dofs are otherwise moved onto the dofs their
    /// lines refer to, and inhomogeneities onto the right-hand side, which keeps the
    /// system symmetric. Use [`distribute`](Self::distribute) on the solution afterwards.
    pub fn distribute_local_to_global(
        &self,
        local_matrix: &na::DMatrix<f64>,
        local_rhs: &na::DVector<f64>,
        dofs: &[usize],
        matrix: &mut TripletMatrix,
        rhs: &mut [f64],
    ) {
        let fallback = average_diagonal(local_matrix);
        let expanded: Vec<_> = dofs.iter().map(|&d| self.expand(d)).collect();
        for (i, &row) in dofs.iter().enumerate() {
            if let Some(line) = self.lines.get(&row) {
                let diag = diagonal_entry(local_matrix[(i, i)], fallback);
                matrix.add(row, row, diag);
                rhs[row] += diag * line.inhomogeneity;
            }
            for &(r, wr) in expanded[i].iter() {
                rhs[r] += wr * local_rhs[i];
                for (j, &col) in dofs.iter().enumerate() {
                    let a = wr * local_matrix[(i, j)];
                    if a == 0.0 {
                        continue;
                    }
                    if let Some(g) = self.inhomogeneity(col) {
                        rhs[r] -= a * g;
                    }
                    for &(c, wc) in expanded[j].iter() {
                        matrix.add(r, c, a * wc);
                    }
                }
            }
        }
    }

    /// Matrix only version of [`distribute_local_to_global`](Self::distribute_local_to_global).
    pub fn distribute_local_matrix(
        &self,
        local_matrix: &na::DMatrix<f64>,
        dofs: &[usize],
        matrix: &mut TripletMatrix,
    ) {
        let fallback = average_diagonal(local_matrix);
        let expanded: Vec<_> = dofs.iter().map(|&d| self.expand(d)).collect();
        for (i, &row) in dofs.iter().enumerate() {
            if self.is_constrained(row) {
                matrix.add(row, row, diagonal_entry(local_matrix[(i, i)], fallback));
            }
            for &(r, wr) in expanded[i].iter() {
                for j in 0..dofs.len() {
                    let a = wr * local_matrix[(i, j)];
                    if a == 0.0 {
                        continue;
                    }
                    for &(c, wc) in expanded[j].iter() {
                        matrix.add(r, c, a * wc);
                    }
                }
            }
        }
    }

    /// Right-hand side only version of [`distribute_local_to_global`](Self::distribute_local_to_global).
    ///
    /// Constrained rows are left untouched and inhomogeneities are ignored.
    pub fn distribute_local_rhs(&self, local_rhs: &na::DVector<f64>, dofs: &[usize], rhs: &mut [f64]) {
        for (i, &row) in dofs.iter().enumerate() {
            for (r, w) in self.expand(row) {
                rhs[r] += w * local_rhs[i];
            }
        }
    }
}

fn average_diagonal(m: &na::DMatrix<f64>) -> f64 {
    let n = m.nrows().max(1) as f64;
    let avg = m.diagonal().iter().map(|x| x.abs()).sum::<f64>() / n;
    if avg > 0.0 {
        avg
    } else {
        1.0
    }
}

fn diagonal_entry(a_ii: f64, fallback: f64) -> f64 {
    if a_ii != 0.0 {
        a_ii.abs()
    } else {
        fallback
    }
}
