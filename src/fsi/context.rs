use nalgebra::DVector;

use crate::linalg::SparseMatrix;
use crate::numerics::IterationPhase;

/// A matrix block remembered over two consecutive assemblies.
#[derive(Clone, Debug, Default)]
pub struct MatrixSnapshot {
    prev: Option<SparseMatrix>,
    cur: Option<SparseMatrix>,
}

impl MatrixSnapshot {
    pub fn rotate(&mut self, new: Option<SparseMatrix>) {
        self.prev = self.cur.take();
        self.cur = new;
    }

    pub fn clear_current(&mut self) {
        self.cur = None;
    }

    pub fn current(&self) -> Option<&SparseMatrix> {
        self.cur.as_ref()
    }

    pub fn previous(&self) -> Option<&SparseMatrix> {
        self.prev.as_ref()
    }

    /// The block the converged state was linearized with: the previous
    /// assembly, or the only one if there was just one.
    pub fn for_recovery(&self) -> Option<&SparseMatrix> {
        self.prev.as_ref().or(self.cur.as_ref())
    }
}

/// State the fluid-split system carries from one Newton iteration to the next.
#[derive(Clone, Debug, Default)]
pub struct IterationContext {
    pub phase: IterationPhase,

    /// F_ΓI
    pub fgi: MatrixSnapshot,
    /// F_ΓΓ
    pub fgg: MatrixSnapshot,
    /// F^G_ΓI
    pub fmgi: MatrixSnapshot,
    /// F^G_ΓΓ
    pub fmgg: MatrixSnapshot,

    /// Iteration increment of the structure interface displacement.
    pub ddginc: Option<DVector<f64>>,
    /// Iteration increment of the inner fluid unknowns.
    pub duiinc: Option<DVector<f64>>,
    /// Iteration increment of the inner ALE displacement.
    pub ddialeinc: Option<DVector<f64>>,

    pub disgprev: Option<DVector<f64>>,
    pub soliprev: Option<DVector<f64>>,
    pub solialeprev: Option<DVector<f64>>,
}

impl IterationContext {
    /// Start of a time step: increments are zero, nothing is remembered yet.
    pub fn reset_trackers(&mut self, n_interface: usize, n_fluid_inner: usize, n_ale_inner: usize) {
        self.ddginc = Some(DVector::zeros(n_interface));
        self.duiinc = Some(DVector::zeros(n_fluid_inner));
        self.ddialeinc = Some(DVector::zeros(n_ale_inner));
        self.disgprev = None;
        self.soliprev = None;
        self.solialeprev = None;

        self.fgi.clear_current();
        self.fgg.clear_current();
        self.fmgi.clear_current();
        self.fmgg.clear_current();
    }

    pub fn rotate_snapshots(
        &mut self,
        fgi: Option<SparseMatrix>,
        fgg: Option<SparseMatrix>,
        fmgi: Option<SparseMatrix>,
        fmgg: Option<SparseMatrix>,
    ) {
        self.fgi.rotate(fgi);
        self.fgg.rotate(fgg);
        self.fmgi.rotate(fmgi);
        self.fmgg.rotate(fmgg);
    }
}

/// `new - prev`, or `new` when there is nothing to compare with. Updates `prev`.
pub(crate) fn track_increment(prev: &mut Option<DVector<f64>>, new: &DVector<f64>) -> DVector<f64> {
    let inc = match prev.as_ref() {
        Some(p) if p.len() == new.len() => new - p,
        _ => new.clone(),
    };
    *prev = Some(new.clone());
    inc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::DofMap;

    #[test]
    fn recovery_prefers_previous_snapshot() {
        let map = DofMap::from_range(0..1);
        let a = SparseMatrix::identity(&map);
        let mut b = SparseMatrix::identity(&map);
        b.scale(2.0);

        let mut s = MatrixSnapshot::default();
        assert!(s.for_recovery().is_none());
        s.rotate(Some(a));
        assert_eq!(s.for_recovery().map(|m| m.get(0, 0)), Some(1.0));
        s.rotate(Some(b));
        assert_eq!(s.for_recovery().map(|m| m.get(0, 0)), Some(1.0));
        assert_eq!(s.current().map(|m| m.get(0, 0)), Some(2.0));
    }

    #[test]
    fn increments_are_differences_of_successive_values() {
        let mut prev = None;
        let first = track_increment(&mut prev, &DVector::from_vec(vec![1.0, 2.0]));
        assert_eq!(first.as_slice(), &[1.0, 2.0]);
        let second = track_increment(&mut prev, &DVector::from_vec(vec![1.5, 2.0]));
        assert_eq!(second.as_slice(), &[0.5, 0.0]);
    }

    #[test]
    fn reset_sizes_increments() {
        let mut ctx = IterationContext::default();
        ctx.disgprev = Some(DVector::zeros(3));
        ctx.reset_trackers(2, 5, 4);
        assert_eq!(ctx.ddginc.as_ref().map(DVector::len), Some(2));
        assert_eq!(ctx.duiinc.as_ref().map(DVector::len), Some(5));
        assert!(ctx.disgprev.is_none());
    }
}
