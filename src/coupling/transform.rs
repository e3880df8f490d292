//! Move sparse blocks between the DOF spaces of coupled fields.
//!
//! The destination must be in the filling state. Without `add_matrix` it is
//! emptied first; otherwise the transformed entries are summed into it.

use super::converter::CouplingConverter;
use crate::error::FsiError;
use crate::linalg::SparseMatrix;

fn prepare(dst: &mut SparseMatrix, add_matrix: bool) -> Result<(), FsiError> {
    if !add_matrix {
        dst.reset();
    }
    if dst.is_filled() {
        return Err(FsiError::MatrixState {
            op: "coupling transform",
            expected: "filling",
        });
    }
    Ok(())
}

fn convert_row(conv: &dyn CouplingConverter, gid: usize) -> Result<usize, FsiError> {
    conv.convert(gid).ok_or(FsiError::DofNotInMap {
        gid,
        map: "row coupling",
    })
}

/// Rows are converted, columns are kept.
pub fn matrix_row_transform(
    src: &SparseMatrix,
    scale: f64,
    row_conv: &dyn CouplingConverter,
    dst: &mut SparseMatrix,
    add_matrix: bool,
) -> Result<(), FsiError> {
    prepare(dst, add_matrix)?;
    for (r, c, v) in src.entries() {
        dst.insert(convert_row(row_conv, r)?, c, scale * v)?;
    }
    Ok(())
}

/// Columns are converted, rows are kept. Entries in columns without a
/// coupling partner are an error with `exact_match` and dropped otherwise.
pub fn matrix_col_transform(
    src: &SparseMatrix,
    scale: f64,
    col_conv: &dyn CouplingConverter,
    dst: &mut SparseMatrix,
    exact_match: bool,
    add_matrix: bool,
) -> Result<(), FsiError> {
    prepare(dst, add_matrix)?;
    for (r, c, v) in src.entries() {
        match col_conv.convert(c) {
            Some(cc) => dst.insert(r, cc, scale * v)?,
            None if exact_match => {
                return Err(FsiError::DofNotInMap {
                    gid: c,
                    map: "column coupling",
                });
            }
            None => {}
        }
    }
    Ok(())
}

/// Rows and columns are converted.
pub fn matrix_row_col_transform(
    src: &SparseMatrix,
    scale: f64,
    row_conv: &dyn CouplingConverter,
    col_conv: &dyn CouplingConverter,
    dst: &mut SparseMatrix,
    exact_match: bool,
    add_matrix: bool,
) -> Result<(), FsiError> {
    prepare(dst, add_matrix)?;
    for (r, c, v) in src.entries() {
        let rr = convert_row(row_conv, r)?;
        match col_conv.convert(c) {
            Some(cc) => dst.insert(rr, cc, scale * v)?,
            None if exact_match => {
                return Err(FsiError::DofNotInMap {
                    gid: c,
                    map: "column coupling",
                });
            }
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupling::adapter::{Coupling, InterfaceNode};
    use crate::coupling::converter::CouplingSlaveConverter;
    use crate::linalg::DofMap;

    // master dofs 0,1 ; slave dofs 10,11
    fn coupling() -> Coupling {
        let m = vec![
            InterfaceNode { position: [0.0; 3], dofs: vec![0] },
            InterfaceNode { position: [1.0, 0.0, 0.0], dofs: vec![1] },
        ];
        let s = vec![
            InterfaceNode { position: [1.0, 0.0, 0.0], dofs: vec![11] },
            InterfaceNode { position: [0.0; 3], dofs: vec![10] },
        ];
        Coupling::setup(&m, &s, 1, 1e-12).unwrap()
    }

    #[test]
    fn row_col_transform_moves_and_scales() {
        let c = coupling();
        let slave = DofMap::new([10, 11]);
        let src = SparseMatrix::from_triplets(
            slave.clone(),
            slave,
            &[(10, 10, 1.0), (10, 11, 2.0), (11, 11, 3.0)],
        )
        .unwrap();
        let master = DofMap::new([0, 1, 2]);
        let mut dst = SparseMatrix::new(master.clone(), master);
        dst.insert(0, 0, 5.0).unwrap();
        let conv = CouplingSlaveConverter(&c);
        matrix_row_col_transform(&src, 2.0, &conv, &conv, &mut dst, true, true).unwrap();
        dst.complete().unwrap();
        assert_eq!(dst.get(0, 0), 7.0);
        assert_eq!(dst.get(0, 1), 4.0);
        assert_eq!(dst.get(1, 1), 6.0);
    }

    #[test]
    fn col_transform_drops_or_rejects_unmapped_columns() {
        let c = coupling();
        let rows = DofMap::new([20]);
        let src = SparseMatrix::from_triplets(
            rows.clone(),
            DofMap::new([10, 12]),
            &[(20, 10, 1.0), (20, 12, 9.0)],
        )
        .unwrap();
        let conv = CouplingSlaveConverter(&c);
        let mut dst = SparseMatrix::new(rows, DofMap::new([0, 1]));
        assert!(matrix_col_transform(&src, 1.0, &conv, &mut dst, true, false).is_err());
        matrix_col_transform(&src, 1.0, &conv, &mut dst, false, false).unwrap();
        dst.complete().unwrap();
        assert_eq!(dst.nnz(), 1);
        assert_eq!(dst.get(20, 0), 1.0);
    }

    #[test]
    fn completed_destination_is_rejected_when_adding() {
        let c = coupling();
        let slave = DofMap::new([10, 11]);
        let src = SparseMatrix::identity(&slave);
        let mut dst = SparseMatrix::identity(&DofMap::new([0, 1]));
        let conv = CouplingSlaveConverter(&c);
        assert!(matches!(
            matrix_row_transform(&src, 1.0, &conv, &mut dst, true),
            Err(FsiError::MatrixState { .. })
        ));
    }
}
