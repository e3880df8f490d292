use nalgebra::DVector;

use crate::error::FsiError;

/// Ordered set of global DOF ids. The local id of a DOF is its position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DofMap {
    gids: Vec<usize>,
}

impl DofMap {
    pub fn new(gids: impl IntoIterator<Item = usize>) -> Self {
        let mut gids: Vec<usize> = gids.into_iter().collect();
        gids.sort_unstable();
        gids.dedup();
        Self { gids }
    }

    pub fn from_range(range: std::ops::Range<usize>) -> Self {
        Self {
            gids: range.collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.gids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gids.is_empty()
    }

    pub fn gids(&self) -> &[usize] {
        &self.gids
    }

    pub fn gid(&self, lid: usize) -> usize {
        self.gids[lid]
    }

    pub fn lid(&self, gid: usize) -> Option<usize> {
        self.gids.binary_search(&gid).ok()
    }

    pub fn contains(&self, gid: usize) -> bool {
        self.lid(gid).is_some()
    }

    /// Local id of `gid`, or a [`FsiError::DofNotInMap`] naming `map`.
    pub fn try_lid(&self, gid: usize, map: &'static str) -> Result<usize, FsiError> {
        self.lid(gid).ok_or(FsiError::DofNotInMap { gid, map })
    }

    pub fn merge_maps(maps: &[&DofMap]) -> DofMap {
        DofMap::new(maps.iter().flat_map(|m| m.gids.iter().copied()))
    }

    pub fn intersect_maps(a: &DofMap, b: &DofMap) -> DofMap {
        DofMap {
            gids: a.gids.iter().copied().filter(|g| b.contains(*g)).collect(),
        }
    }

    /// Gids of `self` that are not in `other`.
    pub fn split(&self, other: &DofMap) -> DofMap {
        DofMap {
            gids: self
                .gids
                .iter()
                .copied()
                .filter(|g| !other.contains(*g))
                .collect(),
        }
    }

    pub fn is_subset_of(&self, other: &DofMap) -> bool {
        self.gids.iter().all(|g| other.contains(*g))
    }

    pub(crate) fn check_vector(
        &self,
        v: &DVector<f64>,
        context: &'static str,
    ) -> Result<(), FsiError> {
        if v.len() != self.len() {
            return Err(FsiError::MapMismatch {
                context,
                expected: self.len(),
                actual: v.len(),
            });
        }
        Ok(())
    }
}

/// Copy the entries of `src` (laid out over `src_map`) into a new vector over
/// `dst_map`. Gids missing from `src_map` stay zero.
pub fn export_vector(
    src_map: &DofMap,
    src: &DVector<f64>,
    dst_map: &DofMap,
) -> Result<DVector<f64>, FsiError> {
    src_map.check_vector(src, "export source")?;
    Ok(DVector::from_iterator(
        dst_map.len(),
        dst_map
            .gids()
            .iter()
            .map(|&g| src_map.lid(g).map_or(0.0, |lid| src[lid])),
    ))
}

/// Splits a field's DOFs into the FSI interface ("cond") and the inner ("other") part.
#[derive(Clone, Debug)]
pub struct MapExtractor {
    full: DofMap,
    cond: DofMap,
    other: DofMap,
    cond_lids: Vec<usize>,
    other_lids: Vec<usize>,
}

impl MapExtractor {
    pub fn new(full: DofMap, cond: DofMap) -> Result<Self, FsiError> {
        if let Some(&gid) = cond.gids().iter().find(|g| !full.contains(**g)) {
            return Err(FsiError::DofNotInMap {
                gid,
                map: "field full",
            });
        }
        let other = full.split(&cond);
        let cond_lids = cond.gids().iter().filter_map(|&g| full.lid(g)).collect();
        let other_lids = other.gids().iter().filter_map(|&g| full.lid(g)).collect();
        Ok(Self {
            full,
            cond,
            other,
            cond_lids,
            other_lids,
        })
    }

    pub fn full_map(&self) -> &DofMap {
        &self.full
    }

    pub fn cond_map(&self) -> &DofMap {
        &self.cond
    }

    pub fn other_map(&self) -> &DofMap {
        &self.other
    }

    pub fn extract_cond_vector(&self, full: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        self.full.check_vector(full, "extract interface vector")?;
        Ok(gather(full, &self.cond_lids))
    }

    pub fn extract_other_vector(&self, full: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        self.full.check_vector(full, "extract inner vector")?;
        Ok(gather(full, &self.other_lids))
    }

    pub fn insert_cond_vector(&self, cond: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        let mut full = DVector::zeros(self.full.len());
        self.add_cond_vector(cond, &mut full, 1.0)?;
        Ok(full)
    }

    pub fn insert_other_vector(&self, other: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        let mut full = DVector::zeros(self.full.len());
        self.add_other_vector(other, &mut full, 1.0)?;
        Ok(full)
    }

    /// full += scale * insert_cond(cond)
    pub fn add_cond_vector(
        &self,
        cond: &DVector<f64>,
        full: &mut DVector<f64>,
        scale: f64,
    ) -> Result<(), FsiError> {
        self.cond.check_vector(cond, "add interface vector")?;
        self.full.check_vector(full, "add interface vector")?;
        scatter_add(cond, &self.cond_lids, full, scale);
        Ok(())
    }

    pub fn add_other_vector(
        &self,
        other: &DVector<f64>,
        full: &mut DVector<f64>,
        scale: f64,
    ) -> Result<(), FsiError> {
        self.other.check_vector(other, "add inner vector")?;
        self.full.check_vector(full, "add inner vector")?;
        scatter_add(other, &self.other_lids, full, scale);
        Ok(())
    }
}

/// Extractor for a full map made of disjoint block maps.
#[derive(Clone, Debug)]
pub struct MultiMapExtractor {
    full: DofMap,
    maps: Vec<DofMap>,
    lids: Vec<Vec<usize>>,
}

impl MultiMapExtractor {
    pub fn new(maps: Vec<DofMap>) -> Result<Self, FsiError> {
        let refs: Vec<&DofMap> = maps.iter().collect();
        let full = DofMap::merge_maps(&refs);
        let total: usize = maps.iter().map(DofMap::len).sum();
        if total != full.len() {
            return Err(FsiError::MapMismatch {
                context: "block maps overlap",
                expected: full.len(),
                actual: total,
            });
        }
        let lids = maps
            .iter()
            .map(|m| m.gids().iter().filter_map(|&g| full.lid(g)).collect())
            .collect();
        Ok(Self { full, maps, lids })
    }

    pub fn num_maps(&self) -> usize {
        self.maps.len()
    }

    pub fn map(&self, block: usize) -> &DofMap {
        &self.maps[block]
    }

    pub fn full_map(&self) -> &DofMap {
        &self.full
    }

    pub fn extract_vector(
        &self,
        full: &DVector<f64>,
        block: usize,
    ) -> Result<DVector<f64>, FsiError> {
        self.full.check_vector(full, "extract block vector")?;
        Ok(gather(full, &self.lids[block]))
    }

    pub fn insert_vector(
        &self,
        part: &DVector<f64>,
        block: usize,
    ) -> Result<DVector<f64>, FsiError> {
        let mut full = DVector::zeros(self.full.len());
        self.add_vector(part, block, &mut full, 1.0)?;
        Ok(full)
    }

    pub fn add_vector(
        &self,
        part: &DVector<f64>,
        block: usize,
        full: &mut DVector<f64>,
        scale: f64,
    ) -> Result<(), FsiError> {
        self.maps[block].check_vector(part, "add block vector")?;
        self.full.check_vector(full, "add block vector")?;
        scatter_add(part, &self.lids[block], full, scale);
        Ok(())
    }

    /// Multiply the block `block` of `full` entrywise by `factors`.
    pub fn scale_block(
        &self,
        full: &mut DVector<f64>,
        block: usize,
        factors: &DVector<f64>,
    ) -> Result<(), FsiError> {
        self.maps[block].check_vector(factors, "scale block vector")?;
        self.full.check_vector(full, "scale block vector")?;
        for (f, &lid) in factors.iter().zip(&self.lids[block]) {
            full[lid] *= f;
        }
        Ok(())
    }
}

fn gather(full: &DVector<f64>, lids: &[usize]) -> DVector<f64> {
    DVector::from_iterator(lids.len(), lids.iter().map(|&l| full[l]))
}

fn scatter_add(part: &DVector<f64>, lids: &[usize], full: &mut DVector<f64>, scale: f64) {
    for (v, &l) in part.iter().zip(lids) {
        full[l] += scale * v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_set_operations() {
        let a = DofMap::new([5, 1, 3, 3]);
        let b = DofMap::new([3, 4, 5]);
        assert_eq!(a.gids(), &[1, 3, 5]);
        assert_eq!(DofMap::intersect_maps(&a, &b).gids(), &[3, 5]);
        assert_eq!(DofMap::merge_maps(&[&a, &b]).gids(), &[1, 3, 4, 5]);
        assert_eq!(a.split(&b).gids(), &[1]);
        assert_eq!(a.lid(5), Some(2));
        assert!(a.try_lid(4, "a").is_err());
    }

    #[test]
    fn extractor_insert_and_extract_are_consistent() {
        let ex = MapExtractor::new(DofMap::from_range(10..16), DofMap::new([11, 14])).unwrap();
        let full = DVector::from_vec(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let cond = ex.extract_cond_vector(&full).unwrap();
        let other = ex.extract_other_vector(&full).unwrap();
        assert_eq!(cond.as_slice(), &[1.0, 4.0]);
        assert_eq!(other.len(), 4);

        let mut rebuilt = ex.insert_cond_vector(&cond).unwrap();
        ex.add_other_vector(&other, &mut rebuilt, 1.0).unwrap();
        assert_eq!(rebuilt, full);
    }

    #[test]
    fn extractor_rejects_foreign_interface() {
        assert!(MapExtractor::new(DofMap::from_range(0..3), DofMap::new([7])).is_err());
    }

    #[test]
    fn overlapping_block_maps_are_rejected() {
        let maps = vec![DofMap::from_range(0..3), DofMap::from_range(2..5)];
        assert!(MultiMapExtractor::new(maps).is_err());
    }

    #[test]
    fn export_copies_common_gids() {
        let src_map = DofMap::new([1, 2, 3]);
        let dst_map = DofMap::new([2, 3, 9]);
        let v = DVector::from_vec(vec![10.0, 20.0, 30.0]);
        let out = export_vector(&src_map, &v, &dst_map).unwrap();
        assert_eq!(out.as_slice(), &[20.0, 30.0, 0.0]);
    }
}
