//! Geography resolution: area to super-area to region.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::model::{AreaId, AreaRow, RegionName, RegionRow, SuperAreaRow};

/// Lookup from area id to resolved region name, built by chained inner
/// joins over the three geography tables.
///
/// An area whose super-area is absent, or a super-area whose region is
/// absent, is excluded from the lookup rather than raised as an error; the
/// exclusion count is kept so callers can report it.
#[derive(Debug, Clone)]
pub struct GeographyIndex {
    area_to_region: FxHashMap<AreaId, RegionName>,
    excluded_areas: usize,
}

impl GeographyIndex {
    /// Resolve the area → super-area → region chain.
    pub fn resolve(areas: &[AreaRow], super_areas: &[SuperAreaRow], regions: &[RegionRow]) -> Self {
        let region_names: FxHashMap<u64, RegionName> = regions
            .iter()
            .map(|r| (r.id, Arc::from(r.name.as_str())))
            .collect();
        let super_to_region: FxHashMap<u64, RegionName> = super_areas
            .iter()
            .filter_map(|s| region_names.get(&s.region_id).map(|r| (s.id, Arc::clone(r))))
            .collect();

        let mut area_to_region = FxHashMap::default();
        let mut excluded_areas = 0usize;
        for area in areas {
            match super_to_region.get(&area.super_area_id) {
                Some(region) => {
                    area_to_region.insert(area.id, Arc::clone(region));
                }
                None => excluded_areas += 1,
            }
        }
        if excluded_areas > 0 {
            log::warn!("{excluded_areas} areas excluded from geography: unresolved super-area or region");
        }
        Self {
            area_to_region,
            excluded_areas,
        }
    }

    /// Region name for an area, if the area resolved
    #[must_use]
    pub fn region_of(&self, area_id: AreaId) -> Option<&RegionName> {
        self.area_to_region.get(&area_id)
    }

    /// Number of resolved areas
    #[must_use]
    pub fn len(&self) -> usize {
        self.area_to_region.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.area_to_region.is_empty()
    }

    /// Areas excluded by the inner-join chain
    #[must_use]
    pub fn excluded_areas(&self) -> usize {
        self.excluded_areas
    }
}
