//! Catalog storage: the builder and read view over a [`BlockList`].
//!
//! One [`CatalogStorage`] is owned by each worker and reused for every
//! catalog it simulates. `begin_catalog` resets the logical counters but
//! keeps the blocks, so after the first few catalogs a run allocates
//! nothing.

use std::io::{Read, Write};

use oetas_core::{
    CatalogBuilder, CatalogParams, CatalogResult, CatalogView, GenerationInfo, MarshalError,
    MarshalReader, MarshalWriter, Rupture, UNBOUNDED_STOP_TIME,
};

use crate::block::BlockList;
use crate::config::StorageConfig;
use crate::error::StorageError;

/// Block-indexed struct-of-arrays catalog store.
///
/// Implements [`CatalogBuilder`] for the generator and [`CatalogView`] for
/// the generator's parent lookups and for scanning.
///
/// # Panics
///
/// Builder calls out of protocol order (a rupture outside a generation, a
/// generation outside a catalog, nested generations) panic; they indicate a
/// bug in the caller.
pub struct CatalogStorage {
    config: StorageConfig,
    blocks: BlockList,
    params: CatalogParams,
    stop_time: f64,
    result_code: CatalogResult,
    cat_size: usize,
    gen_start: Vec<usize>,
    gen_size: Vec<usize>,
    gen_valid_size: Vec<usize>,
    gen_mag_min: Vec<f64>,
    gen_mag_max: Vec<f64>,
    in_catalog: bool,
    in_generation: bool,
}

impl CatalogStorage {
    /// Create an empty storage.
    ///
    /// # Errors
    ///
    /// Returns the configuration's validation error, if any.
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let blocks = BlockList::new(config.block_shift, config.initial_block_capacity);
        Ok(Self {
            config,
            blocks,
            params: CatalogParams::default(),
            stop_time: UNBOUNDED_STOP_TIME,
            result_code: CatalogResult::Ok,
            cat_size: 0,
            gen_start: Vec::new(),
            gen_size: Vec::new(),
            gen_valid_size: Vec::new(),
            gen_mag_min: Vec::new(),
            gen_mag_max: Vec::new(),
            in_catalog: false,
            in_generation: false,
        })
    }

    /// Storage configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Whether a catalog is open for building.
    pub fn is_building(&self) -> bool {
        self.in_catalog
    }

    /// Memory held by rupture blocks, in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.blocks.memory_bytes()
    }

    #[inline]
    fn index(&self, i_gen: usize, j_rup: usize) -> usize {
        debug_assert!(j_rup < self.gen_size[i_gen]);
        self.gen_start[i_gen] + j_rup
    }

    fn recompute_valid_sizes(&mut self) {
        let truncated = self.stop_time < self.params.tend;
        for i_gen in 0..self.gen_start.len() {
            let size = self.gen_size[i_gen];
            self.gen_valid_size[i_gen] = if truncated {
                let start = self.gen_start[i_gen];
                (start..start + size)
                    .filter(|&idx| self.blocks.time(idx) < self.stop_time)
                    .count()
            } else {
                size
            };
        }
    }

    const MARSHAL_NAME: &'static str = "CatalogStorage";
    const MARSHAL_VERSION: u8 = 1;

    /// Write the finished catalog at storage precision.
    ///
    /// # Panics
    ///
    /// Panics if a catalog is still being built.
    pub fn marshal<W: Write>(&self, w: &mut MarshalWriter<W>) -> Result<(), MarshalError> {
        assert!(!self.in_catalog, "cannot marshal a catalog that is still open");
        w.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        self.params.marshal(w)?;
        w.write_f64("stop_time", self.stop_time)?;
        w.write_u8("result_code", self.result_code.code())?;

        let to_u64 = |v: &[usize]| v.iter().map(|&x| x as u64).collect::<Vec<_>>();
        w.write_u64_array("gen_size", &to_u64(&self.gen_size))?;
        w.write_u64_array("gen_valid_size", &to_u64(&self.gen_valid_size))?;
        w.write_f64_array("gen_mag_min", &self.gen_mag_min)?;
        w.write_f64_array("gen_mag_max", &self.gen_mag_max)?;

        let n = self.cat_size;
        let rups: Vec<Rupture> = (0..n).map(|idx| self.blocks.get(idx)).collect();
        let col32 = |f: fn(&Rupture) -> f64| rups.iter().map(|r| f(r) as f32).collect::<Vec<_>>();
        w.write_f64_array("t_day", &rups.iter().map(|r| r.t_day).collect::<Vec<_>>())?;
        w.write_f32_array("rup_mag", &col32(|r| r.rup_mag))?;
        w.write_f32_array("k_prod", &col32(|r| r.k_prod))?;
        w.write_f32_array("x_km", &col32(|r| r.x_km))?;
        w.write_f32_array("y_km", &col32(|r| r.y_km))?;
        w.write_i32_array(
            "rup_parent",
            &rups.iter().map(|r| r.rup_parent).collect::<Vec<_>>(),
        )?;
        w.end_object(Self::MARSHAL_NAME)
    }

    /// Read a catalog written by [`marshal`](Self::marshal) into a new
    /// storage with the given configuration.
    pub fn unmarshal<R: Read>(
        r: &mut MarshalReader<R>,
        config: StorageConfig,
    ) -> Result<Self, MarshalError> {
        let mut storage = Self::new(config).map_err(|e| MarshalError::Malformed {
            detail: e.to_string(),
        })?;
        r.begin_object(Self::MARSHAL_NAME, Self::MARSHAL_VERSION)?;
        let params = CatalogParams::unmarshal(r)?;
        let stop_time = r.read_f64("stop_time")?;
        let code = r.read_u8("result_code")?;
        let result_code = CatalogResult::try_from(code).map_err(|c| MarshalError::Malformed {
            detail: format!("unknown result code {c}"),
        })?;

        let to_usize = |v: Vec<u64>| -> Result<Vec<usize>, MarshalError> {
            v.into_iter()
                .map(|x| {
                    usize::try_from(x).map_err(|_| MarshalError::Malformed {
                        detail: format!("size {x} does not fit in usize"),
                    })
                })
                .collect()
        };
        let gen_size = to_usize(r.read_u64_array("gen_size")?)?;
        let gen_valid_size = to_usize(r.read_u64_array("gen_valid_size")?)?;
        let gen_mag_min = r.read_f64_array("gen_mag_min")?;
        let gen_mag_max = r.read_f64_array("gen_mag_max")?;
        let t_day = r.read_f64_array("t_day")?;
        let rup_mag = r.read_f32_array("rup_mag")?;
        let k_prod = r.read_f32_array("k_prod")?;
        let x_km = r.read_f32_array("x_km")?;
        let y_km = r.read_f32_array("y_km")?;
        let rup_parent = r.read_i32_array("rup_parent")?;
        r.end_object(Self::MARSHAL_NAME)?;

        let gen_count = gen_size.len();
        if [gen_valid_size.len(), gen_mag_min.len(), gen_mag_max.len()]
            .iter()
            .any(|&len| len != gen_count)
        {
            return Err(MarshalError::Malformed {
                detail: "generation arrays differ in length".to_string(),
            });
        }
        let cat_size: usize = gen_size.iter().sum();
        if [
            t_day.len(),
            rup_mag.len(),
            k_prod.len(),
            x_km.len(),
            y_km.len(),
            rup_parent.len(),
        ]
        .iter()
        .any(|&len| len != cat_size)
        {
            return Err(MarshalError::Malformed {
                detail: format!("rupture columns do not hold {cat_size} ruptures"),
            });
        }

        storage.begin_catalog(&params);
        for i_gen in 0..gen_count {
            storage.begin_generation(&GenerationInfo::new(gen_mag_min[i_gen], gen_mag_max[i_gen]));
            let start = storage.cat_size;
            for idx in start..start + gen_size[i_gen] {
                storage.add_rup(&Rupture {
                    t_day: t_day[idx],
                    rup_mag: f64::from(rup_mag[idx]),
                    k_prod: f64::from(k_prod[idx]),
                    rup_parent: rup_parent[idx],
                    x_km: f64::from(x_km[idx]),
                    y_km: f64::from(y_km[idx]),
                });
            }
            storage.end_generation();
        }
        storage.set_stop_time(stop_time);
        storage.set_result_code(result_code);
        storage.end_catalog();
        storage.gen_valid_size = gen_valid_size;
        Ok(storage)
    }
}

impl CatalogBuilder for CatalogStorage {
    fn begin_catalog(&mut self, params: &CatalogParams) {
        assert!(!self.in_catalog, "begin_catalog called inside an open catalog");
        self.params = *params;
        self.stop_time = UNBOUNDED_STOP_TIME;
        self.result_code = CatalogResult::Ok;
        self.cat_size = 0;
        self.gen_start.clear();
        self.gen_size.clear();
        self.gen_valid_size.clear();
        self.gen_mag_min.clear();
        self.gen_mag_max.clear();
        self.in_catalog = true;
        self.in_generation = false;
    }

    fn end_catalog(&mut self) {
        assert!(self.in_catalog, "end_catalog called with no open catalog");
        assert!(!self.in_generation, "end_catalog called inside a generation");
        self.in_catalog = false;
        self.recompute_valid_sizes();
    }

    fn begin_generation(&mut self, gen_info: &GenerationInfo) {
        assert!(self.in_catalog, "begin_generation called with no open catalog");
        assert!(!self.in_generation, "begin_generation called inside a generation");
        self.gen_start.push(self.cat_size);
        self.gen_size.push(0);
        self.gen_valid_size.push(0);
        self.gen_mag_min.push(gen_info.gen_mag_min);
        self.gen_mag_max.push(gen_info.gen_mag_max);
        self.in_generation = true;
    }

    fn end_generation(&mut self) {
        assert!(self.in_generation, "end_generation called outside a generation");
        let last = self.gen_size.len() - 1;
        self.gen_valid_size[last] = self.gen_size[last];
        self.in_generation = false;
    }

    fn add_rup(&mut self, rup: &Rupture) {
        assert!(self.in_generation, "add_rup called outside a generation");
        let index = self.cat_size;
        self.blocks.ensure_capacity(index + 1);
        self.blocks.put(index, rup);
        self.cat_size += 1;
        let last = self.gen_size.len() - 1;
        self.gen_size[last] += 1;
    }

    fn set_stop_time(&mut self, stop_time: f64) {
        self.stop_time = stop_time;
    }

    fn set_result_code(&mut self, result: CatalogResult) {
        self.result_code = result;
    }
}

impl CatalogView for CatalogStorage {
    fn params(&self) -> &CatalogParams {
        &self.params
    }

    fn stop_time(&self) -> f64 {
        self.stop_time
    }

    fn result_code(&self) -> CatalogResult {
        self.result_code
    }

    fn gen_count(&self) -> usize {
        self.gen_start.len()
    }

    fn gen_size(&self, i_gen: usize) -> usize {
        self.gen_size[i_gen]
    }

    fn gen_valid_size(&self, i_gen: usize) -> usize {
        self.gen_valid_size[i_gen]
    }

    fn gen_info(&self, i_gen: usize) -> GenerationInfo {
        GenerationInfo::new(self.gen_mag_min[i_gen], self.gen_mag_max[i_gen])
    }

    fn cat_size(&self) -> usize {
        self.cat_size
    }

    fn rup(&self, i_gen: usize, j_rup: usize) -> Rupture {
        self.blocks.get(self.index(i_gen, j_rup))
    }

    fn rup_time(&self, i_gen: usize, j_rup: usize) -> f64 {
        self.blocks.time(self.index(i_gen, j_rup))
    }

    fn rup_time_prod(&self, i_gen: usize, j_rup: usize) -> (f64, f64) {
        self.blocks.time_prod(self.index(i_gen, j_rup))
    }

    fn rup_time_xy(&self, i_gen: usize, j_rup: usize) -> (f64, f64, f64) {
        self.blocks.time_xy(self.index(i_gen, j_rup))
    }
}

// Compile-time assertion: storage moves into worker threads.
const _: fn() = || {
    fn assert<T: Send>() {}
    assert::<CatalogStorage>();
};
