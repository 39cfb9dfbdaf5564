//! Indicator computation engine
//!
//! Every operation follows the same sequence: resolve raster names against
//! the store root, read each band and mask its no-data cells, reduce or
//! evaluate the indicator formula, and write the output raster (if the
//! indicator produces one) with the primary input's georeferencing.
//!
//! Rasters are read afresh on every call; nothing is cached between calls.

use crate::catalog::{IndicatorId, RasterRole, Status};
use crate::config::EngineConfig;
use crate::expr::{evaluate, Expr};
use crate::result::{ComputationResult, RasterInfo, Summary, UniformityTier};
use crate::statistics::{nan_mean, nan_percentile, nan_std, BandStatistics};
use crate::store::RasterStoreLocation;
use aquapi_core::io::{GeoTiff, RasterSink, RasterSource};
use aquapi_core::raster::{NodataPolicy, Raster};
use aquapi_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// NPP (gC/m^2) to biomass (kg/ha)
pub const NPP_TO_BIOMASS: f64 = 22.222;
/// Percentile of AETI used as potential evapotranspiration by adequacy
pub const ADEQUACY_PERCENTILE: f64 = 99.0;
/// Percentile of AETI used as maximum evapotranspiration by the deficit
pub const DEFICIT_PERCENTILE: f64 = 95.0;

/// Caller-supplied coefficients of the yield formula
/// `Y = HI * AOT * fc * TBP / (1 - MC)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YieldFactors {
    /// Moisture content
    pub mc: f64,
    /// Light use efficiency correction factor
    pub fc: f64,
    /// Above ground over total biomass ratio
    pub aot: f64,
    /// Harvest index
    pub hi: f64,
}

impl YieldFactors {
    fn validate(&self) -> Result<()> {
        finite("MC", self.mc)?;
        finite("fc", self.fc)?;
        finite("AOT", self.aot)?;
        finite("HI", self.hi)?;
        if self.mc == 1.0 {
            return Err(Error::InvalidFactor {
                name: "MC",
                value: self.mc,
                reason: "moisture content of 1 makes 1 - MC zero".into(),
            });
        }
        Ok(())
    }
}

fn finite(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::InvalidFactor {
            name,
            value,
            reason: "must be a finite number".into(),
        })
    }
}

fn nonzero(name: &'static str, value: f64) -> Result<f64> {
    finite(name, value)?;
    if value == 0.0 {
        return Err(Error::InvalidFactor {
            name,
            value,
            reason: "must not be zero".into(),
        });
    }
    Ok(value)
}

fn mean_std(raster: &Raster) -> Summary {
    Summary::MeanStd {
        mean: nan_mean(raster.values()),
        std_dev: nan_std(raster.data().iter().copied()),
    }
}

/// A catalog-driven invocation: raster names by role, factors by code.
///
/// Raster and output names are relative to the engine's store root.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRequest {
    pub indicator: IndicatorId,
    pub rasters: BTreeMap<RasterRole, PathBuf>,
    pub factors: BTreeMap<String, f64>,
    pub output: Option<PathBuf>,
}

impl IndicatorRequest {
    pub fn new(indicator: IndicatorId) -> Self {
        Self {
            indicator,
            rasters: BTreeMap::new(),
            factors: BTreeMap::new(),
            output: None,
        }
    }

    pub fn raster(mut self, role: RasterRole, name: impl Into<PathBuf>) -> Self {
        self.rasters.insert(role, name.into());
        self
    }

    pub fn factor(mut self, code: impl Into<String>, value: f64) -> Self {
        self.factors.insert(code.into(), value);
        self
    }

    pub fn output(mut self, name: impl Into<PathBuf>) -> Self {
        self.output = Some(name.into());
        self
    }

    /// Check the request against the indicator's catalog definition.
    pub fn validate(&self) -> Result<()> {
        let def = self.indicator.definition();
        if def.status == Status::Reserved {
            return Err(Error::NotImplemented(def.name.to_string()));
        }

        if let Some(role) = self.rasters.keys().find(|r| !def.requires(**r)) {
            return Err(Error::InvalidRequest(format!(
                "{} does not take a {} raster",
                def.name, role
            )));
        }
        if let Some(role) = def.roles().find(|r| !self.rasters.contains_key(r)) {
            return Err(Error::InvalidRequest(format!(
                "{} requires a {} raster",
                def.name, role
            )));
        }

        if let Some(code) = self
            .factors
            .keys()
            .find(|c| !def.caller_factors().any(|f| f.code == c.as_str()))
        {
            return Err(Error::InvalidRequest(format!(
                "{} does not take a factor named {}",
                def.name, code
            )));
        }
        if let Some(f) = def.caller_factors().find(|f| !self.factors.contains_key(f.code)) {
            return Err(Error::InvalidRequest(format!(
                "{} requires factor {} ({})",
                def.name, f.code, f.description
            )));
        }

        match (def.output.writes_raster(), &self.output) {
            (true, None) => Err(Error::InvalidRequest(format!(
                "{} writes a raster; an output name is required",
                def.name
            ))),
            (false, Some(_)) => Err(Error::InvalidRequest(format!(
                "{} produces no raster; remove the output name",
                def.name
            ))),
            _ => Ok(()),
        }
    }

    fn raster_name(&self, role: RasterRole) -> Result<&Path> {
        self.rasters
            .get(&role)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::InvalidRequest(format!("missing {} raster", role)))
    }

    fn factor_value(&self, code: &str) -> Result<f64> {
        self.factors
            .get(code)
            .copied()
            .ok_or_else(|| Error::InvalidRequest(format!("missing factor {}", code)))
    }

    fn output_name(&self) -> Result<&Path> {
        self.output
            .as_deref()
            .ok_or_else(|| Error::InvalidRequest("missing output name".into()))
    }
}

/// Computes indicators from rasters under a store root.
///
/// Storage goes through `S` and `K`; both default to local GeoTIFF files.
#[derive(Debug)]
pub struct IndicatorEngine<S = GeoTiff, K = GeoTiff> {
    store: RasterStoreLocation,
    nodata: NodataPolicy,
    source: S,
    sink: K,
}

impl IndicatorEngine {
    /// Engine reading and writing GeoTIFF files.
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_io(config, GeoTiff, GeoTiff)
    }
}

impl<S: RasterSource, K: RasterSink> IndicatorEngine<S, K> {
    pub fn with_io(config: &EngineConfig, source: S, sink: K) -> Self {
        Self {
            store: RasterStoreLocation::from_config(config),
            nodata: config.nodata,
            source,
            sink,
        }
    }

    /// Current store root all raster names are resolved against.
    pub fn raster_store_root(&self) -> PathBuf {
        self.store.root()
    }

    /// Point later calls at another raster directory under the plugin directory.
    pub fn set_raster_store_root(&mut self, subpath: impl Into<PathBuf>) {
        self.store.set_directory(subpath);
        debug!("Raster store root: {}", self.store.root().display());
    }

    pub fn nodata_policy(&self) -> NodataPolicy {
        self.nodata
    }

    /// Read a band and replace its no-data cells with NaN.
    pub fn load_band(&self, name: impl AsRef<Path>) -> Result<Raster> {
        let path = self.store.resolve(name);
        debug!("Reading {}", path.display());
        let mut raster = self.source.open(&path)?;
        let masked = self.nodata.apply(&mut raster);
        debug!(
            "Loaded {} x {} from {}, {} cells masked ({})",
            raster.cols(),
            raster.rows(),
            path.display(),
            masked,
            self.nodata
        );
        Ok(raster)
    }

    /// Dimensions, extent and statistics of a masked band.
    pub fn describe_raster(&self, name: impl AsRef<Path>) -> Result<RasterInfo> {
        let path = self.store.resolve(name.as_ref());
        let raster = self.load_band(name)?;
        Ok(RasterInfo {
            path,
            rows: raster.rows(),
            cols: raster.cols(),
            cell_size: raster.cell_size(),
            extent: raster.extent(),
            statistics: BandStatistics::of(&raster),
        })
    }

    /// Evaluate `expr`, then write it under the store root.
    fn compute_raster(
        &self,
        expr: &Expr,
        bindings: &[(&str, &Raster)],
        output: &Path,
    ) -> Result<(Raster, PathBuf)> {
        debug!("Evaluating {}", expr);
        let raster = evaluate(expr, bindings)?;

        let non_finite = raster.values().filter(|v| v.is_infinite()).count();
        if non_finite > 0 {
            warn!("{} cells are infinite (zero denominator)", non_finite);
        }

        let path = self.store.resolve(output);
        self.sink.write(&raster, &path)?;
        info!("Output: {}", path.display());
        Ok((raster, path))
    }

    /// Uniformity of water consumption: CV = std(AETI) / mean(AETI) * 100.
    pub fn equity(&self, aeti: impl AsRef<Path>) -> Result<ComputationResult> {
        let aeti = self.load_band(aeti)?;
        let mean = nan_mean(aeti.values());
        let std_dev = nan_std(aeti.data().iter().copied());
        if mean.is_nan() {
            warn!("AETI has no valid cells");
        }
        let cv = std_dev / mean * 100.0;
        let summary = Summary::Uniformity {
            mean,
            std_dev,
            cv,
            tier: UniformityTier::classify(cv),
        };
        info!("{}", summary);
        Ok(ComputationResult::new(IndicatorId::Equity).with_summary(summary))
    }

    /// BF = T / AETI
    pub fn beneficial_fraction(
        &self,
        t: impl AsRef<Path>,
        aeti: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<ComputationResult> {
        let t = self.load_band(t)?;
        let aeti = self.load_band(aeti)?;
        let expr = Expr::band("T") / Expr::band("AETI");
        let (_, path) = self.compute_raster(&expr, &[("AETI", &aeti), ("T", &t)], output.as_ref())?;
        Ok(ComputationResult::new(IndicatorId::BeneficialFraction).with_output(path))
    }

    /// AD = AETI / P99(AETI)
    pub fn adequacy(&self, aeti: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<ComputationResult> {
        let aeti = self.load_band(aeti)?;
        let etp = nan_percentile(aeti.values(), ADEQUACY_PERCENTILE)?;
        if etp.is_nan() {
            warn!("AETI has no valid cells; ETp is undefined");
        }
        let expr = Expr::band("AETI") / etp;
        let (_, path) = self.compute_raster(&expr, &[("AETI", &aeti)], output.as_ref())?;
        Ok(ComputationResult::new(IndicatorId::Adequacy)
            .with_summary(Summary::Reference {
                percentile: ADEQUACY_PERCENTILE,
                value: etp,
            })
            .with_output(path))
    }

    /// RWD = 1 - mean(AETI) / P95(AETI), with the per-pixel raster
    /// `1 - AETI / P95(AETI)`.
    pub fn relative_water_deficit(
        &self,
        aeti: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<ComputationResult> {
        let aeti = self.load_band(aeti)?;
        let etx = nan_percentile(aeti.values(), DEFICIT_PERCENTILE)?;
        let value = 1.0 - nan_mean(aeti.values()) / etx;
        let summary = Summary::Deficit { value, threshold: etx };
        info!("{}", summary);

        let expr = 1.0 - Expr::band("AETI") / etx;
        let (_, path) = self.compute_raster(&expr, &[("AETI", &aeti)], output.as_ref())?;
        Ok(ComputationResult::new(IndicatorId::RelativeWaterDeficit)
            .with_summary(summary)
            .with_output(path))
    }

    /// TBP = NPP * 22.222 / 1000 (ton/ha)
    pub fn total_biomass_production(
        &self,
        npp: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<ComputationResult> {
        let npp = self.load_band(npp)?;
        let expr = Expr::band("NPP") * NPP_TO_BIOMASS / 1000.0;
        self.with_mean_std(IndicatorId::TotalBiomassProduction, &expr, &[("NPP", &npp)], output)
    }

    /// WPb = TBP / AETI * 100 (kg/m^3)
    pub fn biomass_water_productivity(
        &self,
        aeti: impl AsRef<Path>,
        tbp: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<ComputationResult> {
        let aeti = self.load_band(aeti)?;
        let tbp = self.load_band(tbp)?;
        let expr = Expr::band("TBP") / Expr::band("AETI") * 100.0;
        self.with_mean_std(
            IndicatorId::BiomassWaterProductivity,
            &expr,
            &[("AETI", &aeti), ("TBP", &tbp)],
            output,
        )
    }

    /// Y = HI * AOT * fc * TBP / (1 - MC). Factors are checked before any
    /// raster is read.
    pub fn yield_indicator(
        &self,
        tbp: impl AsRef<Path>,
        factors: YieldFactors,
        output: impl AsRef<Path>,
    ) -> Result<ComputationResult> {
        factors.validate()?;
        let tbp = self.load_band(tbp)?;
        let YieldFactors { mc, fc, aot, hi } = factors;
        let expr = Expr::constant(hi) * aot * fc * (Expr::band("TBP") / (1.0 - mc));
        self.with_mean_std(IndicatorId::Yield, &expr, &[("TBP", &tbp)], output)
    }

    /// cWP = Y / AETI * 100 (kg/m^3)
    pub fn crop_water_productivity(
        &self,
        y: impl AsRef<Path>,
        aeti: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<ComputationResult> {
        let y = self.load_band(y)?;
        let aeti = self.load_band(aeti)?;
        let expr = Expr::band("Y") / Expr::band("AETI") * 100.0;
        self.with_mean_std(
            IndicatorId::CropWaterProductivity,
            &expr,
            &[("AETI", &aeti), ("Y", &y)],
            output,
        )
    }

    /// OCR = 1 - (AETI - PCP) / V_ws
    pub fn overall_consumed_ratio(
        &self,
        aeti: impl AsRef<Path>,
        pcp: impl AsRef<Path>,
        v_ws: f64,
        output: impl AsRef<Path>,
    ) -> Result<ComputationResult> {
        let v_ws = nonzero("V_ws", v_ws)?;
        self.consumption_ratio(IndicatorId::OverallConsumedRatio, aeti, pcp, v_ws, output)
    }

    /// FAR = 1 - (AETI - PCP) / V_wd
    pub fn field_application_ratio(
        &self,
        aeti: impl AsRef<Path>,
        pcp: impl AsRef<Path>,
        v_wd: f64,
        output: impl AsRef<Path>,
    ) -> Result<ComputationResult> {
        let v_wd = nonzero("V_wd", v_wd)?;
        self.consumption_ratio(IndicatorId::FieldApplicationRatio, aeti, pcp, v_wd, output)
    }

    fn consumption_ratio(
        &self,
        id: IndicatorId,
        aeti: impl AsRef<Path>,
        pcp: impl AsRef<Path>,
        volume: f64,
        output: impl AsRef<Path>,
    ) -> Result<ComputationResult> {
        let aeti = self.load_band(aeti)?;
        let pcp = self.load_band(pcp)?;
        let expr = 1.0 - (Expr::band("AETI") - Expr::band("PCP")) / volume;
        let (_, path) =
            self.compute_raster(&expr, &[("AETI", &aeti), ("PCP", &pcp)], output.as_ref())?;
        Ok(ComputationResult::new(id).with_output(path))
    }

    /// DF = 1 - AETI / (PCP + V_c). Cells where the denominator is zero come
    /// out infinite or NaN.
    pub fn depleted_fraction(
        &self,
        aeti: impl AsRef<Path>,
        pcp: impl AsRef<Path>,
        v_c: f64,
        output: impl AsRef<Path>,
    ) -> Result<ComputationResult> {
        let v_c = finite("V_c", v_c)?;
        let aeti = self.load_band(aeti)?;
        let pcp = self.load_band(pcp)?;
        let expr = 1.0 - Expr::band("AETI") / (Expr::band("PCP") + v_c);
        let (_, path) =
            self.compute_raster(&expr, &[("AETI", &aeti), ("PCP", &pcp)], output.as_ref())?;
        Ok(ComputationResult::new(IndicatorId::DepletedFraction).with_output(path))
    }

    /// Reserved indicator.
    pub fn crop_yield(&self) -> Result<ComputationResult> {
        Err(Error::NotImplemented(
            IndicatorId::CropYield.definition().name.to_string(),
        ))
    }

    fn with_mean_std(
        &self,
        id: IndicatorId,
        expr: &Expr,
        bindings: &[(&str, &Raster)],
        output: impl AsRef<Path>,
    ) -> Result<ComputationResult> {
        let (raster, path) = self.compute_raster(expr, bindings, output.as_ref())?;
        let summary = mean_std(&raster);
        info!("{}: {}", id.definition().name, summary);
        Ok(ComputationResult::new(id).with_summary(summary).with_output(path))
    }

    /// Run the indicator a request names, binding its rasters and factors
    /// through the catalog definition.
    pub fn run(&self, request: &IndicatorRequest) -> Result<ComputationResult> {
        request.validate()?;
        let raster = |role| request.raster_name(role);
        let factor = |code| request.factor_value(code);

        match request.indicator {
            IndicatorId::Equity => self.equity(raster(RasterRole::Aeti)?),
            IndicatorId::BeneficialFraction => self.beneficial_fraction(
                raster(RasterRole::T)?,
                raster(RasterRole::Aeti)?,
                request.output_name()?,
            ),
            IndicatorId::Adequacy => {
                self.adequacy(raster(RasterRole::Aeti)?, request.output_name()?)
            }
            IndicatorId::RelativeWaterDeficit => {
                self.relative_water_deficit(raster(RasterRole::Aeti)?, request.output_name()?)
            }
            IndicatorId::TotalBiomassProduction => {
                self.total_biomass_production(raster(RasterRole::Npp)?, request.output_name()?)
            }
            IndicatorId::BiomassWaterProductivity => self.biomass_water_productivity(
                raster(RasterRole::Aeti)?,
                raster(RasterRole::Tbp)?,
                request.output_name()?,
            ),
            IndicatorId::Yield => self.yield_indicator(
                raster(RasterRole::Tbp)?,
                YieldFactors {
                    mc: factor("MC")?,
                    fc: factor("fc")?,
                    aot: factor("AOT")?,
                    hi: factor("HI")?,
                },
                request.output_name()?,
            ),
            IndicatorId::CropWaterProductivity => self.crop_water_productivity(
                raster(RasterRole::Y)?,
                raster(RasterRole::Aeti)?,
                request.output_name()?,
            ),
            IndicatorId::OverallConsumedRatio => self.overall_consumed_ratio(
                raster(RasterRole::Aeti)?,
                raster(RasterRole::Pcp)?,
                factor("V_ws")?,
                request.output_name()?,
            ),
            IndicatorId::FieldApplicationRatio => self.field_application_ratio(
                raster(RasterRole::Aeti)?,
                raster(RasterRole::Pcp)?,
                factor("V_wd")?,
                request.output_name()?,
            ),
            IndicatorId::DepletedFraction => self.depleted_fraction(
                raster(RasterRole::Aeti)?,
                raster(RasterRole::Pcp)?,
                factor("V_c")?,
                request.output_name()?,
            ),
            IndicatorId::CropYield => self.crop_yield(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aquapi_core::{ErrorKind, GeoTransform};
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// Rasters kept in memory, shared between the engine's source and sink.
    #[derive(Debug, Clone, Default)]
    struct MemoryStore(Rc<RefCell<HashMap<PathBuf, Raster>>>);

    impl MemoryStore {
        fn put(&self, path: &str, raster: Raster) {
            self.0.borrow_mut().insert(PathBuf::from(path), raster);
        }

        fn get(&self, path: &str) -> Option<Raster> {
            self.0.borrow().get(Path::new(path)).cloned()
        }
    }

    impl RasterSource for MemoryStore {
        fn open(&self, path: &Path) -> Result<Raster> {
            self.0
                .borrow()
                .get(path)
                .cloned()
                .ok_or_else(|| Error::RasterNotFound { path: path.to_path_buf() })
        }
    }

    impl RasterSink for MemoryStore {
        fn write(&self, raster: &Raster, path: &Path) -> Result<()> {
            self.0.borrow_mut().insert(path.to_path_buf(), raster.clone());
            Ok(())
        }
    }

    fn engine() -> (IndicatorEngine<MemoryStore, MemoryStore>, MemoryStore) {
        let store = MemoryStore::default();
        let config = EngineConfig::default().with_rasters_path("mem");
        (IndicatorEngine::with_io(&config, store.clone(), store.clone()), store)
    }

    fn band(rows: usize, cols: usize, data: Vec<f64>) -> Raster {
        let mut r = Raster::from_vec(data, rows, cols).unwrap();
        r.set_transform(GeoTransform::new(30.0, 10.0, 0.01, -0.01));
        r
    }

    #[test]
    fn test_equity_poor_uniformity_with_nodata() {
        let (engine, store) = engine();
        store.put("./mem/aeti.tif", band(2, 2, vec![10.0, 20.0, -9999.0, 30.0]));

        let result = engine.equity("aeti.tif").unwrap();
        match result.summary.unwrap() {
            Summary::Uniformity { mean, std_dev, cv, tier } => {
                assert_relative_eq!(mean, 20.0);
                assert_relative_eq!(std_dev, 8.165, epsilon = 1e-3);
                assert_relative_eq!(cv, 40.82, epsilon = 1e-2);
                assert_eq!(tier, UniformityTier::Poor);
            }
            other => panic!("unexpected summary {other:?}"),
        }
        assert!(result.output.is_none());
    }

    #[test]
    fn test_equity_constant_band_is_good() {
        let (engine, store) = engine();
        store.put("./mem/aeti.tif", band(3, 3, vec![412.0; 9]));
        let summary = engine.equity("aeti.tif").unwrap().summary.unwrap();
        assert_eq!(summary.to_string(), "Uniformity in this region is = 0.0, Good Uniformity");
    }

    #[test]
    fn test_beneficial_fraction_uses_aeti_geometry() {
        let (engine, store) = engine();
        let aeti = band(2, 2, vec![4.0, 0.0, -1.0, 8.0]);
        store.put("./mem/aeti.tif", aeti.clone());
        store.put("./mem/t.tif", band(2, 2, vec![2.0, 1.0, 1.0, 2.0]));

        let result = engine.beneficial_fraction("t.tif", "aeti.tif", "bf.tif").unwrap();
        assert_eq!(result.output, Some(PathBuf::from("./mem/bf.tif")));

        let out = store.get("./mem/bf.tif").unwrap();
        assert!(out.same_geometry(&aeti));
        assert_eq!(out.get(0, 0).unwrap(), 0.5);
        assert_eq!(out.get(0, 1).unwrap(), f64::INFINITY);
        assert!(out.get(1, 0).unwrap().is_nan());
        assert_eq!(out.get(1, 1).unwrap(), 0.25);
    }

    #[test]
    fn test_relative_water_deficit_scalar_and_raster() {
        let (engine, store) = engine();
        store.put("./mem/aeti.tif", band(1, 5, vec![1.0, 2.0, 3.0, 4.0, 5.0]));

        let result = engine.relative_water_deficit("aeti.tif", "rwd.tif").unwrap();
        let p95 = 4.8;
        match result.summary.unwrap() {
            Summary::Deficit { value, threshold } => {
                assert_relative_eq!(threshold, p95, epsilon = 1e-12);
                assert_relative_eq!(value, 1.0 - 3.0 / p95, epsilon = 1e-12);
            }
            other => panic!("unexpected summary {other:?}"),
        }
        let out = store.get("./mem/rwd.tif").unwrap();
        assert_relative_eq!(out.get(0, 0).unwrap(), 1.0 - 1.0 / p95, epsilon = 1e-12);
    }

    #[test]
    fn test_yield_rejects_unit_moisture_before_reading() {
        let (engine, _) = engine();
        let factors = YieldFactors { mc: 1.0, fc: 1.0, aot: 0.8, hi: 0.45 };
        // the TBP raster does not exist; the factor error must come first
        let err = engine.yield_indicator("missing.tif", factors, "y.tif").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFactor);
    }

    #[test]
    fn test_yield_formula() {
        let (engine, store) = engine();
        store.put("./mem/tbp.tif", band(1, 2, vec![10.0, 20.0]));
        let factors = YieldFactors { mc: 0.7, fc: 1.0, aot: 0.8, hi: 0.45 };
        engine.yield_indicator("tbp.tif", factors, "y.tif").unwrap();
        let out = store.get("./mem/y.tif").unwrap();
        assert_relative_eq!(out.get(0, 0).unwrap(), 0.45 * 0.8 * 10.0 / 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_consumption_ratios_reject_zero_volume() {
        let (engine, _) = engine();
        let err = engine.overall_consumed_ratio("a", "p", 0.0, "o").unwrap_err();
        assert!(matches!(err, Error::InvalidFactor { name: "V_ws", .. }));
        let err = engine.field_application_ratio("a", "p", f64::NAN, "o").unwrap_err();
        assert!(matches!(err, Error::InvalidFactor { name: "V_wd", .. }));
    }

    #[test]
    fn test_depleted_fraction_tolerates_zero_denominator() {
        let (engine, store) = engine();
        store.put("./mem/aeti.tif", band(1, 2, vec![3.0, 0.0]));
        store.put("./mem/pcp.tif", band(1, 2, vec![0.0, 0.0]));
        engine.depleted_fraction("aeti.tif", "pcp.tif", 0.0, "df.tif").unwrap();
        let out = store.get("./mem/df.tif").unwrap();
        assert_eq!(out.get(0, 0).unwrap(), f64::NEG_INFINITY);
        assert!(out.get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn test_shape_mismatch_writes_nothing() {
        let (engine, store) = engine();
        store.put("./mem/aeti.tif", Raster::filled(4, 4, 2.0));
        store.put("./mem/pcp.tif", Raster::filled(2, 2, 1.0));
        let err = engine.overall_consumed_ratio("aeti.tif", "pcp.tif", 10.0, "ocr.tif").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        assert!(store.get("./mem/ocr.tif").is_none());
    }

    #[test]
    fn test_store_root_change_applies_to_next_call() {
        let (mut engine, store) = engine();
        store.put("./season2/aeti.tif", band(1, 1, vec![5.0]));
        assert_eq!(engine.equity("aeti.tif").unwrap_err().kind(), ErrorKind::RasterNotFound);

        engine.set_raster_store_root("season2");
        assert!(engine.equity("aeti.tif").is_ok());
    }

    #[test]
    fn test_sentinel_policy_keeps_other_negatives() {
        let store = MemoryStore::default();
        let config = EngineConfig::default()
            .with_rasters_path("mem")
            .with_nodata(NodataPolicy::Sentinel { value: -9999.0 });
        let engine = IndicatorEngine::with_io(&config, store.clone(), store.clone());
        store.put("./mem/x.tif", band(1, 3, vec![-9999.0, -2.0, 4.0]));

        let info = engine.describe_raster("x.tif").unwrap();
        assert_eq!(info.statistics.valid_count, 2);
        assert_eq!(info.statistics.min, -2.0);
    }

    #[test]
    fn test_crop_yield_not_implemented() {
        let (engine, _) = engine();
        assert_eq!(engine.crop_yield().unwrap_err().kind(), ErrorKind::NotImplemented);
        let req = IndicatorRequest::new(IndicatorId::CropYield);
        assert_eq!(engine.run(&req).unwrap_err().kind(), ErrorKind::NotImplemented);
    }

    #[test]
    fn test_request_validation() {
        let ok = IndicatorRequest::new(IndicatorId::BeneficialFraction)
            .raster(RasterRole::T, "t.tif")
            .raster(RasterRole::Aeti, "aeti.tif")
            .output("bf.tif");
        ok.validate().unwrap();

        let extra_role = ok.clone().raster(RasterRole::Pcp, "pcp.tif");
        assert_eq!(extra_role.validate().unwrap_err().kind(), ErrorKind::InvalidRequest);

        let mut missing_role = ok.clone();
        missing_role.rasters.remove(&RasterRole::T);
        assert_eq!(missing_role.validate().unwrap_err().kind(), ErrorKind::InvalidRequest);

        let mut no_output = ok.clone();
        no_output.output = None;
        assert_eq!(no_output.validate().unwrap_err().kind(), ErrorKind::InvalidRequest);

        let unknown_factor = ok.factor("MC", 0.5);
        assert_eq!(unknown_factor.validate().unwrap_err().kind(), ErrorKind::InvalidRequest);

        let equity_with_output = IndicatorRequest::new(IndicatorId::Equity)
            .raster(RasterRole::Aeti, "aeti.tif")
            .output("cv.tif");
        assert_eq!(equity_with_output.validate().unwrap_err().kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_run_dispatches_yield_factors() {
        let (engine, store) = engine();
        store.put("./mem/tbp.tif", band(1, 1, vec![3.0]));
        let req = IndicatorRequest::new(IndicatorId::Yield)
            .raster(RasterRole::Tbp, "tbp.tif")
            .factor("MC", 0.0)
            .factor("fc", 1.0)
            .factor("AOT", 1.0)
            .factor("HI", 0.5)
            .output("y.tif");
        let result = engine.run(&req).unwrap();
        assert_eq!(result.indicator, IndicatorId::Yield);
        assert_eq!(store.get("./mem/y.tif").unwrap().get(0, 0).unwrap(), 1.5);

        let missing = IndicatorRequest::new(IndicatorId::Yield)
            .raster(RasterRole::Tbp, "tbp.tif")
            .factor("MC", 0.0)
            .output("y.tif");
        assert_eq!(engine.run(&missing).unwrap_err().kind(), ErrorKind::InvalidRequest);
    }
}
