//! Indicator catalog with declarative input definitions.
//!
//! Each entry describes an indicator's display name, formula, the raster
//! roles it needs, the scalar factors it uses and how a front end lays out
//! its (at most three) parameter slots. The table is static: changing it
//! means changing this file.

use aquapi_core::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Identifier of every indicator the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorId {
    Equity,
    BeneficialFraction,
    Adequacy,
    RelativeWaterDeficit,
    TotalBiomassProduction,
    BiomassWaterProductivity,
    Yield,
    CropWaterProductivity,
    OverallConsumedRatio,
    FieldApplicationRatio,
    DepletedFraction,
    CropYield,
}

impl IndicatorId {
    /// Stable snake_case key, used on the command line and in requests.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Equity => "equity",
            Self::BeneficialFraction => "beneficial_fraction",
            Self::Adequacy => "adequacy",
            Self::RelativeWaterDeficit => "relative_water_deficit",
            Self::TotalBiomassProduction => "total_biomass_production",
            Self::BiomassWaterProductivity => "biomass_water_productivity",
            Self::Yield => "yield",
            Self::CropWaterProductivity => "crop_water_productivity",
            Self::OverallConsumedRatio => "overall_consumed_ratio",
            Self::FieldApplicationRatio => "field_application_ratio",
            Self::DepletedFraction => "depleted_fraction",
            Self::CropYield => "crop_yield",
        }
    }

    /// Catalog entry for this indicator.
    pub fn definition(&self) -> &'static IndicatorDefinition {
        // The table is ordered like the enum; `catalog_is_indexed_by_id` guards it.
        &CATALOG[*self as usize]
    }
}

impl fmt::Display for IndicatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for IndicatorId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        CATALOG
            .iter()
            .map(|d| d.id)
            .find(|id| id.key() == key)
            .ok_or_else(|| Error::UnknownIndicator(s.to_string()))
    }
}

/// Kind of raster an indicator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RasterRole {
    /// Actual evapotranspiration and interception
    #[serde(rename = "AETI")]
    Aeti,
    /// Transpiration
    #[serde(rename = "T")]
    T,
    /// Net primary production
    #[serde(rename = "NPP")]
    Npp,
    /// Total biomass production
    #[serde(rename = "TBP")]
    Tbp,
    /// Yield
    #[serde(rename = "Y")]
    Y,
    /// Precipitation
    #[serde(rename = "PCP")]
    Pcp,
}

impl RasterRole {
    pub const ALL: &'static [RasterRole] = &[
        Self::Aeti,
        Self::T,
        Self::Npp,
        Self::Tbp,
        Self::Y,
        Self::Pcp,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Aeti => "AETI",
            Self::T => "T",
            Self::Npp => "NPP",
            Self::Tbp => "TBP",
            Self::Y => "Y",
            Self::Pcp => "PCP",
        }
    }
}

impl fmt::Display for RasterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RasterRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidRequest(format!("unknown raster role '{}'", s)))
    }
}

/// Where a scalar factor's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorSource {
    /// Supplied by the caller.
    Caller,
    /// Computed from the input rasters.
    Derived,
}

/// A scalar coefficient used in an indicator's formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FactorDef {
    pub code: &'static str,
    pub description: &'static str,
    pub source: FactorSource,
}

/// One parameter slot of an indicator's input form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamSlot {
    /// A raster of one fixed role.
    Raster {
        label: &'static str,
        role: RasterRole,
    },
    /// A raster whose role is picked from a small set.
    RasterChoice {
        label: &'static str,
        roles: &'static [RasterRole],
    },
    /// A group of caller-supplied scalar factors.
    Factors { codes: &'static [&'static str] },
}

impl ParamSlot {
    /// Raster roles this slot can bind.
    pub fn roles(&self) -> &[RasterRole] {
        match self {
            Self::Raster { role, .. } => std::slice::from_ref(role),
            Self::RasterChoice { roles, .. } => *roles,
            Self::Factors { .. } => &[],
        }
    }
}

/// What an indicator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Scalar,
    Raster,
    ScalarAndRaster,
}

impl OutputKind {
    pub fn writes_raster(&self) -> bool {
        matches!(self, Self::Raster | Self::ScalarAndRaster)
    }
}

/// Maturity of an indicator's formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Checked against reference values.
    Validated,
    /// Implemented, formula not yet validated against reference values.
    Unvalidated,
    /// Placeholder; invoking it fails with `NotImplemented`.
    Reserved,
}

/// Immutable catalog entry for one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorDefinition {
    pub id: IndicatorId,
    /// Display name
    pub name: &'static str,
    /// Formula and unit notes
    pub info: &'static str,
    /// Mandatory raster roles with their human labels
    pub rasters: &'static [(RasterRole, &'static str)],
    pub factors: &'static [FactorDef],
    /// Ordered UI parameter slots (at most three)
    pub params: &'static [ParamSlot],
    pub output: OutputKind,
    pub status: Status,
}

impl IndicatorDefinition {
    /// Whether `role` is one of this indicator's mandatory rasters.
    pub fn requires(&self, role: RasterRole) -> bool {
        self.rasters.iter().any(|(r, _)| *r == role)
    }

    /// Raster roles in declaration order.
    pub fn roles(&self) -> impl Iterator<Item = RasterRole> + '_ {
        self.rasters.iter().map(|(r, _)| *r)
    }

    /// Factors the caller must supply.
    pub fn caller_factors(&self) -> impl Iterator<Item = &FactorDef> + '_ {
        self.factors
            .iter()
            .filter(|f| f.source == FactorSource::Caller)
    }

    /// Check the entry's internal consistency.
    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::Config {
            key: format!("catalog.{}", self.id.key()),
            reason,
        };

        if self.params.len() > MAX_PARAM_SLOTS {
            return Err(invalid(format!(
                "{} parameter slots, at most {} allowed",
                self.params.len(),
                MAX_PARAM_SLOTS
            )));
        }
        for slot in self.params {
            for role in slot.roles() {
                if !self.requires(*role) {
                    return Err(invalid(format!(
                        "parameter slot names raster role {} missing from rasters",
                        role
                    )));
                }
            }
            if let ParamSlot::Factors { codes } = slot {
                for code in *codes {
                    if !self.factors.iter().any(|f| f.code == *code) {
                        return Err(invalid(format!("parameter slot names undeclared factor {}", code)));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Maximum number of parameter slots per indicator.
pub const MAX_PARAM_SLOTS: usize = 3;

const AETI_LABEL: &str = "Actual Evapotranspiration and Interception";
const PCP_LABEL: &str = "Precipitation";
const TBP_LABEL: &str = "Total Biomass Production";

static CATALOG: [IndicatorDefinition; 12] = [
    IndicatorDefinition {
        id: IndicatorId::Equity,
        name: "Uniformity of Water Consumption",
        info: "Equity is defined as the coefficient of variation (CV) of seasonal ETa in the \
               area of interest: equity = (sd_raster / mean_raster) * 100",
        rasters: &[(RasterRole::Aeti, AETI_LABEL)],
        factors: &[
            FactorDef {
                code: "sd_raster",
                description: "Standard deviation obtained from the raster",
                source: FactorSource::Derived,
            },
            FactorDef {
                code: "mean_raster",
                description: "Mean obtained from the raster",
                source: FactorSource::Derived,
            },
        ],
        params: &[ParamSlot::Raster { label: "AETI", role: RasterRole::Aeti }],
        output: OutputKind::Scalar,
        status: Status::Validated,
    },
    IndicatorDefinition {
        id: IndicatorId::BeneficialFraction,
        name: "Beneficial Fraction",
        info: "BF = T / AETI",
        rasters: &[(RasterRole::Aeti, AETI_LABEL), (RasterRole::T, "Transpiration")],
        factors: &[],
        params: &[
            ParamSlot::Raster { label: "T Raster", role: RasterRole::T },
            ParamSlot::Raster { label: "AETI Raster", role: RasterRole::Aeti },
        ],
        output: OutputKind::Raster,
        status: Status::Validated,
    },
    IndicatorDefinition {
        id: IndicatorId::Adequacy,
        name: "Adequacy (Relative Evapotranspiration)",
        info: "AD = AETI / ETp, where ETp is the 99th percentile of the AETI raster",
        rasters: &[(RasterRole::Aeti, AETI_LABEL)],
        factors: &[FactorDef {
            code: "ETp",
            description: "99th percentile of the AETI raster",
            source: FactorSource::Derived,
        }],
        params: &[ParamSlot::Raster { label: "AETI Raster", role: RasterRole::Aeti }],
        output: OutputKind::Raster,
        status: Status::Validated,
    },
    IndicatorDefinition {
        id: IndicatorId::RelativeWaterDeficit,
        name: "Relative Water Deficit",
        info: "RWD = 1 - (AETI / ETx), where ETx is the 95th percentile of the AETI raster. \
               The scalar summary uses the mean AETI.",
        rasters: &[(RasterRole::Aeti, AETI_LABEL)],
        factors: &[FactorDef {
            code: "ETx",
            description: "95th percentile of the AETI raster",
            source: FactorSource::Derived,
        }],
        params: &[ParamSlot::Raster { label: "AETI Raster", role: RasterRole::Aeti }],
        output: OutputKind::ScalarAndRaster,
        status: Status::Validated,
    },
    IndicatorDefinition {
        id: IndicatorId::TotalBiomassProduction,
        name: "Total Biomass Production",
        info: "TBP = (NPP * 22.222) / 1000. The value 22.222 converts NPP in gC/m^2 to biomass \
               production in kg/ha; dividing by 1000 converts to ton/ha.",
        rasters: &[(RasterRole::Npp, "Net Primary Production")],
        factors: &[],
        params: &[ParamSlot::Raster { label: "NPP Raster", role: RasterRole::Npp }],
        output: OutputKind::ScalarAndRaster,
        status: Status::Validated,
    },
    IndicatorDefinition {
        id: IndicatorId::BiomassWaterProductivity,
        name: "Biomass Water Productivity",
        info: "WPb = TBP / AETI * 100. The factor 100 converts TBP in ton/ha to kg/m^2 (divide \
               by 10) and AETI in mm/season to m/season (divide by 1000), giving kg/m^3.",
        rasters: &[(RasterRole::Aeti, AETI_LABEL), (RasterRole::Tbp, TBP_LABEL)],
        factors: &[],
        params: &[
            ParamSlot::Raster { label: "AETI Raster", role: RasterRole::Aeti },
            ParamSlot::Raster { label: "TBP Raster", role: RasterRole::Tbp },
        ],
        output: OutputKind::ScalarAndRaster,
        status: Status::Validated,
    },
    IndicatorDefinition {
        id: IndicatorId::Yield,
        name: "Yield",
        info: "Y = HI * AOT * fc * (TBP / (1 - MC))",
        rasters: &[(RasterRole::Tbp, TBP_LABEL)],
        factors: &[
            FactorDef {
                code: "MC",
                description: "Moisture content, dry matter over fresh biomass",
                source: FactorSource::Caller,
            },
            FactorDef {
                code: "fc",
                description: "Light use efficiency correction factor",
                source: FactorSource::Caller,
            },
            FactorDef {
                code: "AOT",
                description: "Above ground over total biomass production ratio",
                source: FactorSource::Caller,
            },
            FactorDef {
                code: "HI",
                description: "Harvest index",
                source: FactorSource::Caller,
            },
        ],
        params: &[
            ParamSlot::Raster { label: "TBP Raster", role: RasterRole::Tbp },
            ParamSlot::Factors { codes: &["MC", "fc", "AOT", "HI"] },
        ],
        output: OutputKind::ScalarAndRaster,
        status: Status::Validated,
    },
    IndicatorDefinition {
        id: IndicatorId::CropWaterProductivity,
        name: "Crop Water Productivity",
        info: "cWP = Y / AETI * 100. The factor 100 converts to kg/m^3 from AETI in mm/season \
               and Y in ton/ha.",
        rasters: &[(RasterRole::Y, "Yield"), (RasterRole::Aeti, AETI_LABEL)],
        factors: &[],
        params: &[
            ParamSlot::Raster { label: "Y Raster", role: RasterRole::Y },
            ParamSlot::Raster { label: "AETI Raster", role: RasterRole::Aeti },
        ],
        output: OutputKind::ScalarAndRaster,
        status: Status::Validated,
    },
    IndicatorDefinition {
        id: IndicatorId::OverallConsumedRatio,
        name: "Overall Consumed Ratio",
        info: "OCR = 1 - (AETI - PCP) / V_ws",
        rasters: &[(RasterRole::Aeti, AETI_LABEL), (RasterRole::Pcp, PCP_LABEL)],
        factors: &[FactorDef {
            code: "V_ws",
            description: "Volume of water supplied to the command area, in mm",
            source: FactorSource::Caller,
        }],
        params: &[
            ParamSlot::Raster { label: "AETI Raster", role: RasterRole::Aeti },
            ParamSlot::Raster { label: "PCP Raster", role: RasterRole::Pcp },
            ParamSlot::Factors { codes: &["V_ws"] },
        ],
        output: OutputKind::Raster,
        status: Status::Unvalidated,
    },
    IndicatorDefinition {
        id: IndicatorId::FieldApplicationRatio,
        name: "Field Application Ratio (efficiency)",
        info: "FAR = 1 - (AETI - PCP) / V_wd",
        rasters: &[(RasterRole::Aeti, AETI_LABEL), (RasterRole::Pcp, PCP_LABEL)],
        factors: &[FactorDef {
            code: "V_wd",
            description: "Volume of water delivered to the field(s), in mm",
            source: FactorSource::Caller,
        }],
        params: &[
            ParamSlot::Raster { label: "AETI Raster", role: RasterRole::Aeti },
            ParamSlot::Raster { label: "PCP Raster", role: RasterRole::Pcp },
            ParamSlot::Factors { codes: &["V_wd"] },
        ],
        output: OutputKind::Raster,
        status: Status::Unvalidated,
    },
    IndicatorDefinition {
        id: IndicatorId::DepletedFraction,
        name: "Depleted Fraction",
        info: "DF = 1 - AETI / (PCP + V_c)",
        rasters: &[(RasterRole::Aeti, AETI_LABEL), (RasterRole::Pcp, PCP_LABEL)],
        factors: &[FactorDef {
            code: "V_c",
            description: "Volume of water consumed, in mm",
            source: FactorSource::Caller,
        }],
        params: &[
            ParamSlot::Raster { label: "AETI Raster", role: RasterRole::Aeti },
            ParamSlot::Raster { label: "PCP Raster", role: RasterRole::Pcp },
            ParamSlot::Factors { codes: &["V_c"] },
        ],
        output: OutputKind::Raster,
        status: Status::Unvalidated,
    },
    IndicatorDefinition {
        id: IndicatorId::CropYield,
        name: "Crop Yield",
        info: "Reserved.",
        rasters: &[],
        factors: &[],
        params: &[],
        output: OutputKind::Scalar,
        status: Status::Reserved,
    },
];

/// All catalog entries in registration order.
pub fn definitions() -> &'static [IndicatorDefinition] {
    &CATALOG
}

/// Display names in registration order.
pub fn list_indicators() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|d| d.name)
}

/// Find an indicator by display name or key.
pub fn lookup(name: &str) -> Result<&'static IndicatorDefinition> {
    if let Some(def) = CATALOG.iter().find(|d| d.name == name) {
        return Ok(def);
    }
    name.parse::<IndicatorId>()
        .map(|id| id.definition())
        .map_err(|_| Error::UnknownIndicator(name.to_string()))
}

/// Check every entry's internal consistency.
pub fn validate() -> Result<()> {
    CATALOG.iter().try_for_each(IndicatorDefinition::validate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_valid() {
        validate().unwrap();
    }

    #[test]
    fn test_catalog_is_indexed_by_id() {
        for (i, def) in definitions().iter().enumerate() {
            assert_eq!(def.id as usize, i, "{} out of place", def.name);
            assert_eq!(def.id.definition().name, def.name);
        }
    }

    #[test]
    fn test_list_preserves_registration_order() {
        let names: Vec<_> = list_indicators().collect();
        assert_eq!(names.len(), 12);
        assert_eq!(names[0], "Uniformity of Water Consumption");
        assert_eq!(names[1], "Beneficial Fraction");
        assert_eq!(names[7], "Crop Water Productivity");
        assert_eq!(names[11], "Crop Yield");
        // restartable
        assert_eq!(list_indicators().collect::<Vec<_>>(), names);
    }

    #[test]
    fn test_lookup_by_name_and_key() {
        assert_eq!(lookup("Beneficial Fraction").unwrap().id, IndicatorId::BeneficialFraction);
        assert_eq!(lookup("beneficial_fraction").unwrap().id, IndicatorId::BeneficialFraction);
        assert_eq!(lookup("water-productivity").ok(), None);
        assert_eq!(
            lookup("biomass-water-productivity").unwrap().id,
            IndicatorId::BiomassWaterProductivity
        );
    }

    #[test]
    fn test_lookup_unknown() {
        let err = lookup("Water Footprint").unwrap_err();
        assert!(matches!(err, Error::UnknownIndicator(ref n) if n == "Water Footprint"));
    }

    #[test]
    fn test_yield_factor_binding() {
        let def = IndicatorId::Yield.definition();
        let codes: Vec<_> = def.caller_factors().map(|f| f.code).collect();
        assert_eq!(codes, vec!["MC", "fc", "AOT", "HI"]);
        assert!(def.requires(RasterRole::Tbp));
        assert!(!def.requires(RasterRole::Aeti));
    }

    #[test]
    fn test_reserved_entry() {
        let def = lookup("crop_yield").unwrap();
        assert_eq!(def.status, Status::Reserved);
        assert!(def.rasters.is_empty());
    }

    #[test]
    fn test_violating_entry_is_rejected() {
        let bad = IndicatorDefinition {
            id: IndicatorId::Adequacy,
            name: "Broken",
            info: "",
            rasters: &[(RasterRole::Aeti, AETI_LABEL)],
            factors: &[],
            params: &[ParamSlot::RasterChoice {
                label: "AETI or PCP",
                roles: &[RasterRole::Aeti, RasterRole::Pcp],
            }],
            output: OutputKind::Raster,
            status: Status::Validated,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("aeti".parse::<RasterRole>().unwrap(), RasterRole::Aeti);
        assert_eq!("PCP".parse::<RasterRole>().unwrap(), RasterRole::Pcp);
        assert!("ETp".parse::<RasterRole>().is_err());
    }
}
