//! aquapi CLI - water productivity indicators from remote-sensing rasters

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use aquapi_core::ErrorReport;
use aquapi_indicators::catalog::{FactorSource, ParamSlot};
use aquapi_indicators::{
    definitions, lookup, ComputationResult, EngineConfig, IndicatorDefinition, IndicatorEngine,
    IndicatorRequest, RasterInfo, RasterRole, YieldFactors,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "aquapi")]
#[command(author, version, about = "Water productivity indicators from remote-sensing rasters", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Raster store directory, relative to the plugin directory
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Print results and errors as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the indicator catalog
    List,
    /// Show an indicator's inputs and formula
    Describe {
        /// Indicator name or key
        indicator: String,
    },
    /// Show information about a raster in the store
    Info {
        /// Raster file, relative to the store root
        raster: PathBuf,
    },
    /// Uniformity of water consumption (CV of AETI)
    Equity {
        /// AETI raster
        aeti: PathBuf,
    },
    /// Beneficial fraction: T / AETI
    BeneficialFraction {
        /// Transpiration raster
        t: PathBuf,
        /// AETI raster
        aeti: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Adequacy: AETI / P99(AETI)
    Adequacy {
        /// AETI raster
        aeti: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Relative water deficit: 1 - AETI / P95(AETI)
    RelativeWaterDeficit {
        /// AETI raster
        aeti: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Total biomass production: NPP * 22.222 / 1000
    TotalBiomassProduction {
        /// NPP raster
        npp: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Biomass water productivity: TBP / AETI * 100
    BiomassWaterProductivity {
        /// AETI raster
        aeti: PathBuf,
        /// TBP raster
        tbp: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Yield: HI * AOT * fc * TBP / (1 - MC)
    Yield {
        /// TBP raster
        tbp: PathBuf,
        /// Output file
        output: PathBuf,
        /// Moisture content
        #[arg(long)]
        mc: f64,
        /// Light use efficiency correction factor
        #[arg(long)]
        fc: f64,
        /// Above ground over total biomass ratio
        #[arg(long)]
        aot: f64,
        /// Harvest index
        #[arg(long)]
        hi: f64,
    },
    /// Crop water productivity: Y / AETI * 100
    CropWaterProductivity {
        /// Yield raster
        y: PathBuf,
        /// AETI raster
        aeti: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Overall consumed ratio: 1 - (AETI - PCP) / V_ws
    OverallConsumedRatio {
        /// AETI raster
        aeti: PathBuf,
        /// Precipitation raster
        pcp: PathBuf,
        /// Output file
        output: PathBuf,
        /// Volume of water supplied to the command area (mm)
        #[arg(long)]
        v_ws: f64,
    },
    /// Field application ratio: 1 - (AETI - PCP) / V_wd
    FieldApplicationRatio {
        /// AETI raster
        aeti: PathBuf,
        /// Precipitation raster
        pcp: PathBuf,
        /// Output file
        output: PathBuf,
        /// Volume of water delivered to the fields (mm)
        #[arg(long)]
        v_wd: f64,
    },
    /// Depleted fraction: 1 - AETI / (PCP + V_c)
    DepletedFraction {
        /// AETI raster
        aeti: PathBuf,
        /// Precipitation raster
        pcp: PathBuf,
        /// Output file
        output: PathBuf,
        /// Volume of water consumed (mm)
        #[arg(long)]
        v_c: f64,
    },
    /// Run any indicator with catalog-bound inputs
    Run {
        /// Indicator name or key
        indicator: String,
        /// Raster binding, ROLE=FILE (e.g. AETI=L2_AETI_20.tif)
        #[arg(long = "raster", value_parser = parse_binding)]
        rasters: Vec<(RasterRole, PathBuf)>,
        /// Scalar factor, CODE=VALUE (e.g. MC=0.7)
        #[arg(long = "factor", value_parser = parse_factor)]
        factors: Vec<(String, f64)>,
        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// What a command produced
enum Report {
    Catalog(&'static [IndicatorDefinition]),
    Definition(&'static IndicatorDefinition),
    Info(RasterInfo),
    Computation(ComputationResult),
}

#[derive(Serialize)]
struct CatalogEntry {
    key: &'static str,
    name: &'static str,
    status: aquapi_indicators::Status,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let config = config.load_from_env();
    Ok(match &cli.root {
        Some(root) => config.with_rasters_path(root),
        None => config,
    })
}

fn parse_binding(s: &str) -> std::result::Result<(RasterRole, PathBuf), String> {
    let (role, file) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ROLE=FILE, got '{}'", s))?;
    let role = role.parse::<RasterRole>().map_err(|e| e.to_string())?;
    Ok((role, PathBuf::from(file)))
}

fn parse_factor(s: &str) -> std::result::Result<(String, f64), String> {
    let (code, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CODE=VALUE, got '{}'", s))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value for {}: {}", code, e))?;
    Ok((code.trim().to_string(), value))
}

/// Run `f` under a spinner and report the elapsed time.
fn timed<T>(msg: &str, f: impl FnOnce() -> aquapi_core::Result<T>) -> aquapi_core::Result<T> {
    let pb = spinner(msg);
    let start = Instant::now();
    let result = f();
    pb.finish_and_clear();
    debug!("Processing time: {:.2?}", start.elapsed());
    result
}

fn print_definition(def: &IndicatorDefinition) {
    println!("{} ({})", def.name, def.id.key());
    println!("  {}", def.info);
    println!("  Status: {:?}", def.status);
    println!("  Output: {:?}", def.output);
    if !def.rasters.is_empty() {
        println!("\nRasters:");
        for (role, label) in def.rasters {
            println!("  {:<5} {}", role.code(), label);
        }
    }
    if !def.factors.is_empty() {
        println!("\nFactors:");
        for f in def.factors {
            let source = match f.source {
                FactorSource::Caller => "caller",
                FactorSource::Derived => "derived",
            };
            println!("  {:<12} {} [{}]", f.code, f.description, source);
        }
    }
    if !def.params.is_empty() {
        println!("\nParameters:");
        for (i, slot) in def.params.iter().enumerate() {
            match slot {
                ParamSlot::Raster { label, role } => println!("  {}. {} ({})", i + 1, label, role),
                ParamSlot::RasterChoice { label, roles } => {
                    let roles: Vec<_> = roles.iter().map(|r| r.code()).collect();
                    println!("  {}. {} ({})", i + 1, label, roles.join(" | "))
                }
                ParamSlot::Factors { codes } => println!("  {}. factors {}", i + 1, codes.join(", ")),
            }
        }
    }
}

fn print_report(report: &Report, json: bool) -> Result<()> {
    if json {
        let text = match report {
            Report::Catalog(defs) => {
                let entries: Vec<_> = defs
                    .iter()
                    .map(|d| CatalogEntry {
                        key: d.id.key(),
                        name: d.name,
                        status: d.status,
                    })
                    .collect();
                serde_json::to_string_pretty(&entries)
            }
            Report::Definition(def) => serde_json::to_string_pretty(def),
            Report::Info(info) => serde_json::to_string_pretty(info),
            Report::Computation(result) => serde_json::to_string_pretty(result),
        }
        .context("Failed to serialize output")?;
        println!("{}", text);
        return Ok(());
    }

    match report {
        Report::Catalog(defs) => {
            for d in defs.iter() {
                println!("{:<28} {}", d.id.key(), d.name);
            }
        }
        Report::Definition(def) => print_definition(def),
        Report::Info(info) => println!("{}", info),
        Report::Computation(result) => println!("{}", result),
    }
    Ok(())
}

fn execute(engine: &IndicatorEngine, command: Commands) -> aquapi_core::Result<Report> {
    let report = match command {
        Commands::List => Report::Catalog(definitions()),
        Commands::Describe { indicator } => Report::Definition(lookup(&indicator)?),
        Commands::Info { raster } => {
            Report::Info(timed("Reading raster...", || engine.describe_raster(&raster))?)
        }

        // ── Indicators ───────────────────────────────────────────────
        Commands::Equity { aeti } => Report::Computation(timed("Computing equity...", || {
            engine.equity(&aeti)
        })?),
        Commands::BeneficialFraction { t, aeti, output } => Report::Computation(timed(
            "Computing beneficial fraction...",
            || engine.beneficial_fraction(&t, &aeti, &output),
        )?),
        Commands::Adequacy { aeti, output } => Report::Computation(timed(
            "Computing adequacy...",
            || engine.adequacy(&aeti, &output),
        )?),
        Commands::RelativeWaterDeficit { aeti, output } => Report::Computation(timed(
            "Computing relative water deficit...",
            || engine.relative_water_deficit(&aeti, &output),
        )?),
        Commands::TotalBiomassProduction { npp, output } => Report::Computation(timed(
            "Computing total biomass production...",
            || engine.total_biomass_production(&npp, &output),
        )?),
        Commands::BiomassWaterProductivity { aeti, tbp, output } => Report::Computation(timed(
            "Computing biomass water productivity...",
            || engine.biomass_water_productivity(&aeti, &tbp, &output),
        )?),
        Commands::Yield {
            tbp,
            output,
            mc,
            fc,
            aot,
            hi,
        } => Report::Computation(timed("Computing yield...", || {
            engine.yield_indicator(&tbp, YieldFactors { mc, fc, aot, hi }, &output)
        })?),
        Commands::CropWaterProductivity { y, aeti, output } => Report::Computation(timed(
            "Computing crop water productivity...",
            || engine.crop_water_productivity(&y, &aeti, &output),
        )?),
        Commands::OverallConsumedRatio {
            aeti,
            pcp,
            output,
            v_ws,
        } => Report::Computation(timed("Computing overall consumed ratio...", || {
            engine.overall_consumed_ratio(&aeti, &pcp, v_ws, &output)
        })?),
        Commands::FieldApplicationRatio {
            aeti,
            pcp,
            output,
            v_wd,
        } => Report::Computation(timed("Computing field application ratio...", || {
            engine.field_application_ratio(&aeti, &pcp, v_wd, &output)
        })?),
        Commands::DepletedFraction {
            aeti,
            pcp,
            output,
            v_c,
        } => Report::Computation(timed("Computing depleted fraction...", || {
            engine.depleted_fraction(&aeti, &pcp, v_c, &output)
        })?),

        // ── Catalog-driven ───────────────────────────────────────────
        Commands::Run {
            indicator,
            rasters,
            factors,
            output,
        } => {
            let def = lookup(&indicator)?;
            let mut request = IndicatorRequest::new(def.id);
            for (role, file) in rasters {
                request = request.raster(role, file);
            }
            for (code, value) in factors {
                request = request.factor(code, value);
            }
            if let Some(output) = output {
                request = request.output(output);
            }
            let msg = format!("Computing {}...", def.name);
            Report::Computation(timed(&msg, || engine.run(&request))?)
        }
    };
    Ok(report)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let config = load_config(&cli)?;
    let engine = IndicatorEngine::new(&config);
    debug!("Raster store root: {}", engine.raster_store_root().display());
    debug!("No-data: {}", engine.nodata_policy());

    let json = cli.json;
    match execute(&engine, cli.command) {
        Ok(report) => {
            print_report(&report, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let report = ErrorReport::from(&err);
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialize error")?
                );
            } else {
                eprintln!("Error: {}", report);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_binding() {
        let (role, file) = parse_binding("aeti=L2_AETI_20.tif").unwrap();
        assert_eq!(role, RasterRole::Aeti);
        assert_eq!(file, PathBuf::from("L2_AETI_20.tif"));
        assert!(parse_binding("AETI").is_err());
        assert!(parse_binding("ETp=x.tif").is_err());
    }

    #[test]
    fn test_parse_factor() {
        assert_eq!(parse_factor("MC=0.7").unwrap(), ("MC".to_string(), 0.7));
        assert!(parse_factor("MC=wet").is_err());
        assert!(parse_factor("0.7").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "aquapi",
            "--root",
            "season_2020",
            "run",
            "yield",
            "--raster",
            "TBP=tbp.tif",
            "--factor",
            "MC=0.7",
            "--factor",
            "HI=0.45",
            "-o",
            "y.tif",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("season_2020")));
        match cli.command {
            Commands::Run { indicator, rasters, factors, output } => {
                assert_eq!(indicator, "yield");
                assert_eq!(rasters, vec![(RasterRole::Tbp, PathBuf::from("tbp.tif"))]);
                assert_eq!(factors.len(), 2);
                assert_eq!(output, Some(PathBuf::from("y.tif")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_yield_requires_every_factor() {
        let base = [
            "aquapi", "yield", "tbp.tif", "y.tif", "--mc", "0.7", "--aot", "0.8", "--hi", "0.45",
        ];
        let err = Cli::try_parse_from(base).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from(base.iter().copied().chain(["--fc", "0.9"])).unwrap();
        match cli.command {
            Commands::Yield { fc, .. } => assert_eq!(fc, 0.9),
            _ => panic!("expected yield"),
        }
    }

    #[test]
    fn test_cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
