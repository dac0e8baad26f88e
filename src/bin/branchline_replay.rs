//! Branchline replay
//!
//! Loads a schema document, registers a galaxy with one star, and replays a
//! short measurement session against it: a series of star measurements, then
//! an assertion on the galaxy that may fork the timeline.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use branchline::{
    Assertion, EngineConfig, Entity, EntityId, Position, SchemaTable, Tick, TickExt, TimelineEngine,
    TimelineResult, Universe,
};

/// Replay configuration
struct Config {
    /// Schema document to load
    schema: PathBuf,
    /// Seed for the engine's random source
    seed: u64,
    /// Number of star measurements
    steps: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: PathBuf::from("schemas/cosmos.json"),
            seed: 42,
            steps: 8,
        }
    }
}

fn value_of<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("error: {flag} requires a value");
            std::process::exit(1);
        }
    }
}

fn parse_number(value: &str, what: &str) -> u64 {
    value.parse().unwrap_or_else(|_| {
        eprintln!("error: invalid {what}: {value}");
        std::process::exit(1);
    })
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--schema" | "-s" => {
                config.schema = PathBuf::from(value_of(&args, i, "--schema"));
                i += 2;
            }
            "--seed" => {
                config.seed = parse_number(value_of(&args, i, "--seed"), "seed");
                i += 2;
            }
            "--steps" | "-n" => {
                config.steps = parse_number(value_of(&args, i, "--steps"), "step count");
                if config.steps == 0 {
                    eprintln!("error: --steps must be > 0");
                    std::process::exit(1);
                }
                i += 2;
            }
            "--help" | "-h" => {
                println!("branchline-replay - replay a measurement session");
                println!();
                println!("USAGE:");
                println!("    branchline-replay [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -s, --schema <FILE>       Schema document [default: schemas/cosmos.json]");
                println!("        --seed <SEED>         Random seed [default: 42]");
                println!("    -n, --steps <N>           Star measurements to take [default: 8]");
                println!("    -h, --help                Print help information");
                println!();
                println!("Log output is controlled by RUST_LOG (e.g. RUST_LOG=branchline=debug).");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    config
}

fn describe(engine: &TimelineEngine, position: Option<Position>) -> String {
    position
        .and_then(|p| engine.schemas().state_name(p))
        .unwrap_or("?")
        .to_string()
}

fn billion_years(n: u64) -> Tick {
    n.billion().years()
}

fn measure_series(
    engine: &mut TimelineEngine,
    universe: &Universe,
    entity: EntityId,
    dates: &[Tick],
) -> TimelineResult<Vec<(Tick, String, Option<Position>)>> {
    let mut rows = Vec::with_capacity(dates.len());
    let mut timeline = engine.continuity(universe, entity)?;
    for &date in dates {
        let forecast = timeline.forecast(date)?.to_string();
        let position = timeline.measure_position(date)?;
        rows.push((date, forecast, position));
    }
    Ok(rows)
}

fn run(config: &Config) -> TimelineResult<()> {
    let schemas = SchemaTable::from_path(&config.schema)?;
    let galaxy_type = schemas.resolve("Galaxy")?;
    let star_type = schemas.resolve("Star")?;
    let active = schemas.position(galaxy_type, "Active")?;
    let quiescent = schemas.position(galaxy_type, "Quiescent")?;

    let mut engine = TimelineEngine::new(schemas, EngineConfig::default().with_seed(config.seed))?;
    let galaxy = engine.register(&Entity::new(galaxy_type))?;
    let star = engine.register(&Entity::new(star_type).with_parent(galaxy)?)?;
    let root = engine.root_universe();

    let outcome = engine.continuity(&root, galaxy)?.assert(billion_years(1), active)?;
    println!("galaxy is Active at 1 billion years: {}", outcome.is_accepted());

    let span = billion_years(15);
    let dates: Vec<Tick> = (1..=config.steps).map(|k| span * k / config.steps).collect();
    println!();
    println!("star measurements (seed {}):", config.seed);
    for (date, forecast, position) in measure_series(&mut engine, &root, star, &dates)? {
        println!("  day {date:>16}  {forecast:<48} -> {}", describe(&engine, position));
    }

    let late = billion_years(14);
    let measured = engine.continuity(&root, galaxy)?.measure_position(late)?;
    println!();
    println!("galaxy at 14 billion years: {}", describe(&engine, measured));

    let outcome = engine.continuity(&root, galaxy)?.assert(billion_years(6), quiescent)?;
    match outcome {
        Assertion::Incoherent => println!("Quiescent at 6 billion years cannot follow from the past"),
        Assertion::Accepted => println!("Quiescent at 6 billion years is consistent with this timeline"),
        Assertion::Diverged(diff) => {
            println!("Quiescent at 6 billion years diverges: {}", diff.id());
            let alternate = engine.register_universe(&diff)?;
            let there = engine.continuity(&alternate, galaxy)?.measure_position(late)?;
            println!("  in the alternate, galaxy at 14 billion years: {}", describe(&engine, there));
        }
    }

    println!();
    println!("branches: {}", engine.timelines().len());
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = parse_args();
    tracing::info!(schema = %config.schema.display(), seed = config.seed, steps = config.steps, "starting replay");

    if let Err(e) = run(&config) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
