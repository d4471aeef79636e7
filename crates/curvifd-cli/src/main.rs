use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::str::FromStr;

use curvifd::config::{load_run_config, FieldKind, Operator, RunConfig};
use curvifd::io::{write_grid_binary, write_table};
use curvifd::Matrix;

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("CURVIFD_LOG", "error,curvifd=info"))
        .init();

    let matches = Command::new("curvifd")
        .version(clap::crate_version!())
        .about("Finite-difference derivatives on curvilinear structured 2D grids")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("derive")
                .about("Sample a field on a grid, apply a derivative operator and write the result")
                .arg(
                    Arg::new("config")
                        .help("Path to run configuration file (JSON). Defaults are used when omitted.")
                        .required(false)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("output_file")
                        .short('o')
                        .long("output")
                        .help("Path of the text table to write. Overrides the output in the configuration file.")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("operator")
                        .long("operator")
                        .help("Operator to apply. Overrides the operator in the configuration file.")
                        .value_parser(["values", "du_dx", "du_dy", "laplace", "det_j_inv", "jacobian"]),
                )
                .arg(
                    Arg::new("field")
                        .long("field")
                        .help("Field to sample. Overrides the field in the configuration file.")
                        .value_parser(["linear_x", "sum", "harmonic", "gaussian", "sin_cos"]),
                )
                .arg(
                    Arg::new("nx")
                        .long("nx")
                        .help("Number of cells along xi")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("ny")
                        .long("ny")
                        .help("Number of cells along eta")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .subcommand(Command::new("template").about("Print the default run configuration as JSON"))
        .subcommand(
            Command::new("expm")
                .about("Exponentiate a random square matrix")
                .arg(
                    Arg::new("size")
                        .long("size")
                        .short('n')
                        .help("Dimension of the matrix")
                        .required(true)
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .help("Seed for the random entries")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("adaptive")
                        .long("adaptive")
                        .help("Pick the number of series terms from the norm and this tolerance")
                        .value_parser(clap::value_parser!(f64)),
                ),
        )
        .subcommand(
            Command::new("grid")
                .about("Write the configured grid in the binary grid format")
                .arg(
                    Arg::new("config")
                        .help("Path to run configuration file (JSON)")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("output_file")
                        .short('o')
                        .long("output")
                        .help("Path of the binary grid file to write")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("derive", sub_m)) => handle_derive(sub_m),
        Some(("template", _)) => handle_template(),
        Some(("expm", sub_m)) => handle_expm(sub_m),
        Some(("grid", sub_m)) => handle_grid(sub_m),
        _ => unreachable!("Subcommand is required by CLI configuration"),
    }
}

fn run_config_from_arguments(matches: &ArgMatches) -> Result<RunConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(config_path) => {
            log::info!("[curvifd] Using config: {:?}", config_path);
            load_run_config(config_path)?
        }
        None => {
            log::info!("[curvifd] No config provided; using defaults.");
            RunConfig::default()
        }
    };

    if let Some(output) = matches.get_one::<PathBuf>("output_file") {
        config.output = output.clone();
    }
    if let Some(operator) = matches.get_one::<String>("operator") {
        config.operator = Operator::from_str(operator).map_err(anyhow::Error::msg)?;
    }
    if let Some(field) = matches.get_one::<String>("field") {
        config.field = FieldKind::from_str(field).map_err(anyhow::Error::msg)?;
    }
    if let Some(&nx) = matches.get_one::<usize>("nx") {
        config.grid.nx = nx;
    }
    if let Some(&ny) = matches.get_one::<usize>("ny") {
        config.grid.ny = ny;
    }
    Ok(config)
}

fn handle_derive(matches: &ArgMatches) -> Result<()> {
    let config = run_config_from_arguments(matches)?;

    let run = || -> Result<()> {
        let result = config.evaluate()?;
        write_table(&result, &config.output)?;
        log::info!(
            "[curvifd] Wrote {:?} of {:?} to {:?}; max |value| over interior nodes: {:.6e}",
            config.operator,
            config.field,
            config.output,
            result.max_abs_interior()
        );
        Ok(())
    };

    match run() {
        Ok(()) => Ok(()),
        Err(e) => {
            log::error!("Derivative evaluation failed: {:#}", e);
            std::process::exit(1)
        }
    }
}

fn handle_template() -> Result<()> {
    let json = serde_json::to_string_pretty(&RunConfig::default())
        .context("Failed to serialize default config")?;
    println!("{}", json);
    Ok(())
}

fn handle_expm(matches: &ArgMatches) -> Result<()> {
    let size = *matches
        .get_one::<usize>("size")
        .context("--size is required")?;
    let matrix = match matches.get_one::<u64>("seed") {
        Some(&seed) => Matrix::random_with(&mut StdRng::seed_from_u64(seed), size, size),
        None => Matrix::random_square(size),
    };

    let result = match matches.get_one::<f64>("adaptive") {
        Some(&tolerance) => matrix.exp_adaptive(tolerance),
        None => matrix.exp(0.0),
    };
    let exp = match result {
        Ok(exp) => exp,
        Err(e) => {
            log::error!("Matrix exponential failed: {:#}", e);
            std::process::exit(1)
        }
    };

    println!("A =");
    matrix.print();
    println!("exp(A) =");
    exp.print();
    println!("||exp(A)||_F = {:.6e}", exp.frobenius_norm());
    Ok(())
}

fn handle_grid(matches: &ArgMatches) -> Result<()> {
    let config_path = matches
        .get_one::<PathBuf>("config")
        .context("config path is required")?;
    let output_path = matches
        .get_one::<PathBuf>("output_file")
        .context("output path is required")?;

    let config = load_run_config(config_path)?;
    let grid = config.build_grid()?;
    match write_grid_binary(grid.as_ref(), output_path) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::error!("Writing grid failed: {:#}", e);
            std::process::exit(1)
        }
    }
}
