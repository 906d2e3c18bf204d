// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use roadmap_core::datamodel::{DataSeries, Settings};
use roadmap_engine::ast::print_eqn;
use roadmap_engine::lexer::LexerType;
use roadmap_engine::parser::parse;
use roadmap_engine::{
    Error, RecipeOutput, Runner, normalize, parse_recipe, parse_recipes, run_batch,
};

const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "roadmap", version, about = "Evaluate roadmap recipes against goal data.")]
struct Cli {
    /// path to write output to, instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one recipe and print the derived series
    Run {
        #[arg(long)]
        recipe: PathBuf,
        /// JSON object of goal id to data series
        #[arg(long)]
        series: PathBuf,
        /// JSON settings with year specs and unit definitions
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Evaluate a JSON object of goal id to recipe, in dependency order
    Batch {
        #[arg(long)]
        recipes: PathBuf,
        #[arg(long)]
        series: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print a recipe with its variables renamed to canonical names
    Normalize {
        #[arg(long)]
        recipe: PathBuf,
    },
    /// Check a recipe without evaluating it
    Check {
        #[arg(long)]
        recipe: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// also resolve variables and check units against these series
        #[arg(long)]
        series: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Tsv,
}

// kind and message, without the error code
fn engine_err(err: Error) -> anyhow::Error {
    anyhow!("{}: {}", err.kind, err.message())
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    Settings::from_json(&read(path)?)
        .map_err(engine_err)
        .with_context(|| format!("loading settings from {}", path.display()))
}

fn load_series(path: &Path) -> Result<HashMap<String, DataSeries>> {
    serde_json::from_str(&read(path)?)
        .with_context(|| format!("parsing data series in {}", path.display()))
}

fn load_runner(config: Option<&Path>) -> Result<Runner> {
    let settings = load_settings(config)?;
    Runner::from_settings(&settings).map_err(engine_err)
}

fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn write_tsv(out: &mut dyn Write, output: &RecipeOutput) -> Result<()> {
    match output.unit {
        Some(ref unit) => writeln!(out, "year\tvalue ({unit})")?,
        None => writeln!(out, "year\tvalue")?,
    }
    for (year_key, value) in output.series.values.iter() {
        match value {
            Some(value) => writeln!(out, "{year_key}\t{value}")?,
            None => writeln!(out, "{year_key}\t")?,
        }
    }
    Ok(())
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings.iter() {
        eprintln!("warning: {warning}");
    }
}

/// execute runs one subcommand, returning false when it completed but
/// some of its goals could not be evaluated.
fn execute(command: Command, out: &mut dyn Write) -> Result<bool> {
    match command {
        Command::Run {
            recipe,
            series,
            config,
            format,
        } => {
            let runner = load_runner(config.as_deref())?;
            let recipe = parse_recipe(&read(&recipe)?).map_err(engine_err)?;
            let sources = load_series(&series)?;

            let output = runner.run(&recipe, &sources).map_err(engine_err)?;
            match format {
                Format::Json => write_json(out, &output)?,
                Format::Tsv => {
                    print_warnings(&output.warnings);
                    write_tsv(out, &output)?;
                }
            }
        }
        Command::Batch {
            recipes,
            series,
            config,
        } => {
            let runner = load_runner(config.as_deref())?;
            let recipes = parse_recipes(&read(&recipes)?).map_err(engine_err)?;
            let sources = load_series(&series)?;

            let output = run_batch(&runner, &recipes, &sources);
            write_json(out, &output)?;

            let failed = output.results.iter().filter(|(_, r)| r.is_err()).count();
            if failed > 0 {
                eprintln!("{failed} of {} goals could not be evaluated", recipes.len());
                return Ok(false);
            }
        }
        Command::Normalize { recipe } => {
            let recipe = parse_recipe(&read(&recipe)?).map_err(engine_err)?;
            let mut warnings = Vec::new();
            let normalized = normalize(&recipe, &mut warnings).map_err(engine_err)?;
            print_warnings(&warnings);
            write_json(out, &normalized)?;
        }
        Command::Check {
            recipe,
            config,
            series,
        } => {
            let runner = load_runner(config.as_deref())?;
            let recipe = parse_recipe(&read(&recipe)?).map_err(engine_err)?;

            match series {
                Some(series) => {
                    let sources = load_series(&series)?;
                    let output = runner.check(&recipe, &sources).map_err(engine_err)?;
                    print_warnings(&output.warnings);
                    writeln!(out, "{}", output.eq)?;
                    if let Some(unit) = output.unit {
                        writeln!(out, "unit: {unit}")?;
                    }
                }
                None => {
                    let mut warnings = Vec::new();
                    let normalized = normalize(&recipe, &mut warnings).map_err(engine_err)?;
                    print_warnings(&warnings);
                    let expr = match parse(&normalized.eq, LexerType::Equation) {
                        Ok(Some(expr)) => expr,
                        Ok(None) => return Err(anyhow!("recipe has an empty equation")),
                        Err(err) => return Err(engine_err(err.into_error(&normalized.eq))),
                    };
                    writeln!(out, "{}", print_eqn(&expr))?;
                }
            }
        }
    }

    Ok(true)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    debug!(output = ?cli.output, "starting");

    let result = match cli.output {
        Some(ref path) => File::create(path)
            .with_context(|| format!("creating {}", path.display()))
            .and_then(|file| {
                let mut out = BufWriter::new(file);
                let ok = execute(cli.command, &mut out)?;
                out.flush()?;
                Ok(ok)
            }),
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            execute(cli.command, &mut out)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_FAILURE),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}
