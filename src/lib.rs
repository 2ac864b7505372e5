pub mod cli;
pub mod convert;
mod cursor;
pub mod dataset;
pub mod encoding;
pub mod error;
pub mod form;
pub mod format;
pub mod spss;
pub mod stata;
pub mod table;
pub mod workbook;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::cli::{Cli, Commands};
use crate::convert::{ConvertOptions, Converter};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("xlsform_convert", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Convert(args) => handle_convert(&args),
        Commands::Inspect(args) => handle_inspect(&args),
    }
}

fn handle_convert(args: &cli::ConvertArgs) -> Result<()> {
    let options = ConvertOptions {
        form_id: args.form_id.clone(),
        form_title: args.form_title.clone(),
        kind: args.file_type,
        encoding: args.input_encoding.clone(),
    };
    let converter = convert::convert(&args.input, &args.output, options)
        .with_context(|| format!("Converting {:?}", args.input))?;
    info!(
        "wrote {} survey row(s) and {} choice row(s)",
        converter.survey_rows().len(),
        converter.choice_rows().len()
    );
    println!("XLSForm successfully created: {}", args.output.display());
    Ok(())
}

fn handle_inspect(args: &cli::InspectArgs) -> Result<()> {
    let options = ConvertOptions {
        kind: args.file_type,
        encoding: args.input_encoding.clone(),
        ..ConvertOptions::default()
    };
    let converter = Converter::open(&args.input, options)
        .with_context(|| format!("Inspecting {:?}", args.input))?;
    let info = converter.variable_info();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        let rows: Vec<Vec<String>> = info
            .iter()
            .map(|var| {
                vec![
                    var.variable.clone(),
                    var.label.clone(),
                    var.kind.to_string(),
                    if var.has_value_labels { "yes" } else { "no" }.to_string(),
                    var.distinct_values.to_string(),
                ]
            })
            .collect();
        table::print_table(
            &["variable", "label", "type", "value_labels", "distinct"],
            &rows,
        );
    }
    Ok(())
}
