use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};

use surveyc::error::SurveyError;
use surveyc::lexer::Lexer;
use surveyc::parser::{Parser, ParserConfig};

#[derive(ClapParser, Debug)]
#[command(version, about = "Survey language front end", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to surveyc.log
    #[arg(long, global = true)]
    log: bool,

    /// Deepest allowed nesting of blocks and parentheses
    #[arg(long, global = true, default_value_t = ParserConfig::default().max_nesting)]
    max_nesting: usize,

    /// Most operators and property links on one path of an expression
    #[arg(long, global = true, default_value_t = ParserConfig::default().max_expression_depth)]
    max_expression_depth: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes a survey file, printing each token
    Tokenize { filename: Option<PathBuf> },

    /// Parses a survey file and prints its syntax tree as JSON
    Parse { filename: Option<PathBuf> },

    /// Parses and checks a survey file, then summarises its symbols
    Check { filename: Option<PathBuf> },
}

/// Reads a file into a `String`.
fn read_file(filename: PathBuf) -> Result<String> {
    info!("Reading file: {:?}", filename);
    let file = File::open(&filename).context(format!("Failed to open file {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    let bytes = reader
        .read_to_end(&mut buf)
        .context(format!("Failed to read file {:?}", filename))?;

    info!("Read {} bytes from {:?}", bytes, filename);

    String::from_utf8(buf).context(format!("{:?} is not valid UTF-8", filename))
}

fn init_logger() -> Result<()> {
    let log_file = File::create("surveyc.log").context("Failed to create surveyc.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("surveyc::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    info!("Logger initialized, writing to surveyc.log");
    Ok(())
}

/// Report a front‑end error the way every subcommand does and stop.
fn fail(stage: &str, e: SurveyError) -> ! {
    debug!("{} failed: {}", stage, e);
    eprintln!("{}", e);
    std::process::exit(65);
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    if args.log {
        init_logger()?;
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .parse_default_env()
            .init();
    }

    info!("CLI arguments: {:?}", args);

    let config = ParserConfig {
        max_nesting: args.max_nesting,
        max_expression_depth: args.max_expression_depth,
    };

    let filename = match args.commands {
        Commands::Tokenize { ref filename }
        | Commands::Parse { ref filename }
        | Commands::Check { ref filename } => filename.clone(),
    };

    let Some(filename) = filename else {
        info!("No filepath provided");
        println!("No input filepath was provided. Exiting...");
        std::process::exit(0);
    };

    let source = read_file(filename)?;

    match args.commands {
        Commands::Tokenize { .. } => {
            info!("Running Tokenize subcommand");

            for token in Lexer::new(&source) {
                match token {
                    Ok(token) => println!("{}", token),
                    Err(e) => fail("Tokenization", e),
                }
            }

            info!("Tokenization completed successfully");
        }

        Commands::Parse { .. } => {
            info!("Running Parse subcommand");

            let document = Parser::with_config(Lexer::new(&source), config)
                .parse()
                .unwrap_or_else(|e| fail("Parse", e));

            let json = serde_json::to_string_pretty(&document)
                .context("Failed to serialise the syntax tree")?;
            println!("{}", json);

            info!("Parse subcommand completed");
        }

        Commands::Check { .. } => {
            info!("Running Check subcommand");

            let document = Parser::with_config(Lexer::new(&source), config)
                .parse()
                .unwrap_or_else(|e| fail("Parse", e));
            let table = surveyc::analyze(&document).unwrap_or_else(|e| fail("Check", e));

            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for symbol in table.symbols() {
                *counts.entry(symbol.kind.label()).or_default() += 1;
            }

            println!("ok");
            for (label, count) in counts {
                println!("{}: {}", label, count);
            }

            info!("Check subcommand completed");
        }
    }

    Ok(())
}
