//! Convert a PDF file to PDF/A
//!
//! Usage:
//!   pdfa_convert <input.pdf> <standard> <output.pdf> [--max-pages N] [--font-dir DIR]... [--report]
//!
//! `standard` is one of 1a, 1b, 2a, 2b, 3a, 3b. With `--report` the compliance report
//! (or the failure) is printed to stdout as JSON.
//!
//! Exit codes: 0 on success, 1 when the conversion fails, 2 on a usage error.

use pdfa_oxide::convert::{ConversionOptions, ConversionRequest, Converter};
use pdfa_oxide::embedder::DirectoryFontSource;
use pdfa_oxide::policy::MaxPages;
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str =
    "usage: pdfa_convert <input.pdf> <standard> <output.pdf> [--max-pages N] [--font-dir DIR]... [--report]";

struct CliConfig {
    input: PathBuf,
    standard: String,
    output: PathBuf,
    max_pages: Option<usize>,
    font_dirs: Vec<PathBuf>,
    report: bool,
}

impl CliConfig {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut positional = Vec::new();
        let mut max_pages = None;
        let mut font_dirs = Vec::new();
        let mut report = false;

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--max-pages" => {
                    i += 1;
                    let value = args.get(i).ok_or("--max-pages needs a value")?;
                    let pages = value
                        .parse::<usize>()
                        .map_err(|_| format!("invalid page count '{}'", value))?;
                    max_pages = Some(pages);
                },
                "--font-dir" => {
                    i += 1;
                    let dir = args.get(i).ok_or("--font-dir needs a value")?;
                    font_dirs.push(PathBuf::from(dir));
                },
                "--report" => report = true,
                "--help" | "-h" => return Err(String::new()),
                flag if flag.starts_with("--") => return Err(format!("unknown option '{}'", flag)),
                _ => positional.push(args[i].clone()),
            }
            i += 1;
        }

        let [input, standard, output]: [String; 3] = positional
            .try_into()
            .map_err(|_| "expected <input.pdf> <standard> <output.pdf>".to_string())?;
        Ok(Self {
            input: PathBuf::from(input),
            standard,
            output: PathBuf::from(output),
            max_pages,
            font_dirs,
            report,
        })
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let config = match CliConfig::from_args() {
        Ok(config) => config,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("Error: {}", message);
            }
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        },
    };

    let input = match std::fs::read(&config.input) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Error reading {}: {}", config.input.display(), e);
            return ExitCode::from(2);
        },
    };
    let request = match ConversionRequest::new(&input, &config.standard) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        },
    };

    let mut options = ConversionOptions::default();
    if let Some(pages) = config.max_pages {
        options = options.with_page_limit(MaxPages(pages));
    }
    if !config.font_dirs.is_empty() {
        match DirectoryFontSource::scan(config.font_dirs.as_slice()) {
            Ok(source) => {
                log::info!("Indexed {} font program(s)", source.len());
                options = options.with_font_source(source);
            },
            Err(e) => {
                eprintln!("Error scanning font directories: {}", e);
                return ExitCode::from(2);
            },
        }
    }

    match Converter::new(options).convert_detailed(&request) {
        Ok(outcome) => {
            if config.report {
                match serde_json::to_string_pretty(&outcome.report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => eprintln!("Error encoding report: {}", e),
                }
            }
            if let Err(e) = std::fs::write(&config.output, &outcome.bytes) {
                eprintln!("Error writing {}: {}", config.output.display(), e);
                return ExitCode::from(1);
            }
            eprintln!(
                "✓ {} → {} (PDF/A-{}, {} fix(es))",
                config.input.display(),
                config.output.display(),
                request.standard().code(),
                outcome.report.fixes.len()
            );
            ExitCode::SUCCESS
        },
        Err(e) => {
            if config.report {
                let failure = serde_json::json!({
                    "passed": false,
                    "kind": e.kind(),
                    "message": e.to_string(),
                });
                println!("{}", failure);
            }
            eprintln!("✗ {}: {}", config.input.display(), e);
            ExitCode::from(1)
        },
    }
}
