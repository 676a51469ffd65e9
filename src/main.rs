use std::io::{self, BufRead, IsTerminal};

use serde_json::json;
use siftline::{Event, Outcome, Pipeline, Record, RuleSetDef, compile_rule_set};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let rules_json = match std::fs::read_to_string(&config.rules_path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("error: cannot read {}: {err}", config.rules_path);
            std::process::exit(2);
        }
    };
    let pipeline = match RuleSetDef::from_json(&rules_json).and_then(|def| compile_rule_set(&def)) {
        Ok(compiled) => compiled.into_pipeline(),
        Err(err) => {
            eprintln!("error: bad rule set: {err}");
            std::process::exit(2);
        }
    };

    match config.input {
        Some(line) => process_line(&pipeline, &line, config.pretty),
        None => {
            if io::stdin().is_terminal() {
                eprintln!("reading log lines from stdin (one per line); use --input for a single line");
            }
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) if !line.is_empty() => process_line(&pipeline, &line, config.pretty),
                    Ok(_) => {}
                    Err(err) => {
                        eprintln!("error: stdin: {err}");
                        std::process::exit(1);
                    }
                }
            }
        }
    }
}

fn process_line(pipeline: &Pipeline, line: &str, pretty: bool) {
    let mut evt = Event::new();
    evt.put("message", json!(line));
    let outcome = pipeline.process(&mut evt);
    evt.put("outcome", json!(format!("{outcome:?}")));
    let rendered = if pretty {
        serde_json::to_string_pretty(evt.as_value())
    } else {
        serde_json::to_string(evt.as_value())
    };
    match rendered {
        Ok(out) => println!("{out}"),
        Err(err) => eprintln!("error: render: {err}"),
    }
    if outcome == Outcome::NoMatch {
        tracing::debug!(line, "no rule matched");
    }
}

struct CliConfig {
    rules_path: String,
    input: Option<String>,
    pretty: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut rules_path: Option<String> = None;
    let mut input: Option<String> = None;
    let mut pretty = false;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("siftline {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--pretty" => pretty = true,
            "--rules" | "-r" => {
                let value = args.next().ok_or_else(|| "error: --rules expects a path".to_string())?;
                rules_path = Some(value);
            }
            "--input" | "-i" => {
                let value = args.next().ok_or_else(|| "error: --input expects a value".to_string())?;
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(value);
            }
            other => return Err(format!("error: unexpected argument {other:?} (try --help)")),
        }
    }

    let rules_path = rules_path.ok_or_else(|| "error: --rules <file> is required".to_string())?;
    Ok(CliConfig { rules_path, input, pretty })
}

fn print_help() {
    println!(
        "siftline — match and enrich log lines with a JSON rule set

USAGE:
    siftline --rules <file> [--input <line>] [--pretty]

OPTIONS:
    -r, --rules <file>   rule definition document (JSON)
    -i, --input <line>   process a single line instead of stdin
        --pretty         pretty-print output records
    -h, --help           show this help
    -V, --version        show version

Each processed record is printed as one JSON object. Set RUST_LOG=siftline=debug
to trace rule selection."
    );
}
