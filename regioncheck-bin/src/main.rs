use clap::Parser;
use regioncheck_lib::{Config, Options, Outcome, print_and_exit, probe::Selection};
use std::{env, path::PathBuf, process::exit};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser, value_name = "DIRECTORY")]
    directory: Option<PathBuf>,

    #[clap(
        short,
        long,
        value_parser,
        value_name = "FILE",
        default_value = "config.yaml",
        help = "Specify configuration file"
    )]
    config: PathBuf,

    #[clap(
        short,
        long,
        value_name = "SERVICE",
        help = "Probe this service instead of the configured one"
    )]
    service: Option<String>,

    #[clap(
        short,
        long,
        action,
        help = "Test configuration and exit"
    )]
    test_config: bool,

    #[clap(short, long, help = "Additionally log to file")]
    log_file: Option<String>,

    #[clap(long, action, help = "Print the report as JSON")]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let cwd = cli
        .directory
        .map(Ok)
        .unwrap_or_else(env::current_dir)
        .unwrap_or_else(|e| print_and_exit!("cwd error: {}", e));

    let file = if cli.config.is_absolute() {
        cli.config
    } else {
        cwd.join(cli.config)
    };
    if !file.exists() {
        print_and_exit!("config file not found: {}", file.to_string_lossy());
    }

    if cli.test_config {
        match Config::File(file.to_string_lossy().to_string()).try_parse() {
            Ok(_) => {
                println!(
                    "configuration file {} test is successful",
                    file.to_string_lossy()
                );
                exit(0);
            }
            Err(e) => {
                eprintln!(
                    "configuration file {} test failed: {}",
                    file.to_string_lossy(),
                    e
                );
                exit(1);
            }
        }
    }

    let result = regioncheck_lib::start_scaffold(Options {
        config: Config::File(file.to_string_lossy().to_string()),
        cwd: Some(cwd.to_string_lossy().to_string()),
        service: cli.service,
        rt: None,
        log_file: cli.log_file,
    });

    match result {
        Ok(selection) if cli.json => match serde_json::to_string_pretty(&selection) {
            Ok(s) => println!("{s}"),
            Err(e) => print_and_exit!("failed to encode report: {}", e),
        },
        Ok(selection) => print_report(&selection),
        Err(e) => print_and_exit!("{}", e),
    }
}

fn print_report(selection: &Selection) {
    println!("service: {}", selection.service);
    for report in &selection.reports {
        match &report.outcome {
            Outcome::Excluded(e) => {
                println!("  {:<24} error: {}", report.outbound.as_str(), e)
            }
            Outcome::Classified(c) => println!(
                "  {:<24} {:<16} allowed: {:<5} cost: {}ms",
                report.outbound.as_str(),
                c.category.to_string(),
                c.allowed,
                c.cost.as_millis()
            ),
        }
    }
    println!(
        "selected: {} ({}, {}ms)",
        selection.selected,
        selection.classification.category,
        selection.classification.cost.as_millis()
    );
}
