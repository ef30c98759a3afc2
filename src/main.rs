use std::io::Write;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use xml_session::cli::{Cli, VerbosityLevel};
use xml_session::config::{Config, ConfigManager};
use xml_session::error_reporter::ErrorReporter;
use xml_session::output::{Output, QueryOutcome, RunReport, ValueSummary};
use xml_session::{DocumentSession, SessionOptions, with_session};

/// Exit code for a failed session (parse, schema, validation or query error)
const EXIT_SESSION_ERROR: u8 = 1;
/// Exit code for an unusable configuration
const EXIT_CONFIG_ERROR: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let config = match ConfigManager::load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            ErrorReporter::new(cli.verbosity()).report_config_error(&e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let verbosity = VerbosityLevel::from_flags(
        config.output.verbose,
        config.output.debug,
        config.output.quiet,
    );
    init_logging(verbosity);

    match run(&cli, &config, verbosity) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_SESSION_ERROR)
        }
    }
}

/// Install the stderr subscriber; `RUST_LOG` overrides the verbosity-derived filter
fn init_logging(verbosity: VerbosityLevel) {
    let default_filter = match verbosity {
        VerbosityLevel::Quiet => "warn",
        VerbosityLevel::Normal => "info",
        VerbosityLevel::Verbose => "debug",
        VerbosityLevel::Debug => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: &Cli, config: &Config, verbosity: VerbosityLevel) -> anyhow::Result<ExitCode> {
    xml_session::init();

    let started = Instant::now();
    let output = Output::new(verbosity, config.output.format.into());
    let reporter = ErrorReporter::new(verbosity);

    let options = SessionOptions {
        xml_path: cli.xml.clone(),
        schema_path: cli.schema.clone(),
        loader: config.loader_options(),
        namespaces: config.namespaces(),
    };
    tracing::debug!(?options, "starting session");

    let mut run = RunReport::new(&cli.xml, cli.schema.clone());
    let result = with_session(options, |session| collect(cli, session, &mut run));
    run.duration = started.elapsed();

    let (print_run, code) = match &result {
        Ok(()) => (true, ExitCode::SUCCESS),
        Err(error) => {
            reporter.report_session_error(error);
            match error.report() {
                Some(report) => {
                    run.valid = false;
                    run.report = report.clone();
                    (true, ExitCode::from(EXIT_SESSION_ERROR))
                }
                None => (false, ExitCode::from(EXIT_SESSION_ERROR)),
            }
        }
    };

    if print_run {
        let rendered = output
            .format_run(&run)
            .context("failed to render run output")?;
        if !rendered.is_empty() {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", rendered.trim_end_matches('\n'))
                .context("failed to write to stdout")?;
        }
    }

    Ok(code)
}

/// Perform every requested operation while the document is loaded
fn collect(cli: &Cli, session: &DocumentSession, run: &mut RunReport) -> xml_session::Result<()> {
    run.report = session.validation_report().clone();

    if cli.root {
        run.root = Some(session.root()?.name());
    }

    for query in &cli.xpath {
        let value = session.xpath_value(query)?;
        run.queries.push(QueryOutcome::Xpath {
            query: query.clone(),
            result: ValueSummary::from(&value),
        });
    }

    for query in &cli.serialize {
        let fragments = session
            .xpath(query)?
            .iter()
            .map(|node| {
                session
                    .node_to_string(node)
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            })
            .collect::<xml_session::Result<Vec<_>>>()?;
        run.queries.push(QueryOutcome::Serialize {
            query: query.clone(),
            fragments,
        });
    }

    for query in &cli.tree {
        let trees = session
            .xpath(query)?
            .iter()
            .map(|node| session.tree(node))
            .collect::<xml_session::Result<Vec<_>>>()?;
        run.queries.push(QueryOutcome::Tree {
            query: query.clone(),
            trees,
        });
    }

    Ok(())
}
