use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

use asmstruct_core::analysis::PASS_NAMES;
use asmstruct_core::pipeline::DebugConfig;
use asmstruct_core::{LoopStrategy, OutputConfig, PipelineConfig, Session};

/// Recover structured control flow from an assembly listing.
#[derive(Parser)]
#[command(name = "asmstruct", version, about)]
struct Cli {
    /// Assembly listing to structure.
    listing: PathBuf,

    /// Generate the structured listing (<stem>.hll).
    #[arg(short = 'c')]
    code: bool,

    /// Generate the graph description (<stem>.dot).
    #[arg(short = 'd')]
    graph: bool,

    /// Annotate graph nodes with structure information (implies -d).
    #[arg(short = 's')]
    structure: bool,

    /// Annotate graph nodes with immediate post-dominators (implies -d).
    #[arg(short = 'p')]
    post_dominators: bool,

    /// Annotate graph nodes with loop and case heads (implies -d).
    #[arg(short = 'H', long)]
    heads: bool,

    /// Annotate graph nodes with reverse order numbers (implies -d).
    #[arg(short = 'r')]
    reverse_order: bool,

    /// Emit block identifiers only, no instructions (implies -c).
    #[arg(short = 'b')]
    blocks_only: bool,

    /// Remove gotos that only jump over closing braces (implies -c).
    #[arg(short = 'g')]
    remove_gotos: bool,

    /// Find loops through the derived sequence of interval graphs.
    #[arg(long)]
    intervals: bool,

    /// JSON opcode table to use instead of the built-in SPARC table.
    #[arg(long, value_name = "FILE")]
    opcodes: Option<PathBuf>,

    /// Output path stem [default: the listing path].
    #[arg(short = 'o', long, value_name = "STEM")]
    output: Option<PathBuf>,

    /// Print the intervals of every derived graph.
    #[arg(long)]
    show_intervals: bool,

    /// Print run statistics.
    #[arg(long)]
    stats: bool,

    /// Print run statistics as JSON.
    #[arg(long, conflicts_with = "stats")]
    stats_json: bool,

    /// Print every procedure's structured graph as JSON.
    #[arg(long)]
    dump_shape: bool,

    /// Stop after the named pass and dump the procedure shapes to stderr.
    #[arg(long, value_name = "PASS", value_parser = clap::builder::PossibleValuesParser::new(PASS_NAMES.iter().copied()))]
    dump_after: Option<String>,

    /// Only dump procedures whose name matches this filter.
    #[arg(long, value_name = "NAME")]
    filter: Option<String>,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn output_config(&self) -> OutputConfig {
        OutputConfig {
            generate_code: self.code,
            generate_graph: self.graph,
            show_structure_info: self.structure,
            show_post_dominators: self.post_dominators,
            show_heads: self.heads,
            show_reverse_order: self.reverse_order,
            blocks_only: self.blocks_only,
            remove_gotos: self.remove_gotos,
        }
        .normalized()
    }

    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let log_config = ConfigBuilder::new().set_time_level(LevelFilter::Off).build();
    // Only fails when a logger is already installed.
    let _ = TermLogger::init(
        cli.log_level(),
        log_config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let strategy = if cli.intervals {
        LoopStrategy::Intervals
    } else {
        LoopStrategy::Stamps
    };
    let config = PipelineConfig {
        output: cli.output_config(),
        strategy,
        opcodes: cli.opcodes.clone(),
        debug: DebugConfig {
            dump_after: cli.dump_after.clone(),
            procedure_filter: cli.filter.clone(),
        },
    };
    let code_requested = config.output.generate_code;

    let session = Session::new(config).context("failed to set up the pipeline")?;
    let out = session
        .run_file(&cli.listing)
        .with_context(|| format!("failed to structure {}", cli.listing.display()))?;

    if cli.show_intervals {
        for proc in &out.program.procedures {
            print!("{}", proc.derived_sequence().report(proc));
        }
    }

    if cli.dump_shape {
        let json = serde_json::to_string_pretty(&out.shapes())
            .context("failed to serialize procedure shapes")?;
        println!("{json}");
    }

    let stem = cli.output.as_ref().unwrap_or(&cli.listing);
    out.write(stem)
        .with_context(|| format!("failed to write output for {}", stem.display()))?;

    if cli.stats {
        let file = cli.listing.display().to_string();
        let generated = code_requested && !out.stopped_early;
        print!("{}", out.metrics.summary(&file, strategy, generated));
    }
    if cli.stats_json {
        let json = serde_json::to_string_pretty(&out.metrics)
            .context("failed to serialize statistics")?;
        println!("{json}");
    }

    Ok(())
}
