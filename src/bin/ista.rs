//! Command-line front end (spec §6 CLI surface). An external
//! collaborator around the mining core: argument parsing, transaction
//! file reading and output formatting are not part of the specified
//! algorithm, just plumbing to drive it from a terminal.

use std::env;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process;
use std::time::Instant;

use argparse::{ArgumentParser, Store, StoreOption, StoreTrue};

use ista::driver::{EvalMeasure, Miner, MinerParams};
use ista::itemizer::Itemizer;
use ista::mode::ModeFlags;
use ista::reader::{itemize, TransactionReader};
use ista::reporter::{Reporter, VecReporter};
use ista::repository::{Target, Variant};
use ista::transaction::{SortMode, SupportSpec};

struct Arguments {
    input_path: String,
    output_path: Option<String>,
    target: String,
    z_min: usize,
    z_max: usize,
    s_min: f64,
    s_max: Option<f64>,
    eval: String,
    thresh: f64,
    sort_mode: u32,
    patricia: bool,
    no_prune: bool,
    filter: bool,
    max_only: bool,
    weighted: bool,
    preformat: bool,
    compress: bool,
    no_clean: bool,
    verbose: bool,
    border: Option<String>,
}

fn parse_args_or_exit() -> Arguments {
    let mut args = Arguments {
        input_path: String::new(),
        output_path: None,
        target: "c".to_owned(),
        z_min: 0,
        z_max: usize::MAX,
        s_min: 10.0,
        s_max: None,
        eval: "x".to_owned(),
        thresh: 0.0,
        sort_mode: 4,
        patricia: false,
        no_prune: false,
        filter: false,
        max_only: false,
        weighted: false,
        preformat: false,
        compress: false,
        no_clean: false,
        verbose: false,
        border: None,
    };

    {
        let mut parser = ArgumentParser::new();
        parser.set_description(
            "Closed/maximal frequent item set miner built on an intersection repository.",
        );

        parser
            .refer(&mut args.input_path)
            .add_argument("input_file", Store, "Transaction file to mine.")
            .required();

        parser.refer(&mut args.output_path).add_argument(
            "output_file",
            StoreOption,
            "Optional file to write emitted item sets to (default: stdout).",
        );

        parser.refer(&mut args.target).add_option(
            &["-t"],
            Store,
            "Target: 'c' for closed sets (default), 'm' for maximal sets.",
        );

        parser
            .refer(&mut args.z_min)
            .add_option(&["-m"], Store, "Minimum item set size.");

        parser
            .refer(&mut args.z_max)
            .add_option(&["-n"], Store, "Maximum item set size.");

        parser.refer(&mut args.s_min).add_option(
            &["-s"],
            Store,
            "Minimum support: positive is a percentage of total weight, \
             negative is an absolute transaction count.",
        );

        parser.refer(&mut args.s_max).add_option(
            &["-S"],
            StoreOption,
            "Maximum support, same sign convention as -s.",
        );

        parser.refer(&mut args.eval).add_option(
            &["-e"],
            Store,
            "Secondary evaluation measure: 'x' for none (default), 'b' for binary.",
        );

        parser
            .refer(&mut args.thresh)
            .add_option(&["-d"], Store, "Threshold for the -e evaluation measure.");

        parser.refer(&mut args.sort_mode).add_option(
            &["-q"],
            Store,
            "Transaction sort mode: 0=none 1=ascending 2=descending \
             3=ascending-by-size-sum 4=descending-by-size-sum (default).",
        );

        parser
            .refer(&mut args.patricia)
            .add_option(&["-i"], StoreTrue, "Use the patricia-tree repository variant.");

        parser
            .refer(&mut args.no_prune)
            .add_option(&["-p"], StoreTrue, "Disable residual-driven pruning sweeps.");

        parser.refer(&mut args.filter).add_option(
            &["-j"],
            StoreTrue,
            "Filter maximal sets via the reporter instead of the tree-local criterion.",
        );

        parser
            .refer(&mut args.max_only)
            .add_option(&["-g"], StoreTrue, "Skip the closed-set pass, emit only maximal sets.");

        parser.refer(&mut args.weighted).add_option(
            &["-R"],
            StoreTrue,
            "Transaction records end with an explicit integer weight column.",
        );

        parser
            .refer(&mut args.preformat)
            .add_option(&["-P"], StoreTrue, "Pre-render integer supports in the reporter.");

        parser
            .refer(&mut args.compress)
            .add_option(&["-Z"], StoreTrue, "Ask the reporter to compress its output.");

        parser.refer(&mut args.no_clean).add_option(
            &["-N"],
            StoreTrue,
            "Suppress repository teardown on error paths, for debugging.",
        );

        parser
            .refer(&mut args.verbose)
            .add_option(&["-z"], StoreTrue, "Verbose progress logging.");

        parser.refer(&mut args.border).add_option(
            &["-F"],
            StoreOption,
            "Per-size support border 's1:s2:...' (accepted, not yet applied by the \
             bundled reporter).",
        );

        if env::args().count() == 1 {
            parser.print_help("ista", &mut io::stderr()).unwrap();
            process::exit(1);
        }

        match parser.parse_args() {
            Ok(()) => {}
            Err(code) => process::exit(code),
        }
    }

    args
}

fn support_spec(v: f64) -> SupportSpec {
    if v < 0.0 {
        SupportSpec::Absolute((-v).round() as u64)
    } else {
        SupportSpec::Percentage(v)
    }
}

fn write_sets(
    sets: &[ista::repository::ItemSet],
    itemizer: &Itemizer,
    out: &mut dyn Write,
) -> io::Result<()> {
    for set in sets {
        let names: Vec<&str> = set.items.iter().map(|&i| itemizer.str_of(i)).collect();
        writeln!(out, "{} ({})", names.join(" "), set.supp)?;
    }
    Ok(())
}

fn run(args: &Arguments) -> Result<usize, Box<dyn Error>> {
    log::info!("reading {}", args.input_path);
    let start = Instant::now();

    let mut itemizer = Itemizer::new();
    let reader = TransactionReader::open(&args.input_path, args.weighted)?;
    let raw = itemize(reader, &mut itemizer)?;
    log::debug!(
        "read {} transactions over {} distinct item names in {:?}",
        raw.len(),
        itemizer.len(),
        start.elapsed()
    );

    let target = match args.target.as_str() {
        "c" => Target::Closed,
        "m" => Target::Maximal,
        other => return Err(format!("invalid -t value '{other}', expected 'c' or 'm'").into()),
    };
    let eval = match args.eval.as_str() {
        "x" => EvalMeasure::None,
        "b" => EvalMeasure::Binary,
        other => return Err(format!("invalid -e value '{other}', expected 'x' or 'b'").into()),
    };
    let sort_mode = match args.sort_mode {
        0 => SortMode::NoSort,
        1 => SortMode::Ascending,
        2 => SortMode::Descending,
        3 => SortMode::AscendingBySizeSum,
        4 => SortMode::DescendingBySizeSum,
        other => return Err(format!("invalid -q value '{other}'").into()),
    };

    if let Some(border) = &args.border {
        log::debug!("per-size support border '{border}' accepted but not applied");
    }

    let mut mode_flags = ModeFlags::default();
    mode_flags.set(ModeFlags::PRUNE, !args.no_prune);
    mode_flags.set(ModeFlags::FILTER, args.filter);
    mode_flags.set(ModeFlags::MAX_ONLY, args.max_only);
    mode_flags.set(ModeFlags::PREFORMAT, args.preformat);
    mode_flags.set(ModeFlags::VERBOSE, args.verbose);
    mode_flags.set(ModeFlags::NO_CLEAN, args.no_clean);
    mode_flags.set(ModeFlags::COMPRESS_OUTPUT, args.compress);

    let params = MinerParams {
        target,
        s_min: support_spec(args.s_min),
        s_max: args.s_max.map(support_spec),
        z_min: args.z_min,
        z_max: args.z_max,
        eval,
        thresh: args.thresh,
        variant: if args.patricia { Variant::Patricia } else { Variant::Prefix },
        mode_flags,
    };

    let mut miner = Miner::create(params)?;
    miner.prepare_data(raw, sort_mode)?;

    let mut reporter = VecReporter::new();
    miner.prepare_reporter(&mut reporter)?;

    let timer = Instant::now();
    miner.mine(&mut reporter)?;
    log::info!("mining finished in {:?}", timer.elapsed());

    let sets = reporter.into_sets();
    let count = sets.len();

    match &args.output_path {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path)?);
            write_sets(&sets, &itemizer, &mut out)?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            write_sets(&sets, &itemizer, &mut out)?;
        }
    }

    miner.destroy(true);
    Ok(count)
}

fn main() {
    env_logger::init();
    let args = parse_args_or_exit();
    match run(&args) {
        Ok(count) => log::info!("emitted {count} item sets"),
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(1);
        }
    }
}
