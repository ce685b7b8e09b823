#[macro_use]
extern crate log;

extern crate clap;

extern crate locust;

use clap::{App, Arg};

use locust::alphabet::{Program, Reduction};
use locust::index::IndexKind;
use locust::report::Column;
use locust::searcher::{run_search, SearchOptions};
use locust::util;

fn main() {
    let args = App::new("locust-search")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Local alignment search against a locust-build index.")
        .arg(Arg::with_name("QUERY")
            .short("q")
            .long("query")
            .help("Path to FASTA or FASTQ query file.")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("DB")
            .short("d")
            .long("db")
            .help("Database path the index was built for.")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("OUT")
            .short("o")
            .long("out")
            .help("Output path; suffix selects the format (.m8, .m9, .m0).")
            .takes_value(true)
            .default_value("out.m8"))
        .arg(Arg::with_name("PROGRAM")
            .short("p")
            .long("program")
            .possible_values(&["blastn", "blastp", "blastx", "tblastn", "tblastx"])
            .takes_value(true)
            .default_value("blastp"))
        .arg(Arg::with_name("INDEX_KIND")
            .long("di")
            .help("Database index kind.")
            .possible_values(&["sa", "fm"])
            .takes_value(true)
            .default_value("fm"))
        .arg(Arg::with_name("EVALUE")
            .short("e")
            .long("e-value")
            .help("Maximum E-value of reported matches.")
            .takes_value(true)
            .default_value("0.1"))
        .arg(Arg::with_name("IDENTITY")
            .long("id")
            .help("Minimum percent identity of reported matches.")
            .takes_value(true)
            .default_value("0"))
        .arg(Arg::with_name("NUM_MATCHES")
            .long("nm")
            .help("Maximum matches kept per query.")
            .takes_value(true)
            .default_value("256"))
        .arg(Arg::with_name("NUM_THREADS")
            .short("t")
            .long("threads")
            .help("Number of worker threads to spawn.")
            .takes_value(true)
            .default_value("4"))
        .arg(Arg::with_name("SEED_LENGTH")
            .long("sl")
            .help("Seed length in the reduced alphabet.")
            .takes_value(true)
            .default_value("10"))
        .arg(Arg::with_name("SEED_OFFSET")
            .long("so")
            .help("Offset between seed starts.")
            .takes_value(true)
            .default_value("10"))
        .arg(Arg::with_name("SEED_DIST")
            .long("sd")
            .help("Hamming error budget per seed.")
            .takes_value(true)
            .default_value("1"))
        .arg(Arg::with_name("SEED_GRAVITY")
            .long("sg")
            .help("Maximum gap for merging colinear seed hits.")
            .takes_value(true)
            .default_value("10"))
        .arg(Arg::with_name("REDUCTION")
            .long("ar")
            .help("Amino-acid alphabet reduction used for seeding.")
            .possible_values(&["none", "murphy10"])
            .takes_value(true)
            .default_value("murphy10"))
        .arg(Arg::with_name("GENETIC_CODE")
            .short("g")
            .long("genetic-code")
            .help("NCBI genetic code id for translation.")
            .takes_value(true)
            .default_value("1"))
        .arg(Arg::with_name("SCORING")
            .long("sc")
            .help("Scoring matrix: 45/62/80 select a BLOSUM, 0 is blastn match/mismatch.")
            .possible_values(&["0", "45", "62", "80"])
            .takes_value(true)
            .default_value("62"))
        .arg(Arg::with_name("GAP_OPEN")
            .long("go")
            .help("Gap open penalty.")
            .takes_value(true)
            .default_value("11"))
        .arg(Arg::with_name("GAP_EXTEND")
            .long("ge")
            .help("Gap extension penalty.")
            .takes_value(true)
            .default_value("1"))
        .arg(Arg::with_name("MATCH")
            .long("ma")
            .help("blastn match score.")
            .takes_value(true)
            .default_value("2"))
        .arg(Arg::with_name("MISMATCH")
            .long("mi")
            .help("blastn mismatch score.")
            .takes_value(true)
            .default_value("-3"))
        .arg(Arg::with_name("XDROP")
            .short("x")
            .long("x-drop")
            .help("Stop extension when the score drops this far below the best; negative extends to completion.")
            .takes_value(true)
            .default_value("30"))
        .arg(Arg::with_name("BAND")
            .short("b")
            .long("band")
            .help("Band half-width: -3 log of query length, -2 square root, -1 full DP, literal otherwise.")
            .takes_value(true)
            .allow_hyphen_values(true)
            .default_value("-3"))
        .arg(Arg::with_name("DOUBLE_INDEX")
            .long("pd")
            .help("Search a seed trie of whole query blocks against the index.")
            .possible_values(&["on", "off"])
            .takes_value(true)
            .default_value("off"))
        .arg(Arg::with_name("PUTATIVE_ABUNDANT")
            .long("pa")
            .help("Stop collecting hits for queries whose hit quality stops improving.")
            .possible_values(&["on", "off"])
            .takes_value(true)
            .default_value("on"))
        .arg(Arg::with_name("PRE_SCORING")
            .long("ps")
            .help("Pre-scoring window in seed lengths; 0 disables.")
            .takes_value(true)
            .default_value("2"))
        .arg(Arg::with_name("PRE_SCORING_THRESHOLD")
            .long("pt")
            .help("Minimum average per-position score of the pre-scoring window.")
            .takes_value(true)
            .default_value("2.0"))
        .arg(Arg::with_name("COLUMNS")
            .long("oc")
            .help("Output columns, comma separated.")
            .takes_value(true))
        .arg(Arg::with_name("VERBOSITY")
            .short("v")
            .long("verbosity")
            .possible_values(&["0", "1", "2"])
            .takes_value(true)
            .default_value("1"))
        .get_matches();

    let verbosity = args.value_of("VERBOSITY").unwrap().parse::<u8>().unwrap_or(1);

    // setup logger
    util::init_logging(match verbosity {
        0 => log::LogLevelFilter::Warn,
        1 => log::LogLevelFilter::Info,
        _ => log::LogLevelFilter::Debug,
    });

    let exit_code = {
        let program = match Program::from_str(args.value_of("PROGRAM").unwrap()) {
            Ok(p) => p,
            Err(why) => {
                error!("{}", why);
                std::process::exit(why.exit_code());
            },
        };

        let mut opts = SearchOptions::new(program,
                                          args.value_of("QUERY").unwrap(),
                                          args.value_of("DB").unwrap(),
                                          args.value_of("OUT").unwrap());
        opts.verbosity = verbosity;

        opts.index_kind = match IndexKind::from_str(args.value_of("INDEX_KIND").unwrap()) {
            Ok(kind) => kind,
            Err(why) => {
                error!("{}", why);
                std::process::exit(why.exit_code());
            },
        };

        opts.reduction = match Reduction::from_str(args.value_of("REDUCTION").unwrap()) {
            Ok(r) => r,
            Err(why) => {
                error!("{}", why);
                std::process::exit(why.exit_code());
            },
        };

        opts.evalue_cutoff = args.value_of("EVALUE")
            .unwrap()
            .parse::<f64>()
            .expect("Invalid e-value cutoff entered!");
        opts.identity_cutoff = args.value_of("IDENTITY")
            .unwrap()
            .parse::<f64>()
            .expect("Invalid identity cutoff entered!");
        opts.max_matches = args.value_of("NUM_MATCHES")
            .unwrap()
            .parse::<usize>()
            .expect("Invalid match cap entered!");
        opts.threads = args.value_of("NUM_THREADS")
            .unwrap()
            .parse::<usize>()
            .expect("Invalid number entered for number of threads!");
        opts.seed_len = args.value_of("SEED_LENGTH")
            .unwrap()
            .parse::<usize>()
            .expect("Invalid seed length entered!");
        opts.seed_offset = args.value_of("SEED_OFFSET")
            .unwrap()
            .parse::<usize>()
            .expect("Invalid seed offset entered!");
        opts.max_seed_dist = args.value_of("SEED_DIST")
            .unwrap()
            .parse::<u32>()
            .expect("Invalid seed distance entered!");
        opts.seed_gravity = args.value_of("SEED_GRAVITY")
            .unwrap()
            .parse::<u32>()
            .expect("Invalid seed gravity entered!");
        opts.genetic_code = args.value_of("GENETIC_CODE")
            .unwrap()
            .parse::<u32>()
            .expect("Invalid genetic code entered!");
        opts.matrix = args.value_of("SCORING")
            .unwrap()
            .parse::<u32>()
            .expect("Invalid scoring matrix entered!");
        opts.gap_open = args.value_of("GAP_OPEN")
            .unwrap()
            .parse::<i32>()
            .expect("Invalid gap open penalty entered!");
        opts.gap_extend = args.value_of("GAP_EXTEND")
            .unwrap()
            .parse::<i32>()
            .expect("Invalid gap extension penalty entered!");
        opts.match_score = args.value_of("MATCH")
            .unwrap()
            .parse::<i32>()
            .expect("Invalid match score entered!");
        opts.mismatch_score = args.value_of("MISMATCH")
            .unwrap()
            .parse::<i32>()
            .expect("Invalid mismatch score entered!");
        opts.xdrop = args.value_of("XDROP")
            .unwrap()
            .parse::<i32>()
            .expect("Invalid x-drop entered!");
        opts.band = args.value_of("BAND")
            .unwrap()
            .parse::<i32>()
            .expect("Invalid band entered!");
        opts.double_index = args.value_of("DOUBLE_INDEX") == Some("on");
        opts.filter_putative_abundant = args.value_of("PUTATIVE_ABUNDANT") == Some("on");
        opts.pre_scoring = args.value_of("PRE_SCORING")
            .unwrap()
            .parse::<u32>()
            .expect("Invalid pre-scoring window entered!");
        opts.pre_scoring_threshold = args.value_of("PRE_SCORING_THRESHOLD")
            .unwrap()
            .parse::<f64>()
            .expect("Invalid pre-scoring threshold entered!");

        if let Some(list) = args.value_of("COLUMNS") {
            opts.columns = match Column::parse_list(list) {
                Ok(cols) => cols,
                Err(why) => {
                    error!("{}", why);
                    std::process::exit(why.exit_code());
                },
            };
        }

        match run_search(&opts) {
            Ok(stats) => {
                info!("Done: {} matches written.", stats.matches_written);
                0
            },
            Err(why) => {
                error!("Error running search: {}", why);
                why.exit_code()
            },
        }
    };

    std::process::exit(exit_code);
}
