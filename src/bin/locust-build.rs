#[macro_use]
extern crate log;

extern crate bio;
extern crate clap;

extern crate locust;

use bio::io::fasta;
use clap::{App, Arg};

use locust::alphabet::{Program, Reduction};
use locust::builder::{build_and_write_index, BuildOptions};
use locust::index::IndexKind;
use locust::util;

fn main() {
    let args = App::new("locust-build")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Index construction for the locust local alignment search tool.")
        .arg(Arg::with_name("FASTA")
            .short("f")
            .long("fasta")
            .help("Path to the FASTA database file.")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("DB")
            .short("d")
            .long("db")
            .help("Database path the artifact family is written under.")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("PROGRAM")
            .short("p")
            .long("program")
            .help("Program the index will serve.")
            .possible_values(&["blastn", "blastp", "blastx", "tblastn", "tblastx"])
            .takes_value(true)
            .default_value("blastp"))
        .arg(Arg::with_name("INDEX_KIND")
            .long("di")
            .help("Index kind to build.")
            .possible_values(&["sa", "fm"])
            .takes_value(true)
            .default_value("fm"))
        .arg(Arg::with_name("REDUCTION")
            .long("ar")
            .help("Amino-acid alphabet reduction of the seeding text.")
            .possible_values(&["none", "murphy10"])
            .takes_value(true)
            .default_value("murphy10"))
        .arg(Arg::with_name("GENETIC_CODE")
            .short("g")
            .long("genetic-code")
            .help("NCBI genetic code id for subject translation.")
            .takes_value(true)
            .default_value("1"))
        .arg(Arg::with_name("OCC_INTERVAL")
            .long("sample-interval")
            .help("BWT occurrence sampling rate of the FM index.")
            .takes_value(true)
            .default_value("64"))
        .arg(Arg::with_name("SA_SAMPLE_RATE")
            .long("sa-sample")
            .help("Suffix array sampling rate of the FM index.")
            .takes_value(true)
            .default_value("32"))
        .arg(Arg::with_name("MASK_WINDOW")
            .long("mask-window")
            .help("Window length of the low-complexity scan.")
            .takes_value(true)
            .default_value("12"))
        .arg(Arg::with_name("MASK_ENTROPY")
            .long("mask-entropy")
            .help("Entropy threshold (bits) below which a window is masked.")
            .takes_value(true))
        .arg(Arg::with_name("VERBOSE")
            .short("v")
            .help("Include this flag to trigger debug-level logging."))
        .get_matches();

    // setup logger
    util::init_logging(if args.is_present("VERBOSE") {
        log::LogLevelFilter::Debug
    } else {
        log::LogLevelFilter::Info
    });

    let exit_code = {
        let program = match Program::from_str(args.value_of("PROGRAM").unwrap()) {
            Ok(p) => p,
            Err(why) => {
                error!("{}", why);
                std::process::exit(why.exit_code());
            },
        };

        let mut opts = BuildOptions::new(program);

        opts.kind = match IndexKind::from_str(args.value_of("INDEX_KIND").unwrap()) {
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

        opts.genetic_code = args.value_of("GENETIC_CODE")
            .unwrap()
            .parse::<u32>()
            .expect("Invalid genetic code entered!");
        opts.occ_interval = args.value_of("OCC_INTERVAL")
            .unwrap()
            .parse::<u32>()
            .expect("Invalid occurrence sample interval entered!");
        opts.sa_sample = args.value_of("SA_SAMPLE_RATE")
            .unwrap()
            .parse::<usize>()
            .expect("Invalid suffix array sample interval entered!");
        opts.mask_window = args.value_of("MASK_WINDOW")
            .unwrap()
            .parse::<usize>()
            .expect("Invalid mask window entered!");
        if let Some(s) = args.value_of("MASK_ENTROPY") {
            opts.mask_entropy = s.parse::<f64>().expect("Invalid mask entropy entered!");
        }

        let fasta_path = args.value_of("FASTA").unwrap();
        let db_path = args.value_of("DB").unwrap();

        debug!("Opening FASTA database file...");
        let records = match util::open_maybe_gz(fasta_path) {
            Ok(reader) => fasta::Reader::new(reader).records(),
            Err(why) => {
                error!("Unable to open FASTA database: {}", why);
                std::process::exit(why.exit_code());
            },
        };

        match build_and_write_index(records, db_path, &opts) {
            Ok(_) => {
                info!("Done building and writing index!");
                0
            },
            Err(why) => {
                error!("Error building index: {}", why);
                why.exit_code()
            },
        }
    };

    std::process::exit(exit_code);
}
