//! End-to-end scenarios: build an index in a temporary directory, run the
//! searcher over it, and check the reported records.

extern crate bio;
extern crate locust;
extern crate rand;
extern crate tempfile;

use bio::alphabets::dna::revcomp;
use bio::io::fasta::Reader;
use rand::{Rng, XorShiftRng};
use std::fs;
use std::io::Cursor;
use tempfile::TempDir;

use locust::alphabet::Program;
use locust::builder::{build_and_write_index, BuildOptions};
use locust::index::IndexKind;
use locust::report::Column;
use locust::searcher::{run_search, SearchOptions};

const SUBJECT_30: &str = "MKVLATTREWQHIDNCYGSPWHKTFEEDAR";

struct Fixture {
    dir: TempDir,
    db_path: String,
}

impl Fixture {
    fn build(reference: &str, opts: &BuildOptions) -> Fixture {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("db").to_str().unwrap().to_string();
        let records = Reader::new(Cursor::new(reference.as_bytes())).records();
        build_and_write_index(records, &db_path, opts).unwrap();
        Fixture { dir, db_path }
    }

    fn write_query(&self, content: &str) -> String {
        let path = self.dir.path().join("query.fa");
        fs::write(&path, content).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn out_path(&self, name: &str) -> String {
        self.dir.path().join(name).to_str().unwrap().to_string()
    }

    fn options(&self, program: Program, query: &str, out: &str) -> SearchOptions {
        let mut opts = SearchOptions::new(program, query, &self.db_path, out);
        opts.threads = 1;
        opts.verbosity = 0;
        opts
    }
}

fn read_lines(path: &str) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

/// Deterministic random decoy database, one FASTA record per decoy.
fn random_reference(num_records: usize, min_len: usize, max_len: usize) -> String {
    let mut rng = XorShiftRng::new_unseeded();
    let mut fasta = String::new();
    for i in 0..num_records {
        let len = rng.gen_range(min_len, max_len);
        let seq: String = (0..len).map(|_| ['A', 'C', 'G', 'T'][rng.gen::<usize>() % 4]).collect();
        fasta.push_str(&format!(">d{}\n{}\n", i, seq));
    }
    fasta
}

#[test]
fn planted_subject_ranks_first_among_random_decoys() {
    let planted = "ACGATTACAGGCATCGTTGACCTTGCAGGC";
    let mut reference = random_reference(20, 80, 120);
    reference.push_str(&format!(">planted\n{}\n", planted));
    let fx = Fixture::build(&reference, &BuildOptions::new(Program::BlastN));

    let query = fx.write_query(&format!(">q1\n{}\n", planted));
    let out = fx.out_path("out.m8");
    let stats = run_search(&fx.options(Program::BlastN, &query, &out)).unwrap();

    // chance decoy alignments may trail it, but the planted copy is the
    // best match of the record and sorts first
    let lines = read_lines(&out);
    assert!(!lines.is_empty());
    let fields: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!("q1", fields[0]);
    assert_eq!("planted", fields[1]);
    assert_eq!("100.000", fields[2]);
    assert_eq!("1", fields[6]);
    assert_eq!("30", fields[7]);
    assert!(stats.matches_written >= 1);
}

#[test]
fn identical_query_yields_one_full_identity_match() {
    let reference = format!(">s1\n{}GGGGGSSSSSKKKKKLLLLL\n>s2\nWWWWWHHHHHCCCCCPPPPPDDDDDNNNNN\n",
                            SUBJECT_30);
    let fx = Fixture::build(&reference, &BuildOptions::new(Program::BlastP));
    let query = fx.write_query(&format!(">q1\n{}\n", SUBJECT_30));
    let out = fx.out_path("out.m8");

    let opts = fx.options(Program::BlastP, &query, &out);
    let stats = run_search(&opts).unwrap();

    let lines = read_lines(&out);
    assert_eq!(1, lines.len(), "output: {:?}", lines);
    let fields: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!(12, fields.len());
    assert_eq!("q1", fields[0]);
    assert_eq!("s1", fields[1]);
    assert_eq!("100.000", fields[2]);
    assert_eq!("30", fields[3]); // alignment length
    assert_eq!("0", fields[4]); // mismatches
    assert_eq!("0", fields[5]); // gap opens
    assert_eq!("1", fields[6]);
    assert_eq!("30", fields[7]);
    assert_eq!("1", fields[8]);
    assert_eq!("30", fields[9]);
    let evalue: f64 = fields[10].parse().unwrap();
    assert!(evalue < opts.evalue_cutoff);

    assert_eq!(1, stats.matches_written);
    assert_eq!(1, stats.queries);
}

#[test]
fn raw_score_is_the_sum_of_diagonal_matrix_entries() {
    let reference = format!(">s1\n{}\n>s2\nWWWWWHHHHHCCCCCPPPPPDDDDDNNNNN\n", SUBJECT_30);
    let fx = Fixture::build(&reference, &BuildOptions::new(Program::BlastP));
    let query = fx.write_query(&format!(">q1\n{}\n", SUBJECT_30));
    let out = fx.out_path("out.m8");

    let mut opts = fx.options(Program::BlastP, &query, &out);
    opts.columns = vec![Column::SSeqId, Column::Score];
    let scheme = opts.scheme().unwrap();
    run_search(&opts).unwrap();

    let expected: i32 = SUBJECT_30.bytes().map(|c| scheme.score(c, c)).sum();
    let lines = read_lines(&out);
    assert_eq!(1, lines.len());
    assert_eq!(format!("s1\t{}", expected), lines[0]);
}

#[test]
fn point_substitution_keeps_one_ungapped_match() {
    let reference = format!(">s1\n{}\n>s2\nWWWWWHHHHHCCCCCPPPPPDDDDDNNNNN\n", SUBJECT_30);
    let fx = Fixture::build(&reference, &BuildOptions::new(Program::BlastP));

    let mut mutated = SUBJECT_30.as_bytes().to_vec();
    mutated[15] = b'G'; // C -> G at position 15
    let query = fx.write_query(&format!(">q1\n{}\n", String::from_utf8(mutated).unwrap()));
    let out = fx.out_path("out.m8");

    let opts = fx.options(Program::BlastP, &query, &out);
    run_search(&opts).unwrap();

    let lines = read_lines(&out);
    assert_eq!(1, lines.len(), "output: {:?}", lines);
    let fields: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!("s1", fields[1]);
    let pident: f64 = fields[2].parse().unwrap();
    assert!((pident - 29.0 / 30.0 * 100.0).abs() < 0.01, "pident = {}", pident);
    assert_eq!("30", fields[3]);
    assert_eq!("1", fields[4]); // one mismatch
    assert_eq!("0", fields[5]); // no gaps
}

#[test]
fn reverse_complement_query_reports_the_minus_frame() {
    let subject = "ACGATTACAGGCATCGTTGACCTTGCAGGCAATCGGATTCCAGGTTTCAGATTACCGGAT";
    let reference = format!(">n1\n{}\n", subject);
    let fx = Fixture::build(&reference, &BuildOptions::new(Program::BlastN));

    // a query matching only the reverse complement of the subject
    let query_seq = String::from_utf8(revcomp(&subject.as_bytes()[10..40])).unwrap();
    let query = fx.write_query(&format!(">q1\n{}\n", query_seq));
    let out = fx.out_path("out.m8");

    let mut opts = fx.options(Program::BlastN, &query, &out);
    opts.columns = vec![Column::SSeqId, Column::QFrame, Column::QStart, Column::QEnd,
                        Column::SStart, Column::SEnd, Column::PIdent];
    run_search(&opts).unwrap();

    let lines = read_lines(&out);
    assert_eq!(1, lines.len(), "output: {:?}", lines);
    let fields: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!("n1", fields[0]);
    assert_eq!("-1", fields[1]);
    // minus-frame query coordinates are reported start > end
    let qstart: i64 = fields[2].parse().unwrap();
    let qend: i64 = fields[3].parse().unwrap();
    assert!(qstart > qend);
    // the subject range is the sliced window, one-based
    assert_eq!("11", fields[4]);
    assert_eq!("40", fields[5]);
    assert_eq!("100.000", fields[6]);
}

#[test]
fn match_cap_truncates_and_counts_abundant_hits() {
    let mut reference = String::new();
    for i in 0..5 {
        reference.push_str(&format!(">s{}\n{}\n", i, SUBJECT_30));
    }
    let fx = Fixture::build(&reference, &BuildOptions::new(Program::BlastP));
    let query = fx.write_query(&format!(">q1\n{}\n", SUBJECT_30));
    let out = fx.out_path("out.m8");

    let mut opts = fx.options(Program::BlastP, &query, &out);
    opts.max_matches = 2;
    opts.filter_putative_abundant = false;
    let stats = run_search(&opts).unwrap();

    let lines = read_lines(&out);
    assert_eq!(2, lines.len());
    assert_eq!(3, stats.hits_abundant);
    assert_eq!(2, stats.matches_written);
}

#[test]
fn suffix_array_and_fm_index_agree() {
    let reference = format!(">s1\n{}GGGGGSSSSSKKKKKLLLLL\n>s2\nWWWWWHHHHHCCCCCPPPPPDDDDDNNNNN\n",
                            SUBJECT_30);

    let mut sa_build = BuildOptions::new(Program::BlastP);
    sa_build.kind = IndexKind::Sa;
    let fx_sa = Fixture::build(&reference, &sa_build);
    let fx_fm = Fixture::build(&reference, &BuildOptions::new(Program::BlastP));

    let query_content = format!(">q1\n{}\n", SUBJECT_30);
    let q_sa = fx_sa.write_query(&query_content);
    let q_fm = fx_fm.write_query(&query_content);
    let out_sa = fx_sa.out_path("out.m8");
    let out_fm = fx_fm.out_path("out.m8");

    let mut opts_sa = fx_sa.options(Program::BlastP, &q_sa, &out_sa);
    opts_sa.index_kind = IndexKind::Sa;
    run_search(&opts_sa).unwrap();

    let opts_fm = fx_fm.options(Program::BlastP, &q_fm, &out_fm);
    run_search(&opts_fm).unwrap();

    assert_eq!(read_lines(&out_sa), read_lines(&out_fm));
}

#[test]
fn double_indexing_matches_single_indexing() {
    let reference = format!(">s1\n{}GGGGGSSSSSKKKKKLLLLL\n>s2\nWWWWWHHHHHCCCCCPPPPPDDDDDNNNNN\n",
                            SUBJECT_30);
    let fx = Fixture::build(&reference, &BuildOptions::new(Program::BlastP));

    let query_content = format!(">q1\n{}\n>q2\nWWWWWHHHHHCCCCCPPPPPDDDDDNNNNN\n", SUBJECT_30);
    let query = fx.write_query(&query_content);
    let out_single = fx.out_path("single.m8");
    let out_double = fx.out_path("double.m8");

    let opts = fx.options(Program::BlastP, &query, &out_single);
    run_search(&opts).unwrap();

    let mut opts = fx.options(Program::BlastP, &query, &out_double);
    opts.out_path = out_double.clone();
    opts.double_index = true;
    run_search(&opts).unwrap();

    let mut single = read_lines(&out_single);
    let mut double = read_lines(&out_double);
    single.sort();
    double.sort();
    assert_eq!(single, double);
}

#[test]
fn reruns_are_byte_identical() {
    let reference = format!(">s1\n{}\n>s2\nWWWWWHHHHHCCCCCPPPPPDDDDDNNNNN\n", SUBJECT_30);
    let fx = Fixture::build(&reference, &BuildOptions::new(Program::BlastP));
    let query = fx.write_query(&format!(">q1\n{}\n>q2\nWWWWWHHHHHCCCCCPPPPPDDDDDNNNNN\n",
                                        SUBJECT_30));

    let out_a = fx.out_path("a.m8");
    let out_b = fx.out_path("b.m8");
    run_search(&fx.options(Program::BlastP, &query, &out_a)).unwrap();
    run_search(&fx.options(Program::BlastP, &query, &out_b)).unwrap();

    assert_eq!(fs::read(&out_a).unwrap(), fs::read(&out_b).unwrap());
}

#[test]
fn tabular_comment_format_carries_headers() {
    let reference = format!(">s1\n{}\n", SUBJECT_30);
    let fx = Fixture::build(&reference, &BuildOptions::new(Program::BlastP));
    let query = fx.write_query(&format!(">q1\n{}\n", SUBJECT_30));
    let out = fx.out_path("out.m9");

    run_search(&fx.options(Program::BlastP, &query, &out)).unwrap();

    let lines = read_lines(&out);
    assert!(lines[0].starts_with("# Query: q1"));
    assert!(lines.iter().any(|l| l.starts_with("# Fields: ")));
    assert!(lines.iter().any(|l| l.ends_with("hits found")));
    assert_eq!(1, lines.iter().filter(|l| !l.starts_with('#')).count());
}

#[test]
fn pairwise_format_renders_alignment_rows() {
    let reference = format!(">s1\n{}\n", SUBJECT_30);
    let fx = Fixture::build(&reference, &BuildOptions::new(Program::BlastP));
    let query = fx.write_query(&format!(">q1\n{}\n", SUBJECT_30));
    let out = fx.out_path("out.m0");

    run_search(&fx.options(Program::BlastP, &query, &out)).unwrap();

    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("Query= q1"));
    assert!(text.contains("> s1"));
    assert!(text.contains("Identities = 30/30 (100%)"));
    assert!(text.contains(&format!("Query  1     {}  30", SUBJECT_30)));
}

#[test]
fn tblastn_matches_translated_subjects() {
    // n1 encodes SUBJECT_30 in frame +1
    let codons: &[&str] = &["ATG", "AAA", "GTT", "TTA", "GCT", "ACT", "ACT", "CGT", "GAA",
                            "TGG", "CAA", "CAT", "ATT", "GAT", "AAT", "TGT", "TAT", "GGT",
                            "TCT", "CCT", "TGG", "CAT", "AAA", "ACT", "TTT", "GAA", "GAA",
                            "GAT", "GCT", "CGT"];
    let nt: String = codons.concat();
    let reference = format!(">n1\n{}\n", nt);
    let fx = Fixture::build(&reference, &BuildOptions::new(Program::TBlastN));
    let query = fx.write_query(&format!(">q1\n{}\n", SUBJECT_30));
    let out = fx.out_path("out.m8");

    let mut opts = fx.options(Program::TBlastN, &query, &out);
    opts.columns = vec![Column::SSeqId, Column::SFrame, Column::PIdent, Column::SStart,
                        Column::SEnd];
    run_search(&opts).unwrap();

    let lines = read_lines(&out);
    assert_eq!(1, lines.len(), "output: {:?}", lines);
    let fields: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!("n1", fields[0]);
    assert_eq!("1", fields[1]);
    assert_eq!("100.000", fields[2]);
    // nucleotide coordinates of the full 30-codon frame
    assert_eq!("1", fields[3]);
    assert_eq!("90", fields[4]);
}
