//! locust: local alignment search against an indexed sequence database.
//!
//! Two programs are built from this crate: `locust-build`, which turns a
//! FASTA database into an on-disk index, and `locust-search`, which loads
//! the index and reports gapped local alignments for a set of queries with
//! BLAST-style statistics.

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate quickcheck;

pub mod alphabet;
pub mod builder;
pub mod error;
pub mod extend;
pub mod hits;
pub mod index;
pub mod mask;
pub mod matrix;
pub mod query;
pub mod report;
pub mod search;
pub mod searcher;
pub mod stats;
pub mod store;
pub mod util;
