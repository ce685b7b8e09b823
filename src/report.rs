//! Result records and output rendering: BLAST tabular (`.m8`, `.m9`) and
//! pairwise (`.m0`) formats.

use std::io::Write;

use crate::alphabet::untranslate_range;
use crate::error::*;
use crate::hits::StatsHolder;
use crate::index::Database;
use crate::matrix::ScoringScheme;
use crate::query::QuerySet;

/// Per-alignment tallies; each is bounded by `align_len`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AlignStats {
    pub identity: u32,
    pub positives: u32,
    pub mismatches: u32,
    pub gaps: u32,
    pub gap_opens: u32,
    pub align_len: u32,
}

/// Tally the two alignment rows.
pub fn alignment_stats(row0: &[u8], row1: &[u8], scheme: &ScoringScheme) -> AlignStats {
    debug_assert_eq!(row0.len(), row1.len());
    let mut stats = AlignStats { align_len: row0.len() as u32, ..Default::default() };
    let mut in_gap = false;
    for (&a, &b) in row0.iter().zip(row1.iter()) {
        if a == b'-' || b == b'-' {
            stats.gaps += 1;
            if !in_gap {
                stats.gap_opens += 1;
                in_gap = true;
            }
            continue;
        }
        in_gap = false;
        if a == b {
            stats.identity += 1;
            stats.positives += 1;
        } else {
            stats.mismatches += 1;
            if scheme.score(a, b) > 0 {
                stats.positives += 1;
            }
        }
    }
    stats
}

/// One reported alignment, in translated-record coordinates plus frames.
#[derive(Clone, Debug)]
pub struct BlastMatch {
    /// Source subject record.
    pub subject: u32,
    pub qframe: i8,
    pub sframe: i8,
    pub qstart: usize,
    pub qend: usize,
    pub sstart: usize,
    pub send: usize,
    pub score: i32,
    pub bit_score: f64,
    pub evalue: f64,
    pub row0: Vec<u8>,
    pub row1: Vec<u8>,
    pub stats: AlignStats,
}

impl BlastMatch {
    pub fn percent_identity(&self) -> f64 {
        if self.stats.align_len == 0 {
            return 0.0;
        }
        self.stats.identity as f64 * 100.0 / self.stats.align_len as f64
    }
}

/// All surviving matches of one source query.
pub struct BlastRecord {
    pub query: u32,
    pub matches: Vec<BlastMatch>,
}

impl BlastRecord {
    /// Order by ascending E-value, descending bit score, ascending subject
    /// id, then cap at `max_matches`, counting the overflow.
    pub fn finalize(&mut self, max_matches: usize, stats: &mut StatsHolder) {
        self.matches.sort_by(|a, b| {
            a.evalue
                .partial_cmp(&b.evalue)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.bit_score.partial_cmp(&a.bit_score).unwrap_or(std::cmp::Ordering::Equal))
                .then(a.subject.cmp(&b.subject))
        });
        if self.matches.len() > max_matches {
            stats.hits_abundant += (self.matches.len() - max_matches) as u64;
            self.matches.truncate(max_matches);
        }
    }
}

/// The closed output column set for `-oc`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Column {
    QSeqId,
    SSeqId,
    PIdent,
    Length,
    Mismatch,
    GapOpen,
    Gaps,
    Positive,
    QStart,
    QEnd,
    SStart,
    SEnd,
    EValue,
    BitScore,
    Score,
    QFrame,
    SFrame,
    QLen,
    SLen,
}

impl Column {
    pub fn from_str(s: &str) -> LocustResult<Column> {
        match s {
            "qseqid" => Ok(Column::QSeqId),
            "sseqid" => Ok(Column::SSeqId),
            "pident" => Ok(Column::PIdent),
            "length" => Ok(Column::Length),
            "mismatch" => Ok(Column::Mismatch),
            "gapopen" => Ok(Column::GapOpen),
            "gaps" => Ok(Column::Gaps),
            "positive" => Ok(Column::Positive),
            "qstart" => Ok(Column::QStart),
            "qend" => Ok(Column::QEnd),
            "sstart" => Ok(Column::SStart),
            "send" => Ok(Column::SEnd),
            "evalue" => Ok(Column::EValue),
            "bitscore" => Ok(Column::BitScore),
            "score" => Ok(Column::Score),
            "qframe" => Ok(Column::QFrame),
            "sframe" => Ok(Column::SFrame),
            "qlen" => Ok(Column::QLen),
            "slen" => Ok(Column::SLen),
            _ => Err(LocustError::InvalidOption(format!("unknown output column: {}", s))),
        }
    }

    pub fn name(&self) -> &'static str {
        match *self {
            Column::QSeqId => "qseqid",
            Column::SSeqId => "sseqid",
            Column::PIdent => "pident",
            Column::Length => "length",
            Column::Mismatch => "mismatch",
            Column::GapOpen => "gapopen",
            Column::Gaps => "gaps",
            Column::Positive => "positive",
            Column::QStart => "qstart",
            Column::QEnd => "qend",
            Column::SStart => "sstart",
            Column::SEnd => "send",
            Column::EValue => "evalue",
            Column::BitScore => "bitscore",
            Column::Score => "score",
            Column::QFrame => "qframe",
            Column::SFrame => "sframe",
            Column::QLen => "qlen",
            Column::SLen => "slen",
        }
    }

    /// Parse a `-oc` list, comma or whitespace separated.
    pub fn parse_list(s: &str) -> LocustResult<Vec<Column>> {
        let cols: Vec<Column> = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|tok| !tok.is_empty())
            .map(Column::from_str)
            .collect::<LocustResult<_>>()?;
        if cols.is_empty() {
            return Err(LocustError::InvalidOption("empty output column list".to_string()));
        }
        Ok(cols)
    }

    /// The standard 12-column BLAST tabular set.
    pub fn default_set() -> Vec<Column> {
        vec![Column::QSeqId,
             Column::SSeqId,
             Column::PIdent,
             Column::Length,
             Column::Mismatch,
             Column::GapOpen,
             Column::QStart,
             Column::QEnd,
             Column::SStart,
             Column::SEnd,
             Column::EValue,
             Column::BitScore]
    }
}

/// Output format, selected by the output path suffix.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputFormat {
    /// Plain TSV.
    Tabular,
    /// TSV with `# ...` comment lines between queries.
    TabularComment,
    /// Pairwise text rendering.
    Pairwise,
}

impl OutputFormat {
    pub fn from_path(path: &str) -> OutputFormat {
        if path.ends_with(".m9") {
            OutputFormat::TabularComment
        } else if path.ends_with(".m0") {
            OutputFormat::Pairwise
        } else {
            OutputFormat::Tabular
        }
    }
}

fn format_evalue(e: f64) -> String {
    if e <= 1e-180 {
        "0.0".to_string()
    } else if e < 1e-3 {
        format!("{:.2e}", e)
    } else {
        format!("{:.3}", e)
    }
}

/// Writes finished records. Ownership by the single pipeline consumer
/// serializes all writes; records may appear in any query order.
pub struct Reporter<W: Write> {
    writer: W,
    format: OutputFormat,
    columns: Vec<Column>,
    db_name: String,
}

impl<W: Write> Reporter<W> {
    pub fn new(writer: W, format: OutputFormat, columns: Vec<Column>, db_name: &str) -> Reporter<W> {
        Reporter { writer, format, columns, db_name: db_name.to_string() }
    }

    pub fn write_record(&mut self,
                        record: &BlastRecord,
                        queries: &QuerySet,
                        db: &Database,
                        scheme: &ScoringScheme)
                        -> LocustResult<()> {
        match self.format {
            OutputFormat::Tabular => self.write_tabular(record, queries, db, false)?,
            OutputFormat::TabularComment => self.write_tabular(record, queries, db, true)?,
            OutputFormat::Pairwise => self.write_pairwise(record, queries, db, scheme)?,
        }
        self.writer.flush()?;
        Ok(())
    }

    fn write_tabular(&mut self,
                     record: &BlastRecord,
                     queries: &QuerySet,
                     db: &Database,
                     comments: bool)
                     -> LocustResult<()> {
        let qid = queries.ids.get_str(record.query as usize)?.to_string();
        if comments {
            let fields: Vec<&str> = self.columns.iter().map(|c| c.name()).collect();
            writeln!(self.writer, "# Query: {}", qid)?;
            writeln!(self.writer, "# Database: {}", self.db_name)?;
            writeln!(self.writer, "# Fields: {}", fields.join(", "))?;
            writeln!(self.writer, "# {} hits found", record.matches.len())?;
        }

        for m in &record.matches {
            let mut fields = Vec::with_capacity(self.columns.len());
            let (qs, qe) = self.query_coords(m, queries, record.query);
            let (ss, se) = self.subject_coords(m, db);
            for col in &self.columns {
                fields.push(match *col {
                    Column::QSeqId => qid.clone(),
                    Column::SSeqId => db.ids.get_str(m.subject as usize)?.to_string(),
                    Column::PIdent => format!("{:.3}", m.percent_identity()),
                    Column::Length => m.stats.align_len.to_string(),
                    Column::Mismatch => m.stats.mismatches.to_string(),
                    Column::GapOpen => m.stats.gap_opens.to_string(),
                    Column::Gaps => m.stats.gaps.to_string(),
                    Column::Positive => m.stats.positives.to_string(),
                    Column::QStart => qs.to_string(),
                    Column::QEnd => qe.to_string(),
                    Column::SStart => ss.to_string(),
                    Column::SEnd => se.to_string(),
                    Column::EValue => format_evalue(m.evalue),
                    Column::BitScore => format!("{:.1}", m.bit_score),
                    Column::Score => m.score.to_string(),
                    Column::QFrame => m.qframe.to_string(),
                    Column::SFrame => m.sframe.to_string(),
                    Column::QLen => queries.source_len(record.query as usize).to_string(),
                    Column::SLen => db.source_len(m.subject as usize).to_string(),
                });
            }
            writeln!(self.writer, "{}", fields.join("\t"))?;
        }
        Ok(())
    }

    fn query_coords(&self, m: &BlastMatch, queries: &QuerySet, query: u32) -> (usize, usize) {
        let unit = if queries.frames == 6 { 3 } else { 1 };
        untranslate_range(m.qframe, unit, m.qstart, m.qend, queries.source_len(query as usize))
    }

    fn subject_coords(&self, m: &BlastMatch, db: &Database) -> (usize, usize) {
        let unit = if db.program.subject_translated() { 3 } else { 1 };
        untranslate_range(m.sframe, unit, m.sstart, m.send, db.source_len(m.subject as usize))
    }

    fn write_pairwise(&mut self,
                      record: &BlastRecord,
                      queries: &QuerySet,
                      db: &Database,
                      scheme: &ScoringScheme)
                      -> LocustResult<()> {
        let qid = queries.ids.get_str(record.query as usize)?;
        writeln!(self.writer, "Query= {}", qid)?;
        writeln!(self.writer)?;
        writeln!(self.writer, "Length={}", queries.source_len(record.query as usize))?;

        let dna = db.program.dna_scoring();
        for m in &record.matches {
            writeln!(self.writer)?;
            writeln!(self.writer, "> {}", db.ids.get_str(m.subject as usize)?)?;
            writeln!(self.writer, "Length={}", db.source_len(m.subject as usize))?;
            writeln!(self.writer)?;
            writeln!(self.writer,
                     " Score = {:.1} bits ({}),  Expect = {}",
                     m.bit_score,
                     m.score,
                     format_evalue(m.evalue))?;
            let len = m.stats.align_len;
            writeln!(self.writer,
                     " Identities = {}/{} ({}%), Positives = {}/{} ({}%), Gaps = {}/{} ({}%)",
                     m.stats.identity,
                     len,
                     percent(m.stats.identity, len),
                     m.stats.positives,
                     len,
                     percent(m.stats.positives, len),
                     m.stats.gaps,
                     len,
                     percent(m.stats.gaps, len))?;
            if queries.frames > 1 || db.program.subject_translated() {
                writeln!(self.writer, " Frame = {:+}/{:+}", m.qframe, m.sframe)?;
            }
            writeln!(self.writer)?;
            self.write_alignment_block(m, queries, db, scheme, dna, record.query)?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    fn write_alignment_block(&mut self,
                             m: &BlastMatch,
                             queries: &QuerySet,
                             db: &Database,
                             scheme: &ScoringScheme,
                             dna: bool,
                             query: u32)
                             -> LocustResult<()> {
        let qunit = if queries.frames == 6 { 3 } else { 1 };
        let sunit = if db.program.subject_translated() { 3 } else { 1 };
        let qlen = queries.source_len(query as usize);
        let slen = db.source_len(m.subject as usize);

        let mut qidx = m.qstart;
        let mut sidx = m.sstart;
        let mut col = 0;
        while col < m.row0.len() {
            let chunk = (m.row0.len() - col).min(60);
            let q_consumed =
                m.row0[col..col + chunk].iter().filter(|&&c| c != b'-').count();
            let s_consumed =
                m.row1[col..col + chunk].iter().filter(|&&c| c != b'-').count();

            let (q_from, q_to) =
                untranslate_range(m.qframe, qunit, qidx, qidx + q_consumed, qlen);
            let (s_from, s_to) =
                untranslate_range(m.sframe, sunit, sidx, sidx + s_consumed, slen);

            let row0 = &m.row0[col..col + chunk];
            let row1 = &m.row1[col..col + chunk];
            let midline: String = row0
                .iter()
                .zip(row1.iter())
                .map(|(&a, &b)| {
                    if a == b'-' || b == b'-' {
                        ' '
                    } else if a == b {
                        if dna { '|' } else { a as char }
                    } else if !dna && scheme.score(a, b) > 0 {
                        '+'
                    } else {
                        ' '
                    }
                })
                .collect();

            writeln!(self.writer,
                     "Query  {:<5} {}  {}",
                     q_from,
                     String::from_utf8_lossy(row0),
                     q_to)?;
            writeln!(self.writer, "       {:<5} {}", "", midline)?;
            writeln!(self.writer,
                     "Sbjct  {:<5} {}  {}",
                     s_from,
                     String::from_utf8_lossy(row1),
                     s_to)?;
            writeln!(self.writer)?;

            qidx += q_consumed;
            sidx += s_consumed;
            col += chunk;
        }
        Ok(())
    }
}

fn percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        0
    } else {
        (part * 100 + whole / 2) / whole
    }
}
