//! Final report: outer join of the stage tables on the sample name.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};
use crate::{
    Error,
    err::add_path,
    ext,
    pipeline::{Layout, Stage},
};

/// Column in the source table.
#[derive(Clone, Copy, Debug)]
enum Col {
    /// Column with the given header.
    Name(&'static str),
    /// Column index, used for tables without header.
    Index(usize),
}

/// Description of a single source table.
struct Source {
    stage: Stage,
    path: PathBuf,
    has_headers: bool,
    key: Col,
    /// Suffixes, removed from the key to obtain the sample name.
    key_suffixes: &'static [&'static str],
    /// Source column and its name in the report.
    columns: &'static [(Col, &'static str)],
}

/// Source tables in the order of joining.
fn sources(layout: &Layout) -> Vec<Source> {
    vec![
        // mlst: file name, species, ST, alleles...
        Source {
            stage: Stage::Mlst,
            path: layout.mlst_table(),
            has_headers: false,
            key: Col::Index(0),
            key_suffixes: &["_assembly.fasta"],
            columns: &[(Col::Index(1), "species"), (Col::Index(2), "ST")],
        },
        Source {
            stage: Stage::Quast,
            path: layout.quast_report(),
            has_headers: true,
            key: Col::Name("Assembly"),
            key_suffixes: &["_assembly"],
            columns: &[
                (Col::Name(CONTIGS_COLUMN), "#contigs"),
                (Col::Name("GC (%)"), "GC (%)"),
                (Col::Name("N50"), "N50"),
                (Col::Name("L50"), "L50"),
                (Col::Name("Total length (>= 0 bp)"), "Total_length"),
                (Col::Name("Largest contig"), "Largest contig"),
            ],
        },
        // sample, mean depth, standard deviation.
        Source {
            stage: Stage::Depth,
            path: layout.overall_depth_table(),
            has_headers: false,
            key: Col::Index(0),
            key_suffixes: &[],
            columns: &[(Col::Index(1), "Avg_readDepth"), (Col::Index(2), "StDev")],
        },
        // Both mates have the same number of reads, the first one is taken.
        Source {
            stage: Stage::FastQc,
            path: layout.multiqc_fastqc_table(),
            has_headers: true,
            key: Col::Name("Sample"),
            key_suffixes: &["_1_val_1", "_2_val_2"],
            columns: &[(Col::Name("Total Sequences"), "#Reads")],
        },
    ]
}

const CONTIGS_COLUMN: &'static str = "# contigs (>= 0 bp)";

/// Loaded table: column names and rows (sample name + values), one row per sample.
struct Table {
    columns: Vec<&'static str>,
    rows: Vec<(String, Vec<String>)>,
}

impl Table {
    fn empty(source: &Source) -> Self {
        Self {
            columns: source.columns.iter().map(|(_, name)| *name).collect(),
            rows: Vec::new(),
        }
    }
}

fn open_tsv(path: &Path, has_headers: bool) -> Result<csv::Reader<std::fs::File>, Error> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(has_headers)
        .flexible(true)
        .quoting(false)
        .from_path(path)
        .map_err(|e| Error::Csv(format!("Cannot open {}: {}", ext::fmt::path(path), e)))
}

/// Finds column index, returns error if the column is absent.
fn column_index(headers: Option<&csv::StringRecord>, col: Col, path: &Path) -> Result<usize, Error> {
    match (col, headers) {
        (Col::Index(i), _) => Ok(i),
        (Col::Name(name), Some(headers)) => headers.iter().position(|h| h.trim() == name)
            .ok_or_else(|| Error::InvalidData(format!("Column {:?} is missing in {}", name, ext::fmt::path(path)))),
        (Col::Name(name), None) => Err(Error::InvalidData(format!("Cannot find column {:?} in {}: no header",
            name, ext::fmt::path(path)))),
    }
}

fn normalize_key(key: &str, suffixes: &[&str]) -> String {
    let key = key.trim();
    // mlst reports files with their directory.
    let key = key.rsplit('/').next().unwrap_or(key);
    for suffix in suffixes {
        if let Some(stripped) = key.strip_suffix(suffix) {
            return stripped.to_owned();
        }
    }
    key.to_owned()
}

fn load(source: &Source) -> crate::Result<Table> {
    let path = &source.path;
    let mut reader = open_tsv(path, source.has_headers)?;
    let headers = if source.has_headers { Some(reader.headers()?.clone()) } else { None };
    let key_ix = column_index(headers.as_ref(), source.key, path)?;
    let col_ixs = source.columns.iter()
        .map(|&(col, _)| column_index(headers.as_ref(), col, path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut table = Table::empty(source);
    let mut seen = HashSet::new();
    for record in reader.records() {
        let record = record?;
        let key = match record.get(key_ix) {
            Some(key) if !key.trim().is_empty() => normalize_key(key, source.key_suffixes),
            _ => continue,
        };
        if !seen.insert(key.clone()) {
            continue;
        }
        let values = col_ixs.iter().map(|&i| record.get(i).unwrap_or("").trim().to_owned()).collect();
        table.rows.push((key, values));
    }
    Ok(table)
}

/// Report table. Rows are keyed by sample name, missing values are empty.
pub struct Report {
    columns: Vec<String>,
    keys: Vec<String>,
    index: HashMap<String, usize>,
    cells: Vec<Vec<String>>,
}

impl Report {
    pub fn new(samples: &[String]) -> Self {
        let mut report = Self {
            columns: Vec::new(),
            keys: Vec::new(),
            index: HashMap::new(),
            cells: Vec::new(),
        };
        for sample in samples {
            report.row(sample);
        }
        report
    }

    /// Returns row index, adds new row if needed.
    fn row(&mut self, key: &str) -> usize {
        if let Some(&i) = self.index.get(key) {
            return i;
        }
        let i = self.keys.len();
        self.keys.push(key.to_owned());
        self.index.insert(key.to_owned(), i);
        self.cells.push(vec![String::new(); self.columns.len()]);
        i
    }

    /// Outer join: rows, absent in the table, get empty values, keys present only in the table are appended.
    fn join(&mut self, table: Table) {
        let offset = self.columns.len();
        self.columns.extend(table.columns.iter().map(|name| name.to_string()));
        for row in self.cells.iter_mut() {
            row.resize(self.columns.len(), String::new());
        }
        for (key, values) in table.rows {
            let i = self.row(&key);
            for (j, value) in values.into_iter().enumerate() {
                self.cells[i][offset + j] = value;
            }
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, key: &str, column: &str) -> Option<&str> {
        let i = *self.index.get(key)?;
        let j = self.columns.iter().position(|col| col == column)?;
        Some(&self.cells[i][j])
    }

    pub fn write(&self, path: &Path) -> Result<(), Error> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .from_path(path)
            .map_err(|e| Error::Csv(format!("Cannot create {}: {}", ext::fmt::path(path), e)))?;
        writer.write_record(std::iter::once("Assembly").chain(self.columns.iter().map(String::as_str)))?;
        for (key, row) in self.keys.iter().zip(&self.cells) {
            writer.write_record(std::iter::once(key).chain(row))?;
        }
        writer.flush().map_err(add_path!(path))
    }
}

/// Builds report for the samples, joining tables of the stages for which `include` returns true.
/// Missing or malformed tables leave their columns empty.
pub fn build(layout: &Layout, samples: &[String], include: impl Fn(Stage) -> bool) -> Report {
    let mut report = Report::new(samples);
    for source in sources(layout) {
        if !include(source.stage) {
            continue;
        }
        let table = match load(&source) {
            Ok(table) => table,
            Err(e) => {
                log::warn!("Report will have no {} values: {}", source.stage, e.display());
                Table::empty(&source)
            }
        };
        report.join(table);
    }
    report
}

/// Builds the report and writes it into `Asmbl_<timestamp>.tsv`.
pub fn write_report(
    layout: &Layout,
    samples: &[String],
    include: impl Fn(Stage) -> bool,
    timestamp: &str,
) -> Result<PathBuf, Error> {
    let report = build(layout, samples, include);
    let path = layout.report(timestamp);
    report.write(&path)?;
    log::info!("Report for {} samples written to {}", report.keys().len(), ext::fmt::path(&path));
    Ok(path)
}

/// Contig count above which resequencing is suggested.
pub const CONSIDER_RESEQUENCING: u64 = 400;
/// Contig count above which resequencing is strongly advised.
pub const ADVISE_RESEQUENCING: u64 = 700;

/// Checks number of contigs in the Quast report and warns about fragmented assemblies.
/// Returns samples with more than `CONSIDER_RESEQUENCING` contigs.
pub fn review_assemblies(quast_report: &Path) -> crate::Result<Vec<(String, u64)>> {
    let mut reader = open_tsv(quast_report, true)?;
    let headers = reader.headers()?.clone();
    let key_ix = column_index(Some(&headers), Col::Name("Assembly"), quast_report)?;
    let contigs_ix = column_index(Some(&headers), Col::Name(CONTIGS_COLUMN), quast_report)?;

    let mut fragmented = Vec::new();
    for record in reader.records() {
        let record = record?;
        let (Some(key), Some(contigs)) = (record.get(key_ix), record.get(contigs_ix)) else { continue };
        let sample = normalize_key(key, &["_assembly"]);
        let contigs: u64 = contigs.trim().parse().map_err(|_| Error::ParsingError(
            format!("Cannot parse number of contigs {:?} for {}", contigs, sample)))?;
        if contigs > ADVISE_RESEQUENCING {
            log::warn!("More than {} contigs in {} ({}). Resequencing advised", ADVISE_RESEQUENCING, sample, contigs);
        } else if contigs > CONSIDER_RESEQUENCING {
            // Exactly `ADVISE_RESEQUENCING` contigs still belongs here.
            log::warn!("More than {} contigs in {} ({}). Consider resequencing", CONSIDER_RESEQUENCING, sample, contigs);
        } else {
            continue;
        }
        fragmented.push((sample, contigs));
    }
    Ok(fragmented)
}
