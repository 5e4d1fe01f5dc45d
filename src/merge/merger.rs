//! Fragment merging
//!
//! A fragment is the comma-separated output of one worker: some header
//! lines, a column title line containing `[run number]`, then numeric data
//! rows. A fragment may hold several such sections. Each section numbers its
//! runs locally; the merger shifts every section so that its smallest run
//! number lands on the next free global number, then sorts all rows by the
//! varied-parameter columns.
//!
//! A numeric line never disappears silently: a short one inside a data block
//! is a column mismatch, and a data-width one inside a header block is only
//! allowed directly above a title line.

use crate::error::{MergeError, MergeResult};
use crate::merge::format_general;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Title of the run index column
pub const RUN_NUMBER_COLUMN: &str = "[run number]";

/// Title of the step column closing the sort key
pub const STEP_COLUMN: &str = "[step]";

#[derive(Debug, Clone, PartialEq)]
struct Columns {
    titles: Vec<String>,
    run: usize,
    step: Option<usize>,
}

impl Columns {
    fn from_titles(titles: Vec<String>) -> Self {
        let run = titles
            .iter()
            .position(|t| t.contains(RUN_NUMBER_COLUMN))
            .unwrap_or(0);
        let step = titles.iter().position(|t| t.contains(STEP_COLUMN));
        Columns { titles, run, step }
    }

    /// Columns compared when sorting rows
    fn sort_key(&self) -> std::ops::Range<usize> {
        let start = self.run + 1;
        match self.step {
            Some(step) if step >= start => start..step + 1,
            _ => start..self.titles.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Header,
    Data,
}

/// Rows of one section, with their local run numbers
type Block = Vec<(i64, Vec<f64>)>;

/// Accumulates fragments into one consistently numbered table
#[derive(Debug, Default)]
pub struct Merger {
    columns: Option<Columns>,
    header: Vec<String>,
    rows: Vec<Vec<f64>>,
    next_free: Option<i64>,
    sections: usize,
    fragments: usize,
}

/// Result of a merge
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTable {
    /// Header lines of the first section, title line included
    pub header: Vec<String>,

    /// Column titles
    pub columns: Vec<String>,

    /// Sorted, renumbered rows
    pub rows: Vec<Vec<f64>>,

    /// Index of the run number column
    pub run_column: usize,
}

impl Merger {
    pub fn new() -> Self {
        Merger::default()
    }

    /// Number of fragments merged so far
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Parse and merge one fragment
    ///
    /// `name` is only used in error messages. A fragment that fails to parse
    /// leaves the merger unchanged.
    pub fn add_fragment<R: BufRead>(&mut self, name: &str, reader: R) -> MergeResult<()> {
        let mut columns = self.columns.clone();
        let mut header = Vec::new();
        let mut blocks: Vec<Block> = Vec::new();
        let mut state = State::Header;
        // A numeric, data-width line inside a header block. Only accepted
        // directly above a title line.
        let mut stray: Option<usize> = None;

        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|error| MergeError::Read {
                path: PathBuf::from(name),
                error,
            })?;
            let line_no = i + 1;
            let cells: Vec<&str> = line.split(',').map(clean_cell).collect();

            if columns.is_none() {
                // Preamble of the very first section
                if line.contains(RUN_NUMBER_COLUMN) {
                    columns = Some(Columns::from_titles(
                        cells.iter().map(|c| c.to_string()).collect(),
                    ));
                    blocks.push(Block::new());
                    state = State::Data;
                }
                header.push(line);
                continue;
            }
            let Some(cols) = &columns else { continue };

            if line.contains(RUN_NUMBER_COLUMN) {
                if cells.len() != cols.titles.len() || cells.iter().zip(&cols.titles).any(|(a, b)| a != b) {
                    return Err(MergeError::ColumnCountMismatch {
                        source_name: name.to_string(),
                        line: line_no,
                        reason: format!(
                            "column titles [{}] differ from [{}]",
                            cells.join(", "),
                            cols.titles.join(", ")
                        ),
                    });
                }
                stray = None;
                blocks.push(Block::new());
                state = State::Data;
                continue;
            }

            if let Some(at) = stray {
                return Err(stray_row(name, at));
            }

            let numeric = is_numeric(&cells);
            if cells.len() != cols.titles.len() {
                if state == State::Data && numeric {
                    return Err(MergeError::ColumnCountMismatch {
                        source_name: name.to_string(),
                        line: line_no,
                        reason: format!(
                            "data row has {} columns, expected {}",
                            cells.len(),
                            cols.titles.len()
                        ),
                    });
                }
                state = State::Header;
            } else if state == State::Data {
                let row = parse_row(name, line_no, &cells, cols)?;
                if let Some(block) = blocks.last_mut() {
                    block.push(row);
                }
            } else if numeric {
                stray = Some(line_no);
            }
        }

        if let Some(at) = stray {
            return Err(stray_row(name, at));
        }

        // Commit
        if self.columns.is_none() {
            self.header = header;
        }
        self.columns = columns;
        self.fragments += 1;
        let run_column = self.columns.as_ref().map(|c| c.run).unwrap_or(0);
        let sections = blocks.len();
        for block in blocks {
            self.add_block(block, run_column);
        }
        self.sections += sections;

        debug!(fragment = name, sections, rows = self.rows.len(), "merged fragment");
        Ok(())
    }

    /// Merge a fragment held in memory
    pub fn add_str(&mut self, name: &str, text: &str) -> MergeResult<()> {
        self.add_fragment(name, text.as_bytes())
    }

    /// Merge a fragment file
    pub fn add_path(&mut self, path: &Path) -> MergeResult<()> {
        let file = File::open(path).map_err(|error| MergeError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        self.add_fragment(&path.display().to_string(), BufReader::new(file))
    }

    fn add_block(&mut self, block: Block, run_column: usize) {
        let (Some(min), Some(max)) = (
            block.iter().map(|(run, _)| *run).min(),
            block.iter().map(|(run, _)| *run).max(),
        ) else {
            return;
        };

        let offset = self.next_free.map(|next| next - min).unwrap_or(0);
        for (run, mut row) in block {
            row[run_column] = (run + offset) as f64;
            self.rows.push(row);
        }
        self.next_free = Some(max + offset + 1);
    }

    /// Sort the merged rows and hand them out
    pub fn finish(self) -> MergeResult<MergedTable> {
        let columns = self.columns.ok_or(MergeError::NoColumnTitles)?;
        let key = columns.sort_key();

        let mut rows = self.rows;
        rows.sort_by(|a, b| compare_keys(&a[key.clone()], &b[key.clone()]));

        info!(
            fragments = self.fragments,
            sections = self.sections,
            header_lines = self.header.len(),
            columns = columns.titles.len(),
            rows = rows.len(),
            "merged fragments"
        );

        Ok(MergedTable {
            header: self.header,
            columns: columns.titles,
            rows,
            run_column: columns.run,
        })
    }
}

fn is_numeric(cells: &[&str]) -> bool {
    cells.iter().all(|c| c.parse::<f64>().is_ok())
}

fn stray_row(name: &str, line: usize) -> MergeError {
    MergeError::MalformedRecord {
        source_name: name.to_string(),
        line,
        reason: "numeric row inside a header block, no column title line precedes it".to_string(),
    }
}

fn clean_cell(cell: &str) -> &str {
    cell.trim().trim_matches('"')
}

fn parse_row(name: &str, line: usize, cells: &[&str], columns: &Columns) -> MergeResult<(i64, Vec<f64>)> {
    let malformed = |reason: String| MergeError::MalformedRecord {
        source_name: name.to_string(),
        line,
        reason,
    };

    let run_cell = cells[columns.run];
    let run = run_cell
        .parse::<i64>()
        .map_err(|_| malformed(format!("run number '{}' is not an integer", run_cell)))?;

    let mut row = Vec::with_capacity(cells.len());
    for (cell, title) in cells.iter().zip(&columns.titles) {
        let value = cell
            .parse::<f64>()
            .map_err(|_| malformed(format!("'{}' in column '{}' is not a number", cell, title)))?;
        row.push(value);
    }

    Ok((run, row))
}

fn compare_keys(a: &[f64], b: &[f64]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.total_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

impl MergedTable {
    /// Run numbers of the rows, in row order
    pub fn run_numbers(&self) -> Vec<i64> {
        self.rows
            .iter()
            .map(|row| row[self.run_column] as i64)
            .collect()
    }

    /// Write the header verbatim, then one `%g`-formatted line per row
    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        for line in &self.header {
            writeln!(out, "{}", line)?;
        }
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|&x| format_general(x)).collect();
            writeln!(out, "{}", cells.join(","))?;
        }
        out.flush()
    }

    /// Write the table to a file
    pub fn write_file(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        self.write_to(io::BufWriter::new(file))
    }

    /// The table as text
    pub fn to_text(&self) -> String {
        let mut buf = Vec::new();
        // Writing to a Vec cannot fail
        let _ = self.write_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT: &str = r#""BehaviorSpace results (NetLogo 6.0)"
"model.nlogo"
"experiment"
"[run number]","density","[step]","burned"
"0","50","0","0"
"1","60","0","0"
"0","50","1","12.5"
"1","60","1","20"
"#;

    fn merge(fragments: &[&str]) -> MergeResult<MergedTable> {
        let mut merger = Merger::new();
        for (i, text) in fragments.iter().enumerate() {
            merger.add_str(&format!("fragment-{}", i), text)?;
        }
        merger.finish()
    }

    #[test]
    fn test_two_fragments_get_distinct_run_numbers() {
        let table = merge(&[FRAGMENT, FRAGMENT]).unwrap();
        let mut runs = table.run_numbers();
        runs.sort();
        runs.dedup();
        assert_eq!(runs, vec![0, 1, 2, 3]);
        assert_eq!(table.rows.len(), 8);
    }

    #[test]
    fn test_one_based_sections_stay_one_based() {
        let fragment = "[run number],x,[step]\n1,5,0\n2,6,0\n";
        let table = merge(&[fragment, fragment]).unwrap();
        let mut runs = table.run_numbers();
        runs.sort();
        assert_eq!(runs, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_single_fragment_is_unchanged_but_sorted() {
        let table = merge(&[FRAGMENT]).unwrap();
        assert_eq!(table.header.len(), 4);
        assert_eq!(table.columns, vec!["[run number]", "density", "[step]", "burned"]);
        assert_eq!(
            table.rows,
            vec![
                vec![0.0, 50.0, 0.0, 0.0],
                vec![0.0, 50.0, 1.0, 12.5],
                vec![1.0, 60.0, 0.0, 0.0],
                vec![1.0, 60.0, 1.0, 20.0],
            ]
        );
    }

    #[test]
    fn test_output_format() {
        let table = merge(&[FRAGMENT]).unwrap();
        let text = table.to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "\"BehaviorSpace results (NetLogo 6.0)\"");
        assert_eq!(lines[3], "\"[run number]\",\"density\",\"[step]\",\"burned\"");
        assert_eq!(lines[4], "0,50,0,0");
        assert_eq!(lines[5], "0,50,1,12.5");
        assert_eq!(lines.len(), 8);
        assert!(text.ends_with("20\n"));
        assert!(!text.contains(",\n"));
    }

    #[test]
    fn test_sections_within_one_fragment() {
        let text = "title\n[run number],p,[step],y\n0,2,0,1\n0,2,1,2\n\
                    second section\n[run number],p,[step],y\n0,1,0,3\n";
        let table = merge(&[text]).unwrap();
        // Header lines come from the first section only
        assert_eq!(table.header, vec!["title", "[run number],p,[step],y"]);
        assert_eq!(
            table.rows,
            vec![
                vec![1.0, 1.0, 0.0, 3.0],
                vec![0.0, 2.0, 0.0, 1.0],
                vec![0.0, 2.0, 1.0, 2.0],
            ]
        );
    }

    #[test]
    fn test_data_width_line_in_header_block_is_not_data() {
        let text = "[run number],p,[step]\n0,1,0\nnew,header\na,b,c\n[run number],p,[step]\n0,1,0\n";
        let table = merge(&[text]).unwrap();
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_short_numeric_row_is_an_error() {
        let text = "[run number],p,[step],y\n0,1,0,5\n0,1\n1,2,0,7\n1,2,1,8\n";
        match merge(&[text]).unwrap_err() {
            MergeError::ColumnCountMismatch { line, reason, .. } => {
                assert_eq!(line, 3);
                assert!(reason.contains("2 columns, expected 4"));
            }
            other => panic!("expected a column mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_data_rows_without_title_line_are_an_error() {
        let text = "[run number],p,[step]\n0,1,0\nnext run\n1,2,0\n1,2,1\n";
        assert!(matches!(
            merge(&[text]),
            Err(MergeError::MalformedRecord { line: 4, .. })
        ));

        // A lone numeric row at the end of the fragment
        let text = "[run number],p,[step]\n0,1,0\nnext run\n1,2,0\n";
        assert!(matches!(
            merge(&[text]),
            Err(MergeError::MalformedRecord { line: 4, .. })
        ));

        // A second fragment that starts with data
        assert!(matches!(
            merge(&[FRAGMENT, "\"0\",\"50\",\"0\",\"0\"\n"]),
            Err(MergeError::MalformedRecord { line: 1, .. })
        ));
    }

    #[test]
    fn test_numeric_header_line_above_titles_is_kept_out_of_data() {
        // World dimensions written just above the column titles
        let text = "[run number],p,[step]\n0,1,0\n\"BehaviorSpace results\"\n\
                    \"min-pxcor\",\"max-pxcor\",\"min-pycor\"\n\
                    \"-16\",\"16\",\"-16\"\n[run number],p,[step]\n0,2,0\n";
        let table = merge(&[text]).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.run_numbers(), vec![0, 1]);
    }

    #[test]
    fn test_malformed_record() {
        let bad = "[run number],x,[step]\n0,1,0\n1,oops,0\n";
        let err = merge(&[bad]).unwrap_err();
        match err {
            MergeError::MalformedRecord { source_name, line, reason } => {
                assert_eq!(source_name, "fragment-0");
                assert_eq!(line, 3);
                assert!(reason.contains("oops"));
            }
            other => panic!("expected a malformed record, got {:?}", other),
        }

        let bad_run = "[run number],x,[step]\n0.5,1,0\n";
        assert!(matches!(merge(&[bad_run]), Err(MergeError::MalformedRecord { .. })));
    }

    #[test]
    fn test_column_title_mismatch() {
        let other = "[run number],x,[step],extra\n0,1,0,0\n";
        let err = merge(&[FRAGMENT, other]).unwrap_err();
        assert!(matches!(
            err,
            MergeError::ColumnCountMismatch { line: 1, .. }
        ));

        let renamed = "[run number],other,[step],burned\n0,1,0,0\n";
        assert!(matches!(
            merge(&[FRAGMENT, renamed]),
            Err(MergeError::ColumnCountMismatch { .. })
        ));
    }

    #[test]
    fn test_failed_fragment_leaves_merger_unchanged() {
        let mut merger = Merger::new();
        merger.add_str("good", FRAGMENT).unwrap();
        assert!(merger.add_str("bad", "[run number],density,[step],burned\n0,1,x,0\n").is_err());
        assert_eq!(merger.fragments(), 1);
        let table = merger.finish().unwrap();
        assert_eq!(table.rows.len(), 4);
    }

    #[test]
    fn test_no_column_titles() {
        assert!(matches!(merge(&["just,some\n1,2\n"]), Err(MergeError::NoColumnTitles)));
        assert!(matches!(merge(&[]), Err(MergeError::NoColumnTitles)));
    }

    #[test]
    fn test_sort_key_without_step_column() {
        let text = "[run number],b,a\n0,2,9\n1,1,5\n2,2,1\n";
        let table = merge(&[text]).unwrap();
        assert_eq!(table.run_numbers(), vec![1, 2, 0]);
    }

    #[test]
    fn test_add_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rank0.csv");
        std::fs::write(&path, FRAGMENT).unwrap();

        let mut merger = Merger::new();
        merger.add_path(&path).unwrap();
        assert!(matches!(
            merger.add_path(&dir.path().join("missing.csv")),
            Err(MergeError::Read { .. })
        ));
        assert_eq!(merger.finish().unwrap().rows.len(), 4);
    }
}
