//! Numeric summaries for tabular (CSV/TSV) documents.
//!
//! Cells that do not coerce to a number are skipped and counted; malformed
//! records are skipped and counted. Nothing here fails the ingest.

/// Extensions treated as tabular, matched case-insensitively.
const TABULAR_EXTENSIONS: [&str; 2] = [".csv", ".tsv"];

/// Characters stripped from a cell before numeric coercion.
const STRIPPED_CHARS: [char; 5] = ['$', '€', '£', '¥', ','];

#[derive(Debug, Clone, PartialEq)]
pub enum CellOutcome {
    Numeric(f64),
    Skipped,
}

/// Per-column accumulator.
#[derive(Debug, Clone, Default)]
struct ColumnStats {
    sum: f64,
    count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TabularSummary {
    /// Summary chunk text, `None` when no column had numeric data.
    pub text: Option<String>,
    pub rows_read: usize,
    pub skipped_cells: usize,
    pub skipped_rows: usize,
}

pub fn is_tabular(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    TABULAR_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn delimiter_for(file_name: &str) -> char {
    if file_name.to_lowercase().ends_with(".tsv") {
        '\t'
    } else {
        ','
    }
}

pub fn coerce_cell(cell: &str) -> CellOutcome {
    let cleaned: String = cell
        .trim()
        .chars()
        .filter(|c| !STRIPPED_CHARS.contains(c))
        .collect();
    match cleaned.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => CellOutcome::Numeric(value),
        _ => CellOutcome::Skipped,
    }
}

/// Summarise the header plus up to `max_rows` data rows.
pub fn summarize(file_name: &str, text: &str, max_rows: usize) -> TabularSummary {
    let mut summary = TabularSummary::default();
    let mut records = Records::new(text, delimiter_for(file_name));

    let header = loop {
        match records.next() {
            Some(Ok(header)) => break header,
            Some(Err(MalformedRecord)) => summary.skipped_rows += 1,
            None => return summary,
        }
    };
    let mut columns = vec![ColumnStats::default(); header.len()];

    while summary.rows_read < max_rows {
        let row = match records.next() {
            Some(Ok(row)) => row,
            Some(Err(MalformedRecord)) => {
                summary.skipped_rows += 1;
                continue;
            }
            None => break,
        };
        summary.rows_read += 1;

        // Cells beyond the header width have no column to land in.
        for (stats, cell) in columns.iter_mut().zip(row.iter()) {
            match coerce_cell(cell) {
                CellOutcome::Numeric(value) => {
                    stats.sum += value;
                    stats.count += 1;
                }
                CellOutcome::Skipped => summary.skipped_cells += 1,
            }
        }
    }

    let lines: Vec<String> = header
        .iter()
        .zip(columns.iter())
        .filter(|(_, stats)| stats.count > 0)
        .map(|(name, stats)| {
            let avg = stats.sum / stats.count as f64;
            format!(
                "{}=sum:{:.2}@count:{}@avg:{:.2}",
                name.trim(),
                stats.sum,
                stats.count,
                avg
            )
        })
        .collect();

    if lines.is_empty() {
        tracing::debug!(file_name, "no numeric columns, skipping summary chunk");
    } else {
        summary.text = Some(format!(
            "CSV numeric summary for {}:\n{}",
            file_name,
            lines.join("\n")
        ));
    }
    if summary.skipped_cells > 0 || summary.skipped_rows > 0 {
        tracing::warn!(
            file_name,
            skipped_cells = summary.skipped_cells,
            skipped_rows = summary.skipped_rows,
            "skipped non-numeric cells or malformed rows"
        );
    }
    summary
}

/// A record whose quoted field never closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MalformedRecord;

/// Minimal RFC 4180 record reader: quoted fields may contain delimiters,
/// newlines and doubled quotes.
struct Records<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    delimiter: char,
}

impl<'a> Records<'a> {
    fn new(text: &'a str, delimiter: char) -> Self {
        Self {
            chars: text.chars().peekable(),
            delimiter,
        }
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Vec<String>, MalformedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        // Skip blank lines between records.
        while matches!(self.chars.peek(), Some('\n') | Some('\r')) {
            self.chars.next();
        }
        self.chars.peek()?;

        let mut fields = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;

        while let Some(c) = self.chars.next() {
            if in_quotes {
                match c {
                    '"' if self.chars.peek() == Some(&'"') => {
                        self.chars.next();
                        field.push('"');
                    }
                    '"' => in_quotes = false,
                    _ => field.push(c),
                }
                continue;
            }
            match c {
                '"' if field.trim().is_empty() => {
                    field.clear();
                    in_quotes = true;
                }
                '\r' => {}
                '\n' => {
                    fields.push(field);
                    return Some(Ok(fields));
                }
                c if c == self.delimiter => fields.push(std::mem::take(&mut field)),
                _ => field.push(c),
            }
        }

        if in_quotes {
            return Some(Err(MalformedRecord));
        }
        fields.push(field);
        Some(Ok(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(text: &str) -> Vec<Result<Vec<String>, MalformedRecord>> {
        Records::new(text, ',').collect()
    }

    #[test]
    fn test_is_tabular() {
        assert!(is_tabular("ledger.csv"));
        assert!(is_tabular("LEDGER.CSV"));
        assert!(is_tabular("export.tsv"));
        assert!(!is_tabular("notes.txt"));
        assert!(!is_tabular("csv"));
    }

    #[test]
    fn test_coerce_cell_strips_currency_and_separators() {
        assert_eq!(coerce_cell("$10.00"), CellOutcome::Numeric(10.0));
        assert_eq!(coerce_cell(" 1,234.50 "), CellOutcome::Numeric(1234.5));
        assert_eq!(coerce_cell("€-3"), CellOutcome::Numeric(-3.0));
        assert_eq!(coerce_cell("n/a"), CellOutcome::Skipped);
        assert_eq!(coerce_cell(""), CellOutcome::Skipped);
        assert_eq!(coerce_cell("inf"), CellOutcome::Skipped);
    }

    #[test]
    fn test_two_row_amount_column() {
        let summary = summarize("ledger.csv", "amt\n\"$10.00\"\n\"$20.00\"\n", 50);
        let text = summary.text.unwrap();
        assert!(text.starts_with("CSV numeric summary for ledger.csv:"));
        assert!(text.contains("amt=sum:30.00@count:2@avg:15.00"));
        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.skipped_cells, 0);
    }

    #[test]
    fn test_non_numeric_columns_omitted() {
        let csv = "name,amount,note\nalice,\"$1,000.00\",x\nbob,oops,y\n";
        let summary = summarize("t.csv", csv, 50);
        let text = summary.text.unwrap();
        assert!(text.contains("amount=sum:1000.00@count:1@avg:1000.00"));
        assert!(!text.contains("name="));
        assert!(!text.contains("note="));
        assert_eq!(summary.skipped_cells, 5);
    }

    #[test]
    fn test_no_numeric_data_means_no_summary() {
        let summary = summarize("t.csv", "a,b\nx,y\n", 50);
        assert!(summary.text.is_none());
    }

    #[test]
    fn test_row_limit() {
        let mut csv = String::from("n\n");
        for _ in 0..80 {
            csv.push_str("1\n");
        }
        let summary = summarize("t.csv", &csv, 50);
        assert_eq!(summary.rows_read, 50);
        assert!(summary.text.unwrap().contains("n=sum:50.00@count:50@avg:1.00"));
    }

    #[test]
    fn test_tsv_uses_tab_delimiter() {
        let summary = summarize("t.tsv", "a\tb\n1\t2\n3\t4\n", 50);
        let text = summary.text.unwrap();
        assert!(text.contains("a=sum:4.00@count:2@avg:2.00"));
        assert!(text.contains("b=sum:6.00@count:2@avg:3.00"));
    }

    #[test]
    fn test_quoted_fields() {
        let parsed = records("a,\"b,c\",\"say \"\"hi\"\"\"\n\"multi\nline\",2\n");
        assert_eq!(
            parsed,
            vec![
                Ok(vec!["a".to_string(), "b,c".to_string(), "say \"hi\"".to_string()]),
                Ok(vec!["multi\nline".to_string(), "2".to_string()]),
            ]
        );
    }

    #[test]
    fn test_unterminated_quote_is_skipped_row() {
        let summary = summarize("t.csv", "v\n5\n\"7\n", 50);
        assert_eq!(summary.skipped_rows, 1);
        assert!(summary.text.unwrap().contains("v=sum:5.00@count:1@avg:5.00"));
    }

    #[test]
    fn test_empty_input() {
        let summary = summarize("t.csv", "", 50);
        assert!(summary.text.is_none());
        assert_eq!(summary.rows_read, 0);
    }
}
