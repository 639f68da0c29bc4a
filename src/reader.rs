//! Transaction file reader.
//!
//! External collaborator (spec §1 "transaction file parsing ... not
//! specified here"); included so the binary has something to feed
//! [`crate::transaction::Database`]. Grounded on the reference CLI's
//! `TransactionReader`, extended to the trailing-weight format and
//! comma-or-whitespace tokenisation spec §6 "File formats" describes.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use crate::itemizer::Itemizer;

/// One raw record read from a transaction file: item names plus an
/// optional trailing integer weight (defaults to `1` when the reader is
/// not configured to expect one).
pub struct RawTransaction {
    pub items: Vec<String>,
    pub weight: u64,
}

/// Streams [`RawTransaction`]s out of a transaction file, splitting each
/// non-blank line on commas or whitespace.
pub struct TransactionReader<R> {
    lines: io::Lines<BufReader<R>>,
    has_weight_column: bool,
}

impl TransactionReader<File> {
    pub fn open(path: &str, has_weight_column: bool) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(TransactionReader {
            lines: BufReader::new(file).lines(),
            has_weight_column,
        })
    }
}

impl<R: io::Read> TransactionReader<R> {
    pub fn from_reader(reader: R, has_weight_column: bool) -> Self {
        TransactionReader {
            lines: BufReader::new(reader).lines(),
            has_weight_column,
        }
    }
}

fn split_record(line: &str) -> Vec<&str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|tok| !tok.is_empty())
        .collect()
}

impl<R: io::Read> Iterator for TransactionReader<R> {
    type Item = io::Result<RawTransaction>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            let mut tokens = split_record(&line);
            if tokens.is_empty() {
                continue;
            }
            let weight = if self.has_weight_column {
                match tokens.pop().unwrap().parse::<u64>() {
                    Ok(w) => w,
                    Err(_) => {
                        return Some(Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "expected trailing integer weight",
                        )))
                    }
                }
            } else {
                1
            };
            if tokens.is_empty() {
                continue;
            }
            return Some(Ok(RawTransaction {
                items: tokens.into_iter().map(str::to_owned).collect(),
                weight,
            }));
        }
    }
}

/// Maps a stream of [`RawTransaction`]s through an [`Itemizer`], turning
/// item names into raw (not yet dense-recoded) item ids.
pub fn itemize<I>(
    records: I,
    itemizer: &mut Itemizer,
) -> io::Result<Vec<(Vec<crate::item::Item>, u64)>>
where
    I: IntoIterator<Item = io::Result<RawTransaction>>,
{
    let mut out = Vec::new();
    for record in records {
        let record = record?;
        let items = record
            .items
            .iter()
            .map(|name| itemizer.id_of(name))
            .collect();
        out.push((items, record.weight));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn splits_commas_and_whitespace() {
        let data = "a, b  c\n\nd,e\n";
        let reader = TransactionReader::from_reader(Cursor::new(data), false);
        let records: Vec<_> = reader.map(|r| r.unwrap().items).collect();
        assert_eq!(records, vec![vec!["a", "b", "c"], vec!["d", "e"]]);
    }

    #[test]
    fn trailing_weight_column() {
        let data = "a b 3\nc d 7\n";
        let reader = TransactionReader::from_reader(Cursor::new(data), true);
        let records: Vec<_> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(records[0].items, vec!["a", "b"]);
        assert_eq!(records[0].weight, 3);
        assert_eq!(records[1].weight, 7);
    }
}
