//! `.tns` text format ingest — a dims header line followed by
//! `idx_0 ... idx_{n-1} value` lines, one nonzero per line. Blank lines and
//! `#`-prefixed comments are skipped; coordinates may be base-0 or base-1.

use std::io::BufRead;

use crate::error::IngestError;
use crate::table::Tensor;

/// Coordinate base a `.tns` file's indices are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    Zero,
    One,
}

fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Parses a `.tns` stream into a [`Tensor`]. The first non-skippable line
/// gives the dimensions; every line after that is `coord... value`.
pub fn read_tns<R: BufRead>(reader: R, base: Base) -> Result<Tensor, IngestError> {
    let mut lines = reader.lines().enumerate();

    let (dims_line_no, dims) = loop {
        let (idx, line) = lines.next().ok_or_else(|| IngestError::Parse {
            line: 0,
            message: "empty input: expected a dimensions header line".to_string(),
        })?;
        let line = line?;
        if is_skippable(&line) {
            continue;
        }
        break (idx + 1, line);
    };

    let dims: Vec<u32> = dims
        .split_whitespace()
        .map(|tok| {
            tok.parse::<u32>().map_err(|_| IngestError::Parse {
                line: dims_line_no,
                message: format!("invalid dimension token {tok:?}"),
            })
        })
        .collect::<Result<_, _>>()?;

    if dims.is_empty() {
        return Err(IngestError::Parse {
            line: dims_line_no,
            message: "dimensions header must list at least one mode".to_string(),
        });
    }

    let mut tensor = Tensor::with_defaults(dims.clone())?;
    let ndims = dims.len();

    for (idx, line) in lines {
        let line = line?;
        let line_no = idx + 1;
        if is_skippable(&line) {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != ndims + 1 {
            return Err(IngestError::Parse {
                line: line_no,
                message: format!("expected {} coordinate(s) plus a value, got {}", ndims, tokens.len()),
            });
        }

        let mut coord_i64 = Vec::with_capacity(ndims);
        for &tok in &tokens[..ndims] {
            let raw: i64 = tok.parse().map_err(|_| IngestError::Parse {
                line: line_no,
                message: format!("invalid coordinate token {tok:?}"),
            })?;
            coord_i64.push(raw);
        }

        let value: f64 = tokens[ndims].parse().map_err(|_| IngestError::Parse {
            line: line_no,
            message: format!("invalid value token {:?}", tokens[ndims]),
        })?;

        let mut coord = Vec::with_capacity(ndims);
        for (mode, &raw) in coord_i64.iter().enumerate() {
            let adjusted = match base {
                Base::Zero => raw,
                Base::One => {
                    if raw == 0 {
                        return Err(IngestError::ZeroUnderBaseOne { line: line_no, mode });
                    }
                    raw - 1
                }
            };
            if adjusted < 0 || adjusted > u32::MAX as i64 {
                return Err(IngestError::OutOfRange {
                    line: line_no,
                    coord: coord_i64.clone(),
                });
            }
            coord.push(adjusted as u32);
        }

        tensor.set(&coord, value)?;
    }

    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn base_one_ingest_round_trips() {
        let data = "3 3 3\n1 1 1 1.0\n3 3 3 2.0\n";
        let tensor = read_tns(Cursor::new(data), Base::One).unwrap();
        assert_eq!(tensor.get(&[0, 0, 0]).unwrap(), 1.0);
        assert_eq!(tensor.get(&[2, 2, 2]).unwrap(), 2.0);
        assert_eq!(tensor.nnz(), 2);
    }

    #[test]
    fn base_zero_ingest_round_trips() {
        let data = "2 2\n0 0 5.0\n1 1 6.0\n";
        let tensor = read_tns(Cursor::new(data), Base::Zero).unwrap();
        assert_eq!(tensor.get(&[0, 0]).unwrap(), 5.0);
        assert_eq!(tensor.get(&[1, 1]).unwrap(), 6.0);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let data = "# a comment\n\n3 3\n# another\n0 0 1.0\n\n1 1 2.0\n";
        let tensor = read_tns(Cursor::new(data), Base::Zero).unwrap();
        assert_eq!(tensor.nnz(), 2);
    }

    #[test]
    fn zero_coordinate_under_base_one_is_rejected() {
        let data = "3 3\n0 1 1.0\n";
        let err = read_tns(Cursor::new(data), Base::One).unwrap_err();
        assert!(matches!(err, IngestError::ZeroUnderBaseOne { .. }));
    }

    #[test]
    fn wrong_token_count_reports_line_number() {
        let data = "3 3\n0 0 0 1.0\n";
        let err = read_tns(Cursor::new(data), Base::Zero).unwrap_err();
        match err {
            IngestError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        let data = "";
        assert!(read_tns(Cursor::new(data), Base::Zero).is_err());
    }
}
