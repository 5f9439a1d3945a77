//! Textual basis file I/O.
//!
//! The format is the line-oriented HiGHS basis file: a version header,
//! the dimensions, then one status integer per column and per row.
//! Writing then reading reproduces the basis exactly; reading fails on a
//! dimension mismatch.

use std::io::{self, BufRead, Write};

use crate::solution::{Basis, VarStatus};

/// Major format version written in the header.
pub const BASIS_FILE_VERSION: u32 = 1;

/// Errors from reading a basis file.
#[derive(thiserror::Error, Debug)]
pub enum BasisFileError {
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Header line missing or unrecognized.
    #[error("unrecognized basis file header: {0:?}")]
    BadHeader(String),

    /// Dimensions in the file do not match the expected problem.
    #[error("basis dimensions {found_col} {found_row} do not match problem {expect_col} {expect_row}")]
    DimensionMismatch {
        /// Columns in the file.
        found_col: usize,
        /// Rows in the file.
        found_row: usize,
        /// Columns expected.
        expect_col: usize,
        /// Rows expected.
        expect_row: usize,
    },

    /// A status integer was missing or out of range.
    #[error("invalid status entry: {0:?}")]
    BadStatus(String),
}

/// Write a basis to `out` in the textual format.
pub fn write_basis<W: Write>(out: &mut W, basis: &Basis) -> io::Result<()> {
    writeln!(out, "HiGHS Version {BASIS_FILE_VERSION}")?;
    writeln!(out, "{} {}", basis.col_status.len(), basis.row_status.len())?;
    write_status_line(out, &basis.col_status)?;
    write_status_line(out, &basis.row_status)?;
    Ok(())
}

fn write_status_line<W: Write>(out: &mut W, statuses: &[VarStatus]) -> io::Result<()> {
    let mut line = String::with_capacity(2 * statuses.len());
    for (i, status) in statuses.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(&status.to_code().to_string());
    }
    writeln!(out, "{line}")
}

/// Read a basis for a problem with `num_col` columns and `num_row` rows.
pub fn read_basis<R: BufRead>(
    input: &mut R,
    num_col: usize,
    num_row: usize,
) -> Result<Basis, BasisFileError> {
    let mut header = String::new();
    input.read_line(&mut header)?;
    if !header.trim_end().starts_with("HiGHS Version") {
        return Err(BasisFileError::BadHeader(header.trim_end().to_string()));
    }

    let mut dims = String::new();
    input.read_line(&mut dims)?;
    let mut parts = dims.split_whitespace();
    let found_col: usize = parse_field(parts.next(), &dims)?;
    let found_row: usize = parse_field(parts.next(), &dims)?;
    if found_col != num_col || found_row != num_row {
        return Err(BasisFileError::DimensionMismatch {
            found_col,
            found_row,
            expect_col: num_col,
            expect_row: num_row,
        });
    }

    // Statuses may be split across lines arbitrarily.
    let mut codes = Vec::with_capacity(num_col + num_row);
    let mut line = String::new();
    while codes.len() < num_col + num_row {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(BasisFileError::BadStatus("unexpected end of file".to_string()));
        }
        for token in line.split_whitespace() {
            let code: u8 = token
                .parse()
                .map_err(|_| BasisFileError::BadStatus(token.to_string()))?;
            let status = VarStatus::from_code(code)
                .ok_or_else(|| BasisFileError::BadStatus(token.to_string()))?;
            codes.push(status);
        }
    }
    if codes.len() != num_col + num_row {
        return Err(BasisFileError::BadStatus(format!(
            "expected {} statuses, found {}",
            num_col + num_row,
            codes.len()
        )));
    }

    let row_status = codes.split_off(num_col);
    Ok(Basis {
        col_status: codes,
        row_status,
    })
}

fn parse_field(token: Option<&str>, line: &str) -> Result<usize, BasisFileError> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| BasisFileError::BadHeader(line.trim_end().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn sample_basis() -> Basis {
        Basis {
            col_status: vec![
                VarStatus::Basic,
                VarStatus::Lower,
                VarStatus::Upper,
                VarStatus::Zero,
            ],
            row_status: vec![VarStatus::Nonbasic, VarStatus::Basic],
        }
    }

    #[test]
    fn round_trip() {
        let basis = sample_basis();
        let mut buf = Vec::new();
        write_basis(&mut buf, &basis).unwrap();
        let read = read_basis(&mut BufReader::new(buf.as_slice()), 4, 2).unwrap();
        assert_eq!(read, basis);
    }

    #[test]
    fn dimension_mismatch_fails() {
        let basis = sample_basis();
        let mut buf = Vec::new();
        write_basis(&mut buf, &basis).unwrap();
        let err = read_basis(&mut BufReader::new(buf.as_slice()), 3, 2).unwrap_err();
        assert!(matches!(err, BasisFileError::DimensionMismatch { .. }));
    }

    #[test]
    fn bad_header_fails() {
        let text = b"NotABasis\n2 1\n0 0\n1\n";
        let err = read_basis(&mut BufReader::new(&text[..]), 2, 1).unwrap_err();
        assert!(matches!(err, BasisFileError::BadHeader(_)));
    }

    #[test]
    fn bad_status_fails() {
        let text = b"HiGHS Version 1\n2 1\n0 7\n1\n";
        let err = read_basis(&mut BufReader::new(&text[..]), 2, 1).unwrap_err();
        assert!(matches!(err, BasisFileError::BadStatus(_)));
    }
}
