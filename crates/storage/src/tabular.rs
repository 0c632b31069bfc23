//! CSV Table I/O
//!
//! The `ID_code` column, when present, becomes the table's row identifiers
//! and is written back as the first column. Every other column must be
//! numeric.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use feature_engine::{Table, ID_COLUMN};
use tracing::info;

use crate::StorageError;

/// Read a CSV file with a header row into a [`Table`]
pub fn read_table(path: impl AsRef<Path>) -> Result<Table, StorageError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
        _ => StorageError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let table = read_table_from(file)?;
    info!(
        "Read {} rows x {} columns from {}",
        table.n_rows(),
        table.n_columns(),
        path.display()
    );
    Ok(table)
}

/// Read CSV from any reader
pub fn read_table_from<R: Read>(reader: R) -> Result<Table, StorageError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let id_position = headers.iter().position(|h| h == ID_COLUMN);

    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != id_position)
        .map(|(_, h)| h.to_string())
        .collect();

    let mut ids = Vec::new();
    let mut rows = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let mut values = Vec::with_capacity(columns.len());
        for (i, field) in record.iter().enumerate() {
            if Some(i) == id_position {
                ids.push(field.to_string());
                continue;
            }
            let value = field.trim().parse::<f64>().map_err(|_| StorageError::Parse {
                row,
                column: headers.get(i).unwrap_or_default().to_string(),
                value: field.to_string(),
            })?;
            values.push(value);
        }
        rows.push(values);
    }

    let table = Table::from_rows(columns, &rows)?;
    match id_position {
        Some(_) => Ok(table.with_ids(ids)?),
        None => Ok(table),
    }
}

/// Write `table` as CSV, creating parent directories as needed
pub fn write_table(table: &Table, path: impl AsRef<Path>) -> Result<(), StorageError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StorageError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let file = File::create(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_table_to(table, file)?;

    info!("Wrote {} rows to {}", table.n_rows(), path.display());
    Ok(())
}

/// Write CSV to any writer
pub fn write_table_to<W: Write>(table: &Table, writer: W) -> Result<(), StorageError> {
    let mut writer = csv::Writer::from_writer(writer);

    let ids = table.ids();
    let mut header: Vec<&str> = Vec::with_capacity(table.n_columns() + 1);
    if ids.is_some() {
        header.push(ID_COLUMN);
    }
    header.extend(table.columns().iter().map(String::as_str));
    writer.write_record(&header)?;

    let mut record: Vec<String> = Vec::with_capacity(header.len());
    for (i, row) in table.values().rows().into_iter().enumerate() {
        record.clear();
        if let Some(ids) = ids {
            record.push(ids[i].clone());
        }
        record.extend(row.iter().map(f64::to_string));
        writer.write_record(&record)?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "ID_code,target,var_0,var_1\n\
                          train_0,0,8.9255,-6.7863\n\
                          train_1,1,11.5006,-4.1473\n";

    #[test]
    fn test_id_column_becomes_ids() {
        let table = read_table_from(SAMPLE.as_bytes()).unwrap();

        assert_eq!(table.columns(), ["target", "var_0", "var_1"]);
        assert_eq!(table.ids().unwrap(), ["train_0", "train_1"]);
        assert_eq!(table.values()[[1, 1]], 11.5006);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("table.csv");
        let table = read_table_from(SAMPLE.as_bytes()).unwrap();

        write_table(&table, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ID_code,target,var_0,var_1\n"));

        let reread = read_table(&path).unwrap();
        assert_eq!(reread, table);
    }

    #[test]
    fn test_table_without_ids() {
        let table = read_table_from("a,b\n1,2\n3,4.5\n".as_bytes()).unwrap();
        assert!(table.ids().is_none());
        assert_eq!(table.n_rows(), 2);

        let mut out = Vec::new();
        write_table_to(&table, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a,b\n1,2\n3,4.5\n");
    }

    #[test]
    fn test_non_numeric_value() {
        let err = read_table_from("var_0,var_1\n1.0,abc\n".as_bytes()).unwrap_err();
        match err {
            StorageError::Parse { row, column, value } => {
                assert_eq!(row, 0);
                assert_eq!(column, "var_1");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_table(dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
