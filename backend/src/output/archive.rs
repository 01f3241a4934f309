//! Zip bundling of DATA and META workbooks.
//!
//! Entries carry a fixed timestamp so reruns produce identical archives.

use std::io::{Cursor, Read, Seek, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::OutputResult;

/// Deflate `entries` (name, bytes) into an in-memory archive, in order.
pub fn archive_bytes(entries: &[(&str, &[u8])]) -> OutputResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut cursor);
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        for (name, bytes) in entries {
            zip.start_file(*name, options)?;
            zip.write_all(bytes).map_err(zip::result::ZipError::Io)?;
        }
        zip.finish()?;
    }
    Ok(cursor.into_inner())
}

/// Entry names of an archive, in stored order.
pub fn entry_names<R: Read + Seek>(reader: R) -> OutputResult<Vec<String>> {
    let mut archive = ZipArchive::new(reader)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index(i)?.name().to_string());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_in_order() {
        let bytes = archive_bytes(&[("META.xls", &b"meta"[..]), ("DATA.xls", &b"data"[..])]).unwrap();
        let names = entry_names(Cursor::new(bytes)).unwrap();
        assert_eq!(names, vec!["META.xls", "DATA.xls"]);
    }

    #[test]
    fn test_content_roundtrip_and_determinism() {
        let payload = vec![7u8; 4096];
        let a = archive_bytes(&[("x.xls", payload.as_slice())]).unwrap();
        let b = archive_bytes(&[("x.xls", payload.as_slice())]).unwrap();
        assert_eq!(a, b);

        let mut archive = ZipArchive::new(Cursor::new(a)).unwrap();
        let mut file = archive.by_name("x.xls").unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }
}
