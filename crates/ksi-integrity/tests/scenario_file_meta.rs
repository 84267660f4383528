use ksi_integrity::{
    file_movement, file_sha256, guess_mime, inspect, movement_from_reader, HASH_CHUNK_BYTES,
};
use ksi_schemas::FileRole;
use std::io::{self, Read};
use std::path::Path;

#[test]
fn sha256_of_known_content() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("keys.txt");
    std::fs::write(&p, "abc").unwrap();

    assert_eq!(
        file_sha256(&p).unwrap(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn hash_spanning_several_chunks_matches_single_read() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("big.txt");
    let b = dir.path().join("big_copy.txt");
    let body: Vec<u8> = (0..HASH_CHUNK_BYTES * 2 + 17).map(|i| (i % 251) as u8).collect();
    std::fs::write(&a, &body).unwrap();
    std::fs::write(&b, &body).unwrap();

    let meta = inspect(&a).unwrap();
    assert_eq!(meta.size_bytes, body.len() as u64);
    assert_eq!(meta.sha256, file_sha256(&b).unwrap());
    assert_eq!(meta.sha256.len(), 64);
}

#[test]
fn mime_from_extension() {
    assert_eq!(guess_mime(Path::new("keys.txt")).as_deref(), Some("text/plain"));
    assert_eq!(guess_mime(Path::new("table.csv")).as_deref(), Some("text/csv"));
    assert_eq!(guess_mime(Path::new("blob.zz_unknown")), None);
}

#[test]
fn missing_file_is_an_error_not_a_panic() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("gone.txt");
    let e = file_movement(FileRole::InputTxt, "gone.txt", &p).unwrap_err();
    assert_eq!(e.path, p);
    assert!(e.to_string().contains("gone.txt"));
}

#[test]
fn movement_row_carries_role_and_meta() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("modelo_55.txt");
    std::fs::write(&p, "k\n").unwrap();

    let row = file_movement(FileRole::OutputModel55, "modelo_55.txt", &p).unwrap();
    assert_eq!(row.file_role, FileRole::OutputModel55);
    assert_eq!(row.size_bytes, Some(2));
    assert_eq!(row.mime_type.as_deref(), Some("text/plain"));
    assert!(row.sha256.is_some());
}

struct FailAfterFirstRead(bool);

impl Read for FailAfterFirstRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.0 {
            return Err(io::Error::new(io::ErrorKind::Other, "device gone"));
        }
        self.0 = true;
        buf[0] = b'k';
        Ok(1)
    }
}

#[test]
fn movement_from_reader_matches_file_inspection() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("table.csv");
    std::fs::write(&p, "a;b\n1;2\n").unwrap();

    let from_file = file_movement(FileRole::InputCsv, "table.csv", &p).unwrap();
    let from_reader =
        movement_from_reader(FileRole::InputCsv, "table.csv", &p, &mut io::Cursor::new(b"a;b\n1;2\n")).unwrap();
    assert_eq!(from_file, from_reader);
    assert_eq!(from_reader.size_bytes, Some(8));
}

#[test]
fn read_error_mid_stream_names_the_path() {
    let p = Path::new("/stored/keys.txt");
    let e = movement_from_reader(FileRole::InputTxt, "keys.txt", p, &mut FailAfterFirstRead(false)).unwrap_err();
    assert_eq!(e.path, p);
    assert!(e.to_string().contains("device gone"));
}
