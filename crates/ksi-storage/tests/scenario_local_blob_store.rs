use ksi_schemas::ServiceType;
use ksi_storage::{allocate_job_folder, BlobStore, LocalBlobStore};
use std::fs;
use tempfile::tempdir;
use uuid::Uuid;

#[test]
fn job_folder_allocation_is_repeatable() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let job_id = Uuid::new_v4();

    let a = allocate_job_folder(&LocalBlobStore, tmp.path(), ServiceType::Nfe, "ana", job_id)?;
    let b = allocate_job_folder(&LocalBlobStore, tmp.path(), ServiceType::Nfe, "ana", job_id)?;

    assert_eq!(a, b);
    assert!(a.is_dir());
    assert!(a.ends_with(format!("NFE/ana/{job_id}")));
    Ok(())
}

#[test]
fn write_move_list_remove() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let blobs = LocalBlobStore;

    let src_dir = tmp.path().join("wip").join("20260101_000000");
    let n = blobs.write_file(&src_dir.join("modelo_55").join("a.txt"), &mut "k1\nk2\n".as_bytes())?;
    assert_eq!(n, 6);

    let dst_dir = tmp.path().join("final");
    blobs.move_dir(&src_dir, &dst_dir)?;
    assert!(!blobs.exists(&src_dir));
    assert_eq!(fs::read_to_string(dst_dir.join("modelo_55").join("a.txt"))?, "k1\nk2\n");

    let listed = blobs.list_dir(&tmp.path().join("wip"))?;
    assert!(listed.is_empty());

    blobs.remove_dir_all(&dst_dir)?;
    assert!(!blobs.exists(&dst_dir));
    // Removing again is fine.
    blobs.remove_dir_all(&dst_dir)?;
    Ok(())
}
