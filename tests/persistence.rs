use ndstore::array::{Array, ArrayBuilder, ArrayCreateError, BlockCodecChain};
use ndstore::array_subset::ArraySubset;

#[test]
fn persistence_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    for contiguous in [false, true] {
        let name = if contiguous { "frame.nd" } else { "sparse.nd" };
        let path = dir.path().join(name);
        let mut array = ArrayBuilder::new(8, vec![9, 4], vec![4, 4], vec![2, 2])
            .path(&path)
            .contiguous(contiguous)
            .build_full(-1i64)?;
        let subset = ArraySubset::new_with_start_end_exc(&[5, 1], &[7, 4])?;
        array.store_array_subset_elements::<i64>(&subset, &[1, 2, 3, 4, 5, 6])?;
        array.append(bytemuck::cast_slice(&[7i64, 8, 9, 10]), 0)?;
        let metadata = array.metadata();
        array.free()?;
        assert_eq!(path.is_file(), contiguous);
        assert_eq!(path.is_dir(), !contiguous);

        let mut array = Array::open(&path)?;
        assert_eq!(array.metadata(), metadata);
        assert_eq!(array.shape(), &[10, 4]);
        assert_eq!(array.is_contiguous(), contiguous);
        assert!(array.is_persistent());
        assert_eq!(
            array.retrieve_array_subset_elements::<i64>(&subset)?,
            vec![1, 2, 3, 4, 5, 6]
        );
        let last_row = ArraySubset::new_with_start_end_exc(&[9, 0], &[10, 4])?;
        assert_eq!(
            array.retrieve_array_subset_elements::<i64>(&last_row)?,
            vec![7, 8, 9, 10]
        );
        assert!(!array.chunk_is_materialized(&[0, 0])?);
        let first_row = ArraySubset::new_with_start_end_exc(&[0, 0], &[1, 2])?;
        assert_eq!(
            array.retrieve_array_subset_elements::<i64>(&first_row)?,
            vec![-1, -1]
        );

        // a reopened array keeps accepting writes
        let first = ArraySubset::new_with_start_end_exc(&[0, 0], &[1, 1])?;
        array.store_array_subset_elements::<i64>(&first, &[42])?;
        array.free()?;
        let array = Array::open(&path)?;
        assert_eq!(
            array.retrieve_array_subset_elements::<i64>(&first_row)?,
            vec![42, -1]
        );
    }
    Ok(())
}

#[cfg(feature = "zstd")]
#[test]
fn persistence_codecs() -> Result<(), Box<dyn std::error::Error>> {
    use ndstore::array::codec::CompressorMetadata;

    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("zstd.nd");
    let codecs = BlockCodecChain::new(true, CompressorMetadata::Zstd { level: 3 })?;
    let codecs_metadata = codecs.metadata().clone();
    let mut array = ArrayBuilder::new(2, vec![64], vec![32], vec![8])
        .path(&path)
        .codec(codecs)
        .build_zeros()?;
    let src: Vec<u16> = (0..64).collect();
    array.store_array_subset_elements::<u16>(&array.subset_all(), &src)?;
    array.free()?;

    let array = Array::open(&path)?;
    assert_eq!(array.codecs().metadata(), &codecs_metadata);
    let elements = array.retrieve_array_subset_elements::<u16>(&array.subset_all())?;
    assert_eq!(elements, src);
    Ok(())
}

#[test]
fn persistence_bytes_codec() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("bytes.nd");
    let mut array = ArrayBuilder::new(1, vec![16], vec![8], vec![4])
        .path(&path)
        .contiguous(true)
        .codec(BlockCodecChain::new_bytes())
        .build_zeros()?;
    array.store_slice(&[2], &[14], &[9; 12], &[12])?;
    array.free()?;
    let array = Array::open(&path)?;
    let mut expected = vec![0u8; 16];
    expected[2..14].fill(9);
    assert_eq!(array.retrieve_array_subset(&array.subset_all())?, expected);
    Ok(())
}

#[test]
fn persistence_open_missing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    assert!(Array::open(dir.path().join("missing.nd")).is_err());
    assert!(matches!(
        Array::open(dir.path()),
        Err(ArrayCreateError::MissingMetadata)
    ));
    Ok(())
}

#[test]
fn persistence_remove_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("array.nd");
    ndstore::remove(&path)?;

    for contiguous in [false, true] {
        let array = ArrayBuilder::new(1, vec![4], vec![2], vec![1])
            .path(&path)
            .contiguous(contiguous)
            .build_zeros()?;
        array.free()?;
        assert!(path.exists());
        ndstore::remove(&path)?;
        assert!(!path.exists());
        ndstore::remove(&path)?;
    }
    Ok(())
}

#[test]
fn persistence_failed_append_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("array.nd");
    let mut array = ArrayBuilder::new(1, vec![5], vec![3], vec![2])
        .path(&path)
        .build_zeros()?;
    array.store_slice(&[0], &[5], &[1, 2, 3, 4, 5], &[5])?;

    // corrupt the trailing partial chunk, which the append must patch
    std::fs::write(path.join("c").join("1"), b"corrupt")?;
    assert!(array.append(&[6, 7, 8, 9, 10], 0).is_err());
    assert_eq!(array.shape(), &[5]);
    assert!(!path.join("c").join("2").exists());
    assert!(!path.join("c").join("3").exists());
    array.free()?;

    let array = Array::open(&path)?;
    assert_eq!(array.shape(), &[5]);
    assert_eq!(
        array.retrieve_array_subset(&ArraySubset::new_with_start_end_exc(&[0], &[3])?)?,
        vec![1, 2, 3]
    );
    Ok(())
}

/// Replace the sparse chunk file at `chunk_key` with a non-empty directory, which cannot be read or erased as a value.
fn make_unreadable(path: &std::path::Path, chunk_key: &str) -> std::io::Result<()> {
    let chunk_path = path.join(chunk_key);
    std::fs::remove_file(&chunk_path)?;
    std::fs::create_dir(&chunk_path)?;
    std::fs::write(chunk_path.join("entry"), b"entry")
}

fn read_chunk_files(
    path: &std::path::Path,
    chunk_keys: &[&str],
) -> std::io::Result<Vec<Vec<u8>>> {
    chunk_keys
        .iter()
        .map(|chunk_key| std::fs::read(path.join(chunk_key)))
        .collect()
}

#[test]
fn persistence_failed_store_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("array.nd");
    let mut array = ArrayBuilder::new(1, vec![9], vec![3], vec![2])
        .path(&path)
        .build_zeros()?;
    array.store_slice(&[0], &[9], &[1, 2, 3, 4, 5, 6, 7, 8, 9], &[9])?;
    let keys = ["c/0", "c/2"];
    let intact = read_chunk_files(&path, &keys)?;

    // the partial write of the middle chunk must decode it
    std::fs::write(path.join("c").join("1"), b"corrupt")?;
    let err = array
        .store_slice(&[1], &[8], &[0; 7], &[7])
        .unwrap_err();
    assert!(!err.is_invalid_argument());
    assert_eq!(read_chunk_files(&path, &keys)?, intact);
    assert_eq!(std::fs::read(path.join("c").join("1"))?, b"corrupt");
    assert_eq!(
        array.retrieve_array_subset(&ArraySubset::new_with_start_end_exc(&[0], &[3])?)?,
        vec![1, 2, 3]
    );
    assert_eq!(
        array.retrieve_array_subset(&ArraySubset::new_with_start_end_exc(&[6], &[9])?)?,
        vec![7, 8, 9]
    );
    Ok(())
}

#[test]
fn persistence_failed_resize_grow_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("array.nd");
    let mut array = ArrayBuilder::new(1, vec![4, 5], vec![2, 3], vec![1, 2])
        .path(&path)
        .build_full(7u8)?;
    let src: Vec<u8> = (0..20).collect();
    array.store_slice(&[0, 0], &[4, 5], &src, &[4, 5])?;
    let keys = ["c/0/0", "c/0/1", "c/1/0"];
    let intact = read_chunk_files(&path, &keys)?;

    // growing fills the exposed columns of both partial chunks
    std::fs::write(path.join("c").join("1").join("1"), b"corrupt")?;
    assert!(array.resize(&[4, 7]).is_err());
    assert_eq!(array.shape(), &[4, 5]);
    assert_eq!(read_chunk_files(&path, &keys)?, intact);
    array.free()?;

    let array = Array::open(&path)?;
    assert_eq!(array.shape(), &[4, 5]);
    assert_eq!(
        array.retrieve_array_subset(&ArraySubset::new_with_start_end_exc(&[0, 0], &[2, 5])?)?,
        (0..10).collect::<Vec<u8>>()
    );
    Ok(())
}

#[test]
fn persistence_failed_resize_shrink_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("array.nd");
    let mut array = ArrayBuilder::new(1, vec![4, 5], vec![2, 3], vec![1, 2])
        .path(&path)
        .build_full(7u8)?;
    let src: Vec<u8> = (0..20).collect();
    array.store_slice(&[0, 0], &[4, 5], &src, &[4, 5])?;
    let keys = ["c/0/1", "c/1/0"];
    let intact = read_chunk_files(&path, &keys)?;

    // chunks [0, 1] and [1, 0] are erased before chunk [1, 1] fails
    make_unreadable(&path, "c/1/1")?;
    assert!(array.resize(&[2, 2]).is_err());
    assert_eq!(array.shape(), &[4, 5]);
    assert_eq!(read_chunk_files(&path, &keys)?, intact);
    array.free()?;

    let array = Array::open(&path)?;
    assert_eq!(array.shape(), &[4, 5]);
    assert_eq!(
        array.retrieve_array_subset(&ArraySubset::new_with_start_end_exc(&[0, 0], &[2, 5])?)?,
        (0..10).collect::<Vec<u8>>()
    );
    Ok(())
}

#[test]
fn persistence_failed_refill_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("array.nd");
    let mut array = ArrayBuilder::new(1, vec![2, 6], vec![2, 2], vec![1, 2])
        .path(&path)
        .build_full(7u8)?;
    array.store_slice(&[0, 0], &[1, 6], &[1, 2, 3, 4, 5, 6], &[2, 6])?;
    let keys = ["c/0/0", "c/0/2"];
    let intact = read_chunk_files(&path, &keys)?;

    // chunk [0, 0] is erased before chunk [0, 1] fails
    make_unreadable(&path, "c/0/1")?;
    assert!(array.refill(0u8).is_err());
    assert_eq!(array.fill_value().as_ne_bytes(), &[7]);
    assert_eq!(read_chunk_files(&path, &keys)?, intact);
    array.free()?;

    let array = Array::open(&path)?;
    assert_eq!(array.fill_value().as_ne_bytes(), &[7]);
    assert_eq!(
        array.retrieve_array_subset(&ArraySubset::new_with_start_end_exc(&[0, 0], &[2, 2])?)?,
        vec![1, 2, 7, 7]
    );
    Ok(())
}
