use ndstore::array::{ArrayBuilder, Chunk, FillValue};
use ndstore::array_subset::ArraySubset;

#[test]
fn uniform_until_written() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    for contiguous in [false, true] {
        for persistent in [false, true] {
            let path = dir.path().join(format!("uniform_{contiguous}.nd"));
            let mut builder = ArrayBuilder::new(2, vec![12, 10], vec![5, 4], vec![2, 2]);
            builder.contiguous(contiguous);
            if persistent {
                builder.path(&path);
            }
            let mut array = builder.build_full(513u16)?;
            assert_eq!(array.num_materialized_chunks()?, 0);
            assert_eq!(
                array.chunk(&[1, 1])?,
                Chunk::Uniform(FillValue::from(513u16))
            );

            // one write inside chunk [1, 2]
            let subset = ArraySubset::new_with_start_end_exc(&[6, 9], &[8, 10])?;
            array.store_array_subset_elements::<u16>(&subset, &[1, 2])?;
            assert_eq!(array.num_materialized_chunks()?, 1);
            assert!(array.chunk_is_materialized(&[1, 2])?);
            assert!(!array.chunk(&[1, 2])?.is_uniform());
            assert!(array.chunk(&[0, 0])?.is_uniform());

            let elements = array.retrieve_array_subset_elements::<u16>(&array.subset_all())?;
            for (i, &element) in elements.iter().enumerate() {
                let expected = match (i / 10, i % 10) {
                    (6, 9) => 1,
                    (7, 9) => 2,
                    _ => 513,
                };
                assert_eq!(element, expected);
            }

            array.refill(FillValue::from(0u16))?;
            assert_eq!(array.num_materialized_chunks()?, 0);
            assert!(array
                .retrieve_array_subset(&array.subset_all())?
                .iter()
                .all(|&b| b == 0));

            array.free()?;
            ndstore::remove(&path)?;
        }
    }
    Ok(())
}

#[test]
fn uniform_chunk_out_of_grid() -> Result<(), Box<dyn std::error::Error>> {
    let array = ArrayBuilder::new(1, vec![4, 4], vec![2, 2], vec![2, 2]).build_zeros()?;
    assert!(array.chunk(&[2, 0]).is_err());
    assert!(array.chunk(&[0]).is_err());
    assert!(array.chunk_is_materialized(&[0, 2]).is_err());
    Ok(())
}

#[test]
fn uniform_empty_equals_zeros() -> Result<(), Box<dyn std::error::Error>> {
    let array = ArrayBuilder::new(4, vec![3, 3], vec![2, 2], vec![1, 1]).build_empty()?;
    assert_eq!(array.fill_value(), &FillValue::new_zeros(4));
    assert_eq!(
        array.retrieve_array_subset_elements::<u32>(&array.subset_all())?,
        vec![0; 9]
    );
    Ok(())
}
