use half::f16;
use objspeed_rs::tensor::row_major_strides;
use objspeed_rs::{
    decode, DecoderOptions, ElementType, LayoutHint, ObjSpeedError, Result, Tensor,
    TensorMaskDecoder,
};

fn rows(mask: &objspeed_rs::ClassMask) -> Vec<Vec<u8>> {
    mask.rows().map(<[u8]>::to_vec).collect()
}

fn row_major<T: objspeed_rs::TensorElement>(shape: &[usize], values: &[T]) -> Result<Tensor> {
    Tensor::from_elements(shape.to_vec(), row_major_strides(shape), values)
}

#[test]
fn test_class_indices_pass_through() -> Result<()> {
    let tensor = row_major(&[2, 2], &[0i32, 1, 2, 0])?;
    let mask = decode(&tensor)?;
    assert_eq!(rows(&mask), vec![vec![0, 255], vec![255, 0]]);
    Ok(())
}

#[test]
fn test_channels_first_argmax() -> Result<()> {
    // [C=3, H=2, W=2], channel 0 largest everywhere
    let mut scores = vec![0.0f32; 12];
    scores[..4].fill(1.0);
    let mask = decode(&row_major(&[3, 2, 2], &scores)?)?;
    assert_eq!(rows(&mask), vec![vec![0, 0], vec![0, 0]]);

    // channel 1 wins at (0, 0) only
    scores[4] = 2.0;
    let mask = decode(&row_major(&[3, 2, 2], &scores)?)?;
    assert_eq!(rows(&mask), vec![vec![255, 0], vec![0, 0]]);
    Ok(())
}

#[test]
fn test_batch_first_argmax() -> Result<()> {
    let tensor = row_major(&[1, 2, 1, 1], &[0.25f32, 0.75])?;
    let mask = decode(&tensor)?;
    assert_eq!(rows(&mask), vec![vec![255]]);
    Ok(())
}

#[test]
fn test_batch_axis_stride_is_ignored() -> Result<()> {
    // A huge batch stride would run off the buffer if batch contributed to offsets.
    let tensor =
        Tensor::from_elements(vec![1, 2, 1, 1], vec![1000, 1, 1, 1], &[0.25f32, 0.75])?;
    let mask = decode(&tensor)?;
    assert_eq!(rows(&mask), vec![vec![255]]);
    Ok(())
}

#[test]
fn test_ties_keep_the_lowest_channel() -> Result<()> {
    // [C=3, H=1, W=2]: pixel 0 ties channels 0 and 2, pixel 1 ties channels 1 and 2
    let scores = [5.0f32, 1.0, 0.0, 7.0, 5.0, 7.0];
    let tensor = row_major(&[3, 1, 2], &scores)?;

    let first = decode(&tensor)?;
    assert_eq!(rows(&first), vec![vec![0, 255]]);
    for _ in 0..10 {
        assert_eq!(decode(&tensor)?, first);
    }
    Ok(())
}

#[test]
fn test_padded_rows_are_honoured() -> Result<()> {
    // [H=2, W=2] class indices with a row stride of 3; the padding holds garbage.
    let values = [0i32, 1, 99, 1, 0, 99];
    let tensor = Tensor::from_elements(vec![2, 2], vec![3, 1], &values)?;
    let mask = decode(&tensor)?;
    assert_eq!(rows(&mask), vec![vec![0, 255], vec![255, 0]]);
    Ok(())
}

#[test]
fn test_transposed_strides_are_honoured() -> Result<()> {
    // Logical [C=2, H=3, W=4] stored as [W, H, C] in memory.
    let (c, h, w) = (2usize, 3usize, 4usize);
    let mut storage = vec![0.0f32; c * h * w];
    let strides = vec![1isize, c as isize, (c * h) as isize];
    // channel 1 wins at (x=2, y=0) and (x=0, y=1)
    for &(x, y) in &[(2usize, 0usize), (0, 1)] {
        storage[1 + y * c + x * c * h] = 1.0;
    }
    let tensor = Tensor::from_elements(vec![c, h, w], strides, &storage)?;

    let mask = decode(&tensor)?;
    assert_eq!(
        rows(&mask),
        vec![vec![0, 0, 255, 0], vec![255, 0, 0, 0], vec![0, 0, 0, 0]]
    );
    Ok(())
}

#[test]
fn test_half_precision_matches_single_precision() -> Result<()> {
    let values: Vec<f32> = (0..24).map(|i| ((i * 7) % 11) as f32 * 0.37 - 1.5).collect();
    let halves: Vec<f16> = values.iter().map(|&v| f16::from_f32(v)).collect();

    let shape = [1, 3, 2, 4];
    let single = decode(&row_major(&shape, &values)?)?;
    let half = decode(&row_major(&shape, &halves)?)?;

    assert_eq!(rows(&half), rows(&single));
    Ok(())
}

#[test]
fn test_unsupported_ranks_are_rejected() -> Result<()> {
    let rank1 = row_major(&[4], &[0.0f32, 1.0, 2.0, 3.0])?;
    let rank5 = row_major(&[1, 1, 2, 1, 1], &[0.0f32, 1.0])?;

    for (tensor, rank) in [(rank1, 1), (rank5, 5)] {
        match decode(&tensor) {
            Err(ObjSpeedError::UnsupportedRank { rank: got }) => assert_eq!(got, rank),
            other => panic!("expected UnsupportedRank, got {:?}", other),
        }
    }
    Ok(())
}

#[test]
fn test_undecodable_element_type_is_an_error() -> Result<()> {
    let tensor = row_major(&[1, 2, 1, 1], &[0i64, 1])?;
    let err = decode(&tensor).unwrap_err();
    assert!(matches!(
        err,
        ObjSpeedError::UnsupportedElementType {
            element_type: ElementType::Int64
        }
    ));
    Ok(())
}

#[test]
fn test_layout_hint_overrides_heuristic() -> Result<()> {
    // [4, 4, 2] looks channels-last to the heuristic; as CHW it has 4 channels.
    let mut scores = vec![0.0f32; 32];
    // As CHW: channel 3 wins at (x=1, y=0) -> index 3*8 + 0*2 + 1
    scores[3 * 8 + 1] = 1.0;
    let tensor = row_major(&[4, 4, 2], &scores)?;

    let guessed = decode(&tensor)?;
    assert_eq!((guessed.width(), guessed.height()), (4, 4));

    let hinted = TensorMaskDecoder::new(
        DecoderOptions::default().with_layout_hint(Some(LayoutHint::ChannelsFirst)),
    )
    .decode(&tensor)?;
    assert_eq!((hinted.width(), hinted.height()), (2, 4));
    assert_eq!(hinted.foreground_pixels(), 1);
    assert!(hinted.is_foreground(1, 0));
    Ok(())
}
