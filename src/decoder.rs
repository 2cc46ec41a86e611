use log::{debug, trace};

use crate::errors::{ObjSpeedError, Result};
use crate::layout::{AxisMap, LayoutHint};
use crate::mask::ClassMask;
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Overrides the rank-3 layout guess and selects NHWC for rank 4.
    pub layout_hint: Option<LayoutHint>,
    /// Mask rows are padded to a multiple of this many bytes.
    pub row_alignment: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            layout_hint: None,
            row_alignment: 1,
        }
    }
}

impl DecoderOptions {
    pub const fn with_layout_hint(mut self, hint: Option<LayoutHint>) -> Self {
        self.layout_hint = hint;
        self
    }

    pub const fn with_row_alignment(mut self, row_alignment: usize) -> Self {
        self.row_alignment = row_alignment;
        self
    }
}

/// Turns a raw segmentation output into a binary foreground mask.
///
/// Rank-2 tensors already hold class indices. Rank-3 and rank-4 tensors hold
/// per-channel scores that are reduced with an argmax over channels, keeping the
/// lowest channel on ties. Class 0 is background; every other class is painted.
///
/// The decoder is stateless and only borrows the tensor for the call, so one
/// instance can be shared freely across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct TensorMaskDecoder {
    options: DecoderOptions,
}

impl TensorMaskDecoder {
    pub const fn new(options: DecoderOptions) -> Self {
        Self { options }
    }

    pub const fn options(&self) -> &DecoderOptions {
        &self.options
    }

    pub fn decode(&self, tensor: &Tensor) -> Result<ClassMask> {
        let shape = tensor.shape();
        let axes = AxisMap::resolve(shape, self.options.layout_hint)?;

        let element_type = tensor.element_type();
        if !element_type.is_decodable() {
            return Err(ObjSpeedError::UnsupportedElementType { element_type });
        }

        let height = axes.height_of(shape);
        let width = axes.width_of(shape);
        debug!(
            "decoding {:?} tensor {:?} as {:?} ({}x{}, {} channels)",
            element_type,
            shape,
            axes.layout,
            width,
            height,
            axes.channels_of(shape)
        );

        let mut mask = ClassMask::new(width, height, self.options.row_alignment)?;
        match axes.channel {
            None => decode_class_indices(tensor, &axes, &mut mask)?,
            Some(channel_axis) => decode_argmax(tensor, &axes, channel_axis, &mut mask)?,
        }

        trace!("mask has {} foreground pixels", mask.foreground_pixels());
        Ok(mask)
    }
}

/// Decode with default options.
pub fn decode(tensor: &Tensor) -> Result<ClassMask> {
    TensorMaskDecoder::default().decode(tensor)
}

fn decode_class_indices(tensor: &Tensor, axes: &AxisMap, mask: &mut ClassMask) -> Result<()> {
    let strides = tensor.strides();
    let (row_stride, col_stride) = (strides[axes.height], strides[axes.width]);

    for y in 0..mask.height() {
        for x in 0..mask.width() {
            let value = tensor.read(y as isize * row_stride + x as isize * col_stride)?;
            mask.set_foreground(x, y, !is_background_index(value));
        }
    }
    Ok(())
}

/// A stored class index rounds to 0. NaN carries no class and counts as background.
fn is_background_index(value: f64) -> bool {
    let class = value.round();
    class == 0.0 || class.is_nan()
}

fn decode_argmax(
    tensor: &Tensor,
    axes: &AxisMap,
    channel_axis: usize,
    mask: &mut ClassMask,
) -> Result<()> {
    let strides = tensor.strides();
    let (row_stride, col_stride) = (strides[axes.height], strides[axes.width]);
    let channel_stride = strides[channel_axis];
    let channels = tensor.shape()[channel_axis];

    for y in 0..mask.height() {
        for x in 0..mask.width() {
            // Batch index is always 0 and contributes nothing to the offset.
            let base = y as isize * row_stride + x as isize * col_stride;

            let mut best_class = 0;
            let mut best_score = f64::MIN;
            for c in 0..channels {
                let score = tensor.read(base + c as isize * channel_stride)?;
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }
            mask.set_foreground(x, y, best_class != 0);
        }
    }
    Ok(())
}
