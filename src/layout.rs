use crate::errors::{ObjSpeedError, Result};

/// Largest first-axis size the rank-3 heuristic accepts as a channel count.
pub const MAX_HEURISTIC_CHANNELS: usize = 256;

/// Axis ordering of a segmentation output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `[N, C, H, W]`, batch fixed at index 0.
    Nchw,
    /// `[N, H, W, C]`, batch fixed at index 0. Only reachable through a hint.
    Nhwc,
    /// `[C, H, W]`
    Chw,
    /// `[H, W, C]`
    Hwc,
    /// `[H, W]` holding per-pixel class indices.
    ClassIndices,
}

/// Channel placement reported by the inference engine when it knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutHint {
    ChannelsFirst,
    ChannelsLast,
}

/// Which tensor axes hold height, width and (optionally) channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisMap {
    pub layout: Layout,
    pub batch: Option<usize>,
    pub channel: Option<usize>,
    pub height: usize,
    pub width: usize,
}

impl AxisMap {
    const fn new(
        layout: Layout,
        batch: Option<usize>,
        channel: Option<usize>,
        height: usize,
        width: usize,
    ) -> Self {
        Self {
            layout,
            batch,
            channel,
            height,
            width,
        }
    }

    /// Resolve the axes of a tensor with the given shape.
    ///
    /// Without a hint a rank-3 shape is classified by a guess: the first axis is
    /// taken as channels when it is at most [`MAX_HEURISTIC_CHANNELS`] and differs
    /// from both other axes. This is an approximation. A channels-last output with
    /// a small height that differs from its width and channel count is read as
    /// channels-first, so engines that know their layout should pass a hint.
    pub fn resolve(shape: &[usize], hint: Option<LayoutHint>) -> Result<Self> {
        match (shape.len(), hint) {
            (4, Some(LayoutHint::ChannelsLast)) => {
                Ok(Self::new(Layout::Nhwc, Some(0), Some(3), 1, 2))
            }
            (4, _) => Ok(Self::new(Layout::Nchw, Some(0), Some(1), 2, 3)),
            (3, Some(LayoutHint::ChannelsFirst)) => Ok(Self::new(Layout::Chw, None, Some(0), 1, 2)),
            (3, Some(LayoutHint::ChannelsLast)) => Ok(Self::new(Layout::Hwc, None, Some(2), 0, 1)),
            (3, None) => {
                if looks_channels_first(shape) {
                    Ok(Self::new(Layout::Chw, None, Some(0), 1, 2))
                } else {
                    Ok(Self::new(Layout::Hwc, None, Some(2), 0, 1))
                }
            }
            (2, _) => Ok(Self::new(Layout::ClassIndices, None, None, 0, 1)),
            (rank, _) => Err(ObjSpeedError::UnsupportedRank { rank }),
        }
    }

    pub fn height_of(&self, shape: &[usize]) -> usize {
        shape[self.height]
    }

    pub fn width_of(&self, shape: &[usize]) -> usize {
        shape[self.width]
    }

    /// Number of channels, or 1 when the tensor already holds class indices.
    pub fn channels_of(&self, shape: &[usize]) -> usize {
        self.channel.map_or(1, |axis| shape[axis])
    }
}

fn looks_channels_first(shape: &[usize]) -> bool {
    shape[0] <= MAX_HEURISTIC_CHANNELS && shape[0] != shape[1] && shape[0] != shape[2]
}
