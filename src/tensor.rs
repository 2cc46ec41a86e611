use half::f16;
use ndarray::{ArrayView, Dimension};

use crate::errors::{ObjSpeedError, Result};

/// Element encodings a raw model output can carry.
///
/// Only the first four are decodable into scores. The integer variants below
/// them show up in real model outputs (quantized heads, token ids) and can be
/// held by a [`Tensor`], but the mask decoder rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Float32,
    Float64,
    Float16,
    Int32,
    Int8,
    UInt8,
    Int64,
}

impl ElementType {
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Float16 => 2,
            Self::Float32 | Self::Int32 => 4,
            Self::Float64 | Self::Int64 => 8,
        }
    }

    pub const fn is_decodable(self) -> bool {
        matches!(
            self,
            Self::Float32 | Self::Float64 | Self::Float16 | Self::Int32
        )
    }

    /// Widen one native-endian element to `f64`.
    ///
    /// Returns `None` when the type is not decodable or `bytes` has the wrong length.
    fn decode(self, bytes: &[u8]) -> Option<f64> {
        match self {
            Self::Float32 => <[u8; 4]>::try_from(bytes)
                .ok()
                .map(|b| f64::from(f32::from_ne_bytes(b))),
            Self::Float64 => <[u8; 8]>::try_from(bytes).ok().map(f64::from_ne_bytes),
            Self::Float16 => <[u8; 2]>::try_from(bytes)
                .ok()
                .map(|b| f16::from_ne_bytes(b).to_f64()),
            Self::Int32 => <[u8; 4]>::try_from(bytes)
                .ok()
                .map(|b| f64::from(i32::from_ne_bytes(b))),
            Self::Int8 | Self::UInt8 | Self::Int64 => None,
        }
    }
}

/// Rust scalar types that can be encoded into a [`Tensor`] buffer.
///
/// Encoding is available for every [`ElementType`]; decoding is not.
pub trait TensorElement: Copy + 'static {
    const ELEMENT_TYPE: ElementType;

    fn extend_ne_bytes(self, out: &mut Vec<u8>);
}

macro_rules! impl_tensor_element {
    ($ty:ty, $element_type:expr) => {
        impl TensorElement for $ty {
            const ELEMENT_TYPE: ElementType = $element_type;

            fn extend_ne_bytes(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }
        }
    };
}

impl_tensor_element!(f32, ElementType::Float32);
impl_tensor_element!(f64, ElementType::Float64);
impl_tensor_element!(f16, ElementType::Float16);
impl_tensor_element!(i32, ElementType::Int32);
impl_tensor_element!(i8, ElementType::Int8);
impl_tensor_element!(u8, ElementType::UInt8);
impl_tensor_element!(i64, ElementType::Int64);

/// Row-major strides, in elements, for `shape`.
pub fn row_major_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![1isize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1] as isize;
    }
    strides
}

/// A read-only N-dimensional tensor over an owned byte buffer.
///
/// Elements are addressed through `strides`, never by assuming the buffer is
/// tightly packed, and every access is bounds-checked. The constructor checks
/// that all reachable offsets stay inside the buffer, so a valid `Tensor` can be
/// scanned without further extent checks by its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    strides: Vec<isize>,
    element_type: ElementType,
    data: Vec<u8>,
}

impl Tensor {
    pub fn new(
        shape: Vec<usize>,
        strides: Vec<isize>,
        element_type: ElementType,
        data: Vec<u8>,
    ) -> Result<Self> {
        if shape.len() != strides.len() {
            return Err(ObjSpeedError::invalid_tensor(format!(
                "shape has {} axes but strides has {}",
                shape.len(),
                strides.len()
            )));
        }
        if let Some(axis) = shape.iter().position(|&d| d == 0) {
            return Err(ObjSpeedError::invalid_tensor(format!(
                "axis {} has size 0",
                axis
            )));
        }

        let element_size = element_type.size_in_bytes();
        if data.len() % element_size != 0 {
            return Err(ObjSpeedError::invalid_tensor(format!(
                "buffer of {} bytes is not a whole number of {:?} elements",
                data.len(),
                element_type
            )));
        }

        let element_count = data.len() / element_size;
        let (min, max) = offset_extent(&shape, &strides)?;
        if min < 0 || max >= element_count as isize {
            return Err(ObjSpeedError::invalid_tensor(format!(
                "strides {:?} reach elements {}..={} outside a buffer of {} elements",
                strides, min, max, element_count
            )));
        }

        Ok(Self {
            shape,
            strides,
            element_type,
            data,
        })
    }

    /// Build a tensor whose buffer is laid out in row-major order.
    pub fn contiguous(shape: Vec<usize>, element_type: ElementType, data: Vec<u8>) -> Result<Self> {
        let strides = row_major_strides(&shape);
        Self::new(shape, strides, element_type, data)
    }

    /// Encode `values` as the raw buffer and address it with the given strides.
    pub fn from_elements<T: TensorElement>(
        shape: Vec<usize>,
        strides: Vec<isize>,
        values: &[T],
    ) -> Result<Self> {
        let mut data = Vec::with_capacity(values.len() * T::ELEMENT_TYPE.size_in_bytes());
        for &value in values {
            value.extend_ne_bytes(&mut data);
        }
        Self::new(shape, strides, T::ELEMENT_TYPE, data)
    }

    /// Copy an ndarray view into a row-major tensor, whatever the view's own memory order.
    pub fn from_array<T: TensorElement, D: Dimension>(array: ArrayView<'_, T, D>) -> Result<Self> {
        let shape = array.shape().to_vec();
        let mut data = Vec::with_capacity(array.len() * T::ELEMENT_TYPE.size_in_bytes());
        for &value in array.iter() {
            value.extend_ne_bytes(&mut data);
        }
        Self::contiguous(shape, T::ELEMENT_TYPE, data)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub const fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Element offset of a multi-dimensional index.
    pub fn offset(&self, index: &[usize]) -> Result<isize> {
        if index.len() != self.rank() {
            return Err(ObjSpeedError::invalid_tensor(format!(
                "index has {} components for a rank {} tensor",
                index.len(),
                self.rank()
            )));
        }

        let mut offset = 0isize;
        for (axis, ((&i, &dim), &stride)) in index
            .iter()
            .zip(&self.shape)
            .zip(&self.strides)
            .enumerate()
        {
            if i >= dim {
                return Err(ObjSpeedError::invalid_tensor(format!(
                    "index {} out of range for axis {} of size {}",
                    i, axis, dim
                )));
            }
            offset += i as isize * stride;
        }
        Ok(offset)
    }

    /// Decode the element at `index` as `f64`.
    pub fn value_at(&self, index: &[usize]) -> Result<f64> {
        let offset = self.offset(index)?;
        self.read(offset)
    }

    /// Decode the element at a raw element offset.
    pub(crate) fn read(&self, offset: isize) -> Result<f64> {
        if !self.element_type.is_decodable() {
            return Err(ObjSpeedError::UnsupportedElementType {
                element_type: self.element_type,
            });
        }

        let size = self.element_type.size_in_bytes();
        let bytes = usize::try_from(offset)
            .ok()
            .and_then(|start| self.data.get(start * size..(start + 1) * size))
            .ok_or_else(|| {
                ObjSpeedError::invalid_tensor(format!("element offset {} out of bounds", offset))
            })?;

        self.element_type.decode(bytes).ok_or_else(|| {
            ObjSpeedError::invalid_tensor(format!("malformed element at offset {}", offset))
        })
    }
}

/// Smallest and largest element offsets reachable through `shape` and `strides`.
fn offset_extent(shape: &[usize], strides: &[isize]) -> Result<(isize, isize)> {
    let overflow = || ObjSpeedError::invalid_tensor("stride arithmetic overflows");

    let mut min = 0isize;
    let mut max = 0isize;
    for (&dim, &stride) in shape.iter().zip(strides) {
        let last = isize::try_from(dim - 1).map_err(|_| overflow())?;
        let span = last.checked_mul(stride).ok_or_else(overflow)?;
        if span < 0 {
            min = min.checked_add(span).ok_or_else(overflow)?;
        } else {
            max = max.checked_add(span).ok_or_else(overflow)?;
        }
    }
    Ok((min, max))
}
