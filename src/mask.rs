use image::{GrayImage, Luma};

use crate::errors::{ObjSpeedError, Result};

pub const BACKGROUND: u8 = 0;
pub const FOREGROUND: u8 = 255;

/// Binary per-pixel foreground mask produced by the decoder.
///
/// Rows are stored one byte per pixel and may be padded to `bytes_per_row` so the
/// buffer can be handed to renderers that expect aligned pixel rows. Padding
/// bytes are always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMask {
    width: usize,
    height: usize,
    bytes_per_row: usize,
    data: Vec<u8>,
}

impl ClassMask {
    /// All-background mask whose row length is rounded up to `row_alignment` bytes.
    pub fn new(width: usize, height: usize, row_alignment: usize) -> Result<Self> {
        if row_alignment == 0 {
            return Err(ObjSpeedError::validation(
                "row_alignment",
                "must be at least 1",
            ));
        }
        let bytes_per_row = width
            .checked_next_multiple_of(row_alignment)
            .ok_or_else(|| ObjSpeedError::validation("width", "overflows row alignment"))?;
        let len = bytes_per_row
            .checked_mul(height)
            .ok_or_else(|| ObjSpeedError::validation("height", "mask size overflows"))?;

        Ok(Self {
            width,
            height,
            bytes_per_row,
            data: vec![BACKGROUND; len],
        })
    }

    pub const fn width(&self) -> usize {
        self.width
    }

    pub const fn height(&self) -> usize {
        self.height
    }

    pub const fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    /// Raw buffer including row padding.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.bytes_per_row + x).copied()
    }

    pub fn is_foreground(&self, x: usize, y: usize) -> bool {
        self.get(x, y) == Some(FOREGROUND)
    }

    pub(crate) fn set_foreground(&mut self, x: usize, y: usize, foreground: bool) {
        let value = if foreground { FOREGROUND } else { BACKGROUND };
        self.data[y * self.bytes_per_row + x] = value;
    }

    /// Pixels of row `y` without padding.
    pub fn row(&self, y: usize) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.bytes_per_row;
        Some(&self.data[start..start + self.width])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.data
            .chunks_exact(self.bytes_per_row.max(1))
            .take(self.height)
            .map(|row| &row[..self.width])
    }

    pub fn foreground_pixels(&self) -> usize {
        self.rows()
            .map(|row| row.iter().filter(|&&v| v == FOREGROUND).count())
            .sum()
    }

    pub fn has_foreground(&self) -> bool {
        self.rows().any(|row| row.contains(&FOREGROUND))
    }

    /// Number of 4-connected foreground regions.
    pub fn region_count(&self) -> usize {
        let mut visited = vec![false; self.width * self.height];
        let mut stack = Vec::new();
        let mut regions = 0;

        for y in 0..self.height {
            for x in 0..self.width {
                if visited[y * self.width + x] || !self.is_foreground(x, y) {
                    continue;
                }
                regions += 1;
                visited[y * self.width + x] = true;
                stack.push((x, y));

                while let Some((cx, cy)) = stack.pop() {
                    let neighbours = [
                        (cx.wrapping_sub(1), cy),
                        (cx + 1, cy),
                        (cx, cy.wrapping_sub(1)),
                        (cx, cy + 1),
                    ];
                    for (nx, ny) in neighbours {
                        if nx < self.width
                            && ny < self.height
                            && !visited[ny * self.width + nx]
                            && self.is_foreground(nx, ny)
                        {
                            visited[ny * self.width + nx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }
        }
        regions
    }

    /// Tightly packed grayscale copy of the mask.
    pub fn to_luma_image(&self) -> Result<GrayImage> {
        let width = u32::try_from(self.width)
            .map_err(|_| ObjSpeedError::validation("width", "does not fit in u32"))?;
        let height = u32::try_from(self.height)
            .map_err(|_| ObjSpeedError::validation("height", "does not fit in u32"))?;

        Ok(GrayImage::from_fn(width, height, |x, y| {
            Luma([self.get(x as usize, y as usize).unwrap_or(BACKGROUND)])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&[u8]]) -> ClassMask {
        let mut mask = ClassMask::new(rows[0].len(), rows.len(), 1).unwrap();
        for (y, row) in rows.iter().enumerate() {
            for (x, &v) in row.iter().enumerate() {
                mask.set_foreground(x, y, v != 0);
            }
        }
        mask
    }

    #[test]
    fn test_row_alignment_padding() -> Result<()> {
        let mut mask = ClassMask::new(5, 2, 16)?;
        assert_eq!(mask.bytes_per_row(), 16);
        assert_eq!(mask.as_raw().len(), 32);

        mask.set_foreground(4, 1, true);
        assert_eq!(mask.get(4, 1), Some(FOREGROUND));
        assert_eq!(mask.as_raw()[16 + 4], FOREGROUND);
        assert_eq!(mask.row(1), Some(&[0, 0, 0, 0, 255][..]));
        assert_eq!(mask.rows().count(), 2);
        Ok(())
    }

    #[test]
    fn test_zero_alignment_rejected() {
        assert!(ClassMask::new(4, 4, 0).is_err());
    }

    #[test]
    fn test_out_of_bounds_access() -> Result<()> {
        let mask = ClassMask::new(3, 3, 8)?;
        assert_eq!(mask.get(3, 0), None);
        assert_eq!(mask.get(0, 3), None);
        assert_eq!(mask.row(3), None);
        Ok(())
    }

    #[test]
    fn test_counts() {
        let mask = mask_from_rows(&[
            &[1, 1, 0, 0],
            &[0, 1, 0, 1],
            &[0, 0, 0, 1],
            &[1, 0, 0, 0],
        ]);
        assert_eq!(mask.foreground_pixels(), 6);
        assert!(mask.has_foreground());
        assert_eq!(mask.region_count(), 3);
    }

    #[test]
    fn test_diagonal_pixels_are_separate_regions() {
        let mask = mask_from_rows(&[&[1, 0], &[0, 1]]);
        assert_eq!(mask.region_count(), 2);
    }

    #[test]
    fn test_empty_mask() -> Result<()> {
        let mask = ClassMask::new(8, 8, 1)?;
        assert!(!mask.has_foreground());
        assert_eq!(mask.region_count(), 0);
        Ok(())
    }

    #[test]
    fn test_luma_image_drops_padding() -> Result<()> {
        let mut mask = ClassMask::new(3, 2, 64)?;
        mask.set_foreground(2, 0, true);

        let image = mask.to_luma_image()?;
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 0), &Luma([255]));
        assert_eq!(image.get_pixel(0, 1), &Luma([0]));
        assert_eq!(image.as_raw().len(), 6);
        Ok(())
    }
}
