use image::{imageops, Rgba, RgbaImage};

use crate::errors::{ObjSpeedError, Result};
use crate::mask::ClassMask;
use crate::traits::OverlayRenderer;

/// Tint and opacity used to paint foreground cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub tint: [u8; 3],
    pub opacity: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            tint: [52, 199, 89],
            opacity: 0.35,
        }
    }
}

impl OverlayStyle {
    pub fn new(tint: [u8; 3], opacity: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(ObjSpeedError::validation(
                "opacity",
                format!("{} is outside 0.0..=1.0", opacity),
            ));
        }
        Ok(Self { tint, opacity })
    }

    fn paint(&self) -> Rgba<u8> {
        let [r, g, b] = self.tint;
        let alpha = (self.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([r, g, b, alpha])
    }
}

/// Nearest-neighbour scaling of the mask to the canvas, painting foreground cells
/// with the tint and leaving background cells fully transparent.
#[derive(Debug, Clone, Copy, Default)]
pub struct TintOverlay;

impl OverlayRenderer for TintOverlay {
    fn render(
        &self,
        mask: &ClassMask,
        (width, height): (u32, u32),
        style: &OverlayStyle,
    ) -> Result<RgbaImage> {
        if width == 0 || height == 0 {
            return Err(ObjSpeedError::validation(
                "canvas",
                format!("{}x{} has no pixels", width, height),
            ));
        }

        let paint = style.paint();
        let clear = Rgba([0, 0, 0, 0]);
        let (mask_width, mask_height) = (mask.width() as u64, mask.height() as u64);

        Ok(RgbaImage::from_fn(width, height, |x, y| {
            let mx = (x as u64 * mask_width / width as u64) as usize;
            let my = (y as u64 * mask_height / height as u64) as usize;
            if mask.is_foreground(mx, my) {
                paint
            } else {
                clear
            }
        }))
    }
}

/// Alpha-blend `overlay` onto `base`. Both must have the same dimensions.
pub fn composite(base: &RgbaImage, overlay: &RgbaImage) -> Result<RgbaImage> {
    if base.dimensions() != overlay.dimensions() {
        let (bw, bh) = base.dimensions();
        let (ow, oh) = overlay.dimensions();
        return Err(ObjSpeedError::validation(
            "overlay",
            format!("is {}x{} but the image is {}x{}", ow, oh, bw, bh),
        ));
    }

    let mut output = base.clone();
    imageops::overlay(&mut output, overlay, 0, 0);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use crate::tensor::Tensor;

    fn checker_mask() -> ClassMask {
        // [[0, 1], [1, 0]]
        let tensor = Tensor::from_elements(vec![2, 2], vec![2, 1], &[0i32, 1, 1, 0]).unwrap();
        decode(&tensor).unwrap()
    }

    #[test]
    fn test_opacity_validation() {
        assert!(OverlayStyle::new([255, 0, 0], 1.0).is_ok());
        assert!(OverlayStyle::new([255, 0, 0], 0.0).is_ok());
        assert!(OverlayStyle::new([255, 0, 0], 1.5).is_err());
        assert!(OverlayStyle::new([255, 0, 0], -0.1).is_err());
        assert!(OverlayStyle::new([255, 0, 0], f32::NAN).is_err());
    }

    #[test]
    fn test_render_scales_mask_to_canvas() -> Result<()> {
        let style = OverlayStyle::new([255, 0, 0], 0.5)?;
        let overlay = TintOverlay.render(&checker_mask(), (4, 4), &style)?;

        assert_eq!(overlay.dimensions(), (4, 4));
        assert_eq!(overlay.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(overlay.get_pixel(1, 1), &Rgba([0, 0, 0, 0]));
        assert_eq!(overlay.get_pixel(2, 0), &Rgba([255, 0, 0, 128]));
        assert_eq!(overlay.get_pixel(3, 1), &Rgba([255, 0, 0, 128]));
        assert_eq!(overlay.get_pixel(0, 3), &Rgba([255, 0, 0, 128]));
        assert_eq!(overlay.get_pixel(3, 3), &Rgba([0, 0, 0, 0]));
        Ok(())
    }

    #[test]
    fn test_render_rejects_empty_canvas() {
        let err = TintOverlay
            .render(&checker_mask(), (0, 10), &OverlayStyle::default())
            .unwrap_err();
        assert!(matches!(err, ObjSpeedError::Validation { .. }));
    }

    #[test]
    fn test_composite_leaves_background_untouched() -> Result<()> {
        let base = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255]));
        let style = OverlayStyle::new([255, 0, 0], 1.0)?;
        let overlay = TintOverlay.render(&checker_mask(), (2, 2), &style)?;

        let blended = composite(&base, &overlay)?;
        assert_eq!(blended.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(blended.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));
        Ok(())
    }

    #[test]
    fn test_composite_size_mismatch() {
        let base = RgbaImage::new(4, 4);
        let overlay = RgbaImage::new(2, 2);
        assert!(composite(&base, &overlay).is_err());
    }
}
