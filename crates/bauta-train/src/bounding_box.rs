//! Axis-aligned bounding boxes of binary masks.

/// Pixel bounding box with inclusive `left`/`top` and exclusive `right`/`bottom`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
}

impl BoundingBox {
    /// Smallest box enclosing every foreground pixel (value above 0.5) of a
    /// row-major `[height, width]` mask, or `None` for an empty mask.
    pub fn from_mask(mask: &[f32], height: usize, width: usize) -> Option<Self> {
        debug_assert_eq!(mask.len(), height * width);

        let mut bounds: Option<Self> = None;
        for (index, _) in mask.iter().enumerate().filter(|(_, &v)| v > 0.5) {
            let (y, x) = (index / width, index % width);
            let current = bounds.get_or_insert(Self {
                left: x,
                top: y,
                right: x + 1,
                bottom: y + 1,
            });
            current.left = current.left.min(x);
            current.top = current.top.min(y);
            current.right = current.right.max(x + 1);
            current.bottom = current.bottom.max(y + 1);
        }
        bounds
    }

    pub const fn width(&self) -> usize {
        self.right - self.left
    }

    pub const fn height(&self) -> usize {
        self.bottom - self.top
    }

    /// `[left, top, right, bottom]` as floats, the layout stored in batches.
    pub fn to_array(self) -> [f32; 4] {
        [
            self.left as f32,
            self.top as f32,
            self.right as f32,
            self.bottom as f32,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encloses_every_foreground_pixel() {
        #[rustfmt::skip]
        let mask = [
            0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0, 0.0,
        ];

        let bbox = BoundingBox::from_mask(&mask, 4, 5).unwrap();

        assert_eq!(
            bbox,
            BoundingBox {
                left: 1,
                top: 1,
                right: 4,
                bottom: 4
            }
        );
        assert_eq!(bbox.width(), 3);
        assert_eq!(bbox.height(), 3);
        assert_eq!(bbox.to_array(), [1.0, 1.0, 4.0, 4.0]);
    }

    #[test]
    fn empty_mask_has_no_box() {
        assert_eq!(BoundingBox::from_mask(&[0.0; 6], 2, 3), None);
    }

    #[test]
    fn single_pixel_box_has_unit_size() {
        let mut mask = [0.0; 9];
        mask[8] = 1.0;

        let bbox = BoundingBox::from_mask(&mask, 3, 3).unwrap();

        assert_eq!((bbox.left, bbox.top, bbox.width(), bbox.height()), (2, 2, 1, 1));
    }
}
