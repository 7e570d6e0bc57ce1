use crate::scene::{RenderConfig, RenderDirection, ViewSize};

/// Pixel rectangle inside the composite surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Placement of the candidate views in the composite. Pure function of its fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportLayout {
    pub view_size: ViewSize,
    pub gap: u32,
    pub direction: RenderDirection,
    pub scale: f32,
    pub candidate_count: usize,
}

impl ViewportLayout {
    pub fn new(render: &RenderConfig, scale: f32, candidate_count: usize) -> Self {
        Self {
            view_size: render.viewport_size,
            gap: render.gap,
            direction: render.direction,
            scale,
            candidate_count,
        }
    }

    /// Pixel size of one view after scaling.
    pub fn view_extent(&self) -> (u32, u32) {
        let scale = if self.scale.is_finite() && self.scale > 0.0 {
            self.scale
        } else {
            1.0
        };
        (
            (self.view_size.width as f32 * scale).round() as u32,
            (self.view_size.height as f32 * scale).round() as u32,
        )
    }

    pub fn rect(&self, index: usize) -> Option<Rect> {
        if index >= self.candidate_count {
            return None;
        }
        let (width, height) = self.view_extent();
        let step = u32::try_from(index).ok()?;
        let along = |extent: u32| step.checked_mul(extent.checked_add(self.gap)?);
        Some(match self.direction {
            RenderDirection::Horizontal => Rect::new(along(width)?, 0, width, height),
            RenderDirection::Vertical => Rect::new(0, along(height)?, width, height),
        })
    }

    pub fn rects(&self) -> Vec<Rect> {
        (0..self.candidate_count)
            .filter_map(|index| self.rect(index))
            .collect()
    }

    /// `N·S + max(0, N-1)·G` along the stacking axis, `S` across it; zero when empty.
    /// Saturates instead of wrapping.
    pub fn composite_extent(&self) -> (u64, u64) {
        if self.candidate_count == 0 {
            return (0, 0);
        }
        let (width, height) = self.view_extent();
        let count = self.candidate_count as u64;
        let stack = |extent: u32| {
            (extent as u64)
                .saturating_mul(count)
                .saturating_add((self.gap as u64).saturating_mul(count - 1))
        };
        match self.direction {
            RenderDirection::Horizontal => (stack(width), height as u64),
            RenderDirection::Vertical => (width as u64, stack(height)),
        }
    }

    /// [`Self::composite_extent`] as surface dimensions; `None` when it does not fit.
    pub fn composite_size(&self) -> Option<(u32, u32)> {
        let (width, height) = self.composite_extent();
        Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?))
    }
}

/// Effective focus index; `None` when nothing is selected.
pub fn clamp_focus(requested: i64, count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    Some(requested.clamp(0, count as i64 - 1) as usize)
}

/// The signed form stored alongside the configuration: `-1` for no focus.
pub fn focus_index(requested: i64, count: usize) -> i64 {
    clamp_focus(requested, count).map_or(-1, |index| index as i64)
}

#[cfg(test)]
mod tests {
    use super::{clamp_focus, focus_index, Rect, ViewportLayout};
    use crate::scene::{RenderDirection, ViewSize};

    fn layout(direction: RenderDirection, scale: f32, count: usize) -> ViewportLayout {
        ViewportLayout {
            view_size: ViewSize::new(200, 100),
            gap: 7,
            direction,
            scale,
            candidate_count: count,
        }
    }

    #[test]
    fn composite_extent_matches_stacking_formula() {
        for direction in [RenderDirection::Horizontal, RenderDirection::Vertical] {
            for scale in [1.0f32, 2.0, 0.5] {
                for count in 0..6usize {
                    let l = layout(direction, scale, count);
                    let (w, h) = l.composite_size().unwrap();
                    let sw = (200.0 * scale) as u32;
                    let sh = (100.0 * scale) as u32;
                    let n = count as u32;
                    let gaps = 7 * n.saturating_sub(1);
                    let expected = match (count, direction) {
                        (0, _) => (0, 0),
                        (_, RenderDirection::Horizontal) => (n * sw + gaps, sh),
                        (_, RenderDirection::Vertical) => (sw, n * sh + gaps),
                    };
                    assert_eq!((w, h), expected, "{:?} x{} n={}", direction, scale, count);
                }
            }
        }
    }

    #[test]
    fn rect_origin_steps_by_view_plus_gap() {
        let h = layout(RenderDirection::Horizontal, 2.0, 4);
        assert_eq!(h.rect(3), Some(Rect::new(3 * (400 + 7), 0, 400, 200)));
        let v = layout(RenderDirection::Vertical, 1.0, 4);
        assert_eq!(v.rect(2), Some(Rect::new(0, 2 * (100 + 7), 200, 100)));
        assert_eq!(v.rect(4), None);
        assert_eq!(v.rects().len(), 4);
    }

    #[test]
    fn last_rect_ends_at_composite_edge() {
        let l = layout(RenderDirection::Horizontal, 1.5, 3);
        let last = l.rect(2).unwrap();
        assert_eq!(last.x + last.width, l.composite_size().unwrap().0);
    }

    #[test]
    fn oversized_layout_does_not_wrap() {
        let l = ViewportLayout {
            view_size: ViewSize::new(100_000, 100),
            gap: 10,
            direction: RenderDirection::Horizontal,
            scale: 1.0,
            candidate_count: 50_000,
        };
        assert_eq!(l.composite_extent(), (100_000 * 50_000 + 10 * 49_999, 100));
        assert_eq!(l.composite_size(), None);
        assert_eq!(l.rect(49_999), None);
        assert_eq!(l.rect(1), Some(Rect::new(100_010, 0, 100_000, 100)));
    }

    #[test]
    fn focus_clamps_into_range() {
        assert_eq!(clamp_focus(9, 5), Some(4));
        assert_eq!(clamp_focus(-3, 5), Some(0));
        assert_eq!(clamp_focus(2, 5), Some(2));
        assert_eq!(clamp_focus(0, 0), None);
        assert_eq!(focus_index(9, 5), 4);
        assert_eq!(focus_index(0, 0), -1);
    }
}
