//! Per-frame copies of the shared surface into the preview and focus buffers.

use crate::render::layout::{Rect, ViewportLayout};
use crate::render::raster::Surface;
use image::{imageops, Rgba, RgbaImage};

pub const HIGHLIGHT_COLOR: Rgba<u8> = Rgba([0xdb, 0x42, 0x42, 0xff]);

#[derive(Debug, Default)]
pub struct Compositor {
    preview: Option<RgbaImage>,
    focus: Option<RgbaImage>,
}

impl Compositor {
    /// (Re)creates the destination buffers. A zero-sized request leaves that buffer unallocated.
    pub fn allocate(&mut self, preview_size: (u32, u32), focus_size: (u32, u32)) {
        self.preview = non_empty(preview_size).map(|(w, h)| RgbaImage::new(w, h));
        self.focus = non_empty(focus_size).map(|(w, h)| RgbaImage::new(w, h));
    }

    pub fn release(&mut self) {
        self.preview = None;
        self.focus = None;
    }

    pub fn preview(&self) -> Option<&RgbaImage> {
        self.preview.as_ref()
    }

    pub fn focus(&self) -> Option<&RgbaImage> {
        self.focus.as_ref()
    }

    /// Runs both copies for the frame. Missing inputs or outputs are skipped.
    pub fn composite(
        &mut self,
        surface: Option<&Surface>,
        layout: &ViewportLayout,
        focus: Option<usize>,
    ) {
        let Some(surface) = surface else {
            return;
        };
        if surface.width() == 0 || surface.height() == 0 {
            return;
        }
        let focus_rect = focus.and_then(|index| layout.rect(index));

        if let Some(preview) = self.preview.as_mut() {
            copy_scaled(surface.image(), preview);
            if let Some(rect) = focus_rect {
                let sx = preview.width() as f32 / surface.width() as f32;
                let sy = preview.height() as f32 / surface.height() as f32;
                let stroke = ((rect.width as f32 / 100.0) * sx).round().max(1.0) as u32;
                let scaled = Rect::new(
                    (rect.x as f32 * sx).round() as u32,
                    (rect.y as f32 * sy).round() as u32,
                    (rect.width as f32 * sx).round() as u32,
                    (rect.height as f32 * sy).round() as u32,
                );
                stroke_rect(preview, scaled, stroke, HIGHLIGHT_COLOR);
            }
        }

        if let (Some(buffer), Some(rect)) = (self.focus.as_mut(), focus_rect) {
            copy_region(surface.image(), rect, buffer);
        }
    }
}

fn non_empty((w, h): (u32, u32)) -> Option<(u32, u32)> {
    (w > 0 && h > 0).then_some((w, h))
}

fn copy_scaled(source: &RgbaImage, target: &mut RgbaImage) {
    if source.dimensions() == target.dimensions() {
        target.copy_from_slice(source.as_raw());
        return;
    }
    let resized = imageops::resize(
        source,
        target.width(),
        target.height(),
        imageops::FilterType::Triangle,
    );
    *target = resized;
}

/// 1:1 copy of `rect`; the buffer is resized if the view extent changed.
fn copy_region(source: &RgbaImage, rect: Rect, target: &mut RgbaImage) {
    let x_end = (rect.x + rect.width).min(source.width());
    let y_end = (rect.y + rect.height).min(source.height());
    if rect.x >= x_end || rect.y >= y_end {
        return;
    }
    let cropped = imageops::crop_imm(source, rect.x, rect.y, x_end - rect.x, y_end - rect.y).to_image();
    *target = cropped;
}

fn stroke_rect(target: &mut RgbaImage, rect: Rect, stroke: u32, color: Rgba<u8>) {
    let x_end = (rect.x + rect.width).min(target.width());
    let y_end = (rect.y + rect.height).min(target.height());
    for y in rect.y..y_end {
        for x in rect.x..x_end {
            let inside = x >= rect.x + stroke
                && x + stroke < x_end
                && y >= rect.y + stroke
                && y + stroke < y_end;
            if !inside {
                target.put_pixel(x, y, color);
            }
        }
    }
}
