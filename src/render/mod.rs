mod camera;
mod compositor;
pub mod layout;
pub mod lights;
pub mod raster;

pub use camera::{CameraController, CameraHub};
pub use layout::{clamp_focus, focus_index, ViewportLayout};

use camera::ViewCamera;
use compositor::Compositor;
use lights::LightRig;
use raster::Surface;

use crate::assets::{AssetSource, SlotCache};
use crate::scene::{CameraState, LightConfig, MaterialConfig, ViewSize};
use image::RgbaImage;

const MAX_SURFACE_PIXELS: u64 = 1 << 28;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("composite surface {width}x{height} is too large")]
    SurfaceTooLarge { width: u64, height: u64 },
}

/// Per-frame inputs read from the session.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    pub camera: &'a CameraState,
    pub lights: &'a [LightConfig],
    pub material: &'a MaterialConfig,
    pub transparent: bool,
    pub focus: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub views: usize,
    pub empty_views: usize,
    /// Empty views whose next asset is still being read.
    pub loading_views: usize,
    pub primitives: usize,
}

/// Owns the shared surface and the derived preview/focus buffers.
#[derive(Debug, Default)]
pub struct RenderContext {
    layout: Option<ViewportLayout>,
    preview_size: Option<ViewSize>,
    surface: Option<Surface>,
    compositor: Compositor,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resizes the surface and buffers when the layout or preview size changed.
    pub fn configure(
        &mut self,
        layout: ViewportLayout,
        preview_size: Option<ViewSize>,
    ) -> Result<(), RenderError> {
        if self.layout == Some(layout) && self.preview_size == preview_size {
            return Ok(());
        }
        let (wide, high) = layout.composite_extent();
        let too_large = RenderError::SurfaceTooLarge {
            width: wide,
            height: high,
        };
        if wide.saturating_mul(high) > MAX_SURFACE_PIXELS {
            return Err(too_large);
        }
        let Some((width, height)) = layout.composite_size() else {
            return Err(too_large);
        };

        self.surface = (width > 0 && height > 0).then(|| Surface::new(width, height));
        let preview = preview_size.map_or((width, height), |size| (size.width, size.height));
        let focus = if layout.candidate_count > 0 {
            layout.view_extent()
        } else {
            (0, 0)
        };
        self.compositor.allocate(preview, focus);
        log::info!(
            "Composite {}x{} for {} views, preview {}x{}",
            width,
            height,
            layout.candidate_count,
            preview.0,
            preview.1
        );
        self.layout = Some(layout);
        self.preview_size = preview_size;
        Ok(())
    }

    #[cfg(test)]
    pub fn layout(&self) -> Option<&ViewportLayout> {
        self.layout.as_ref()
    }

    /// Renders every view into the shared surface, then runs the compositor.
    pub fn render_frame<S: AssetSource>(
        &mut self,
        frame: &FrameInputs<'_>,
        cache: &SlotCache<S>,
    ) -> FrameStats {
        let mut stats = FrameStats::default();
        let Some(layout) = self.layout else {
            return stats;
        };
        let background = if frame.transparent {
            raster::TRANSPARENT_BACKGROUND
        } else {
            raster::OPAQUE_BACKGROUND
        };

        if let Some(surface) = self.surface.as_mut() {
            surface.clear(background);
            let point_size = layout.scale.round().max(1.0) as u32;
            for (index, rect) in layout.rects().into_iter().enumerate() {
                stats.views += 1;
                surface.clear_rect(rect, background);
                let Some(asset) = cache.get(index) else {
                    stats.empty_views += 1;
                    if cache.is_loading(index) {
                        stats.loading_views += 1;
                    }
                    continue;
                };
                let camera =
                    ViewCamera::from_state(frame.camera, (rect.width, rect.height), layout.scale);
                let rig = LightRig::build(frame.lights, &camera);
                let params = raster::DrawParams {
                    camera: &camera,
                    rig: &rig,
                    rect,
                    vertex_colors: frame.material.vertex_colors,
                    point_size,
                };
                stats.primitives += raster::draw_asset(surface, asset, &params);
            }
        }

        self.compositor
            .composite(self.surface.as_ref(), &layout, frame.focus);
        log::trace!(
            "Frame: {} views, {} empty ({} loading), {} primitives",
            stats.views,
            stats.empty_views,
            stats.loading_views,
            stats.primitives
        );
        stats
    }

    #[cfg(test)]
    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn preview(&self) -> Option<&RgbaImage> {
        self.compositor.preview()
    }

    pub fn focus(&self) -> Option<&RgbaImage> {
        self.compositor.focus()
    }

    pub fn release(&mut self) {
        self.surface = None;
        self.compositor.release();
        self.layout = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameInputs, RenderContext, RenderError, ViewportLayout};
    use crate::assets::{AssetError, AssetSource, ParsedAsset, PendingLoad, SlotCache};
    use crate::scene::{default_lights, CameraState, MaterialConfig, RenderDirection, ViewSize};
    use std::cell::RefCell;
    use std::io::Write;
    use std::path::Path;

    /// Loads that never finish while the source is alive.
    #[derive(Default)]
    struct StalledSource(RefCell<Vec<flume::Sender<Result<ParsedAsset, AssetError>>>>);

    impl AssetSource for StalledSource {
        fn submit(&self, _slot: usize, path: &Path) -> PendingLoad {
            let (sender, receiver) = flume::bounded(1);
            self.0.borrow_mut().push(sender);
            PendingLoad::worker(path.to_path_buf(), receiver)
        }
    }

    fn layout(count: usize) -> ViewportLayout {
        ViewportLayout {
            view_size: ViewSize::new(32, 32),
            gap: 4,
            direction: RenderDirection::Horizontal,
            scale: 1.0,
            candidate_count: count,
        }
    }

    #[test]
    fn failed_view_does_not_block_the_others() {
        let dir = std::env::temp_dir().join(format!(
            "candiview_render_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("good.stl");
        let mut file = std::fs::File::create(&good).unwrap();
        writeln!(
            file,
            "solid t\nfacet normal 0 0 1\nouter loop\nvertex -50 -50 0\nvertex 50 -50 0\nvertex 0 50 0\nendloop\nendfacet\nendsolid t"
        )
        .unwrap();
        drop(file);

        let mut cache = SlotCache::new();
        cache.ensure(0, &good);
        cache.ensure(1, &dir.join("missing.obj"));
        cache.ensure(2, &good);
        while cache.pending_count() > 0 {
            cache.poll();
            std::thread::yield_now();
        }

        let mut context = RenderContext::new();
        context.configure(layout(3), None).unwrap();
        let camera = CameraState::default();
        let lights = default_lights();
        let material = MaterialConfig::default();
        let stats = context.render_frame(
            &FrameInputs {
                camera: &camera,
                lights: &lights,
                material: &material,
                transparent: false,
                focus: Some(1),
            },
            &cache,
        );
        assert_eq!(stats.views, 3);
        assert_eq!(stats.empty_views, 1);
        assert_eq!(stats.loading_views, 0);
        assert_eq!(stats.primitives, 2);

        let preview = context.preview().unwrap();
        assert_eq!(preview.dimensions(), (104, 32));
        assert_ne!(preview.get_pixel(16, 16)[2], 255);
        assert_ne!(preview.get_pixel(88, 16)[2], 255);
        assert_eq!(context.focus().unwrap().dimensions(), (32, 32));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn oversized_layout_is_rejected_before_allocation() {
        let mut context = RenderContext::new();
        context.configure(layout(2), None).unwrap();
        let huge = ViewportLayout {
            view_size: ViewSize::new(100_000, 100),
            candidate_count: 50_000,
            ..layout(0)
        };
        assert!(matches!(
            context.configure(huge, None),
            Err(RenderError::SurfaceTooLarge { height: 100, .. })
        ));
        let zero_height = ViewportLayout {
            view_size: ViewSize::new(u32::MAX, 0),
            ..layout(3)
        };
        assert!(context.configure(zero_height, None).is_err());
        assert_eq!(context.layout(), Some(&layout(2)));
        assert_eq!(context.surface().unwrap().width(), 68);
    }

    #[test]
    fn views_still_loading_are_counted() {
        let mut cache = SlotCache::with_source(StalledSource::default());
        cache.ensure(1, Path::new("c1/part.stl"));
        let mut context = RenderContext::new();
        context.configure(layout(2), None).unwrap();
        let camera = CameraState::default();
        let material = MaterialConfig::default();
        let stats = context.render_frame(
            &FrameInputs {
                camera: &camera,
                lights: &[],
                material: &material,
                transparent: false,
                focus: None,
            },
            &cache,
        );
        assert_eq!(stats.views, 2);
        assert_eq!(stats.empty_views, 2);
        assert_eq!(stats.loading_views, 1);
    }

    #[test]
    fn empty_candidate_list_renders_nothing() {
        let mut context = RenderContext::new();
        context.configure(layout(0), None).unwrap();
        let cache = SlotCache::new();
        let camera = CameraState::default();
        let material = MaterialConfig::default();
        let stats = context.render_frame(
            &FrameInputs {
                camera: &camera,
                lights: &[],
                material: &material,
                transparent: true,
                focus: None,
            },
            &cache,
        );
        assert_eq!(stats.views, 0);
        assert!(context.surface().is_none());
        assert!(context.preview().is_none());
    }
}
