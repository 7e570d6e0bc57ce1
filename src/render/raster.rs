//! CPU rasterizer for the shared composite surface: depth-tested, Gouraud-shaded,
//! double-sided triangles and square point splats.

use crate::assets::{Asset, Mesh, Topology};
use crate::render::camera::ViewCamera;
use crate::render::layout::Rect;
use crate::render::lights::LightRig;
use glam::{Mat3, Mat4, Vec3, Vec4};
use image::{Rgba, RgbaImage};

pub const OPAQUE_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const TRANSPARENT_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Color plus depth attachment shared by every view of a frame.
#[derive(Debug, Clone)]
pub struct Surface {
    color: RgbaImage,
    depth: Vec<f32>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            color: RgbaImage::new(width, height),
            depth: vec![f32::INFINITY; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.color.width()
    }

    pub fn height(&self) -> u32 {
        self.color.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.color
    }

    pub fn clear(&mut self, background: Rgba<u8>) {
        for pixel in self.color.pixels_mut() {
            *pixel = background;
        }
        self.depth.fill(f32::INFINITY);
    }

    pub fn clear_rect(&mut self, rect: Rect, background: Rgba<u8>) {
        let x_end = (rect.x + rect.width).min(self.width());
        let y_end = (rect.y + rect.height).min(self.height());
        for y in rect.y..y_end {
            for x in rect.x..x_end {
                self.color.put_pixel(x, y, background);
                let index = self.index(x, y);
                self.depth[index] = f32::INFINITY;
            }
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width() as usize + x as usize
    }

    fn plot(&mut self, x: u32, y: u32, depth: f32, color: Vec3) {
        let index = self.index(x, y);
        if depth >= self.depth[index] {
            return;
        }
        self.depth[index] = depth;
        self.color.put_pixel(x, y, encode(color));
    }
}

/// Everything one view needs to draw into its rectangle.
#[derive(Debug, Clone, Copy)]
pub struct DrawParams<'a> {
    pub camera: &'a ViewCamera,
    pub rig: &'a LightRig,
    pub rect: Rect,
    pub vertex_colors: bool,
    pub point_size: u32,
}

struct ScreenVertex {
    x: f32,
    y: f32,
    depth: f32,
}

/// Draws every mesh of `asset`. Returns the number of primitives that reached the rasterizer.
pub fn draw_asset(surface: &mut Surface, asset: &Asset, params: &DrawParams<'_>) -> usize {
    if params.rect.is_empty() {
        return 0;
    }
    let view_projection = params.camera.view_projection();
    let mut drawn = 0;
    asset.for_each_mesh(|world, mesh| {
        drawn += match mesh.topology {
            Topology::Triangles => draw_triangles(surface, mesh, world, view_projection, params),
            Topology::Points => draw_points(surface, mesh, world, view_projection, params),
        };
    });
    drawn
}

fn albedo(mesh: &Mesh, index: usize, vertex_colors: bool) -> Vec3 {
    let base = mesh.base_color.truncate();
    match (&mesh.colors, vertex_colors) {
        (Some(colors), true) => colors.get(index).map_or(base, |c| c.truncate() * base),
        _ => base,
    }
}

fn to_screen(clip: Vec4, rect: Rect) -> Option<ScreenVertex> {
    if clip.w.abs() < f32::EPSILON {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    if !(0.0..=1.0).contains(&ndc.z) {
        return None;
    }
    Some(ScreenVertex {
        x: rect.x as f32 + (ndc.x * 0.5 + 0.5) * rect.width as f32,
        y: rect.y as f32 + (0.5 - ndc.y * 0.5) * rect.height as f32,
        depth: ndc.z,
    })
}

fn draw_triangles(
    surface: &mut Surface,
    mesh: &Mesh,
    world: Mat4,
    view_projection: Mat4,
    params: &DrawParams<'_>,
) -> usize {
    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
    let world_positions: Vec<Vec3> = mesh
        .positions
        .iter()
        .map(|p| world.transform_point3(*p))
        .collect();
    let world_normals: Vec<Vec3> = mesh
        .normals
        .iter()
        .map(|n| (normal_matrix * *n).try_normalize().unwrap_or(Vec3::Z))
        .collect();
    let screen: Vec<Option<ScreenVertex>> = world_positions
        .iter()
        .map(|p| to_screen(view_projection * p.extend(1.0), params.rect))
        .collect();

    let mut drawn = 0;
    for tri in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (Some(sa), Some(sb), Some(sc)) = (&screen[a], &screen[b], &screen[c]) else {
            continue;
        };

        // Double-sided: light the side that faces the viewer.
        let face = (world_positions[b] - world_positions[a])
            .cross(world_positions[c] - world_positions[a]);
        let flip = face.dot(params.camera.direction) > 0.0;
        let shade = |index: usize| {
            let mut normal = world_normals.get(index).copied().unwrap_or(Vec3::Z);
            if flip {
                normal = -normal;
            }
            neutral_tone_map(params.rig.shade(
                world_positions[index],
                normal,
                albedo(mesh, index, params.vertex_colors),
            ))
        };
        let colors = [shade(a), shade(b), shade(c)];
        fill_triangle(surface, [sa, sb, sc], colors, params.rect);
        drawn += 1;
    }
    drawn
}

fn fill_triangle(surface: &mut Surface, v: [&ScreenVertex; 3], colors: [Vec3; 3], rect: Rect) {
    let area = edge(v[0], v[1], v[2].x, v[2].y);
    if area.abs() < f32::EPSILON {
        return;
    }
    let x_limit = (rect.x + rect.width).min(surface.width()) as f32;
    let y_limit = (rect.y + rect.height).min(surface.height()) as f32;
    let min_x = v.iter().map(|p| p.x).fold(f32::INFINITY, f32::min).max(rect.x as f32);
    let max_x = v.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max).min(x_limit - 1.0);
    let min_y = v.iter().map(|p| p.y).fold(f32::INFINITY, f32::min).max(rect.y as f32);
    let max_y = v.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max).min(y_limit - 1.0);
    if min_x > max_x || min_y > max_y {
        return;
    }

    for y in min_y.floor() as u32..=max_y.ceil().min(y_limit - 1.0) as u32 {
        for x in min_x.floor() as u32..=max_x.ceil().min(x_limit - 1.0) as u32 {
            let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
            let w0 = edge(v[1], v[2], px, py) / area;
            let w1 = edge(v[2], v[0], px, py) / area;
            let w2 = edge(v[0], v[1], px, py) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let depth = w0 * v[0].depth + w1 * v[1].depth + w2 * v[2].depth;
            let color = colors[0] * w0 + colors[1] * w1 + colors[2] * w2;
            surface.plot(x, y, depth, color);
        }
    }
}

fn edge(a: &ScreenVertex, b: &ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

fn draw_points(
    surface: &mut Surface,
    mesh: &Mesh,
    world: Mat4,
    view_projection: Mat4,
    params: &DrawParams<'_>,
) -> usize {
    let size = params.point_size.max(1) as i64;
    let half = (size / 2) as f32;
    let facing = -params.camera.direction;
    let rect = params.rect;
    let bounds = |origin: u32, extent: u32, limit: u32| {
        (origin as i64, (origin as i64 + extent as i64).min(limit as i64))
    };
    let columns = bounds(rect.x, rect.width, surface.width());
    let rows = bounds(rect.y, rect.height, surface.height());
    // Splat extent clipped to the view; `None` when it lies entirely outside.
    let span = |center: f32, (low, high): (i64, i64)| {
        let start = (center - half).floor() as i64;
        let end = start.saturating_add(size).min(high);
        let start = start.max(low);
        (start < end).then(|| (start as u32, end as u32))
    };

    let mut drawn = 0;
    for (index, position) in mesh.positions.iter().enumerate() {
        let world_position = world.transform_point3(*position);
        let Some(screen) = to_screen(view_projection * world_position.extend(1.0), rect) else {
            continue;
        };
        let (Some((x0, x1)), Some((y0, y1))) = (span(screen.x, columns), span(screen.y, rows))
        else {
            continue;
        };
        let color = neutral_tone_map(params.rig.shade(
            world_position,
            facing,
            albedo(mesh, index, params.vertex_colors),
        ));
        for y in y0..y1 {
            for x in x0..x1 {
                surface.plot(x, y, screen.depth, color);
            }
        }
        drawn += 1;
    }
    drawn
}

/// Khronos PBR Neutral tone mapping, exposure 1.
pub fn neutral_tone_map(color: Vec3) -> Vec3 {
    const START_COMPRESSION: f32 = 0.8 - 0.04;
    const DESATURATION: f32 = 0.15;

    let color = color.max(Vec3::ZERO);
    let x = color.min_element();
    let offset = if x < 0.08 { x - 6.25 * x * x } else { 0.04 };
    let color = color - Vec3::splat(offset);

    let peak = color.max_element();
    if peak < START_COMPRESSION {
        return color;
    }
    let d = 1.0 - START_COMPRESSION;
    let new_peak = 1.0 - d * d / (peak + d - START_COMPRESSION);
    let color = color * (new_peak / peak);
    let g = 1.0 - 1.0 / (DESATURATION * (peak - new_peak) + 1.0);
    color.lerp(Vec3::splat(new_peak), g)
}

fn encode(color: Vec3) -> Rgba<u8> {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    Rgba([channel(color.x), channel(color.y), channel(color.z), 255])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::triangle;
    use crate::assets::{BufferPool, MeshData, ParsedAsset};
    use crate::scene::{CameraState, LightConfig, LightKind};

    fn ambient_rig(camera: &ViewCamera) -> LightRig {
        let light = LightConfig {
            id: 1,
            display_name: String::new(),
            color_hex: "#ffffff".to_string(),
            intensity: 0.5,
            enabled: true,
            kind: LightKind::Ambient,
        };
        LightRig::build(&[light], camera)
    }

    fn big_triangle() -> MeshData {
        MeshData {
            positions: vec![[-50.0, -50.0, 0.0], [50.0, -50.0, 0.0], [0.0, 50.0, 0.0]],
            indices: Some(vec![0, 1, 2]),
            ..MeshData::default()
        }
    }

    #[test]
    fn tone_map_is_identity_in_the_linear_toe() {
        let mid = neutral_tone_map(Vec3::splat(0.5));
        assert!((mid.x - 0.46).abs() < 1e-4);
        let bright = neutral_tone_map(Vec3::splat(10.0));
        assert!(bright.x < 1.0 && bright.x > 0.9);
        assert_eq!(neutral_tone_map(Vec3::ZERO), Vec3::ZERO);
    }

    #[test]
    fn triangle_covers_center_of_its_view_only() {
        let mut pool = BufferPool::new();
        let asset = Asset::upload(ParsedAsset::Geometry(big_triangle()), &mut pool);
        let camera = ViewCamera::from_state(&CameraState::default(), (64, 64), 1.0);
        let rig = ambient_rig(&camera);
        let mut surface = Surface::new(128, 64);
        surface.clear(OPAQUE_BACKGROUND);

        let params = DrawParams {
            camera: &camera,
            rig: &rig,
            rect: Rect::new(64, 0, 64, 64),
            vertex_colors: true,
            point_size: 1,
        };
        assert_eq!(draw_asset(&mut surface, &asset, &params), 1);

        let center = surface.image().get_pixel(96, 32);
        assert_ne!(*center, OPAQUE_BACKGROUND);
        assert_eq!(center[0], center[1]);
        // Left view untouched.
        assert_eq!(*surface.image().get_pixel(32, 32), OPAQUE_BACKGROUND);
        asset.dispose(&mut pool);
    }

    #[test]
    fn back_faces_are_lit_like_front_faces() {
        let mut pool = BufferPool::new();
        let mut reversed = big_triangle();
        reversed.indices = Some(vec![0, 2, 1]);
        let front = Asset::upload(ParsedAsset::Geometry(big_triangle()), &mut pool);
        let back = Asset::upload(ParsedAsset::Geometry(reversed), &mut pool);

        let camera = ViewCamera::from_state(&CameraState::default(), (32, 32), 1.0);
        let rig = LightRig::build(&crate::scene::default_lights(), &camera);
        let params = DrawParams {
            camera: &camera,
            rig: &rig,
            rect: Rect::new(0, 0, 32, 32),
            vertex_colors: false,
            point_size: 1,
        };
        let mut a = Surface::new(32, 32);
        let mut b = Surface::new(32, 32);
        draw_asset(&mut a, &front, &params);
        draw_asset(&mut b, &back, &params);
        assert_eq!(a.image().get_pixel(16, 16), b.image().get_pixel(16, 16));
        front.dispose(&mut pool);
        back.dispose(&mut pool);
    }

    #[test]
    fn nearer_geometry_wins_depth_test() {
        let mut pool = BufferPool::new();
        let mut near = triangle(10.0);
        near.positions = vec![[-50.0, -50.0, 10.0], [50.0, -50.0, 10.0], [0.0, 50.0, 10.0]];
        near.colors = vec![[1.0, 0.0, 0.0, 1.0]; 3];
        let mut far = big_triangle();
        far.colors = vec![[0.0, 0.0, 1.0, 1.0]; 3];

        let mut root = crate::assets::NodeData::group("root");
        root.meshes.push(near);
        root.meshes.push(far);
        let asset = Asset::upload(ParsedAsset::Scene(root), &mut pool);

        let camera = ViewCamera::from_state(&CameraState::default(), (32, 32), 1.0);
        let rig = ambient_rig(&camera);
        let mut surface = Surface::new(32, 32);
        surface.clear(TRANSPARENT_BACKGROUND);
        let params = DrawParams {
            camera: &camera,
            rig: &rig,
            rect: Rect::new(0, 0, 32, 32),
            vertex_colors: true,
            point_size: 1,
        };
        draw_asset(&mut surface, &asset, &params);
        let pixel = surface.image().get_pixel(16, 16);
        assert!(pixel[0] > 0 && pixel[2] == 0);
        assert_eq!(pixel[3], 255);
        assert_eq!(*surface.image().get_pixel(0, 0), TRANSPARENT_BACKGROUND);
        asset.dispose(&mut pool);
    }

    #[test]
    fn points_are_splatted_inside_their_rect() {
        let mut pool = BufferPool::new();
        let cloud = MeshData {
            positions: vec![[0.0, 0.0, 0.0]],
            topology: Topology::Points,
            ..MeshData::default()
        };
        let asset = Asset::upload(ParsedAsset::Geometry(cloud), &mut pool);
        let camera = ViewCamera::from_state(&CameraState::default(), (16, 16), 1.0);
        let rig = ambient_rig(&camera);
        let mut surface = Surface::new(16, 16);
        surface.clear(OPAQUE_BACKGROUND);
        let params = DrawParams {
            camera: &camera,
            rig: &rig,
            rect: Rect::new(0, 0, 16, 16),
            vertex_colors: true,
            point_size: 3,
        };
        assert_eq!(draw_asset(&mut surface, &asset, &params), 1);
        assert_ne!(*surface.image().get_pixel(8, 8), OPAQUE_BACKGROUND);
        assert_eq!(*surface.image().get_pixel(0, 0), OPAQUE_BACKGROUND);
        asset.dispose(&mut pool);
    }

    #[test]
    fn points_outside_the_view_are_skipped() {
        let mut pool = BufferPool::new();
        let cloud = MeshData {
            positions: vec![[1e9, 0.0, 0.0], [0.0, 0.0, 0.0], [-1e9, -1e9, 0.0]],
            topology: Topology::Points,
            ..MeshData::default()
        };
        let asset = Asset::upload(ParsedAsset::Geometry(cloud), &mut pool);
        let camera = ViewCamera::from_state(&CameraState::default(), (16, 16), 1.0);
        let rig = ambient_rig(&camera);
        let mut surface = Surface::new(32, 16);
        surface.clear(OPAQUE_BACKGROUND);
        let params = DrawParams {
            camera: &camera,
            rig: &rig,
            rect: Rect::new(16, 0, 16, 16),
            vertex_colors: true,
            point_size: 3,
        };
        assert_eq!(draw_asset(&mut surface, &asset, &params), 1);
        assert_ne!(*surface.image().get_pixel(24, 8), OPAQUE_BACKGROUND);
        for x in [0, 15] {
            assert_eq!(*surface.image().get_pixel(x, 8), OPAQUE_BACKGROUND);
        }
        assert_eq!(*surface.image().get_pixel(31, 8), OPAQUE_BACKGROUND);
        asset.dispose(&mut pool);
    }
}
