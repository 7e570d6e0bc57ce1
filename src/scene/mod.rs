pub mod discovery;
pub mod serialization;

use std::path::{Path, PathBuf};

/// Stacking axis of the candidate views inside the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderDirection {
    #[default]
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ViewSize {
    pub width: u32,
    pub height: u32,
}

impl ViewSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Which directories take part and which model file they render.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub work_dir: PathBuf,
    pub candidates: Vec<String>,
    pub selected_candidates: Vec<String>,
    pub selected_file: Option<String>,
    pub file_pattern: String,
    pub available_files: Vec<String>,
}

impl FilesConfig {
    /// One path per selected candidate, in display order.
    pub fn model_paths(&self) -> Vec<PathBuf> {
        let Some(file) = self.selected_file.as_deref() else {
            return Vec::new();
        };
        self.selected_candidates
            .iter()
            .map(|candidate| self.work_dir.join(candidate).join(file))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub viewport_size: ViewSize,
    pub gap: u32,
    pub direction: RenderDirection,
    pub focused_candidate: i64,
    /// Output dimensions of the composite preview; the composite size when unset.
    pub preview_size: Option<ViewSize>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            viewport_size: ViewSize::new(512, 512),
            gap: 0,
            direction: RenderDirection::Horizontal,
            focused_candidate: 0,
            preview_size: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpg,
    #[default]
    Png,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    pub fn supports_transparency(self) -> bool {
        matches!(self, ImageFormat::Png)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub destination_dir: PathBuf,
    pub use_work_dir_as_destination: bool,
    pub format: ImageFormat,
    pub quality: u8,
    pub transparent_background: bool,
    pub filename_template: String,
    pub render_scale: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            destination_dir: PathBuf::new(),
            use_work_dir_as_destination: true,
            format: ImageFormat::Png,
            quality: 100,
            transparent_background: false,
            filename_template: "%name.%ext".to_string(),
            render_scale: 1.0,
        }
    }
}

impl OutputConfig {
    pub fn destination<'a>(&'a self, work_dir: &'a Path) -> &'a Path {
        if self.use_work_dir_as_destination {
            work_dir
        } else {
            &self.destination_dir
        }
    }

    pub fn clamped_quality(&self) -> u8 {
        self.quality.clamp(1, 100)
    }

    /// Transparency only survives formats that carry alpha.
    pub fn transparent(&self) -> bool {
        self.transparent_background && self.format.supports_transparency()
    }

    pub fn scale(&self) -> f32 {
        if self.render_scale.is_finite() && self.render_scale > 0.0 {
            self.render_scale
        } else {
            1.0
        }
    }
}

/// Authored transform of a positionable light.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Placement {
    pub position: [f32; 3],
    pub look_at: [f32; 3],
    /// Track the view camera every frame; `position`/`look_at` are ignored while set.
    pub bind_to_view: bool,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 100.0],
            look_at: [0.0, 0.0, 0.0],
            bind_to_view: false,
        }
    }
}

fn default_decay() -> f32 {
    2.0
}

fn default_spot_angle() -> f32 {
    std::f32::consts::FRAC_PI_3
}

fn default_rect_extent() -> f32 {
    10.0
}

fn default_color() -> String {
    "#ffffff".to_string()
}

fn default_sky() -> String {
    "#ffffff".to_string()
}

fn default_ground() -> String {
    "#444444".to_string()
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LightKind {
    Ambient,
    Directional {
        #[serde(default)]
        placement: Placement,
        #[serde(default)]
        cast_shadow: bool,
    },
    Hemisphere {
        #[serde(default = "default_sky")]
        sky_color_hex: String,
        #[serde(default = "default_ground")]
        ground_color_hex: String,
    },
    Point {
        #[serde(default)]
        placement: Placement,
        #[serde(default)]
        cast_shadow: bool,
        #[serde(default)]
        distance: f32,
        #[serde(default = "default_decay")]
        decay: f32,
        #[serde(default)]
        power: Option<f32>,
    },
    RectArea {
        #[serde(default = "default_rect_extent")]
        width: f32,
        #[serde(default = "default_rect_extent")]
        height: f32,
    },
    Spot {
        #[serde(default)]
        placement: Placement,
        #[serde(default)]
        cast_shadow: bool,
        #[serde(default)]
        distance: f32,
        #[serde(default = "default_decay")]
        decay: f32,
        #[serde(default = "default_spot_angle")]
        angle: f32,
        #[serde(default)]
        penumbra: f32,
    },
}

impl LightKind {
    pub fn label(&self) -> &'static str {
        match self {
            LightKind::Ambient => "ambient",
            LightKind::Directional { .. } => "directional",
            LightKind::Hemisphere { .. } => "hemisphere",
            LightKind::Point { .. } => "point",
            LightKind::RectArea { .. } => "rectarea",
            LightKind::Spot { .. } => "spot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LightConfig {
    pub id: u64,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_color")]
    pub color_hex: String,
    #[serde(default)]
    pub intensity: f32,
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: LightKind,
}

impl LightConfig {
    pub fn placement(&self) -> Option<&Placement> {
        match &self.kind {
            LightKind::Directional { placement, .. }
            | LightKind::Point { placement, .. }
            | LightKind::Spot { placement, .. } => Some(placement),
            _ => None,
        }
    }

    pub fn cast_shadow(&self) -> Option<bool> {
        match &self.kind {
            LightKind::Directional { cast_shadow, .. }
            | LightKind::Point { cast_shadow, .. }
            | LightKind::Spot { cast_shadow, .. } => Some(*cast_shadow),
            _ => None,
        }
    }

    pub fn binds_to_view(&self) -> bool {
        self.placement().is_some_and(|placement| placement.bind_to_view)
    }
}

pub fn default_lights() -> Vec<LightConfig> {
    vec![
        LightConfig {
            id: 1,
            display_name: "Ambient".to_string(),
            color_hex: "#ffffff".to_string(),
            intensity: 0.4,
            enabled: true,
            kind: LightKind::Ambient,
        },
        LightConfig {
            id: 2,
            display_name: "Head lamp".to_string(),
            color_hex: "#ffffff".to_string(),
            intensity: 1.0,
            enabled: true,
            kind: LightKind::Directional {
                placement: Placement {
                    bind_to_view: true,
                    ..Placement::default()
                },
                cast_shadow: false,
            },
        },
    ]
}

/// Shared camera snapshot exchanged between the control view and every render view.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CameraState {
    pub position: [f32; 3],
    /// Quaternion as `[x, y, z, w]`.
    pub orientation: [f32; 4],
    pub zoom: f32,
    pub world_direction: [f32; 3],
    pub reset_requested: bool,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 150.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
            zoom: 5.0,
            world_direction: [0.0, 0.0, -1.0],
            reset_requested: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
    pub vertex_colors: bool,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            vertex_colors: true,
        }
    }
}

/// Snapshot of the configuration store this renderer reads from and writes camera updates to.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Session {
    pub files: FilesConfig,
    pub render: RenderConfig,
    pub output: OutputConfig,
    pub lights: Vec<LightConfig>,
    pub camera: CameraState,
    pub material: MaterialConfig,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            files: FilesConfig::default(),
            render: RenderConfig::default(),
            output: OutputConfig::default(),
            lights: default_lights(),
            camera: CameraState::default(),
            material: MaterialConfig::default(),
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn destination_dir(&self) -> &Path {
        self.output.destination(&self.files.work_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_paths_follow_candidate_order() {
        let files = FilesConfig {
            work_dir: PathBuf::from("/work"),
            selected_candidates: vec!["b".to_string(), "a".to_string()],
            selected_file: Some("bracket.stl".to_string()),
            ..FilesConfig::default()
        };
        assert_eq!(
            files.model_paths(),
            vec![
                PathBuf::from("/work/b/bracket.stl"),
                PathBuf::from("/work/a/bracket.stl")
            ]
        );
    }

    #[test]
    fn model_paths_empty_without_selected_file() {
        let files = FilesConfig {
            selected_candidates: vec!["a".to_string()],
            ..FilesConfig::default()
        };
        assert!(files.model_paths().is_empty());
    }

    #[test]
    fn transparency_requires_png() {
        let mut output = OutputConfig {
            transparent_background: true,
            ..OutputConfig::default()
        };
        assert!(output.transparent());
        output.format = ImageFormat::Jpg;
        assert!(!output.transparent());
    }

    #[test]
    fn destination_prefers_work_dir_when_flagged() {
        let mut output = OutputConfig {
            destination_dir: PathBuf::from("/out"),
            ..OutputConfig::default()
        };
        let work = PathBuf::from("/work");
        assert_eq!(output.destination(&work), Path::new("/work"));
        output.use_work_dir_as_destination = false;
        assert_eq!(output.destination(&work), Path::new("/out"));
    }

    #[test]
    fn bind_to_view_only_on_positionable_kinds() {
        let lights = default_lights();
        assert!(!lights[0].binds_to_view());
        assert!(lights[1].binds_to_view());
        assert_eq!(lights[0].placement(), None);
    }
}
