//! Turns the authored light list into per-frame emitters and evaluates diffuse lighting.

use crate::render::camera::ViewCamera;
use crate::scene::{LightConfig, LightKind, Placement};
use glam::Vec3;

/// Stored intensities are normalized; the renderer works in units that are π larger.
pub const INTENSITY_SCALE: f32 = std::f32::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Emitter {
    Ambient,
    Hemisphere {
        sky: Vec3,
        ground: Vec3,
    },
    /// `direction` points from the light toward the scene.
    Directional {
        direction: Vec3,
    },
    Point {
        position: Vec3,
        distance: f32,
        decay: f32,
    },
    Spot {
        position: Vec3,
        direction: Vec3,
        distance: f32,
        decay: f32,
        cone_cos: f32,
        penumbra_cos: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigLight {
    pub id: u64,
    /// Linear color premultiplied by the render-time intensity.
    pub radiance: Vec3,
    pub emitter: Emitter,
    pub cast_shadow: bool,
}

/// Lights instantiated for one view and one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightRig {
    pub lights: Vec<RigLight>,
}

impl LightRig {
    pub fn build(configs: &[LightConfig], camera: &ViewCamera) -> Self {
        let lights: Vec<RigLight> = configs
            .iter()
            .filter(|config| config.enabled)
            .filter_map(|config| instantiate(config, camera))
            .collect();
        log::trace!(
            "Light rig: {} of {} lights active, {} bound to the view",
            lights.len(),
            configs.len(),
            configs
                .iter()
                .filter(|config| config.enabled && config.binds_to_view())
                .count()
        );
        Self { lights }
    }

    /// Outgoing linear radiance for a Lambertian surface.
    pub fn shade(&self, position: Vec3, normal: Vec3, albedo: Vec3) -> Vec3 {
        let brdf = albedo / std::f32::consts::PI;
        let mut out = Vec3::ZERO;
        for light in &self.lights {
            let irradiance = match light.emitter {
                Emitter::Ambient => light.radiance,
                Emitter::Hemisphere { sky, ground } => {
                    let weight = 0.5 * normal.dot(Vec3::Y) + 0.5;
                    ground.lerp(sky, weight) * light.radiance
                }
                Emitter::Directional { direction } => {
                    light.radiance * normal.dot(-direction).max(0.0)
                }
                Emitter::Point {
                    position: origin,
                    distance,
                    decay,
                } => {
                    let to_light = origin - position;
                    let length = to_light.length();
                    let Some(dir) = to_light.try_normalize() else {
                        continue;
                    };
                    light.radiance
                        * distance_attenuation(length, distance, decay)
                        * normal.dot(dir).max(0.0)
                }
                Emitter::Spot {
                    position: origin,
                    direction,
                    distance,
                    decay,
                    cone_cos,
                    penumbra_cos,
                } => {
                    let to_light = origin - position;
                    let length = to_light.length();
                    let Some(dir) = to_light.try_normalize() else {
                        continue;
                    };
                    let cone = smoothstep(cone_cos, penumbra_cos, (-dir).dot(direction));
                    light.radiance
                        * cone
                        * distance_attenuation(length, distance, decay)
                        * normal.dot(dir).max(0.0)
                }
            };
            out += irradiance * brdf;
        }
        out
    }
}

fn instantiate(config: &LightConfig, camera: &ViewCamera) -> Option<RigLight> {
    let Some(color) = parse_hex_color(&config.color_hex) else {
        log::warn!(
            "Light {} ({}) has invalid color {:?}; skipped",
            config.id,
            config.kind.label(),
            config.color_hex
        );
        return None;
    };
    let mut intensity = config.intensity;
    let emitter = match &config.kind {
        LightKind::Ambient => Emitter::Ambient,
        LightKind::Hemisphere {
            sky_color_hex,
            ground_color_hex,
        } => Emitter::Hemisphere {
            sky: parse_hex_color(sky_color_hex).unwrap_or(Vec3::ONE),
            ground: parse_hex_color(ground_color_hex).unwrap_or(Vec3::ZERO),
        },
        LightKind::Directional { placement, .. } => {
            let (_, direction) = resolve_placement(placement, camera);
            Emitter::Directional { direction }
        }
        LightKind::Point {
            placement,
            distance,
            decay,
            power,
            ..
        } => {
            if let Some(power) = power {
                intensity = power / (4.0 * std::f32::consts::PI);
            }
            let (position, _) = resolve_placement(placement, camera);
            Emitter::Point {
                position,
                distance: *distance,
                decay: *decay,
            }
        }
        LightKind::Spot {
            placement,
            distance,
            decay,
            angle,
            penumbra,
            ..
        } => {
            let (position, direction) = resolve_placement(placement, camera);
            let angle = angle.clamp(0.0, std::f32::consts::FRAC_PI_2);
            Emitter::Spot {
                position,
                direction,
                distance: *distance,
                decay: *decay,
                cone_cos: angle.cos(),
                penumbra_cos: (angle * (1.0 - penumbra.clamp(0.0, 1.0))).cos(),
            }
        }
        // No authored transform: approximated as a frontal area source.
        LightKind::RectArea { .. } => {
            let (_, direction) = resolve_placement(&Placement::default(), camera);
            Emitter::Directional { direction }
        }
    };

    Some(RigLight {
        id: config.id,
        radiance: color * intensity * INTENSITY_SCALE,
        emitter,
        cast_shadow: config.cast_shadow().unwrap_or(false),
    })
}

/// Position and unit direction of a positionable light for this frame.
pub fn resolve_placement(placement: &Placement, camera: &ViewCamera) -> (Vec3, Vec3) {
    if placement.bind_to_view {
        return (camera.position, camera.direction.try_normalize().unwrap_or(Vec3::NEG_Z));
    }
    let position = Vec3::from_array(placement.position);
    let look_at = Vec3::from_array(placement.look_at);
    let direction = (look_at - position).try_normalize().unwrap_or(Vec3::NEG_Z);
    (position, direction)
}

fn distance_attenuation(length: f32, cutoff: f32, decay: f32) -> f32 {
    let mut falloff = 1.0 / length.powf(decay).max(0.01);
    if cutoff > 0.0 {
        let ratio = (length / cutoff).powi(4);
        falloff *= (1.0 - ratio).clamp(0.0, 1.0).powi(2);
    }
    falloff
}

fn smoothstep(low: f32, high: f32, x: f32) -> f32 {
    if high <= low {
        return if x >= high { 1.0 } else { 0.0 };
    }
    let t = ((x - low) / (high - low)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// `#rgb` or `#rrggbb` (leading `#` optional) in sRGB, returned in linear space.
pub fn parse_hex_color(hex: &str) -> Option<Vec3> {
    let digits = hex.trim().trim_start_matches('#');
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return None,
    };
    let value = u32::from_str_radix(&expanded, 16).ok()?;
    let channel = |shift: u32| srgb_to_linear(((value >> shift) & 0xff) as f32 / 255.0);
    Some(Vec3::new(channel(16), channel(8), channel(0)))
}

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
