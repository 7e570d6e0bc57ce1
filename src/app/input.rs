use crate::render::{CameraController, CameraHub};
use crate::scene::CameraState;

/// One scripted pointer gesture on the interactive view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interaction {
    /// Radians about the camera's up and right axes.
    Orbit { yaw: f32, pitch: f32 },
    /// Screen-space pan in world units at zoom 1.
    Pan { right: f32, up: f32 },
    Zoom { factor: f32 },
    /// External hard reset to the default camera.
    Reset,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InputError {
    #[error("unknown interaction {0:?}")]
    Unknown(String),
    #[error("interaction {step:?} expects {expected} numeric argument(s)")]
    Arguments { step: String, expected: usize },
}

/// Parses `orbit:0.3,0.1;zoom:1.5;pan:10,0;reset`.
pub fn parse_script(script: &str) -> Result<Vec<Interaction>, InputError> {
    let mut steps = Vec::new();
    for raw in script.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, args) = raw.split_once(':').unwrap_or((raw, ""));
        let values: Vec<f32> = args
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|_| InputError::Arguments {
                step: raw.to_string(),
                expected: expected_args(name),
            })?;
        let arity = |expected: usize| {
            if values.len() == expected && values.iter().all(|v| v.is_finite()) {
                Ok(())
            } else {
                Err(InputError::Arguments {
                    step: raw.to_string(),
                    expected,
                })
            }
        };
        let step = match name.trim().to_ascii_lowercase().as_str() {
            "orbit" => {
                arity(2)?;
                Interaction::Orbit {
                    yaw: values[0],
                    pitch: values[1],
                }
            }
            "pan" => {
                arity(2)?;
                Interaction::Pan {
                    right: values[0],
                    up: values[1],
                }
            }
            "zoom" => {
                arity(1)?;
                Interaction::Zoom { factor: values[0] }
            }
            "reset" => {
                arity(0)?;
                Interaction::Reset
            }
            _ => return Err(InputError::Unknown(raw.to_string())),
        };
        steps.push(step);
    }
    Ok(steps)
}

fn expected_args(name: &str) -> usize {
    match name.trim() {
        "orbit" | "pan" => 2,
        "zoom" => 1,
        _ => 0,
    }
}

/// Applies one gesture. Gestures move the control camera and publish; a reset only
/// raises the flag, which the control camera adopts on its next frame step.
pub fn apply(interaction: Interaction, control: &mut CameraController, hub: &mut CameraHub) {
    match interaction {
        Interaction::Orbit { yaw, pitch } => control.orbit(yaw, pitch),
        Interaction::Pan { right, up } => control.pan(right, up),
        Interaction::Zoom { factor } => control.zoom_by(factor),
        Interaction::Reset => {
            if hub.reset_pending() {
                log::debug!("Camera reset already pending");
            }
            hub.request_reset(CameraState::default());
            return;
        }
    }
    control.publish(hub);
}
