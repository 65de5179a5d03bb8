use std::f64::consts::PI;

use crate::AudioRole;

/// A computed placement for one non-host device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub role: AudioRole,
}

/// Places `count` non-host devices evenly on a circle of radius 0.3
/// around the room center (0.5, 0.5) and derives a speaker role from the
/// quadrant each one lands in. Placements follow join order, so the whole
/// room is re-placed whenever its device set changes.
///
/// The assignment is advisory and perceptual, not measured.
pub fn assign_placements(count: usize) -> Vec<Placement> {
    let step = 2. * PI / count.saturating_sub(1).max(1) as f64;

    (0..count)
        .map(|index| {
            let angle = step * index as f64;

            let x = 0.5 + 0.3 * angle.cos();
            let y = 0.5 + 0.3 * angle.sin();

            Placement {
                x,
                y,
                role: role_for(x, y, count),
            }
        })
        .collect()
}

fn role_for(x: f64, y: f64, count: usize) -> AudioRole {
    // A lone participant always renders center; the raw quadrant rule
    // would hand it front-right.
    if count <= 1 {
        return AudioRole::Center;
    }

    if x < 0.4 {
        if y < 0.5 {
            AudioRole::RearLeft
        } else {
            AudioRole::FrontLeft
        }
    } else if x > 0.6 {
        if y < 0.5 {
            AudioRole::RearRight
        } else {
            AudioRole::FrontRight
        }
    } else {
        AudioRole::Center
    }
}
