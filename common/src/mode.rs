// Copyright (C) 2026 Marcus L. Hanestad <marlhan@proton.me>
//
// This file is part of MacMirror.
//
// MacMirror is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// MacMirror is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with MacMirror.  If not, see <https://www.gnu.org/licenses/>.

use std::str::FromStr;
use std::time::Duration;

/// User-selected streaming preset. The adaptive controller may undershoot
/// these values under pressure but always rebounds toward them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserMode {
    Performance,
    #[default]
    Balanced,
    Fidelity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeSetpoint {
    pub fps: u32,
    pub image_quality: f32,
    pub audio_quality: f32,
    pub max_frame_time: Duration,
}

impl UserMode {
    pub fn setpoint(self) -> ModeSetpoint {
        match self {
            UserMode::Performance => ModeSetpoint {
                fps: 45,
                image_quality: 0.30,
                audio_quality: 0.50,
                max_frame_time: Duration::from_secs_f64(1.0 / 30.0),
            },
            UserMode::Balanced => ModeSetpoint {
                fps: 30,
                image_quality: 0.50,
                audio_quality: 0.70,
                max_frame_time: Duration::from_secs_f64(1.0 / 25.0),
            },
            UserMode::Fidelity => ModeSetpoint {
                fps: 20,
                image_quality: 0.70,
                audio_quality: 0.90,
                max_frame_time: Duration::from_secs_f64(1.0 / 15.0),
            },
        }
    }

    /// Wire-format name, as carried in the `streamingMode` settings key.
    pub fn name(self) -> &'static str {
        match self {
            UserMode::Performance => "Performance",
            UserMode::Balanced => "Balanced",
            UserMode::Fidelity => "Fidelity",
        }
    }

    /// Parse the wire-format name. Unknown names yield `None` so callers
    /// can log and ignore them.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Performance" => Some(UserMode::Performance),
            "Balanced" => Some(UserMode::Balanced),
            "Fidelity" => Some(UserMode::Fidelity),
            _ => None,
        }
    }
}

impl FromStr for UserMode {
    type Err = String;

    // Case-insensitive, for CLI flags.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "performance" => Ok(UserMode::Performance),
            "balanced" => Ok(UserMode::Balanced),
            "fidelity" => Ok(UserMode::Fidelity),
            other => Err(format!("unknown mode `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setpoint_table() {
        assert_eq!(UserMode::Performance.setpoint().fps, 45);
        assert_eq!(UserMode::Balanced.setpoint().fps, 30);
        assert_eq!(UserMode::Fidelity.setpoint().fps, 20);
        assert!((UserMode::Fidelity.setpoint().image_quality - 0.70).abs() < f32::EPSILON);
    }

    #[test]
    fn test_wire_names_round_trip() {
        for mode in [UserMode::Performance, UserMode::Balanced, UserMode::Fidelity] {
            assert_eq!(UserMode::from_name(mode.name()), Some(mode));
        }
        assert_eq!(UserMode::from_name("Unknown"), None);
    }

    #[test]
    fn test_cli_parse_is_case_insensitive() {
        assert_eq!("PERFORMANCE".parse::<UserMode>(), Ok(UserMode::Performance));
        assert!("ultra".parse::<UserMode>().is_err());
    }
}
