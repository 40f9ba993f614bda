//! Textual commands the session controller hands to the device link.

use std::fmt;

use crate::domain::Axis;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GCode {
    RelativePositioning,
    AbsolutePositioning,
    LinearMove { axis: Axis, distance: f64 },
    SetBedTemperature(u32),
    SetExtruderTemperature(u32),
    FanSpeed { pwm: u8 },
    FlowRate(u32),
    SpeedFactor(u32),
    DisableMotors,
}

impl GCode {
    /// Fan speed given as a percentage, converted to the 0-255 PWM range.
    pub fn fan_percent(percent: u8) -> Self {
        let percent = u32::from(percent.min(100));
        GCode::FanSpeed {
            pwm: (percent * 255 / 100) as u8,
        }
    }

    pub fn to_command(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GCode::RelativePositioning => f.write_str("G91"),
            GCode::AbsolutePositioning => f.write_str("G90"),
            GCode::LinearMove { axis, distance } => write!(f, "G1 {}{}", axis.letter(), distance),
            GCode::SetBedTemperature(celsius) => write!(f, "M140 S{celsius}"),
            GCode::SetExtruderTemperature(celsius) => write!(f, "M104 S{celsius}"),
            GCode::FanSpeed { pwm } => write!(f, "M106 S{pwm}"),
            GCode::FlowRate(percent) => write!(f, "M221 S{percent}"),
            GCode::SpeedFactor(percent) => write!(f, "M220 S{percent}"),
            GCode::DisableMotors => f.write_str("M18"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_move_keeps_sign_and_drops_trailing_zeroes() {
        let forward = GCode::LinearMove {
            axis: Axis::X,
            distance: 10.0,
        };
        let back = GCode::LinearMove {
            axis: Axis::Z,
            distance: -0.5,
        };
        assert_eq!(forward.to_command(), "G1 X10");
        assert_eq!(back.to_command(), "G1 Z-0.5");
    }

    #[test]
    fn fan_percent_maps_onto_pwm_range() {
        assert_eq!(GCode::fan_percent(0), GCode::FanSpeed { pwm: 0 });
        assert_eq!(GCode::fan_percent(50), GCode::FanSpeed { pwm: 127 });
        assert_eq!(GCode::fan_percent(100), GCode::FanSpeed { pwm: 255 });
        assert_eq!(GCode::fan_percent(180), GCode::FanSpeed { pwm: 255 });
    }

    #[test]
    fn heater_and_rate_commands() {
        assert_eq!(GCode::SetBedTemperature(60).to_command(), "M140 S60");
        assert_eq!(GCode::SetExtruderTemperature(205).to_command(), "M104 S205");
        assert_eq!(GCode::FlowRate(95).to_command(), "M221 S95");
        assert_eq!(GCode::SpeedFactor(120).to_command(), "M220 S120");
        assert_eq!(GCode::DisableMotors.to_command(), "M18");
    }
}
