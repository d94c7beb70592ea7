//! Stepped temperature curves
//!
//! A curve maps temperature thresholds (°C) to fan speeds (percent). The
//! speed for a temperature is the highest speed among the thresholds at or
//! below it; there is no interpolation. Every curve has a `0` threshold,
//! which also serves as the floor for temperatures below every threshold.

use std::fmt;

use fand_error::{FandError, Result};

use crate::constants::shelf::{MAX_PWM, MIN_PWM};
use crate::hw::DeviceKind;

/// Temperature to speed steps, sorted by threshold
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureCurve {
    points: Vec<(f64, f64)>,
    floor: f64,
}

impl TemperatureCurve {
    /// Build a curve for `kind`, validating every point
    pub fn new(kind: DeviceKind, mut points: Vec<(f64, f64)>) -> Result<Self> {
        let invalid = |reason: String| FandError::InvalidCurve {
            class: kind.to_string(),
            reason,
        };

        for &(temp, speed) in &points {
            if !temp.is_finite() {
                return Err(invalid(format!("threshold {temp} is not a number")));
            }
            if !speed.is_finite() || !(MIN_PWM..=MAX_PWM).contains(&speed) {
                return Err(invalid(format!(
                    "speed {speed} at {temp}°C must be between {MIN_PWM} and {MAX_PWM}"
                )));
            }
        }

        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        if points.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(invalid("duplicate temperature threshold".into()));
        }

        let floor = points
            .iter()
            .find(|(temp, _)| *temp == 0.0)
            .map(|&(_, speed)| speed)
            .ok_or_else(|| invalid("no 0 temperature configured".into()))?;

        Ok(Self { points, floor })
    }

    /// The `{0: 0}` curve used for classes without configuration
    pub fn idle() -> Self {
        Self {
            points: vec![(0.0, 0.0)],
            floor: 0.0,
        }
    }

    /// Speed for an effective temperature
    pub fn speed_at(&self, temperature: f64) -> f64 {
        self.points
            .iter()
            .filter(|(threshold, _)| temperature >= *threshold)
            .map(|&(_, speed)| speed)
            .reduce(f64::max)
            .unwrap_or(self.floor)
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}

impl Default for TemperatureCurve {
    fn default() -> Self {
        Self::idle()
    }
}

impl fmt::Display for TemperatureCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self
            .points
            .iter()
            .map(|(temp, speed)| format!("{temp}:{speed}"))
            .collect();
        write!(f, "{{{}}}", steps.join(", "))
    }
}

/// One curve per device class
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurveSet {
    pub hdd: TemperatureCurve,
    pub ssd: TemperatureCurve,
    pub cpu: TemperatureCurve,
    none: TemperatureCurve,
}

impl CurveSet {
    pub fn new(hdd: TemperatureCurve, ssd: TemperatureCurve, cpu: TemperatureCurve) -> Self {
        Self {
            hdd,
            ssd,
            cpu,
            none: TemperatureCurve::idle(),
        }
    }

    pub fn for_kind(&self, kind: DeviceKind) -> &TemperatureCurve {
        match kind {
            DeviceKind::Hdd => &self.hdd,
            DeviceKind::Ssd => &self.ssd,
            DeviceKind::Cpu => &self.cpu,
            DeviceKind::None => &self.none,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hdd_curve() -> TemperatureCurve {
        TemperatureCurve::new(
            DeviceKind::Hdd,
            vec![(0.0, 25.0), (30.0, 30.0), (35.0, 50.0), (40.0, 75.0), (41.0, 100.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_stepped_lookup() {
        let curve = hdd_curve();
        assert_eq!(curve.speed_at(0.0), 25.0);
        assert_eq!(curve.speed_at(29.9), 25.0);
        assert_eq!(curve.speed_at(30.0), 30.0);
        assert_eq!(curve.speed_at(34.0), 30.0);
        assert_eq!(curve.speed_at(39.0), 50.0);
        assert_eq!(curve.speed_at(41.0), 100.0);
        assert_eq!(curve.speed_at(40.5), 75.0);
        assert_eq!(curve.speed_at(90.0), 100.0);
    }

    #[test]
    fn test_negative_temperature_uses_floor() {
        assert_eq!(hdd_curve().speed_at(-12.0), 25.0);
        assert_eq!(hdd_curve().speed_at(f64::NAN), 25.0);
    }

    #[test]
    fn test_highest_speed_wins() {
        // Non-monotonic curves keep the highest step reached
        let curve =
            TemperatureCurve::new(DeviceKind::Cpu, vec![(0.0, 20.0), (50.0, 80.0), (60.0, 40.0)]).unwrap();
        assert_eq!(curve.speed_at(65.0), 80.0);
    }

    #[test]
    fn test_unsorted_input() {
        let curve = TemperatureCurve::new(DeviceKind::Ssd, vec![(50.0, 40.0), (0.0, 25.0)]).unwrap();
        assert_eq!(curve.points(), &[(0.0, 25.0), (50.0, 40.0)]);
    }

    #[test]
    fn test_requires_zero_threshold() {
        let err = TemperatureCurve::new(DeviceKind::Hdd, vec![(10.0, 30.0)]).unwrap_err();
        assert!(matches!(err, FandError::InvalidCurve { ref class, .. } if class == "HDD"));
        assert!(TemperatureCurve::new(DeviceKind::Hdd, vec![]).is_err());
    }

    #[test]
    fn test_rejects_bad_points() {
        assert!(TemperatureCurve::new(DeviceKind::Hdd, vec![(0.0, 120.0)]).is_err());
        assert!(TemperatureCurve::new(DeviceKind::Hdd, vec![(0.0, -1.0)]).is_err());
        assert!(TemperatureCurve::new(DeviceKind::Hdd, vec![(0.0, f64::NAN)]).is_err());
        assert!(TemperatureCurve::new(DeviceKind::Hdd, vec![(0.0, 10.0), (0.0, 20.0)]).is_err());
    }

    #[test]
    fn test_none_class_is_idle() {
        let set = CurveSet::new(hdd_curve(), TemperatureCurve::idle(), TemperatureCurve::idle());
        assert_eq!(set.for_kind(DeviceKind::None).speed_at(80.0), 0.0);
        assert_eq!(set.for_kind(DeviceKind::Hdd).speed_at(80.0), 100.0);
    }
}
