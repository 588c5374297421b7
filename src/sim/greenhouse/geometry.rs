//! Greenhouse geometry supplied by a geometry collaborator.
//!
//! A [`GreenhouseShape`] describes a multi-span house by its roof profile and
//! tiling; it reduces to a [`GeometryFragment`] holding the aggregate areas and
//! heights the climate model uses, which is then merged into a
//! [`ParameterSet`].

use serde::{Deserialize, Serialize};

use super::params::ParameterSet;
use crate::error::ConfigurationError;

/// Roof vent area as a share of the floor area.
const VENT_FLOOR_RATIO: f64 = 0.1169;
/// Exponent of the Gothic arch profile; 1 is a triangle, 2 a parabola.
const GOTHIC_POINTEDNESS: f64 = 1.4;
/// Segments per span for numerical profile integration.
const PROFILE_SEGMENTS: usize = 400;
const MAX_SLOPE_DEG: f64 = 89.0;

/// Cross-section of a single roof span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoofArchetype {
    #[default]
    Triangular,
    Semicircular,
    FlatArch,
    GothicArch,
    Sawtooth,
    SawtoothArch,
}

impl RoofArchetype {
    /// Roof height above the gutter at relative position `u` in [0, 1] across
    /// a span of ridge height `h`.
    fn height(self, u: f64, h: f64) -> f64 {
        let s = 2.0 * u - 1.0;
        match self {
            Self::Triangular => h * (1.0 - s.abs()),
            Self::Semicircular => h * (1.0 - s * s).max(0.0).sqrt(),
            Self::FlatArch => h * (1.0 - s * s),
            Self::GothicArch => h * (1.0 - s.abs().powf(GOTHIC_POINTEDNESS)),
            Self::Sawtooth => h * (1.0 - u),
            Self::SawtoothArch => h * (1.0 - u * u),
        }
    }

    /// Sawtooth roofs close each span with a vertical face of full ridge height.
    fn has_vertical_face(self) -> bool {
        matches!(self, Self::Sawtooth | Self::SawtoothArch)
    }
}

/// Parametric multi-span greenhouse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GreenhouseShape {
    pub archetype: RoofArchetype,
    /// Width of one span in m.
    pub span_width: f64,
    /// Length of one bay in m.
    pub bay_length: f64,
    /// Gutter height in m.
    pub wall_height: f64,
    /// Roof slope in degrees. Ignored for semicircular roofs.
    pub slope_deg: f64,
    /// Spans side by side.
    pub spans: u32,
    /// Bays along the ridge.
    pub bays: u32,
}

impl GreenhouseShape {
    pub fn new(archetype: RoofArchetype) -> Self {
        Self {
            archetype,
            span_width: 4.0,
            bay_length: 1.67,
            wall_height: 6.5,
            slope_deg: 22.0,
            spans: 1,
            bays: 1,
        }
    }

    pub fn with_tiling(mut self, spans: u32, bays: u32) -> Self {
        self.spans = spans;
        self.bays = bays;
        self
    }

    /// Ridge height above the gutter in m.
    pub fn ridge_height(&self) -> f64 {
        match self.archetype {
            RoofArchetype::Semicircular => 0.5 * self.span_width,
            _ => self.slope_deg.to_radians().tan() * 0.5 * self.span_width,
        }
    }

    /// Aggregate areas and heights of the whole house.
    pub fn fragment(&self) -> Result<GeometryFragment, ConfigurationError> {
        for (name, value) in [
            ("span_width", self.span_width),
            ("bay_length", self.bay_length),
            ("wall_height", self.wall_height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigurationError::NotPositive {
                    name: format!("geometry.{name}"),
                    value,
                });
            }
        }
        if !(0.0..MAX_SLOPE_DEG).contains(&self.slope_deg) {
            return Err(ConfigurationError::OutOfRange {
                name: "geometry.slope_deg".to_string(),
                value: self.slope_deg,
                min: 0.0,
                max: MAX_SLOPE_DEG,
            });
        }
        if self.spans == 0 || self.bays == 0 {
            return Err(ConfigurationError::Inconsistent(format!(
                "tiling of {} x {} spans and bays is empty",
                self.spans, self.bays
            )));
        }

        let w = self.span_width;
        let h = self.ridge_height();
        let profile = integrate_profile(self.archetype, w, h);
        let spans = f64::from(self.spans);
        let bays = f64::from(self.bays);
        let length = bays * self.bay_length;

        let floor_area = spans * w * length;
        let roof_area = spans * length * profile.arc_length;
        let side_walls = 2.0 * length * self.wall_height;
        let gables = 2.0 * spans * (w * self.wall_height + profile.section_area);

        Ok(GeometryFragment {
            archetype: self.archetype,
            spans: self.spans,
            bays: self.bays,
            floor_area,
            cover_area: roof_area + side_walls + gables,
            roof_vent_area: VENT_FLOOR_RATIO * floor_area,
            mean_height: self.wall_height + profile.section_area / w,
            roof_slope_deg: profile.mean_slope_deg,
        })
    }
}

struct Profile {
    /// Length of the roof line of one span, including a sawtooth's vertical face.
    arc_length: f64,
    /// Area between the gutter line and the roof of one span.
    section_area: f64,
    mean_slope_deg: f64,
}

fn integrate_profile(archetype: RoofArchetype, w: f64, h: f64) -> Profile {
    let n = PROFILE_SEGMENTS;
    let dx = w / n as f64;
    let mut arc_length = 0.0;
    let mut section_area = 0.0;
    let mut slope_sum = 0.0;
    let mut z0 = archetype.height(0.0, h);
    for i in 1..=n {
        let z1 = archetype.height(i as f64 / n as f64, h);
        let dz = z1 - z0;
        arc_length += (dx * dx + dz * dz).sqrt();
        section_area += 0.5 * (z0 + z1) * dx;
        slope_sum += dz.abs().atan2(dx);
        z0 = z1;
    }
    if archetype.has_vertical_face() {
        arc_length += h;
    }
    Profile {
        arc_length,
        section_area,
        mean_slope_deg: (slope_sum / n as f64).to_degrees(),
    }
}

/// Greenhouse geometry as seen by the climate model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryFragment {
    pub archetype: RoofArchetype,
    pub spans: u32,
    pub bays: u32,
    /// m^2
    pub floor_area: f64,
    /// Roof, side walls and gables in m^2.
    pub cover_area: f64,
    /// m^2
    pub roof_vent_area: f64,
    /// Volume divided by floor area in m.
    pub mean_height: f64,
    /// Mean roof slope in degrees.
    pub roof_slope_deg: f64,
}

impl GeometryFragment {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("floor_area", self.floor_area),
            ("cover_area", self.cover_area),
            ("mean_height", self.mean_height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigurationError::NotPositive {
                    name: format!("geometry.{name}"),
                    value,
                });
            }
        }
        if !self.roof_vent_area.is_finite() || self.roof_vent_area < 0.0 {
            return Err(ConfigurationError::OutOfRange {
                name: "geometry.roof_vent_area".to_string(),
                value: self.roof_vent_area,
                min: 0.0,
                max: self.cover_area,
            });
        }
        if !(0.0..MAX_SLOPE_DEG).contains(&self.roof_slope_deg) {
            return Err(ConfigurationError::OutOfRange {
                name: "geometry.roof_slope_deg".to_string(),
                value: self.roof_slope_deg,
                min: 0.0,
                max: MAX_SLOPE_DEG,
            });
        }
        if self.spans == 0 || self.bays == 0 {
            return Err(ConfigurationError::Inconsistent(
                "geometry tiling counts must be at least 1".to_string(),
            ));
        }
        if self.cover_area < self.floor_area {
            return Err(ConfigurationError::Inconsistent(format!(
                "geometry cover area {} m^2 is smaller than floor area {} m^2",
                self.cover_area, self.floor_area
            )));
        }
        if self.roof_vent_area > self.cover_area {
            return Err(ConfigurationError::Inconsistent(format!(
                "geometry vent area {} m^2 exceeds cover area {} m^2",
                self.roof_vent_area, self.cover_area
            )));
        }
        Ok(())
    }
}

impl ParameterSet {
    /// Returns a copy with the construction taken from `fragment`.
    ///
    /// The main compartment height is kept and must stay below the new mean
    /// height.
    pub fn with_geometry(&self, fragment: &GeometryFragment) -> Result<Self, ConfigurationError> {
        fragment.validate()?;
        let mut p = self.clone();
        let g = &mut p.construction;
        if fragment.mean_height <= g.air_height {
            return Err(ConfigurationError::Inconsistent(format!(
                "geometry mean height {} m must exceed the main compartment height {} m",
                fragment.mean_height, g.air_height
            )));
        }
        g.floor_area = fragment.floor_area;
        g.cover_area = fragment.cover_area;
        g.roof_vent_area = fragment.roof_vent_area;
        g.greenhouse_height = fragment.mean_height;
        g.roof_slope_deg = fragment.roof_slope_deg;
        p.validate()?;
        Ok(p)
    }
}
