//! Sky positions as they arrive in request parameters.
//!
//! A `UserTargetWorldPt` is serialized as `lon;lat;SYS[;object[;resolver]]`,
//! e.g. `10.68479;41.26906;EQ_J2000`. IBE services only understand
//! equatorial J2000, so every point is rotated into that frame before it is
//! placed in a query.

use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Vector3};

use crate::error::IbeError;

/// Mean obliquity of the ecliptic at J2000, in degrees.
const OBLIQUITY_J2000: f64 = 23.439_291_111;
/// Mean obliquity of the ecliptic at B1950, in degrees.
const OBLIQUITY_B1950: f64 = 23.445_788_9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordSys {
    EqJ2000,
    EqB1950,
    Galactic,
    EclJ2000,
    EclB1950,
}

impl CoordSys {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordSys::EqJ2000 => "EQ_J2000",
            CoordSys::EqB1950 => "EQ_B1950",
            CoordSys::Galactic => "GALACTIC",
            CoordSys::EclJ2000 => "EC_J2000",
            CoordSys::EclB1950 => "EC_B1950",
        }
    }
}

impl fmt::Display for CoordSys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CoordSys {
    type Err = IbeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "EQ_J2000" | "J2000" | "EQJ2000" | "ICRS" => Ok(CoordSys::EqJ2000),
            "EQ_B1950" | "B1950" | "EQB1950" => Ok(CoordSys::EqB1950),
            "GALACTIC" | "GAL" => Ok(CoordSys::Galactic),
            "EC_J2000" | "ECL_J2000" => Ok(CoordSys::EclJ2000),
            "EC_B1950" | "ECL_B1950" => Ok(CoordSys::EclB1950),
            _ => Err(IbeError::InvalidWorldPt(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldPt {
    pub lon: f64,
    pub lat: f64,
    pub sys: CoordSys,
    pub object_name: Option<String>,
}

impl WorldPt {
    pub fn new(lon: f64, lat: f64, sys: CoordSys) -> Self {
        Self {
            lon,
            lat,
            sys,
            object_name: None,
        }
    }

    /// Returns the same point expressed in equatorial J2000.
    pub fn to_j2000(&self) -> WorldPt {
        let rotation = match self.sys {
            CoordSys::EqJ2000 => return self.clone(),
            CoordSys::EqB1950 => fk4_to_fk5(),
            CoordSys::Galactic => galactic_to_equatorial(),
            CoordSys::EclJ2000 => ecliptic_to_equatorial(OBLIQUITY_J2000),
            CoordSys::EclB1950 => fk4_to_fk5() * ecliptic_to_equatorial(OBLIQUITY_B1950),
        };
        let (lon, lat) = to_lon_lat(&(rotation * unit_vector(self.lon, self.lat)));
        WorldPt {
            lon,
            lat,
            sys: CoordSys::EqJ2000,
            object_name: self.object_name.clone(),
        }
    }
}

impl fmt::Display for WorldPt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{}", self.lon, self.lat, self.sys)?;
        if let Some(name) = &self.object_name {
            write!(f, ";{name}")?;
        }
        Ok(())
    }
}

impl FromStr for WorldPt {
    type Err = IbeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let parts = if trimmed.contains(';') {
            trimmed.split(';').map(str::trim).collect::<Vec<_>>()
        } else {
            trimmed.split(',').map(str::trim).collect::<Vec<_>>()
        };
        if parts.len() < 2 {
            return Err(IbeError::InvalidWorldPt(value.to_string()));
        }
        let lon: f64 = parts[0]
            .parse()
            .map_err(|_| IbeError::InvalidWorldPt(value.to_string()))?;
        let lat: f64 = parts[1]
            .parse()
            .map_err(|_| IbeError::InvalidWorldPt(value.to_string()))?;
        if !lon.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(IbeError::InvalidWorldPt(value.to_string()));
        }
        let sys = match parts.get(2) {
            Some(sys) if !sys.is_empty() => sys.parse()?,
            _ => CoordSys::EqJ2000,
        };
        let object_name = parts
            .get(3)
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string());
        Ok(WorldPt {
            lon,
            lat,
            sys,
            object_name,
        })
    }
}

fn unit_vector(lon_deg: f64, lat_deg: f64) -> Vector3<f64> {
    let (lon, lat) = (lon_deg.to_radians(), lat_deg.to_radians());
    Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
}

fn to_lon_lat(v: &Vector3<f64>) -> (f64, f64) {
    let norm = v.norm();
    let lon = v.y.atan2(v.x).to_degrees().rem_euclid(360.0);
    let lat = (v.z / norm).clamp(-1.0, 1.0).asin().to_degrees();
    (lon, lat)
}

/// Galactic (IAU 1958, Hipparcos realization) to equatorial J2000.
fn galactic_to_equatorial() -> Matrix3<f64> {
    Matrix3::new(
        -0.054_875_560_416_215_4,
        -0.873_437_090_234_885_0,
        -0.483_835_015_548_713_2,
        0.494_109_427_875_583_7,
        -0.444_829_629_960_011_2,
        0.746_982_244_497_218_9,
        -0.867_666_149_019_004_7,
        -0.198_076_373_431_201_5,
        0.455_983_776_175_066_9,
    )
    .transpose()
}

fn ecliptic_to_equatorial(obliquity_deg: f64) -> Matrix3<f64> {
    let (sin, cos) = obliquity_deg.to_radians().sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, cos, -sin, 0.0, sin, cos)
}

/// FK4 B1950 to FK5 J2000 position rotation, E-terms ignored.
fn fk4_to_fk5() -> Matrix3<f64> {
    Matrix3::new(
        0.999_925_678_2,
        -0.011_182_061_1,
        -0.004_857_947_7,
        0.011_182_061_0,
        0.999_937_478_4,
        -0.000_027_176_5,
        0.004_857_947_9,
        -0.000_027_147_4,
        0.999_988_199_7,
    )
}
