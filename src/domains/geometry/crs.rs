use geo::{Coord, Geometry, MapCoords};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;

use crate::common::{FeatureError, FeatureResult};

/// EPSG code of the internal reference system (WGS84 longitude/latitude).
pub const REFERENCE_EPSG: u32 = 4326;

const WGS84: Ellipsoid = Ellipsoid { a: 6_378_137.0, inv_f: 298.257_223_563 };
const GRS80: Ellipsoid = Ellipsoid { a: 6_378_137.0, inv_f: 298.257_222_101 };
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Ellipsoid {
    a: f64,
    inv_f: f64,
}

impl Ellipsoid {
    fn e2(&self) -> f64 {
        let f = 1.0 / self.inv_f;
        2.0 * f - f * f
    }
}

/// Parameters of an Albers equal-area conic projection, in degrees and metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlbersParams {
    pub lat1: f64,
    pub lat2: f64,
    pub lat0: f64,
    pub lon0: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// Longitude/latitude in degrees (EPSG:4326, EPSG:4269).
    Geographic { epsg: u32 },
    /// Spherical Web Mercator (EPSG:3857).
    WebMercator,
    /// Albers equal-area on GRS80 (EPSG:3310, EPSG:5070).
    Albers { epsg: u32, params: AlbersParams },
    /// Universal Transverse Mercator (EPSG:326zz, 327zz, 269zz).
    Utm { epsg: u32, zone: u8, north: bool },
}

impl Crs {
    pub fn wgs84() -> Self {
        Crs::Geographic { epsg: REFERENCE_EPSG }
    }

    pub fn from_epsg(code: u32) -> FeatureResult<Self> {
        match code {
            4326 | 4269 => Ok(Crs::Geographic { epsg: code }),
            3857 | 900913 => Ok(Crs::WebMercator),
            3310 => Ok(Crs::Albers {
                epsg: code,
                params: AlbersParams {
                    lat1: 34.0,
                    lat2: 40.5,
                    lat0: 0.0,
                    lon0: -120.0,
                    false_easting: 0.0,
                    false_northing: -4_000_000.0,
                },
            }),
            5070 => Ok(Crs::Albers {
                epsg: code,
                params: AlbersParams {
                    lat1: 29.5,
                    lat2: 45.5,
                    lat0: 23.0,
                    lon0: -96.0,
                    false_easting: 0.0,
                    false_northing: 0.0,
                },
            }),
            32601..=32660 => Ok(Crs::Utm { epsg: code, zone: (code - 32600) as u8, north: true }),
            32701..=32760 => Ok(Crs::Utm { epsg: code, zone: (code - 32700) as u8, north: false }),
            26901..=26923 => Ok(Crs::Utm { epsg: code, zone: (code - 26900) as u8, north: true }),
            other => Err(FeatureError::projection(format!("unsupported CRS EPSG:{}", other))),
        }
    }

    /// Parses `EPSG:4326`, `urn:ogc:def:crs:EPSG::3310` or `urn:ogc:def:crs:OGC:1.3:CRS84`.
    pub fn parse(name: &str) -> FeatureResult<Self> {
        let trimmed = name.trim();
        let upper = trimmed.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Ok(Crs::wgs84());
        }
        let code = upper
            .rsplit(':')
            .next()
            .filter(|_| upper.contains("EPSG"))
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or_else(|| FeatureError::projection(format!("cannot parse CRS `{}`", trimmed)))?;
        Crs::from_epsg(code)
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Geographic { epsg } | Crs::Albers { epsg, .. } | Crs::Utm { epsg, .. } => *epsg,
            Crs::WebMercator => 3857,
        }
    }

    fn ellipsoid(&self) -> Ellipsoid {
        match self {
            Crs::Utm { epsg, .. } if (32601..=32760).contains(epsg) => WGS84,
            Crs::Geographic { epsg: 4326 } | Crs::WebMercator => WGS84,
            _ => GRS80,
        }
    }

    /// Projects a longitude/latitude coordinate (degrees) into this system.
    pub fn from_lon_lat(&self, c: Coord<f64>) -> FeatureResult<Coord<f64>> {
        check_finite(c)?;
        match self {
            Crs::Geographic { .. } => Ok(c),
            Crs::WebMercator => {
                if c.y.abs() > MERCATOR_MAX_LAT {
                    return Err(FeatureError::projection(format!(
                        "latitude {} outside Web Mercator range",
                        c.y
                    )));
                }
                let r = WGS84.a;
                Ok(Coord {
                    x: r * c.x.to_radians(),
                    y: r * (FRAC_PI_4 + c.y.to_radians() / 2.0).tan().ln(),
                })
            }
            Crs::Albers { params, .. } => Ok(Albers::new(params, self.ellipsoid()).forward(c)),
            Crs::Utm { zone, north, .. } => Ok(TransverseMercator::utm(*zone, *north, self.ellipsoid()).forward(c)),
        }
    }

    /// Converts a coordinate of this system back to longitude/latitude (degrees).
    pub fn to_lon_lat(&self, c: Coord<f64>) -> FeatureResult<Coord<f64>> {
        check_finite(c)?;
        match self {
            Crs::Geographic { .. } => Ok(c),
            Crs::WebMercator => {
                let r = WGS84.a;
                Ok(Coord {
                    x: (c.x / r).to_degrees(),
                    y: (2.0 * (c.y / r).exp().atan() - FRAC_PI_2).to_degrees(),
                })
            }
            Crs::Albers { params, .. } => Albers::new(params, self.ellipsoid()).inverse(c),
            Crs::Utm { zone, north, .. } => Ok(TransverseMercator::utm(*zone, *north, self.ellipsoid()).inverse(c)),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl TryFrom<String> for Crs {
    type Error = FeatureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Crs::parse(&value)
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

fn check_finite(c: Coord<f64>) -> FeatureResult<()> {
    if c.x.is_finite() && c.y.is_finite() {
        Ok(())
    } else {
        Err(FeatureError::projection(format!("non-finite coordinate ({}, {})", c.x, c.y)))
    }
}

/// Reprojects a single geometry between two systems through longitude/latitude.
pub fn reproject(geometry: &Geometry<f64>, from: &Crs, to: &Crs) -> FeatureResult<Geometry<f64>> {
    if from == to {
        return Ok(geometry.clone());
    }
    geometry.try_map_coords(|c| from.to_lon_lat(c).and_then(|ll| to.from_lon_lat(ll)))
}

struct Albers {
    e: f64,
    e2: f64,
    a: f64,
    n: f64,
    c: f64,
    rho0: f64,
    lon0: f64,
    fe: f64,
    fn_: f64,
}

impl Albers {
    fn new(p: &AlbersParams, ellipsoid: Ellipsoid) -> Self {
        let e2 = ellipsoid.e2();
        let e = e2.sqrt();
        let a = ellipsoid.a;
        let m = |phi: f64| phi.cos() / (1.0 - e2 * phi.sin().powi(2)).sqrt();
        let (phi1, phi2, phi0) = (p.lat1.to_radians(), p.lat2.to_radians(), p.lat0.to_radians());
        let (m1, m2) = (m(phi1), m(phi2));
        let (q1, q2, q0) = (albers_q(phi1, e, e2), albers_q(phi2, e, e2), albers_q(phi0, e, e2));
        let n = if (phi1 - phi2).abs() < 1e-12 {
            phi1.sin()
        } else {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        };
        let c = m1 * m1 + n * q1;
        let rho0 = a * (c - n * q0).sqrt() / n;
        Self { e, e2, a, n, c, rho0, lon0: p.lon0.to_radians(), fe: p.false_easting, fn_: p.false_northing }
    }

    fn forward(&self, ll: Coord<f64>) -> Coord<f64> {
        let phi = ll.y.to_radians();
        let q = albers_q(phi, self.e, self.e2);
        let rho = self.a * (self.c - self.n * q).max(0.0).sqrt() / self.n;
        let theta = self.n * (ll.x.to_radians() - self.lon0);
        Coord {
            x: self.fe + rho * theta.sin(),
            y: self.fn_ + self.rho0 - rho * theta.cos(),
        }
    }

    fn inverse(&self, xy: Coord<f64>) -> FeatureResult<Coord<f64>> {
        let x = xy.x - self.fe;
        let y = self.rho0 - (xy.y - self.fn_);
        let sign = self.n.signum();
        let rho = (x * x + y * y).sqrt() * sign;
        let theta = (x * sign).atan2(y * sign);
        let q = (self.c - (rho * self.n / self.a).powi(2)) / self.n;

        let mut phi = (q / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..25 {
            let sin = phi.sin();
            let one_minus = 1.0 - self.e2 * sin * sin;
            let delta = one_minus * one_minus / (2.0 * phi.cos())
                * (q / (1.0 - self.e2) - sin / one_minus
                    + (1.0 / (2.0 * self.e)) * ((1.0 - self.e * sin) / (1.0 + self.e * sin)).ln());
            phi += delta;
            if delta.abs() < 1e-14 {
                break;
            }
        }
        if !phi.is_finite() {
            return Err(FeatureError::projection(format!(
                "Albers inverse did not converge at ({}, {})",
                xy.x, xy.y
            )));
        }
        Ok(Coord {
            x: (self.lon0 + theta / self.n).to_degrees(),
            y: phi.to_degrees(),
        })
    }
}

fn albers_q(phi: f64, e: f64, e2: f64) -> f64 {
    let sin = phi.sin();
    (1.0 - e2) * (sin / (1.0 - e2 * sin * sin) - (1.0 / (2.0 * e)) * ((1.0 - e * sin) / (1.0 + e * sin)).ln())
}

struct TransverseMercator {
    a: f64,
    e2: f64,
    ep2: f64,
    k0: f64,
    lon0: f64,
    fe: f64,
    fn_: f64,
}

impl TransverseMercator {
    fn utm(zone: u8, north: bool, ellipsoid: Ellipsoid) -> Self {
        let e2 = ellipsoid.e2();
        Self {
            a: ellipsoid.a,
            e2,
            ep2: e2 / (1.0 - e2),
            k0: 0.9996,
            lon0: (-183.0 + 6.0 * zone as f64).to_radians(),
            fe: 500_000.0,
            fn_: if north { 0.0 } else { 10_000_000.0 },
        }
    }

    fn meridian_arc(&self, phi: f64) -> f64 {
        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        self.a
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
    }

    fn forward(&self, ll: Coord<f64>) -> Coord<f64> {
        let phi = ll.y.to_radians();
        let (sin, cos, tan) = (phi.sin(), phi.cos(), phi.tan());
        let n = self.a / (1.0 - self.e2 * sin * sin).sqrt();
        let t = tan * tan;
        let c = self.ep2 * cos * cos;
        let a = (ll.x.to_radians() - self.lon0) * cos;
        let m = self.meridian_arc(phi);

        let x = self.k0
            * n
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * self.ep2) * a.powi(5) / 120.0);
        let y = self.k0
            * (m + n
                * tan
                * (a * a / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * self.ep2) * a.powi(6) / 720.0));
        Coord { x: x + self.fe, y: y + self.fn_ }
    }

    fn inverse(&self, xy: Coord<f64>) -> Coord<f64> {
        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let x = xy.x - self.fe;
        let m = (xy.y - self.fn_) / self.k0;
        let mu = m / (self.a * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
        let root = (1.0 - e2).sqrt();
        let e1 = (1.0 - root) / (1.0 + root);

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin1, cos1, tan1) = (phi1.sin(), phi1.cos(), phi1.tan());
        let c1 = self.ep2 * cos1 * cos1;
        let t1 = tan1 * tan1;
        let n1 = self.a / (1.0 - e2 * sin1 * sin1).sqrt();
        let r1 = self.a * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
        let d = x / (n1 * self.k0);

        let phi = phi1
            - (n1 * tan1 / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * self.ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * self.ep2 - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);
        let lon = self.lon0
            + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * self.ep2 + 24.0 * t1 * t1) * d.powi(5)
                    / 120.0)
                / cos1;
        Coord { x: lon.to_degrees(), y: phi.to_degrees() }
    }
}
