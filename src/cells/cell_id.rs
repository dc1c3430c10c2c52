//! Conversion between geographic coordinates and hierarchical cell ids.
//!
//! A [`GeoCell`] is a 64-bit id laid out as `face (3 bits) | hilbert position (2 bits
//! per level) | 1 | 0...`. The position of the trailing `1` bit encodes the level,
//! so a single `u64` identifies a cell together with its refinement depth.

use crate::cells::error::CellError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deepest supported refinement level (leaf cells are roughly one centimetre wide).
pub const MAX_LEVEL: u8 = 30;

const POS_BITS: u32 = 2 * MAX_LEVEL as u32 + 1;
const MAX_SIZE: u32 = 1 << MAX_LEVEL;

const SWAP_MASK: u8 = 0x01;
const INVERT_MASK: u8 = 0x02;

// Hilbert curve tables, indexed by the current orientation.
const IJ_TO_POS: [[u8; 4]; 4] = [
    [0, 1, 3, 2], // canonical order
    [0, 3, 1, 2], // axes swapped
    [2, 3, 1, 0], // bits inverted
    [2, 1, 3, 0], // swapped & inverted
];
const POS_TO_IJ: [[u8; 4]; 4] = [
    [0, 1, 3, 2],
    [0, 2, 3, 1],
    [3, 2, 0, 1],
    [3, 1, 0, 2],
];
const POS_TO_ORIENTATION: [u8; 4] = [SWAP_MASK, 0, 0, INVERT_MASK | SWAP_MASK];

/// Identifier of one tile of the hierarchical spatial subdivision at a fixed level.
///
/// For a given level the cells tile the sphere without gaps or overlaps, so every
/// valid coordinate maps to exactly one cell. The cell centre is only a derived
/// attribute used when cells have to be turned back into points (for instance
/// as interpolation input); it never takes part in identity.
///
/// # Examples
///
/// ```
/// use envfuse::GeoCell;
///
/// let cell = GeoCell::from_lat_lon(52.52, 13.40, 10).unwrap();
/// assert_eq!(cell.level(), 10);
///
/// let (lat, lon) = cell.center();
/// assert_eq!(GeoCell::from_lat_lon(lat, lon, 10).unwrap(), cell);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeoCell(u64);

impl GeoCell {
    /// Returns the cell containing `(lat, lon)` at `level`.
    ///
    /// # Errors
    ///
    /// [`CellError::InvalidCoordinate`] if `|lat| > 90`, `|lon| > 180` or either value is not
    /// finite, [`CellError::InvalidLevel`] if `level > 30`.
    pub fn from_lat_lon(lat: f64, lon: f64, level: u8) -> Result<Self, CellError> {
        validate_level(level)?;
        if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
            return Err(CellError::InvalidCoordinate { lat, lon });
        }

        let (face, u, v) = xyz_to_face_uv(lat_lon_to_xyz(lat, lon));
        let i = st_to_ij(uv_to_st(u));
        let j = st_to_ij(uv_to_st(v));
        Ok(Self::from_face_ij(face, i, j).parent_unchecked(level))
    }

    /// Wraps a raw id, returning `None` if it does not describe a valid cell.
    pub fn from_raw(id: u64) -> Option<Self> {
        if id == 0 || (id >> POS_BITS) >= 6 || id.trailing_zeros() % 2 != 0 {
            return None;
        }
        Some(GeoCell(id))
    }

    pub fn id(&self) -> u64 {
        self.0
    }

    /// Cube face (0..6) the cell lies on.
    pub fn face(&self) -> u8 {
        (self.0 >> POS_BITS) as u8
    }

    pub fn level(&self) -> u8 {
        MAX_LEVEL - (self.0.trailing_zeros() / 2) as u8
    }

    /// Returns the ancestor at `level`, or `None` when `level` is finer than this cell.
    pub fn parent(&self, level: u8) -> Option<Self> {
        if level > self.level() {
            return None;
        }
        Some(self.parent_unchecked(level))
    }

    /// Whether `other` is this cell or one of its descendants.
    pub fn contains(&self, other: &GeoCell) -> bool {
        let half_span = self.lsb() - 1;
        other.0 >= self.0 - half_span && other.0 <= self.0 + half_span
    }

    /// Centre of the cell as `(lat, lon)` in decimal degrees.
    pub fn center(&self) -> (f64, f64) {
        let level = self.level();
        let face = self.face();
        let (i, j) = self.lower_left_ij(level);

        // Work in half-leaf units so the centre stays an integer.
        let size = 1u64 << (MAX_LEVEL - level);
        let si = 2 * u64::from(i) + size;
        let ti = 2 * u64::from(j) + size;
        let scale = 2.0 * f64::from(MAX_SIZE);

        let u = st_to_uv(si as f64 / scale);
        let v = st_to_uv(ti as f64 / scale);
        xyz_to_lat_lon(face_uv_to_xyz(face, u, v))
    }

    /// Compact textual form: the hex id with trailing zeros removed.
    pub fn token(&self) -> String {
        let hex = format!("{:016x}", self.0);
        hex.trim_end_matches('0').to_string()
    }

    fn lsb(&self) -> u64 {
        self.0 & self.0.wrapping_neg()
    }

    fn parent_unchecked(&self, level: u8) -> Self {
        let new_lsb = lsb_for_level(level);
        GeoCell((self.0 & new_lsb.wrapping_neg()) | new_lsb)
    }

    fn from_face_ij(face: u8, i: u32, j: u32) -> Self {
        let mut n = u64::from(face) << POS_BITS;
        let mut orientation = face & SWAP_MASK;
        for k in (0..u32::from(MAX_LEVEL)).rev() {
            let ij = (((i >> k) & 1) << 1) | ((j >> k) & 1);
            let pos = IJ_TO_POS[orientation as usize][ij as usize];
            n |= u64::from(pos) << (2 * k + 1);
            orientation ^= POS_TO_ORIENTATION[pos as usize];
        }
        GeoCell(n | 1)
    }

    /// Decodes the leaf-resolution `(i, j)` of the cell's lower-left corner.
    fn lower_left_ij(&self, level: u8) -> (u32, u32) {
        let mut i = 0u32;
        let mut j = 0u32;
        let mut orientation = self.face() & SWAP_MASK;
        for k in (u32::from(MAX_LEVEL - level)..u32::from(MAX_LEVEL)).rev() {
            let pos = ((self.0 >> (2 * k + 1)) & 3) as usize;
            let ij = POS_TO_IJ[orientation as usize][pos];
            i |= u32::from(ij >> 1) << k;
            j |= u32::from(ij & 1) << k;
            orientation ^= POS_TO_ORIENTATION[pos];
        }
        (i, j)
    }
}

impl fmt::Display for GeoCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for GeoCell {
    type Err = CellError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        if token.is_empty() || token.len() > 16 {
            return Err(CellError::InvalidToken(token.to_string()));
        }
        let padded = format!("{:0<16}", token);
        u64::from_str_radix(&padded, 16)
            .ok()
            .and_then(GeoCell::from_raw)
            .ok_or_else(|| CellError::InvalidToken(token.to_string()))
    }
}

pub(crate) fn validate_level(level: u8) -> Result<(), CellError> {
    if level > MAX_LEVEL {
        return Err(CellError::InvalidLevel(level));
    }
    Ok(())
}

fn lsb_for_level(level: u8) -> u64 {
    1u64 << (2 * u32::from(MAX_LEVEL - level))
}

fn lat_lon_to_xyz(lat: f64, lon: f64) -> [f64; 3] {
    let (phi, theta) = (lat.to_radians(), lon.to_radians());
    let cos_phi = phi.cos();
    [theta.cos() * cos_phi, theta.sin() * cos_phi, phi.sin()]
}

fn xyz_to_lat_lon([x, y, z]: [f64; 3]) -> (f64, f64) {
    let lat = z.atan2((x * x + y * y).sqrt()).to_degrees();
    let lon = y.atan2(x).to_degrees();
    (lat, lon)
}

fn xyz_to_face_uv([x, y, z]: [f64; 3]) -> (u8, f64, f64) {
    let (ax, ay, az) = (x.abs(), y.abs(), z.abs());
    let axis = if ax > ay {
        if ax > az {
            0
        } else {
            2
        }
    } else if ay > az {
        1
    } else {
        2
    };
    let negative = [x, y, z][axis] < 0.0;
    let face = axis as u8 + if negative { 3 } else { 0 };

    let (u, v) = match face {
        0 => (y / x, z / x),
        1 => (-x / y, z / y),
        2 => (-x / z, -y / z),
        3 => (z / x, y / x),
        4 => (z / y, -x / y),
        _ => (-y / z, -x / z),
    };
    (face, u, v)
}

fn face_uv_to_xyz(face: u8, u: f64, v: f64) -> [f64; 3] {
    match face {
        0 => [1.0, u, v],
        1 => [-u, 1.0, v],
        2 => [-u, -v, 1.0],
        3 => [-1.0, -v, -u],
        4 => [v, -1.0, -u],
        _ => [v, u, -1.0],
    }
}

// Quadratic projection, keeps cell areas within a factor of ~2 across a face.
fn uv_to_st(u: f64) -> f64 {
    if u >= 0.0 {
        0.5 * (1.0 + 3.0 * u).sqrt()
    } else {
        1.0 - 0.5 * (1.0 - 3.0 * u).sqrt()
    }
}

fn st_to_uv(s: f64) -> f64 {
    if s >= 0.5 {
        (1.0 / 3.0) * (4.0 * s * s - 1.0)
    } else {
        (1.0 / 3.0) * (1.0 - 4.0 * (1.0 - s) * (1.0 - s))
    }
}

fn st_to_ij(s: f64) -> u32 {
    let max = i64::from(MAX_SIZE) - 1;
    ((f64::from(MAX_SIZE) * s).floor() as i64).clamp(0, max) as u32
}
