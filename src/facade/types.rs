//! Core types for the simulation façade
//!
//! Plain value types shared by the aggregator, the deferred queue and the
//! façade accessors. None of them hold a reference to the session.

/// Identifier of a vehicle, edge, lane, route, traffic light or bus stop.
/// Uniqueness and lifetime are owned by the remote session.
pub type EntityId = String;

/// An RGBA color with 8-bit channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opacity in `[0, 1]` derived from the alpha channel
    pub fn opacity(&self) -> f32 {
        self.a as f32 / 255.0
    }

    /// Build a color from a loosely-typed component list.
    ///
    /// Accepts three (alpha defaults to 255) or four components, each in
    /// `0..=255`. Anything else is not a well-formed color.
    pub fn from_components(components: &[i64]) -> Option<Self> {
        let channel = |value: i64| u8::try_from(value).ok();
        match components {
            [r, g, b] => Some(Self::new(channel(*r)?, channel(*g)?, channel(*b)?, 255)),
            [r, g, b, a] => Some(Self::new(
                channel(*r)?,
                channel(*g)?,
                channel(*b)?,
                channel(*a)?,
            )),
            _ => None,
        }
    }
}

/// A planar position reported by the session
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position2D {
    pub x: f64,
    pub y: f64,
}

impl Position2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position2D) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(&self, other: &Position2D, t: f64) -> Position2D {
        Position2D {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

/// Display-oriented snapshot of one vehicle, rebuilt on every query
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRow {
    pub id: EntityId,
    /// Speed in m/s
    pub speed: f64,
    pub edge: EntityId,
    pub color: Rgba,
}

impl VehicleRow {
    pub fn opacity(&self) -> f32 {
        self.color.opacity()
    }
}

/// Point-in-time state of a single vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    pub id: EntityId,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub edge: EntityId,
}

/// The minimal per-vehicle input of the edge aggregator
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSample {
    pub id: EntityId,
    pub edge: EntityId,
    pub speed: f64,
}

/// Per-edge traffic statistics
///
/// `vehicle_count == 0` exactly when `average_speed == NO_VEHICLES`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeStats {
    pub vehicle_count: usize,
    pub average_speed: f64,
}

impl EdgeStats {
    /// Average speed reported for an edge with no vehicles on it
    pub const NO_VEHICLES: f64 = -1.0;

    pub fn empty() -> Self {
        Self {
            vehicle_count: 0,
            average_speed: Self::NO_VEHICLES,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vehicle_count == 0
    }
}

impl Default for EdgeStats {
    fn default() -> Self {
        Self::empty()
    }
}

/// Whether an id names a simulator-internal junction edge
pub fn is_internal_edge(edge_id: &str, prefix: char) -> bool {
    edge_id.starts_with(prefix)
}
