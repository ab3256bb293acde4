//! Range-checked position fixes.

use std::ops::BitOr;

use super::geo::distance_m;

/// Which fields of a [`Position`] the source actually supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PositionFields(u8);

impl PositionFields {
    pub const NONE: Self = Self(0);
    pub const LATITUDE: Self = Self(1 << 0);
    pub const LONGITUDE: Self = Self(1 << 1);
    pub const ALTITUDE: Self = Self(1 << 2);
    pub const SPEED: Self = Self(1 << 3);
    pub const DIRECTION: Self = Self(1 << 4);
    pub const CLIMB: Self = Self(1 << 5);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for PositionFields {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A single position fix.
///
/// Latitude and longitude are validated at construction and always present.
/// The optional fields are stored as zero when absent and only exposed when
/// their bit is set in [`fields`](Self::fields).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    timestamp: i64,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    speed: f64,
    direction: f64,
    climb: f64,
    fields: PositionFields,
}

impl Position {
    /// Create a fix at `timestamp_ms` (milliseconds since the Unix epoch).
    ///
    /// Returns `None` if latitude is outside [-90, 90] or longitude outside
    /// [-180, 180]. Values are never clamped.
    pub fn new(timestamp_ms: i64, latitude: f64, longitude: f64) -> Option<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }

        Some(Self {
            timestamp: timestamp_ms,
            latitude,
            longitude,
            altitude: 0.0,
            speed: 0.0,
            direction: 0.0,
            climb: 0.0,
            fields: PositionFields::LATITUDE | PositionFields::LONGITUDE,
        })
    }

    /// Create a fix stamped with the current wall-clock time.
    pub fn now(latitude: f64, longitude: f64) -> Option<Self> {
        Self::new(chrono::Utc::now().timestamp_millis(), latitude, longitude)
    }

    /// Altitude in meters above the ellipsoid.
    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = altitude;
        self.fields = self.fields | PositionFields::ALTITUDE;
        self
    }

    /// Ground speed in meters per second.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self.fields = self.fields | PositionFields::SPEED;
        self
    }

    /// Heading in degrees clockwise from true north.
    pub fn with_direction(mut self, direction: f64) -> Self {
        self.direction = direction;
        self.fields = self.fields | PositionFields::DIRECTION;
        self
    }

    /// Vertical speed in meters per second.
    pub fn with_climb(mut self, climb: f64) -> Self {
        self.climb = climb;
        self.fields = self.fields | PositionFields::CLIMB;
        self
    }

    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn altitude(&self) -> Option<f64> {
        self.field(PositionFields::ALTITUDE, self.altitude)
    }

    pub fn speed(&self) -> Option<f64> {
        self.field(PositionFields::SPEED, self.speed)
    }

    pub fn direction(&self) -> Option<f64> {
        self.field(PositionFields::DIRECTION, self.direction)
    }

    pub fn climb(&self) -> Option<f64> {
        self.field(PositionFields::CLIMB, self.climb)
    }

    #[inline]
    pub fn fields(&self) -> PositionFields {
        self.fields
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &Position) -> f64 {
        distance_m(
            (self.latitude, self.longitude),
            (other.latitude, other.longitude),
        )
    }

    fn field(&self, flag: PositionFields, value: f64) -> Option<f64> {
        self.fields.contains(flag).then_some(value)
    }
}
