//! GNSS satellite reports.

use crate::error::ErrorCode;

/// Per-satellite status as reported by the GNSS engine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SatelliteInfo {
    pub prn: u16,
    /// Signal-to-noise ratio in dB-Hz.
    pub snr: f64,
    /// Elevation in degrees.
    pub elevation: f64,
    /// Azimuth in degrees.
    pub azimuth: f64,
    pub used: bool,
    pub has_almanac: bool,
    pub has_ephemeris: bool,
}

/// Snapshot of the visible constellation.
///
/// The used-in-fix count is derived from the per-satellite `used` flags and
/// recomputed on every mutation; it cannot be set directly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SatelliteData {
    satellites: Vec<SatelliteInfo>,
    used: usize,
}

impl SatelliteData {
    /// Create a snapshot with `visible` empty slots.
    pub fn new(visible: usize) -> Self {
        Self {
            satellites: vec![SatelliteInfo::default(); visible],
            used: 0,
        }
    }

    pub fn from_satellites(satellites: Vec<SatelliteInfo>) -> Self {
        let mut data = Self {
            satellites,
            used: 0,
        };
        data.recount();
        data
    }

    /// Replace the details of the satellite at `index`.
    ///
    /// Fails with `WrongParameter` if `index` is past the visible count.
    pub fn set_satellite_details(
        &mut self,
        index: usize,
        info: SatelliteInfo,
    ) -> Result<(), ErrorCode> {
        let slot = self
            .satellites
            .get_mut(index)
            .ok_or(ErrorCode::WrongParameter)?;
        *slot = info;
        self.recount();
        Ok(())
    }

    #[inline]
    pub fn num_satellites_visible(&self) -> usize {
        self.satellites.len()
    }

    #[inline]
    pub fn num_satellite_used(&self) -> usize {
        self.used
    }

    pub fn satellites(&self) -> &[SatelliteInfo] {
        &self.satellites
    }

    fn recount(&mut self) {
        self.used = self.satellites.iter().filter(|s| s.used).count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sat(prn: u16, used: bool) -> SatelliteInfo {
        SatelliteInfo {
            prn,
            snr: 35.0,
            used,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_has_empty_slots() {
        let data = SatelliteData::new(4);
        assert_eq!(data.num_satellites_visible(), 4);
        assert_eq!(data.num_satellite_used(), 0);
    }

    #[test]
    fn test_used_count_follows_flags() {
        let mut data = SatelliteData::new(3);
        data.set_satellite_details(0, sat(5, true)).unwrap();
        data.set_satellite_details(1, sat(7, true)).unwrap();
        assert_eq!(data.num_satellite_used(), 2);

        data.set_satellite_details(0, sat(5, false)).unwrap();
        assert_eq!(data.num_satellite_used(), 1);
    }

    #[test]
    fn test_index_out_of_range() {
        let mut data = SatelliteData::new(1);
        assert_eq!(
            data.set_satellite_details(1, sat(1, true)),
            Err(ErrorCode::WrongParameter)
        );
        assert_eq!(data.num_satellite_used(), 0);
    }

    proptest! {
        #[test]
        fn prop_used_count_matches_flags(flags in proptest::collection::vec(any::<bool>(), 0..32)) {
            let mut data = SatelliteData::new(flags.len());
            for (i, used) in flags.iter().enumerate() {
                data.set_satellite_details(i, sat(i as u16 + 1, *used)).unwrap();
            }
            let expected = flags.iter().filter(|u| **u).count();
            prop_assert_eq!(data.num_satellite_used(), expected);

            // Recomputing is idempotent.
            let again = SatelliteData::from_satellites(data.satellites().to_vec());
            prop_assert_eq!(again.num_satellite_used(), expected);
        }
    }
}
