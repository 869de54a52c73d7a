//! Proper-motion propagation of stored positions to an observation epoch.

use celestial_sky::sphere::MAS_TO_RAD;

use crate::epoch::Epoch;
use crate::shard::ShardRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    Applied,
    /// The record has no proper motion and is unchanged.
    NoProperMotion,
    /// Neither the record nor its shard has an epoch; unchanged.
    NoEpoch,
}

/// Move `record` from its own epoch (or `reference` when it has none) to
/// `target`.
///
/// The position travels along the great circle with bearing
/// `atan2(pm_dec, pm_ra)` (east toward north) by `|pm| · Δt`. Position
/// errors grow in quadrature with `Δt · pm_err`; proper-motion errors are
/// unchanged.
pub fn apply_proper_motion(
    record: &mut ShardRecord,
    reference: Option<Epoch>,
    target: Epoch,
) -> MotionOutcome {
    let Some(pm) = record.proper_motion else {
        return MotionOutcome::NoProperMotion;
    };
    let Some(from) = record.epoch.or(reference) else {
        return MotionOutcome::NoEpoch;
    };

    let dt = target.years_since(from);
    record.epoch = Some(target);
    if dt == 0.0 {
        return MotionOutcome::Applied;
    }

    let bearing = libm::atan2(pm.pm_dec, pm.pm_ra);
    let distance = libm::hypot(pm.pm_ra, pm.pm_dec) * dt * MAS_TO_RAD;
    let moved = record.position().offset(bearing, distance);
    record.ra = moved.ra_deg;
    record.dec = moved.dec_deg;

    if let Some(err) = record.ra_err.as_mut() {
        *err = libm::hypot(*err, dt * pm.pm_ra_err.unwrap_or(0.0));
    }
    if let Some(err) = record.dec_err.as_mut() {
        *err = libm::hypot(*err, dt * pm.pm_dec_err.unwrap_or(0.0));
    }
    MotionOutcome::Applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::ProperMotion;
    use celestial_sky::sphere::angle_difference;

    fn star(pm: Option<ProperMotion>, epoch: Option<Epoch>) -> ShardRecord {
        ShardRecord {
            id: 1,
            ra: 181.0,
            dec: -2.0,
            ra_err: Some(10.0),
            dec_err: Some(20.0),
            proper_motion: pm,
            epoch,
            fluxes: Vec::new(),
        }
    }

    fn pm_45_degrees() -> ProperMotion {
        let amount = 3000.0;
        let angle = 45.0_f64.to_radians();
        ProperMotion {
            pm_ra: amount * angle.cos(),
            pm_dec: amount * angle.sin(),
            pm_ra_err: Some(5.0),
            pm_dec_err: Some(7.0),
        }
    }

    #[test]
    fn test_one_year_displacement() {
        let reference = Epoch::from_mjd(58000.0);
        let mut record = star(Some(pm_45_degrees()), None);
        let before = record.position();
        let outcome = apply_proper_motion(&mut record, Some(reference), reference.plus_years(1.0));
        assert_eq!(outcome, MotionOutcome::Applied);

        let after = record.position();
        let sep_arcsec = before.separation_deg(&after) * 3600.0;
        assert!((sep_arcsec - 3.0).abs() < 1e-6, "separation {sep_arcsec}");
        let bearing = before.bearing_to(&after);
        assert!(angle_difference(bearing, 45.0_f64.to_radians()).abs() < 1e-8);

        assert_eq!(record.ra_err, Some(libm::hypot(10.0, 5.0)));
        assert_eq!(record.dec_err, Some(libm::hypot(20.0, 7.0)));
        assert_eq!(record.epoch, Some(reference.plus_years(1.0)));
    }

    #[test]
    fn test_zero_elapsed_time_is_identity() {
        let reference = Epoch::from_mjd(58000.0);
        let mut record = star(Some(pm_45_degrees()), None);
        let original = record.clone();
        apply_proper_motion(&mut record, Some(reference), reference);
        assert_eq!(record.position(), original.position());
        assert_eq!(record.ra_err, original.ra_err);
        assert_eq!(record.dec_err, original.dec_err);
        assert_eq!(record.epoch, Some(reference));
    }

    #[test]
    fn test_record_epoch_overrides_reference() {
        let mut record = star(Some(pm_45_degrees()), Some(Epoch::from_mjd(58365.25)));
        let before = record.position();
        apply_proper_motion(&mut record, Some(Epoch::from_mjd(0.0)), Epoch::from_mjd(58365.25));
        assert_eq!(record.position(), before);
    }

    #[test]
    fn test_backwards_in_time() {
        let reference = Epoch::from_mjd(58000.0);
        let mut record = star(Some(pm_45_degrees()), None);
        let before = record.position();
        apply_proper_motion(&mut record, Some(reference), reference.plus_years(-2.0));
        let bearing = before.bearing_to(&record.position());
        assert!(angle_difference(bearing, 225.0_f64.to_radians()).abs() < 1e-8);
        assert!((before.separation_deg(&record.position()) * 3600.0 - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_passthrough_cases() {
        let mut record = star(None, None);
        assert_eq!(
            apply_proper_motion(&mut record, None, Epoch::from_mjd(1.0)),
            MotionOutcome::NoProperMotion
        );
        let mut record = star(Some(pm_45_degrees()), None);
        let original = record.clone();
        assert_eq!(
            apply_proper_motion(&mut record, None, Epoch::from_mjd(1.0)),
            MotionOutcome::NoEpoch
        );
        assert_eq!(record, original);
    }
}
