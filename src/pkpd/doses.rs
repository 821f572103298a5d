//! Dose schedule of one drug in one host.
//!
//! Doses are kept in a sorted arena covering today (times in `[0, 1)`) and later days. After
//! every insertion the arena is a time-ordered partition:
//!
//! * boluses at the same time are merged, and precede an infusion starting at that time;
//! * infusions never overlap each other: overlapping infusions are cut at every boundary and
//!   the overlapping pieces carry the summed rate;
//! * infusions never contain a bolus or a day boundary strictly inside them.
//!
//! Integration over a day can then walk the arena front to back.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Dose {
    /// Start time in days from the beginning of today.
    pub time: f64,
    /// Concentration increment (mg/l) of a bolus, or infusion rate (mg/kg/day).
    pub qty: f64,
    /// Zero for a bolus.
    pub duration: f64,
}

impl Dose {
    pub fn bolus(time: f64, concentration: f64) -> Self {
        Self {
            time,
            qty: concentration,
            duration: 0.0,
        }
    }

    pub fn infusion(time: f64, duration: f64, rate: f64) -> Self {
        Self {
            time,
            qty: rate,
            duration,
        }
    }

    pub fn is_bolus(&self) -> bool {
        self.duration == 0.0
    }

    pub fn end(&self) -> f64 {
        self.time + self.duration
    }
}

/// One piece of today's concentration profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    /// Elimination without dosing, for the given number of days.
    Decay(f64),
    /// Instantaneous concentration increment.
    Bolus(f64),
    /// Constant-rate infusion (mg/kg/day) for the given number of days.
    Infusion { duration: f64, rate: f64 },
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DoseSchedule {
    doses: Vec<Dose>,
}

impl DoseSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.doses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.doses.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dose> {
        self.doses.iter()
    }

    pub fn insert_bolus(&mut self, time: f64, concentration: f64) {
        if let Some(existing) = self
            .doses
            .iter_mut()
            .find(|dose| dose.is_bolus() && dose.time == time)
        {
            existing.qty += concentration;
            return;
        }

        // a bolus inside an infusion cuts the infusion in two
        if let Some(index) = self
            .doses
            .iter()
            .position(|dose| !dose.is_bolus() && dose.time < time && time < dose.end())
        {
            let infusion = self.doses[index];
            let pieces = [
                Dose::infusion(infusion.time, time - infusion.time, infusion.qty),
                Dose::bolus(time, concentration),
                Dose::infusion(time, infusion.end() - time, infusion.qty),
            ];
            self.doses.splice(index..=index, pieces);
            return;
        }

        let at = self.doses.partition_point(|dose| dose.time < time);
        self.doses.insert(at, Dose::bolus(time, concentration));
    }

    pub fn insert_infusion(&mut self, time: f64, duration: f64, rate: f64) {
        let end = time + duration;

        // range of doses touching [time, end)
        let lo = self
            .doses
            .iter()
            .position(|dose| {
                if dose.is_bolus() {
                    dose.time >= time
                } else {
                    dose.end() > time
                }
            })
            .unwrap_or(self.doses.len());
        let hi = lo
            + self.doses[lo..]
                .iter()
                .position(|dose| dose.time >= end)
                .unwrap_or(self.doses.len() - lo);

        let region = &self.doses[lo..hi];
        let boluses: SmallVec<[Dose; 4]> =
            region.iter().filter(|dose| dose.is_bolus()).copied().collect();
        let mut infusions: SmallVec<[Dose; 4]> =
            region.iter().filter(|dose| !dose.is_bolus()).copied().collect();
        infusions.push(Dose::infusion(time, duration, rate));

        let mut cuts: SmallVec<[f64; 16]> = infusions
            .iter()
            .flat_map(|dose| [dose.time, dose.end()])
            .chain(boluses.iter().map(|dose| dose.time))
            .collect();
        let first = cuts.iter().copied().fold(f64::INFINITY, f64::min);
        let last = cuts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut day = first.floor() + 1.0;
        while day < last {
            cuts.push(day);
            day += 1.0;
        }
        cuts.sort_by(|a, b| a.total_cmp(b));
        cuts.dedup();

        let mut merged: SmallVec<[Dose; 8]> = SmallVec::new();
        let mut pending = boluses.into_iter().peekable();
        for window in cuts.windows(2) {
            let (a, b) = (window[0], window[1]);
            while let Some(bolus) = pending.next_if(|dose| dose.time <= a) {
                merged.push(bolus);
            }
            let rate: f64 = infusions
                .iter()
                .filter(|dose| dose.time <= a && b <= dose.end())
                .map(|dose| dose.qty)
                .sum();
            if rate > 0.0 {
                merged.push(Dose::infusion(a, b - a, rate));
            }
        }
        merged.extend(pending);

        self.doses.splice(lo..hi, merged);
    }

    /// Today's profile as consecutive segments covering exactly one day.
    pub fn today(&self) -> SmallVec<[Segment; 8]> {
        let mut segments = SmallVec::new();
        let mut cursor = 0.0;
        for dose in self.doses.iter().take_while(|dose| dose.time < 1.0) {
            if dose.time > cursor {
                segments.push(Segment::Decay(dose.time - cursor));
                cursor = dose.time;
            }
            if dose.is_bolus() {
                segments.push(Segment::Bolus(dose.qty));
            } else {
                let end = dose.end().min(1.0);
                segments.push(Segment::Infusion {
                    duration: end - dose.time,
                    rate: dose.qty,
                });
                cursor = end;
            }
        }
        if cursor < 1.0 {
            segments.push(Segment::Decay(1.0 - cursor));
        }
        segments
    }

    /// Drop today's doses and move later ones one day closer.
    pub fn advance_day(&mut self) {
        self.doses.retain(|dose| dose.time >= 1.0);
        for dose in self.doses.iter_mut() {
            dose.time -= 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(schedule: &DoseSchedule) {
        let doses: Vec<&Dose> = schedule.iter().collect();
        for pair in doses.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(a.time <= b.time, "unsorted: {a:?} {b:?}");
            if !a.is_bolus() {
                assert!(a.end() <= b.time + 1e-12, "overlap: {a:?} {b:?}");
            }
            if a.time == b.time {
                assert!(a.is_bolus() && !b.is_bolus(), "order at equal time: {a:?} {b:?}");
            }
        }
        for dose in doses.iter().filter(|dose| !dose.is_bolus()) {
            assert!(
                dose.time.floor() == (dose.end() - 1e-12).floor(),
                "crosses midnight: {dose:?}"
            );
        }
    }

    #[test]
    fn boluses_merge() {
        let mut schedule = DoseSchedule::new();
        schedule.insert_bolus(0.5, 1.0);
        schedule.insert_bolus(0.0, 2.0);
        schedule.insert_bolus(0.5, 3.0);
        assert_eq!(
            schedule.iter().copied().collect::<Vec<_>>(),
            vec![Dose::bolus(0.0, 2.0), Dose::bolus(0.5, 4.0)]
        );
    }

    #[test]
    fn bolus_before_infusion_at_same_time() {
        let mut a = DoseSchedule::new();
        a.insert_infusion(0.0, 0.5, 10.0);
        a.insert_bolus(0.0, 1.0);

        let mut b = DoseSchedule::new();
        b.insert_bolus(0.0, 1.0);
        b.insert_infusion(0.0, 0.5, 10.0);

        assert_eq!(a, b);
        assert_partition(&a);
        assert!(a.iter().next().unwrap().is_bolus());
    }

    #[test]
    fn bolus_splits_infusion() {
        let mut schedule = DoseSchedule::new();
        schedule.insert_infusion(0.2, 0.6, 5.0);
        schedule.insert_bolus(0.5, 1.0);
        assert_partition(&schedule);
        let doses: Vec<Dose> = schedule.iter().copied().collect();
        assert_eq!(doses.len(), 3);
        assert_eq!(doses[0].time, 0.2);
        assert!((doses[0].duration - 0.3).abs() < 1e-12);
        assert_eq!(doses[1], Dose::bolus(0.5, 1.0));
        assert_eq!(doses[2].time, 0.5);
        assert!((doses[2].end() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn overlapping_infusions_sum() {
        let mut schedule = DoseSchedule::new();
        schedule.insert_infusion(0.1, 0.5, 2.0);
        schedule.insert_infusion(0.3, 0.2, 3.0);
        assert_partition(&schedule);

        let rates: Vec<(f64, f64)> = schedule.iter().map(|dose| (dose.time, dose.qty)).collect();
        assert_eq!(rates, vec![(0.1, 2.0), (0.3, 5.0), (0.5, 2.0)]);
    }

    #[test]
    fn infusion_split_at_midnight() {
        let mut schedule = DoseSchedule::new();
        schedule.insert_infusion(0.5, 1.0, 4.0);
        assert_partition(&schedule);
        let doses: Vec<Dose> = schedule.iter().copied().collect();
        assert_eq!(doses, vec![Dose::infusion(0.5, 0.5, 4.0), Dose::infusion(1.0, 0.5, 4.0)]);

        schedule.advance_day();
        let doses: Vec<Dose> = schedule.iter().copied().collect();
        assert_eq!(doses, vec![Dose::infusion(0.0, 0.5, 4.0)]);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut a = DoseSchedule::new();
        a.insert_infusion(0.0, 0.75, 1.0);
        a.insert_infusion(0.25, 1.0, 2.0);
        a.insert_bolus(0.5, 3.0);

        let mut b = DoseSchedule::new();
        b.insert_bolus(0.5, 3.0);
        b.insert_infusion(0.25, 1.0, 2.0);
        b.insert_infusion(0.0, 0.75, 1.0);

        assert_partition(&a);
        assert_eq!(a, b);
    }

    #[test]
    fn segments_cover_one_day() {
        let mut schedule = DoseSchedule::new();
        schedule.insert_infusion(0.1, 0.5, 2.0);
        schedule.insert_infusion(0.3, 0.2, 3.0);
        schedule.insert_bolus(0.8, 1.0);
        schedule.insert_bolus(1.2, 1.0);

        let segments = schedule.today();
        let total: f64 = segments
            .iter()
            .map(|segment| match segment {
                Segment::Decay(t) => *t,
                Segment::Bolus(_) => 0.0,
                Segment::Infusion { duration, .. } => *duration,
            })
            .sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(matches!(segments[0], Segment::Decay(t) if (t - 0.1).abs() < 1e-12));
        assert!(matches!(segments.last(), Some(Segment::Decay(_))));
        assert_eq!(
            segments
                .iter()
                .filter(|segment| matches!(segment, Segment::Bolus(_)))
                .count(),
            1
        );
    }

    #[test]
    fn empty_day_is_one_decay() {
        let schedule = DoseSchedule::new();
        assert_eq!(schedule.today().as_slice(), &[Segment::Decay(1.0)]);
    }
}
