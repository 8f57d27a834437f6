use shared::Coordinate;

use crate::geo::path_length_km;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasureState {
    #[default]
    Idle,
    Measuring,
}

/// A user-drawn polyline. Points only accumulate while measuring and are
/// dropped whenever measuring stops.
#[derive(Debug, Clone, Default)]
pub struct MeasurementSession {
    state: MeasureState,
    points: Vec<Coordinate>,
}

impl MeasurementSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MeasureState {
        self.state
    }

    pub fn is_measuring(&self) -> bool {
        self.state == MeasureState::Measuring
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn start(&mut self) {
        self.points.clear();
        self.state = MeasureState::Measuring;
    }

    pub fn stop(&mut self) {
        self.points.clear();
        self.state = MeasureState::Idle;
    }

    pub fn toggle(&mut self) -> MeasureState {
        match self.state {
            MeasureState::Idle => self.start(),
            MeasureState::Measuring => self.stop(),
        }
        self.state
    }

    /// Returns false when idle or when the point is not a valid coordinate.
    pub fn add_point(&mut self, point: Coordinate) -> bool {
        if !self.is_measuring() || !point.is_valid() {
            return false;
        }
        self.points.push(point);
        true
    }

    /// Empties the polyline but keeps measuring.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn total_length_km(&self) -> f64 {
        path_length_km(&self.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_points_one_degree_apart() {
        let mut session = MeasurementSession::new();
        session.start();
        assert!(session.add_point(Coordinate::new(0.0, 0.0)));
        assert!(session.add_point(Coordinate::new(0.0, 1.0)));
        assert!((session.total_length_km() - 111.19).abs() < 0.5);

        session.stop();
        assert!(session.points().is_empty());
        assert_eq!(session.total_length_km(), 0.0);
        assert_eq!(session.state(), MeasureState::Idle);
    }

    #[test]
    fn points_are_ignored_while_idle() {
        let mut session = MeasurementSession::new();
        assert!(!session.add_point(Coordinate::new(1.0, 1.0)));
        assert!(session.points().is_empty());
    }

    #[test]
    fn start_discards_previous_points() {
        let mut session = MeasurementSession::new();
        session.start();
        session.add_point(Coordinate::new(1.0, 1.0));
        session.start();
        assert!(session.points().is_empty());
        assert!(session.is_measuring());
    }

    #[test]
    fn toggle_and_clear() {
        let mut session = MeasurementSession::new();
        assert_eq!(session.toggle(), MeasureState::Measuring);
        session.add_point(Coordinate::new(1.0, 1.0));
        session.add_point(Coordinate::new(2.0, 2.0));
        session.clear();
        assert!(session.points().is_empty());
        assert!(session.is_measuring());
        assert_eq!(session.toggle(), MeasureState::Idle);
    }

    #[test]
    fn single_point_has_zero_length() {
        let mut session = MeasurementSession::new();
        session.start();
        session.add_point(Coordinate::new(12.0, 34.0));
        assert_eq!(session.total_length_km(), 0.0);
        assert!(!session.add_point(Coordinate::new(f64::NAN, 0.0)));
    }
}
