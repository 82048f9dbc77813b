use crate::error::Error;

/// Trait for reporting catalog indexing progress.
///
/// CLI implements with indicatif, tests implement with counters.
/// All methods have default no-op implementations.
pub trait ProgressSink: Send + Sync {
    fn on_phase_start(&self, _name: &str) {}
    fn on_position(&self, _position: f64, _display_steps: f64) {}
    fn on_phase_complete(&self, _name: &str, _duration_secs: f64) {}
}

/// No-op progress sink for silent operation.
pub struct SilentSink;

impl ProgressSink for SilentSink {}

/// One named sub-operation of a long-running task.
#[derive(Debug, Clone)]
pub struct ProgressOperation {
    pub name: String,
    pub relative_cost: f64,
    pub enabled: bool,
}

/// Allocates a fixed display-step range across an ordered list of
/// sub-operations.
///
/// Each enabled operation gets a contiguous slice of `0..display_steps`
/// proportional to its relative cost; disabled operations collapse to a
/// zero-width slot at their position. Boundaries are recomputed on every
/// mutation.
#[derive(Debug, Clone)]
pub struct ProgressSchedule {
    operations: Vec<ProgressOperation>,
    display_steps: u32,
    boundaries: Vec<f64>,
}

impl ProgressSchedule {
    pub fn new(operations: &[(&str, f64)], display_steps: u32) -> Result<Self, Error> {
        let operations = operations
            .iter()
            .map(|(name, cost)| ProgressOperation {
                name: (*name).to_string(),
                relative_cost: *cost,
                enabled: true,
            })
            .collect();
        let mut schedule = Self {
            operations,
            display_steps,
            boundaries: Vec::new(),
        };
        schedule.compute_boundaries()?;
        Ok(schedule)
    }

    /// Cumulative cost-weighted boundaries rescaled to `display_steps`.
    ///
    /// A schedule whose enabled operations sum to zero cost cannot be
    /// rescaled; that is a configuration error, not a divide-by-zero.
    fn compute_boundaries(&mut self) -> Result<(), Error> {
        if let Some(op) = self.operations.iter().find(|op| op.relative_cost < 0.0) {
            return Err(Error::Schedule(format!(
                "operation '{}' has negative cost {}",
                op.name, op.relative_cost
            )));
        }
        let total: f64 = self
            .operations
            .iter()
            .filter(|op| op.enabled)
            .map(|op| op.relative_cost)
            .sum();
        if total <= 0.0 {
            return Err(Error::Schedule(
                "total cost of enabled operations is zero".to_string(),
            ));
        }

        let mut boundaries = Vec::with_capacity(self.operations.len() + 1);
        boundaries.push(0.0);
        let mut acc = 0.0;
        for op in &self.operations {
            if op.enabled {
                acc += op.relative_cost;
            }
            boundaries.push(acc / total * f64::from(self.display_steps));
        }
        self.boundaries = boundaries;
        Ok(())
    }

    pub fn set_usage(&mut self, index: usize, enabled: bool) -> Result<(), Error> {
        match self.operations.get_mut(index) {
            Some(op) => op.enabled = enabled,
            None => {
                return Err(Error::Schedule(format!(
                    "operation index {} out of range",
                    index
                )))
            }
        }
        self.compute_boundaries()
    }

    pub fn set_cost(&mut self, index: usize, cost: f64) -> Result<(), Error> {
        match self.operations.get_mut(index) {
            Some(op) => op.relative_cost = cost,
            None => {
                return Err(Error::Schedule(format!(
                    "operation index {} out of range",
                    index
                )))
            }
        }
        self.compute_boundaries()
    }

    /// The slice of the global `0..display_steps` range owned by operation
    /// `index`. Pass the result to a nested operation's own reporter so that
    /// arbitrarily deep call chains report globally consistent positions.
    pub fn sub_range(&self, index: usize) -> (f64, f64) {
        (self.boundaries[index], self.boundaries[index + 1])
    }

    pub fn display_steps(&self) -> f64 {
        f64::from(self.display_steps)
    }

    pub fn operations(&self) -> &[ProgressOperation] {
        &self.operations
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_boundary_invariants() {
        let schedule =
            ProgressSchedule::new(&[("enumerate", 15.0), ("hydrate", 5.0), ("reconcile", 80.0)], 100)
                .unwrap();
        let bounds = schedule.boundaries();
        assert!(close(bounds[0], 0.0));
        assert!(close(*bounds.last().unwrap(), 100.0));
        assert!(close(bounds[1], 15.0));
        assert!(close(bounds[2], 20.0));
    }

    #[test]
    fn test_disabled_operation_has_zero_width() {
        let mut schedule =
            ProgressSchedule::new(&[("a", 1.0), ("b", 1.0), ("c", 2.0)], 100).unwrap();
        schedule.set_usage(1, false).unwrap();
        let (start, end) = schedule.sub_range(1);
        assert!(close(start, end));
        // remaining width is redistributed, last boundary still pinned
        assert!(close(*schedule.boundaries().last().unwrap(), 100.0));
        let (_, a_end) = schedule.sub_range(0);
        assert!(close(a_end, 100.0 / 3.0));
    }

    #[test]
    fn test_zero_total_cost_fails_fast() {
        assert!(matches!(
            ProgressSchedule::new(&[("a", 0.0), ("b", 0.0)], 100),
            Err(Error::Schedule(_))
        ));

        let mut schedule = ProgressSchedule::new(&[("a", 1.0), ("b", 1.0)], 100).unwrap();
        schedule.set_usage(0, false).unwrap();
        assert!(schedule.set_usage(1, false).is_err());
    }

    #[test]
    fn test_negative_cost_rejected() {
        assert!(ProgressSchedule::new(&[("a", -1.0)], 100).is_err());
        let mut schedule = ProgressSchedule::new(&[("a", 1.0)], 100).unwrap();
        assert!(schedule.set_cost(0, -0.5).is_err());
    }

    #[test]
    fn test_cost_mutation_recomputes() {
        let mut schedule = ProgressSchedule::new(&[("a", 1.0), ("b", 1.0)], 10).unwrap();
        assert!(close(schedule.sub_range(0).1, 5.0));
        schedule.set_cost(0, 3.0).unwrap();
        assert!(close(schedule.sub_range(0).1, 7.5));
    }

    #[test]
    fn test_sub_ranges_tile_the_whole_range() {
        let schedule = ProgressSchedule::new(&[("a", 2.0), ("b", 7.0), ("c", 1.0)], 50).unwrap();
        let mut cursor = 0.0;
        for i in 0..schedule.operations().len() {
            let (start, end) = schedule.sub_range(i);
            assert!(close(start, cursor));
            assert!(end >= start);
            cursor = end;
        }
        assert!(close(cursor, 50.0));
    }
}
