//! Worker count and progress batch interval derived from the task count.
//!
//! Larger runs use fewer, more heavily batched workers so the remote server
//! is not flooded with sessions and the aggregator sees less contention.

/// Workers and progress batch interval for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPlan {
    /// Number of concurrent workers (each owns one session).
    pub workers: usize,
    /// Emit a progress event every this many outcomes.
    pub batch_interval: usize,
}

/// One row of the step table: applies when the task count exceeds `above`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanStep {
    pub above: usize,
    pub plan: WorkerPlan,
}

/// Monotone step function from task count to [`WorkerPlan`].
///
/// | Tasks      | Workers | Batch |
/// |------------|---------|-------|
/// | > 10 000   | 3       | 100   |
/// | > 5 000    | 5       | 50    |
/// | > 2 000    | 6       | 30    |
/// | > 1 000    | 8       | 20    |
/// | > 500      | 10      | 15    |
/// | > 100      | 12      | 10    |
/// | otherwise  | 8       | 5     |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPlanTable {
    steps: Vec<PlanStep>,
    fallback: WorkerPlan,
}

const fn step(above: usize, workers: usize, batch_interval: usize) -> PlanStep {
    PlanStep {
        above,
        plan: WorkerPlan {
            workers,
            batch_interval,
        },
    }
}

const DEFAULT_STEPS: [PlanStep; 6] = [
    step(10_000, 3, 100),
    step(5_000, 5, 50),
    step(2_000, 6, 30),
    step(1_000, 8, 20),
    step(500, 10, 15),
    step(100, 12, 10),
];

const DEFAULT_FALLBACK: WorkerPlan = WorkerPlan {
    workers: 8,
    batch_interval: 5,
};

impl Default for WorkerPlanTable {
    fn default() -> Self {
        Self::new(DEFAULT_STEPS.to_vec(), DEFAULT_FALLBACK)
    }
}

impl WorkerPlanTable {
    /// Builds a table; steps are sorted by descending threshold so the first
    /// match is the highest one exceeded.
    ///
    /// Zero workers or a zero batch interval are raised to 1.
    #[must_use]
    pub fn new(mut steps: Vec<PlanStep>, fallback: WorkerPlan) -> Self {
        steps.sort_by(|a, b| b.above.cmp(&a.above));
        for s in &mut steps {
            s.plan = s.plan.at_least_one();
        }
        Self {
            steps,
            fallback: fallback.at_least_one(),
        }
    }

    /// Plan for `task_count` tasks, with workers capped by `max_workers`.
    ///
    /// The cap never raises the table's worker count, and the plan never
    /// uses more workers than there are tasks (minimum 1).
    #[must_use]
    pub fn plan(&self, task_count: usize, max_workers: Option<usize>) -> WorkerPlan {
        let base = self
            .steps
            .iter()
            .find(|s| task_count > s.above)
            .map_or(self.fallback, |s| s.plan);

        let mut workers = base.workers;
        if let Some(cap) = max_workers {
            workers = workers.min(cap.max(1));
        }
        workers = workers.min(task_count.max(1));

        WorkerPlan {
            workers,
            batch_interval: base.batch_interval,
        }
    }

    #[must_use]
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }
}

impl WorkerPlan {
    fn at_least_one(self) -> Self {
        Self {
            workers: self.workers.max(1),
            batch_interval: self.batch_interval.max(1),
        }
    }
}
