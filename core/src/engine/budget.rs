/// Corrective re-prompts left for the current decision.
///
/// Carried through the loop state and handed back in every iteration result;
/// only malformed model output consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseBudget {
    limit: u32,
    used: u32,
}

impl ParseBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    /// Consumes one retry. Returns false once the budget is exhausted.
    pub fn try_consume(&mut self) -> bool {
        if self.used >= self.limit {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    /// Attempts made so far for the current decision, counting the first one.
    pub fn attempts(&self) -> u32 {
        self.used + 1
    }

    /// Fresh budget for the next decision.
    pub fn reset(self) -> Self {
        Self::new(self.limit)
    }
}

/// Per-scenario step counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepBudget {
    max: usize,
    taken: usize,
}

impl StepBudget {
    pub fn new(max: usize) -> Self {
        Self { max, taken: 0 }
    }

    pub fn record(&mut self) {
        self.taken += 1;
    }

    pub fn exhausted(&self) -> bool {
        self.taken >= self.max
    }

    pub fn taken(&self) -> usize {
        self.taken
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_budget_allows_configured_retries_only() {
        let mut budget = ParseBudget::new(1);
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert_eq!(budget.attempts(), 2);
        let budget = budget.reset();
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn step_budget_exhausts_at_max() {
        let mut budget = StepBudget::new(2);
        budget.record();
        assert!(!budget.exhausted());
        budget.record();
        assert!(budget.exhausted());
    }
}
