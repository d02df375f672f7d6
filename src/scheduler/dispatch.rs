//! Dispatch policies: `strict`, `wfq`, and `hybrid`.

/// Selectable dispatch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPolicy {
    Strict,
    Wfq,
    Hybrid,
}

/// Per-class weight/deficit state for weighted-fair dispatch. Lives under
/// the same lock as the scheduler's weights (design note 9), since updating
/// weights must reset deficits atomically with respect to the tick.
#[derive(Debug, Clone)]
pub struct WfqState {
    weights: Vec<u64>,
    deficits: Vec<i64>,
    max_deficit_cap: i64,
}

impl WfqState {
    pub fn new(weights: Vec<u64>, max_queue_depth: usize) -> Self {
        let max_deficit_cap = (2 * max_queue_depth) as i64;
        let n = weights.len();
        Self {
            weights,
            deficits: vec![0; n],
            max_deficit_cap,
        }
    }

    pub fn weights(&self) -> Vec<u64> {
        self.weights.clone()
    }

    pub fn set_weights(&mut self, weights: Vec<u64>) {
        let n = weights.len();
        self.weights = weights;
        self.deficits = vec![0; n];
    }

    /// Add each class's weight to its deficit (once per 100ms tick).
    pub fn tick(&mut self, from_class: usize) {
        for i in from_class..self.weights.len() {
            self.deficits[i] += self.weights[i] as i64;
        }
    }

    /// Pick the non-empty class (from `from_class` onward) with the highest
    /// positive deficit. If none is selectable, zero every deficit in range
    /// to prevent unbounded drift.
    pub fn select(&mut self, non_empty: &[bool], from_class: usize) -> Option<usize> {
        let mut best: Option<usize> = None;
        for i in from_class..non_empty.len() {
            if non_empty[i] && self.deficits[i] > 0 && best.map_or(true, |b| self.deficits[i] > self.deficits[b]) {
                best = Some(i);
            }
        }
        if best.is_none() {
            for d in &mut self.deficits[from_class..] {
                *d = 0;
            }
        }
        best
    }

    /// Subtract `cost` from `class`'s deficit, clamped to `± max_deficit_cap`.
    pub fn charge(&mut self, class: usize, cost: i64) {
        let d = &mut self.deficits[class];
        *d -= cost;
        if *d > self.max_deficit_cap {
            *d = self.max_deficit_cap;
        }
        if *d < -self.max_deficit_cap {
            *d = -self.max_deficit_cap;
        }
    }
}

/// `cost = max(1, estimatedTokens/1000)`.
pub fn dispatch_cost(estimated_tokens: u64) -> i64 {
    (estimated_tokens / 1000).max(1) as i64
}

/// Default weights: exponential `2^(L-1-i)`, approximating strict priority
/// while letting lower classes make progress.
pub fn default_weights(num_levels: u8) -> Vec<u64> {
    (0..num_levels)
        .map(|i| 1u64 << (num_levels - 1 - i).min(63))
        .collect()
}
