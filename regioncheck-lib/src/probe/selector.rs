use std::time::Duration;

/// Tracks the cheapest allowed candidate seen so far.
///
/// Candidates are offered in input order; a later candidate only wins with a
/// strictly lower cost, so ties keep the first one.
#[derive(Debug, Default)]
pub struct Selector {
    best: Option<(usize, Duration)>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the candidate became the new minimum.
    pub fn offer(&mut self, index: usize, cost: Duration) -> bool {
        match self.best {
            Some((_, min_cost)) if cost >= min_cost => false,
            _ => {
                self.best = Some((index, cost));
                true
            }
        }
    }

    pub fn best(&self) -> Option<usize> {
        self.best.map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::Selector;
    use std::time::Duration;

    #[test]
    fn test_empty_selector() {
        assert_eq!(Selector::new().best(), None);
    }

    #[test]
    fn test_strict_minimum_keeps_first_tie() {
        let mut s = Selector::new();
        assert!(s.offer(0, Duration::from_millis(120)));
        assert!(s.offer(1, Duration::from_millis(80)));
        assert!(!s.offer(2, Duration::from_millis(80)));
        assert!(!s.offer(3, Duration::from_millis(300)));
        assert_eq!(s.best(), Some(1));
    }

    #[test]
    fn test_zero_cost_is_a_real_minimum() {
        let mut s = Selector::new();
        assert!(s.offer(0, Duration::ZERO));
        assert!(!s.offer(1, Duration::from_millis(10)));
        assert_eq!(s.best(), Some(0));
    }
}
