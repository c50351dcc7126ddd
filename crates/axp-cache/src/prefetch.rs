/// L1D stride prefetcher (spec §4.8: "optional configurable stride
/// prefetch ... must never fault visibly"). Tracks the last observed miss
/// address and the stride between the two most recent misses; once two
/// consecutive misses agree on a stride it predicts the next one.
///
/// Predictions only ever trigger an ordinary coherent read-miss fill
/// through the same path a demand load would use, so a wrong guess costs
/// cache capacity, never correctness.
#[derive(Default)]
pub struct StridePrefetcher {
    enabled: bool,
    last_addr: Option<u64>,
    last_stride: Option<i64>,
}

impl StridePrefetcher {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            last_addr: None,
            last_stride: None,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Records a miss at `line_addr` and returns the next line to prefetch
    /// if a stable stride has been established.
    pub fn observe(&mut self, line_addr: u64) -> Option<u64> {
        let prediction = match (self.last_addr, self.last_stride) {
            (Some(last), Some(stride)) if self.enabled && (line_addr as i64 - last as i64) == stride => {
                Some((line_addr as i64 + stride) as u64)
            }
            _ => None,
        };

        if let Some(last) = self.last_addr {
            self.last_stride = Some(line_addr as i64 - last as i64);
        }
        self.last_addr = Some(line_addr);
        prediction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_stride_predicts_next_line() {
        let mut p = StridePrefetcher::new(true);
        assert_eq!(p.observe(0x1000), None);
        assert_eq!(p.observe(0x1040), None);
        assert_eq!(p.observe(0x1080), Some(0x10C0));
    }

    #[test]
    fn disabled_prefetcher_never_predicts() {
        let mut p = StridePrefetcher::new(false);
        p.observe(0x1000);
        p.observe(0x1040);
        assert_eq!(p.observe(0x1080), None);
    }

    #[test]
    fn irregular_access_pattern_yields_no_prediction() {
        let mut p = StridePrefetcher::new(true);
        p.observe(0x1000);
        p.observe(0x2000);
        assert_eq!(p.observe(0x1500), None);
    }
}
