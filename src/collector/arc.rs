use std::time::Duration;

use super::condition::{AtEnd, ReleaseCondition};
use crate::apq::AdaptablePriorityQueue;
use crate::timing::TimedArc;

/// Sweep-line over start-sorted arcs, tracking which ones are sounding.
///
/// Arcs become active once `time >= start` and leave the active set when the
/// release condition holds. The queue is keyed by end time, so only the
/// earliest-ending active arc is ever inspected for release.
pub struct TimedArcCollector<R = AtEnd> {
    arcs: Vec<TimedArc>,
    release: R,
    /// Next arc that has not started yet.
    cursor: usize,
    /// Indices into `arcs`, ascending (start order).
    active: Vec<usize>,
    ending: AdaptablePriorityQueue<Duration, usize>,
    last_released: Option<usize>,
}

impl TimedArcCollector<AtEnd> {
    pub fn new(arcs: Vec<TimedArc>) -> Self {
        Self::with_release(arcs, AtEnd)
    }
}

impl<R: ReleaseCondition> TimedArcCollector<R> {
    /// Arcs are sorted by start time if they are not already.
    pub fn with_release(mut arcs: Vec<TimedArc>, release: R) -> Self {
        arcs.sort_by_key(|a| a.start);
        Self {
            ending: AdaptablePriorityQueue::with_capacity(16),
            arcs,
            release,
            cursor: 0,
            active: Vec::new(),
            last_released: None,
        }
    }

    /// Activates every arc that has started, then releases every active arc
    /// whose release condition holds. Returns the arcs activated by this call.
    pub fn advance(&mut self, time: Duration) -> &[TimedArc] {
        let first = self.cursor;

        while let Some(arc) = self.arcs.get(self.cursor) {
            if arc.start > time {
                break;
            }
            self.active.push(self.cursor);
            self.ending.insert(arc.end, self.cursor);
            self.cursor += 1;
        }

        while let Some((_, &index)) = self.ending.peek_min() {
            if !self.release.should_release(time, &self.arcs[index]) {
                break;
            }
            self.ending.remove_min();
            if let Ok(pos) = self.active.binary_search(&index) {
                self.active.remove(pos);
            }
            self.last_released = Some(index);
        }

        &self.arcs[first..self.cursor]
    }

    /// Rebuilds the collector state at `time` from scratch.
    pub fn seek(&mut self, time: Duration) {
        self.cursor = 0;
        self.active.clear();
        self.ending.clear();
        self.last_released = None;
        self.advance(time);
    }

    /// Next arc that has not started yet.
    pub fn peek(&self) -> Option<&TimedArc> {
        self.arcs.get(self.cursor)
    }

    /// Most recently released arc.
    pub fn prev(&self) -> Option<&TimedArc> {
        self.last_released.map(|i| &self.arcs[i])
    }

    /// Active arcs in start order.
    pub fn current_arcs(&self) -> impl Iterator<Item = &TimedArc> {
        self.active.iter().map(|&i| &self.arcs[i])
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, arc: &TimedArc) -> bool {
        self.current_arcs().any(|a| a == arc)
    }

    /// Nothing sounding and nothing left to start.
    pub fn is_idle(&self) -> bool {
        self.active.is_empty() && self.cursor >= self.arcs.len()
    }

    pub fn arcs(&self) -> &[TimedArc] {
        &self.arcs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{Early, FractionElapsed};
    use crate::rng::SplitMix64;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn arc(start: u64, end: u64, pitch: u8) -> TimedArc {
        TimedArc::new(ms(start), ms(end), pitch, 100).unwrap()
    }

    fn pitches<R: ReleaseCondition>(collector: &TimedArcCollector<R>) -> Vec<u8> {
        collector.current_arcs().map(|a| a.pitch).collect()
    }

    #[test]
    fn activates_and_releases_overlapping_arcs() {
        let a = arc(0, 2_000, 1);
        let b = arc(1_000, 3_000, 2);
        let mut collector = TimedArcCollector::new(vec![a, b]);

        collector.advance(ms(500));
        assert_eq!(pitches(&collector), vec![1]);
        assert_eq!(collector.peek(), Some(&b));

        collector.advance(ms(1_500));
        assert_eq!(pitches(&collector), vec![1, 2]);
        assert!(collector.prev().is_none());

        collector.advance(ms(2_500));
        assert_eq!(pitches(&collector), vec![2]);
        assert_eq!(collector.prev(), Some(&a));
        assert!(collector.peek().is_none());

        collector.advance(ms(3_000));
        assert!(collector.is_idle());
        assert_eq!(collector.prev(), Some(&b));
    }

    #[test]
    fn arcs_sharing_a_start_activate_together() {
        let mut collector =
            TimedArcCollector::new(vec![arc(100, 200, 60), arc(100, 300, 64), arc(100, 250, 67)]);
        let started = collector.advance(ms(100));
        assert_eq!(started.len(), 3);
        assert_eq!(collector.active_len(), 3);
    }

    #[test]
    fn large_jump_activates_and_releases_in_one_call() {
        let arcs: Vec<TimedArc> = (0..10).map(|i| arc(i * 100, i * 100 + 50, i as u8)).collect();
        let mut collector = TimedArcCollector::new(arcs);

        let started = collector.advance(ms(930));
        assert_eq!(started.len(), 10);
        assert_eq!(pitches(&collector), vec![9]);
        assert_eq!(collector.prev().map(|a| a.pitch), Some(8));
    }

    #[test]
    fn arc_released_on_activation_still_passes_through() {
        let short = arc(0, 10, 60);
        let mut collector = TimedArcCollector::new(vec![short]);

        let started = collector.advance(ms(50));
        assert_eq!(started, &[short]);
        assert_eq!(collector.active_len(), 0);
        assert_eq!(collector.prev(), Some(&short));
    }

    #[test]
    fn custom_release_conditions() {
        let mut early = TimedArcCollector::with_release(vec![arc(0, 100, 60)], Early(ms(30)));
        early.advance(ms(69));
        assert_eq!(early.active_len(), 1);
        early.advance(ms(70));
        assert_eq!(early.active_len(), 0);

        let mut half = TimedArcCollector::with_release(vec![arc(0, 100, 60)], FractionElapsed(0.5));
        half.advance(ms(49));
        assert_eq!(half.active_len(), 1);
        half.advance(ms(50));
        assert_eq!(half.active_len(), 0);

        let never = |_: Duration, _: &TimedArc| false;
        let mut closure = TimedArcCollector::with_release(vec![arc(0, 100, 60)], never);
        closure.advance(ms(10_000));
        assert_eq!(closure.active_len(), 1);
    }

    #[test]
    fn unsorted_input_is_sorted_by_start() {
        let mut collector = TimedArcCollector::new(vec![arc(500, 600, 2), arc(0, 100, 1)]);
        assert_eq!(collector.peek().map(|a| a.pitch), Some(1));
        collector.advance(ms(50));
        assert_eq!(pitches(&collector), vec![1]);
    }

    #[test]
    fn seek_rebuilds_backwards_and_forwards() {
        let mut collector =
            TimedArcCollector::new(vec![arc(0, 200, 1), arc(100, 300, 2), arc(250, 400, 3)]);
        collector.advance(ms(350));
        assert_eq!(pitches(&collector), vec![3]);

        collector.seek(ms(150));
        assert_eq!(pitches(&collector), vec![1, 2]);
        assert_eq!(collector.peek().map(|a| a.pitch), Some(3));
        assert!(collector.prev().is_none());

        collector.seek(ms(260));
        assert_eq!(pitches(&collector), vec![2, 3]);
        assert_eq!(collector.prev().map(|a| a.pitch), Some(1));
    }

    #[test]
    fn seek_matches_incremental_advance() {
        let mut rng = SplitMix64::new(42);
        for round in 0..50 {
            let arcs: Vec<TimedArc> = (0..40)
                .map(|i| {
                    let start = rng.below(5_000);
                    let end = start + 1 + rng.below(800);
                    arc(start, end, i)
                })
                .collect();

            let target = ms(rng.below(6_000));
            let mut incremental = TimedArcCollector::new(arcs.clone());
            let mut t = Duration::ZERO;
            while t < target {
                incremental.advance(t);
                t += ms(1 + rng.below(250));
            }
            incremental.advance(target);

            let mut seeked = TimedArcCollector::new(arcs);
            seeked.advance(ms(5_999));
            seeked.seek(target);

            let mut a: Vec<TimedArc> = incremental.current_arcs().copied().collect();
            let mut b: Vec<TimedArc> = seeked.current_arcs().copied().collect();
            a.sort_by_key(|x| x.pitch);
            b.sort_by_key(|x| x.pitch);
            assert_eq!(a, b, "round {round} at {target:?}");
            assert_eq!(incremental.peek(), seeked.peek());
        }
    }
}
