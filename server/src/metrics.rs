// Copyright (C) 2026 Marcus L. Hanestad <marlhan@proton.me>
//
// This file is part of MacMirror.
//
// MacMirror is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// MacMirror is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with MacMirror.  If not, see <https://www.gnu.org/licenses/>.

use std::collections::VecDeque;
use std::time::Duration;

/// Rolling window of durations whose mean feeds the adaptive controller.
#[derive(Debug)]
pub struct DurationWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl DurationWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Duration) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Last 60 frame-processing durations.
pub fn perf_window() -> DurationWindow {
    DurationWindow::new(60)
}

/// Last 30 round-trip samples; the mean is `estimated_rtt`.
pub fn rtt_window() -> DurationWindow {
    DurationWindow::new(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_has_no_mean() {
        assert_eq!(DurationWindow::new(4).mean(), None);
    }

    #[test]
    fn test_mean_over_samples() {
        let mut w = DurationWindow::new(4);
        w.push(Duration::from_millis(10));
        w.push(Duration::from_millis(30));
        assert_eq!(w.mean(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut w = DurationWindow::new(2);
        w.push(Duration::from_millis(100));
        w.push(Duration::from_millis(10));
        w.push(Duration::from_millis(20));
        assert_eq!(w.len(), 2);
        assert_eq!(w.mean(), Some(Duration::from_millis(15)));
    }
}
