// Copyright 2025 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.
//
// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

use tracing::info;

/// Injected progress sink, so the core never touches a terminal.
///
/// `start` is called once with the number of entities, `advance` once
/// per committed batch, `finish` once per entity.
pub trait ProgressReporter: Send + Sync {
    fn start(&self, total: usize);
    fn advance(&self, table: &str, n: usize);
    fn finish(&self, table: &str, ok: bool);
}

/// Swallows all progress events.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn start(&self, _total: usize) {}
    fn advance(&self, _table: &str, _n: usize) {}
    fn finish(&self, _table: &str, _ok: bool) {}
}

/// Reports progress through the tracing subscriber.
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn start(&self, total: usize) {
        info!("Processing tables count={}", total);
    }

    fn advance(&self, table: &str, n: usize) {
        info!("Committed batches count={} for table={}", n, table);
    }

    fn finish(&self, table: &str, ok: bool) {
        info!("Finished table={} ok={}", table, ok);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingProgress {
        started: AtomicUsize,
        advanced: AtomicUsize,
        finished: AtomicUsize,
    }

    impl ProgressReporter for CountingProgress {
        fn start(&self, total: usize) {
            self.started.store(total, Ordering::SeqCst);
        }
        fn advance(&self, _table: &str, n: usize) {
            self.advanced.fetch_add(n, Ordering::SeqCst);
        }
        fn finish(&self, _table: &str, _ok: bool) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_events_reach_the_reporter_through_the_trait() {
        let counting = Arc::new(CountingProgress::default());
        let reporter: Arc<dyn ProgressReporter> = Arc::clone(&counting) as Arc<dyn ProgressReporter>;
        reporter.start(3);
        reporter.advance("t1", 2);
        reporter.advance("t1", 1);
        reporter.finish("t1", true);

        assert_eq!(counting.started.load(Ordering::SeqCst), 3);
        assert_eq!(counting.advanced.load(Ordering::SeqCst), 3);
        assert_eq!(counting.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop_and_tracing_do_not_panic() {
        NoopProgress.start(1);
        NoopProgress.advance("t", 1);
        NoopProgress.finish("t", false);
        TracingProgress.start(1);
        TracingProgress.advance("t", 1);
        TracingProgress.finish("t", true);
    }
}
