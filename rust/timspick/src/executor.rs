use std::sync::atomic::{
    AtomicU64,
    Ordering,
};
use std::time::Duration;

use indicatif::{
    ProgressBar,
    ProgressStyle,
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Fixed-size thread pool driving bulk per-item functions over a statically
/// partitioned index range.
///
/// Worker `w` of `t` owns items `w, w + t, w + 2t, ...` and only ever
/// writes the output cells those items own, so the parallel bodies run
/// without locks or atomics. The only shared state is one progress counter
/// per worker, polled from the coordinating thread for display.
///
/// Workers are joined unconditionally; if one panics, the panic resumes on
/// the caller once every thread has been joined and the stage's output must
/// be treated as undefined.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    num_threads: usize,
}

struct SendPtr<T>(*mut T);

impl<T> Copy for SendPtr<T> {}
impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

unsafe impl<T: Send> Send for SendPtr<T> {}
unsafe impl<T: Send> Sync for SendPtr<T> {}

impl ParallelExecutor {
    /// `num_threads` is clamped to at least one.
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: num_threads.max(1),
        }
    }

    pub fn with_available_parallelism() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(n)
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Fills `out[i] = f(i)` for every `i` in `0..out.len()`.
    pub fn map_fill<T, F>(&self, out: &mut [T], label: &str, f: F)
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        let num_items = out.len();
        let ptr = SendPtr(out.as_mut_ptr());
        self.drive(num_items, label, move |item| {
            // Rebind so the closure captures the Sync wrapper, not the raw field.
            let ptr = ptr;
            let cell = unsafe { &mut *ptr.0.add(item) };
            *cell = f(item);
        });
    }

    /// Hands item `i` exclusive access to `out[offsets[i]..offsets[i + 1]]`.
    ///
    /// `offsets` must be non-decreasing with `offsets[last] <= out.len()`;
    /// monotone offsets make the segments disjoint, so workers never alias.
    pub fn run_segments<T, F>(&self, offsets: &[usize], out: &mut [T], label: &str, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync,
    {
        assert!(!offsets.is_empty(), "offsets must hold at least one bound");
        assert!(
            offsets.windows(2).all(|w| w[0] <= w[1]),
            "segment offsets must be non-decreasing"
        );
        assert!(
            *offsets.last().unwrap() <= out.len(),
            "segment offsets exceed the output array"
        );
        let num_items = offsets.len() - 1;
        let ptr = SendPtr(out.as_mut_ptr());
        self.drive(num_items, label, move |item| {
            // Rebind so the closure captures the Sync wrapper, not the raw field.
            let ptr = ptr;
            let start = offsets[item];
            let end = offsets[item + 1];
            let seg = unsafe { std::slice::from_raw_parts_mut(ptr.0.add(start), end - start) };
            f(item, seg);
        });
    }

    /// Spawns the workers, runs the coordinator poll loop and joins.
    fn drive<G>(&self, num_items: usize, label: &str, body: G)
    where
        G: Fn(usize) + Sync,
    {
        if num_items == 0 {
            return;
        }
        let threads = self.num_threads.min(num_items);
        let counters: Vec<AtomicU64> = (0..threads).map(|_| AtomicU64::new(0)).collect();
        let bar = progress_bar(num_items as u64, label);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|worker| {
                    let counter = &counters[worker];
                    let body = &body;
                    scope.spawn(move || {
                        let mut item = worker;
                        while item < num_items {
                            body(item);
                            counter.fetch_add(1, Ordering::Relaxed);
                            item += threads;
                        }
                    })
                })
                .collect();

            while !handles.iter().all(|h| h.is_finished()) {
                bar.set_position(total_done(&counters));
                std::thread::sleep(POLL_INTERVAL);
            }
            bar.set_position(total_done(&counters));

            let mut panicked = None;
            for handle in handles {
                if let Err(payload) = handle.join() {
                    panicked.get_or_insert(payload);
                }
            }
            bar.finish_and_clear();
            if let Some(payload) = panicked {
                std::panic::resume_unwind(payload);
            }
        });
    }
}

fn total_done(counters: &[AtomicU64]) -> u64 {
    counters.iter().map(|c| c.load(Ordering::Relaxed)).sum()
}

fn progress_bar(len: u64, label: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(
        "{msg} {spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(len)
        .with_style(style)
        .with_message(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_fill_covers_every_item() {
        let exec = ParallelExecutor::new(4);
        let mut out = vec![0usize; 1001];
        exec.map_fill(&mut out, "squares", |i| i * i);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, i * i);
        }
    }

    #[test]
    fn map_fill_single_thread_matches() {
        let exec = ParallelExecutor::new(1);
        let mut out = vec![0u64; 17];
        exec.map_fill(&mut out, "", |i| i as u64 + 1);
        assert_eq!(out[16], 17);
    }

    #[test]
    fn run_segments_fills_disjoint_ranges() {
        let exec = ParallelExecutor::new(3);
        let offsets = vec![0usize, 2, 2, 5, 9];
        let mut out = vec![0usize; 9];
        exec.run_segments(&offsets, &mut out, "", |item, seg| {
            for cell in seg.iter_mut() {
                *cell = item + 1;
            }
        });
        assert_eq!(out, vec![1, 1, 3, 3, 3, 4, 4, 4, 4]);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let exec = ParallelExecutor::new(2);
        let mut out: Vec<u32> = vec![];
        exec.map_fill(&mut out, "", |_| 1);
        exec.run_segments(&[0], &mut out, "", |_, _| {});
    }

    #[test]
    fn worker_panic_propagates_after_join() {
        let exec = ParallelExecutor::new(2);
        let result = std::panic::catch_unwind(|| {
            let mut out = vec![0usize; 8];
            exec.map_fill(&mut out, "", |i| {
                if i == 5 {
                    panic!("boom");
                }
                i
            });
        });
        assert!(result.is_err());
    }

    #[test]
    #[should_panic(expected = "non-decreasing")]
    fn run_segments_rejects_unsorted_offsets() {
        let exec = ParallelExecutor::new(2);
        let mut out = vec![0u8; 4];
        exec.run_segments(&[0, 3, 1], &mut out, "", |_, _| {});
    }
}
