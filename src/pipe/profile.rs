use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use serde::Serialize;

/// A snapshot of traversal profiling metrics.
///
/// Profiling is enabled via the `PIPEWALK_PROFILE` environment variable and
/// accumulates across every pipeline in the process.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TraversalProfileSnapshot {
    /// Total nanoseconds spent in top-level pulls.
    pub pull_ns: u64,
    /// Number of top-level pulls.
    pub pull_count: u64,
    /// Total nanoseconds spent expanding adjacency.
    pub expand_ns: u64,
    /// Number of adjacency expansions.
    pub expand_count: u64,
    /// Total nanoseconds spent evaluating filter predicates.
    pub filter_ns: u64,
    /// Number of filter evaluations.
    pub filter_count: u64,
    /// Total nanoseconds spent driving loop bodies.
    pub loop_ns: u64,
    /// Number of loop body runs.
    pub loop_count: u64,
    /// Total nanoseconds spent materializing barrier steps (order, aggregate, shuffle).
    pub barrier_ns: u64,
    /// Number of barrier materializations.
    pub barrier_count: u64,
    /// Total nanoseconds spent in `cap()`.
    pub cap_ns: u64,
    /// Number of `cap()` calls.
    pub cap_count: u64,
}

#[derive(Default)]
struct TraversalProfileCounters {
    pull_ns: AtomicU64,
    pull_count: AtomicU64,
    expand_ns: AtomicU64,
    expand_count: AtomicU64,
    filter_ns: AtomicU64,
    filter_count: AtomicU64,
    loop_ns: AtomicU64,
    loop_count: AtomicU64,
    barrier_ns: AtomicU64,
    barrier_count: AtomicU64,
    cap_ns: AtomicU64,
    cap_count: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<TraversalProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("PIPEWALK_PROFILE").is_some())
}

fn counters() -> Option<&'static TraversalProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(TraversalProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum ProfileKind {
    Pull,
    Expand,
    Filter,
    Loop,
    Barrier,
    Cap,
}

pub(crate) fn record_profile_timer(kind: ProfileKind, start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    let (ns, count) = match kind {
        ProfileKind::Pull => (&counters.pull_ns, &counters.pull_count),
        ProfileKind::Expand => (&counters.expand_ns, &counters.expand_count),
        ProfileKind::Filter => (&counters.filter_ns, &counters.filter_count),
        ProfileKind::Loop => (&counters.loop_ns, &counters.loop_count),
        ProfileKind::Barrier => (&counters.barrier_ns, &counters.barrier_count),
        ProfileKind::Cap => (&counters.cap_ns, &counters.cap_count),
    };
    ns.fetch_add(nanos, Ordering::Relaxed);
    count.fetch_add(1, Ordering::Relaxed);
}

/// Retrieves a snapshot of the traversal profiling counters.
///
/// Returns `None` unless `PIPEWALK_PROFILE` is set. With `reset` the
/// counters are swapped back to zero as they are read.
///
/// ```no_run
/// use pipewalk::pipe::profile::profile_snapshot;
///
/// if let Some(snapshot) = profile_snapshot(false) {
///     println!("expand: {} calls, {}ns", snapshot.expand_count, snapshot.expand_ns);
/// }
/// ```
pub fn profile_snapshot(reset: bool) -> Option<TraversalProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(TraversalProfileSnapshot {
        pull_ns: load(&counters.pull_ns),
        pull_count: load(&counters.pull_count),
        expand_ns: load(&counters.expand_ns),
        expand_count: load(&counters.expand_count),
        filter_ns: load(&counters.filter_ns),
        filter_count: load(&counters.filter_count),
        loop_ns: load(&counters.loop_ns),
        loop_count: load(&counters.loop_count),
        barrier_ns: load(&counters.barrier_ns),
        barrier_count: load(&counters.barrier_count),
        cap_ns: load(&counters.cap_ns),
        cap_count: load(&counters.cap_count),
    })
}
