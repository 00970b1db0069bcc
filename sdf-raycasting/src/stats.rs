use std::{
    collections::BTreeMap,
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use lazy_static::lazy_static;

/// A shared node of the timing tree.
pub type StatsNode = Arc<Mutex<Stats>>;

lazy_static! {
    static ref ROOT_STATS: StatsNode = Arc::new(Mutex::new(Stats::new(1)));
}

/// The accumulated timings of one stage and its sub-stages.
#[derive(Debug)]
pub struct Stats {
    /// The hierarchical depth of the node, used for indenting.
    depth: usize,

    /// The accumulated time in nanoseconds.
    timings_ns: u128,

    /// The number of recorded timings.
    num_recordings: usize,

    children: BTreeMap<String, StatsNode>,
}

/// Adds the time between its creation and its drop to the node.
pub struct TimeRecording {
    dst_node: StatsNode,
    t0: Instant,
}

pub trait StatsNodeTrait {
    /// Starts a recording that ends when the returned guard is dropped.
    fn register_timing(&self) -> TimeRecording;

    /// Returns the child node with the given name, which is created if necessary.
    fn get_child(&self, name: &str) -> StatsNode;
}

impl TimeRecording {
    pub fn new(dst_node: StatsNode) -> Self {
        let t0 = Instant::now();

        Self { dst_node, t0 }
    }
}

impl Drop for TimeRecording {
    #[inline]
    fn drop(&mut self) {
        let ns = self.t0.elapsed().as_nanos();

        let mut node = lock(&self.dst_node);
        node.timings_ns += ns;
        node.num_recordings += 1;
    }
}

impl Stats {
    /// Returns the root stats node
    #[inline]
    pub fn root() -> StatsNode {
        ROOT_STATS.clone()
    }

    /// Creates a detached root node, e.g., for timing a single run.
    pub fn new_root() -> StatsNode {
        Arc::new(Mutex::new(Stats::new(1)))
    }

    /// Returns the child node for the given name.
    ///
    /// # Arguments
    /// * `name` - The name of the child.
    pub fn get_child(&mut self, name: String) -> StatsNode {
        let depth = self.depth + 1;
        self.children
            .entry(name)
            .or_insert_with(|| Arc::new(Mutex::new(Stats::new(depth))))
            .clone()
    }

    #[inline]
    pub fn as_nanos(&self) -> u128 {
        self.timings_ns
    }

    #[inline]
    pub fn as_millis(&self) -> u128 {
        self.timings_ns / 1_000_000u128
    }

    #[inline]
    pub fn num_recordings(&self) -> usize {
        self.num_recordings
    }

    fn new(depth: usize) -> Self {
        Self {
            depth,
            timings_ns: 0u128,
            num_recordings: 0,
            children: BTreeMap::new(),
        }
    }
}

/// Locks the node. A poisoned lock only means that a timed task panicked, the timings stay
/// usable.
fn lock(node: &StatsNode) -> MutexGuard<'_, Stats> {
    node.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let timing = if self.num_recordings > 1 {
            format!("{} ms ({}x)", self.as_millis(), self.num_recordings)
        } else {
            format!("{} ms", self.as_millis())
        };

        if self.children.is_empty() {
            return writeln!(f, "{},", timing);
        }

        if self.num_recordings == 0 {
            writeln!(f, "{{")?;
        } else {
            writeln!(f, "{} {{", timing)?;
        }

        for (name, child) in self.children.iter() {
            write!(f, "{:indent$}{}: ", "", name, indent = self.depth * 2)?;
            lock(child).fmt(f)?;
        }

        write!(f, "{:indent$}", "", indent = (self.depth - 1) * 2)?;
        writeln!(f, "}},")
    }
}

impl StatsNodeTrait for StatsNode {
    #[inline]
    fn register_timing(&self) -> TimeRecording {
        TimeRecording::new(self.clone())
    }

    #[inline]
    fn get_child(&self, name: &str) -> StatsNode {
        lock(self).get_child(name.to_owned())
    }
}
