// Cooperative Task Scheduler
// Non-preemptive periodic tasks advanced by the control loop.
//
// Tasks are identified by a caller-chosen kind `K`; the scheduler never owns
// callbacks. Work and activation/deactivation hooks are routed through the
// `TaskRunner` / `TaskHooks` traits so a task body can reschedule tasks
// (including itself) while it runs.

use log::{debug, trace};

/// Handle returned by `Scheduler::add`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(usize);

/// How many runs a task performs once enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iterations {
    Forever,
    Times(u32),
}

/// Activation and deactivation hooks, called synchronously exactly once per
/// enabled/disabled transition
pub trait TaskHooks<K> {
    /// Returning `false` vetoes the enable
    fn on_enable(&mut self, _kind: K) -> bool {
        true
    }

    fn on_disable(&mut self, _kind: K) {}
}

/// Executes task bodies on behalf of the scheduler
pub trait TaskRunner<K>: TaskHooks<K> {
    fn run_task(&mut self, scheduler: &mut Scheduler<K>, id: TaskId, kind: K, run_counter: u32);
}

#[derive(Debug)]
struct Task<K> {
    kind: K,
    interval_ms: u64,
    iterations: Iterations,
    remaining: Option<u32>,
    enabled: bool,
    next_run_ms: u64,
    run_counter: u32,
    // Bumped on every (re)activation so a run can tell it was restarted
    generation: u32,
}

#[derive(Debug)]
pub struct Scheduler<K> {
    tasks: Vec<Task<K>>,
    now_ms: u64,
}

impl<K: Copy + core::fmt::Debug> Scheduler<K> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            now_ms: 0,
        }
    }

    /// Register a task in the disabled state
    pub fn add(&mut self, kind: K, interval_ms: u64, iterations: Iterations) -> TaskId {
        self.tasks.push(Task {
            kind,
            interval_ms,
            iterations,
            remaining: None,
            enabled: false,
            next_run_ms: 0,
            run_counter: 0,
            generation: 0,
        });
        TaskId(self.tasks.len() - 1)
    }

    /// Current scheduler time, as last seen by `execute` or `sync_clock`
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn sync_clock(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    pub fn is_enabled(&self, id: TaskId) -> bool {
        self.tasks[id.0].enabled
    }

    pub fn run_counter(&self, id: TaskId) -> u32 {
        self.tasks[id.0].run_counter
    }

    pub fn interval(&self, id: TaskId) -> u64 {
        self.tasks[id.0].interval_ms
    }

    /// Kinds of all currently enabled tasks
    pub fn enabled_kinds(&self) -> impl Iterator<Item = K> + '_ {
        self.tasks.iter().filter(|t| t.enabled).map(|t| t.kind)
    }

    /// Enable a task, first run due immediately. Enabling an already enabled
    /// task restarts its run count and schedule without calling a hook.
    pub fn enable(&mut self, id: TaskId, hooks: &mut impl TaskHooks<K>) -> bool {
        self.enable_delayed(id, 0, hooks)
    }

    /// Enable a task with its first run `delay_ms` from now
    pub fn enable_delayed(
        &mut self,
        id: TaskId,
        delay_ms: u64,
        hooks: &mut impl TaskHooks<K>,
    ) -> bool {
        let kind = self.tasks[id.0].kind;
        if !self.tasks[id.0].enabled {
            if !hooks.on_enable(kind) {
                debug!("⏸️ Enable of task {:?} vetoed by its activation hook", kind);
                return false;
            }
            trace!("▶️ Task {:?} enabled", kind);
        }

        let now = self.now_ms;
        let task = &mut self.tasks[id.0];
        task.enabled = true;
        task.run_counter = 0;
        task.remaining = match task.iterations {
            Iterations::Forever => None,
            Iterations::Times(n) => Some(n),
        };
        task.next_run_ms = now.saturating_add(delay_ms);
        task.generation = task.generation.wrapping_add(1);
        true
    }

    /// Enable only if currently disabled; an enabled task keeps its schedule
    pub fn enable_if_not(&mut self, id: TaskId, hooks: &mut impl TaskHooks<K>) -> bool {
        if self.tasks[id.0].enabled {
            return false;
        }
        self.enable(id, hooks)
    }

    /// Restart the task's run count and push its next run `delay_ms` out
    pub fn restart_delayed(
        &mut self,
        id: TaskId,
        delay_ms: u64,
        hooks: &mut impl TaskHooks<K>,
    ) -> bool {
        self.enable_delayed(id, delay_ms, hooks)
    }

    /// Disable a task; the deactivation hook runs only on an actual transition
    pub fn disable(&mut self, id: TaskId, hooks: &mut impl TaskHooks<K>) -> bool {
        let task = &mut self.tasks[id.0];
        if !task.enabled {
            return false;
        }
        task.enabled = false;
        task.generation = task.generation.wrapping_add(1);
        let kind = task.kind;
        trace!("⏹️ Task {:?} disabled", kind);
        hooks.on_disable(kind);
        true
    }

    /// Change the period; the next run is one new interval from now
    pub fn set_interval(&mut self, id: TaskId, interval_ms: u64) {
        let now = self.now_ms;
        let task = &mut self.tasks[id.0];
        task.interval_ms = interval_ms;
        task.next_run_ms = now.saturating_add(interval_ms);
    }

    /// Run every enabled task that is due at `now_ms`. Returns the number of
    /// task bodies executed.
    pub fn execute(&mut self, now_ms: u64, runner: &mut impl TaskRunner<K>) -> usize {
        self.now_ms = now_ms;
        let mut executed = 0;

        // Tasks added by a body during this pass are appended and picked up next time
        let count = self.tasks.len();
        for index in 0..count {
            let task = &mut self.tasks[index];
            if !task.enabled || now_ms < task.next_run_ms {
                continue;
            }

            task.run_counter += 1;
            task.next_run_ms = now_ms.saturating_add(task.interval_ms);
            if let Some(remaining) = task.remaining.as_mut() {
                *remaining = remaining.saturating_sub(1);
            }
            let kind = task.kind;
            let counter = task.run_counter;
            let generation = task.generation;

            runner.run_task(self, TaskId(index), kind, counter);
            executed += 1;

            // A body that restarted or disabled its own task bumped the generation
            let task = &mut self.tasks[index];
            if task.enabled && task.generation == generation && task.remaining == Some(0) {
                task.enabled = false;
                task.generation = task.generation.wrapping_add(1);
                trace!("⏹️ Task {:?} finished its iterations", kind);
                runner.on_disable(kind);
            }
        }

        executed
    }
}

impl<K: Copy + core::fmt::Debug> Default for Scheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}
