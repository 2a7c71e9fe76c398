//! # Background Loops
//!
//! The three long-running tasks of a running board:
//!
//! | task       | wakes on              | touches                         |
//! |------------|-----------------------|---------------------------------|
//! | `fetch`    | fetch interval        | source, state (publish), health |
//! | `render`   | render interval       | state (read), display           |
//! | `dispatch` | button event          | state, display, announcer       |
//!
//! They share nothing except [`SharedState`](crate::state::SharedState), the
//! [`DisplayHandle`](crate::display::DisplayHandle), the cancellation token and the
//! button channel. Each `run` returns its task name when it stops; any error from
//! an adapter is logged inside the tick and never ends the loop.

pub mod dispatch;
pub mod fetch;
pub mod render;

pub use dispatch::Dispatcher;
pub use fetch::FetchLoop;
pub use render::RenderLoop;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

/// What a background task resolves to: its own name.
pub type TaskName = &'static str;

/// Names of tasks that have been spawned and not yet finished.
///
/// Each task holds an [`AliveGuard`]; dropping it (normal exit, abort or panic)
/// removes the name. The controller reads the set when the shutdown grace
/// period runs out to report which tasks were stuck.
#[derive(Debug, Clone, Default)]
pub struct AliveTasks {
    inner: Arc<Mutex<BTreeSet<TaskName>>>,
}

impl AliveTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `name` alive until the returned guard is dropped.
    pub fn enter(&self, name: TaskName) -> AliveGuard {
        self.lock().insert(name);
        AliveGuard {
            name,
            tasks: self.clone(),
        }
    }

    /// Sorted names of the tasks still alive.
    pub fn snapshot(&self) -> Vec<TaskName> {
        self.lock().iter().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<TaskName>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct AliveGuard {
    name: TaskName,
    tasks: AliveTasks,
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.tasks.lock().remove(self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_drop_removes_name() {
        let alive = AliveTasks::new();
        let fetch = alive.enter("fetch");
        let render = alive.enter("render");
        assert_eq!(alive.snapshot(), vec!["fetch", "render"]);

        drop(fetch);
        assert_eq!(alive.snapshot(), vec!["render"]);
        drop(render);
        assert!(alive.snapshot().is_empty());
    }

    #[tokio::test]
    async fn guard_released_when_task_panics() {
        let alive = AliveTasks::new();
        let guard = alive.enter("doomed");
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("boom");
        });
        assert!(handle.await.unwrap_err().is_panic());
        assert!(alive.snapshot().is_empty());
    }
}
