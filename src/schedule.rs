//! A worker pool that maps over clusters in dependency order.
//!
//! Each job has three phases: `prepare` and `commit` run under the state lock,
//! `work` runs without it. A job is admitted only once every dependency has
//! been committed (or has failed), so the state `prepare` observes already
//! contains everything the job depends on.

use crate::types::*;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Condvar, Mutex};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Flow {
  Continue,
  /// Admit no further jobs; jobs already running still commit
  Stop,
}

struct Queue {
  ready: VecDeque<ClusterId>,
  /// Number of uncommitted dependencies
  waiting: IdxVec<ClusterId, usize>,
  dependents: IdxVec<ClusterId, Vec<ClusterId>>,
  done: usize,
  stop: bool,
}

impl Queue {
  fn new(deps: &IdxVec<ClusterId, Vec<ClusterId>>) -> Self {
    let mut dependents: IdxVec<ClusterId, Vec<ClusterId>> = IdxVec::from_default(deps.len());
    for (id, ds) in deps.enum_iter() {
      ds.iter().for_each(|&d| dependents[d].push(id))
    }
    let waiting: IdxVec<ClusterId, usize> = deps.0.iter().map(|ds| ds.len()).collect();
    let ready = waiting.enum_iter().filter(|(_, &n)| n == 0).map(|(id, _)| id).collect();
    Queue { ready, waiting, dependents, done: 0, stop: false }
  }

  fn finish(&mut self, id: ClusterId) {
    self.done += 1;
    for i in 0..self.dependents[id].len() {
      let d = self.dependents[id][i];
      self.waiting[d] -= 1;
      if self.waiting[d] == 0 {
        self.ready.push_back(d)
      }
    }
  }
}

/// Run every job on `parallelism` threads and return the final state.
pub fn run_ordered<S: Send, P, T>(
  deps: &IdxVec<ClusterId, Vec<ClusterId>>, parallelism: usize, state: S,
  prepare: impl Fn(&S, ClusterId) -> P + Sync, work: impl Fn(ClusterId, P) -> T + Sync,
  commit: impl Fn(&mut S, ClusterId, T) -> Flow + Sync,
) -> S {
  let total = deps.len();
  let shared = Mutex::new((state, Queue::new(deps)));
  let wakeup = Condvar::new();
  {
    let (shared, wakeup, prepare, work, commit) = (&shared, &wakeup, &prepare, &work, &commit);
    std::thread::scope(|s| {
      for _ in 0..parallelism.max(1) {
        s.spawn(move || loop {
          let (id, input) = {
            let mut lock = shared.lock().unwrap();
            loop {
              let (state, queue) = &mut *lock;
              if queue.stop || queue.done == total {
                wakeup.notify_all();
                return
              }
              if let Some(id) = queue.ready.pop_front() {
                break (id, prepare(state, id))
              }
              lock = wakeup.wait(lock).unwrap();
            }
          };
          let out = std::panic::catch_unwind(AssertUnwindSafe(|| work(id, input)));
          let mut lock = shared.lock().unwrap();
          let (state, queue) = &mut *lock;
          let out = match out {
            Ok(out) => out,
            Err(payload) => {
              // release the other workers before unwinding
              queue.stop = true;
              wakeup.notify_all();
              drop(lock);
              std::panic::resume_unwind(payload)
            }
          };
          if commit(state, id, out) == Flow::Stop {
            queue.stop = true
          }
          queue.finish(id);
          wakeup.notify_all();
        });
      }
    });
  }
  shared.into_inner().unwrap().0
}
