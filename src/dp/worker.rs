//! One-thread-per-bag DP worker pool.
//!
//! Mirrors the reference `NodeWorker`: each bag gets a dedicated OS
//! thread that blocks on an `Event` per child until every child has
//! populated its table, then runs `INSERT INTO td_node_<id> SELECT *
//! FROM td_n_<id>_assignment` and signals its own event. Unlike the
//! reference implementation, the worker count is bounded by a semaphore
//! (`max_worker_threads`) rather than spawning the whole tree at once,
//! and failures are collected on a `crossbeam_channel` instead of being
//! silently swallowed by an unjoined thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::db::{Gateway, Pool};
use crate::dp::problem::{IterationOpts, ProblemVariant};
use crate::error::{Error, Result};
use crate::treedecomp::TreeDecomp;

/// A `threading.Event` equivalent: one-shot, broadcast to all waiters.
#[derive(Clone)]
struct Event {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl Event {
    fn new() -> Self {
        Event {
            state: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    fn set(&self) {
        let (lock, cv) = &*self.state;
        *lock.lock() = true;
        cv.notify_all();
    }

    fn wait(&self, cancel: &CancelToken) -> Result<()> {
        let (lock, cv) = &*self.state;
        let mut done = lock.lock();
        while !*done {
            cancel.check()?;
            cv.wait_for(&mut done, std::time::Duration::from_millis(200));
        }
        Ok(())
    }
}

/// A permit-counting gate bounding how many bag workers run concurrently.
struct Semaphore {
    state: Mutex<usize>,
    cv: Condvar,
}

impl Semaphore {
    fn new(permits: usize) -> Self {
        Semaphore {
            state: Mutex::new(permits),
            cv: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut n = self.state.lock();
        while *n == 0 {
            self.cv.wait(&mut n);
        }
        *n -= 1;
    }

    fn release(&self) {
        *self.state.lock() += 1;
        self.cv.notify_one();
    }
}

pub fn run_workers(
    pool: Arc<Pool>,
    problem_id: i32,
    td: &TreeDecomp,
    variant: Arc<dyn ProblemVariant>,
    cancel: &CancelToken,
    max_worker_threads: usize,
    iteration: IterationOpts,
) -> Result<()> {
    let events: HashMap<u32, Event> = td.nodes().map(|n| (n.id, Event::new())).collect();
    let semaphore = Arc::new(Semaphore::new(max_worker_threads.max(1)));
    let (failure_tx, failure_rx) = unbounded::<Error>();
    let aborted = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::new();
    for node in td.nodes() {
        let node_id = node.id;
        let children: Vec<u32> = node.children.clone();
        let vertices: Vec<u32> = node.vertices.clone();
        let all_vertices: Vec<u32> = td.all_vertices(node);
        let constraint_relevant: Vec<u32> = td.stored_vertices(node);
        let my_event = events[&node_id].clone();
        let waitfor: Vec<Event> = children.iter().map(|c| events[c].clone()).collect();
        let pool = Arc::clone(&pool);
        let cancel = cancel.clone();
        let semaphore = Arc::clone(&semaphore);
        let aborted = Arc::clone(&aborted);
        let failure_tx: Sender<Error> = failure_tx.clone();
        let variant = Arc::clone(&variant);
        let iteration = iteration.clone();

        let handle = std::thread::Builder::new()
            .name(format!("bag-{node_id}"))
            .spawn(move || {
                semaphore.acquire();
                let result = (|| -> Result<()> {
                    for e in &waitfor {
                        e.wait(&cancel)?;
                    }
                    if aborted.load(Ordering::SeqCst) {
                        return Err(Error::Interrupted);
                    }
                    run_one_node(
                        &pool,
                        problem_id,
                        node_id,
                        &vertices,
                        &all_vertices,
                        &constraint_relevant,
                        variant.as_ref(),
                        &cancel,
                        &iteration,
                    )
                })();
                semaphore.release();
                match result {
                    Ok(()) => my_event.set(),
                    Err(e) => {
                        aborted.store(true, Ordering::SeqCst);
                        my_event.set();
                        let _ = failure_tx.send(e);
                    }
                }
            })
            .expect("failed to spawn bag worker thread");
        handles.push(handle);
    }
    drop(failure_tx);

    for h in handles {
        let _ = h.join();
    }

    if let Ok(err) = failure_rx.try_recv() {
        return Err(Error::WorkerFailure(err.to_string()));
    }
    Ok(())
}

fn run_one_node(
    pool: &Arc<Pool>,
    problem_id: i32,
    node_id: u32,
    vertices: &[u32],
    all_vertices: &[u32],
    constraint_relevant: &[u32],
    variant: &dyn ProblemVariant,
    cancel: &CancelToken,
    iteration: &IterationOpts,
) -> Result<()> {
    cancel.check()?;
    let mut db = Gateway::new(Arc::clone(pool));
    db.set_praefix(format!("p{problem_id}_"));
    debug!(node_id, "creating records for node");

    db.execute(
        "UPDATE \"td_node_status\" SET \"start_time\" = statement_timestamp() WHERE \"node\" = $1",
        &[&(node_id as i32)],
    )?;

    let rows = if iteration.is_iterative() {
        run_iterative_rounds(&mut db, node_id, constraint_relevant, variant, iteration)?
    } else {
        let assignment_tab = crate::db::sql::td_node_assignment_view(node_id);
        let select = db.replace_dynamic_tabs(&format!("SELECT * FROM {assignment_tab}"), &[assignment_tab.clone()]);
        db.insert_select_counted(&crate::db::sql::td_node_table(node_id), &select)?
    };

    db.execute(
        "UPDATE \"td_node_status\" SET \"end_time\" = statement_timestamp(), \"rows\" = $2 WHERE \"node\" = $1",
        &[&(node_id as i32), &(rows as i32)],
    )?;

    variant.after_solve_node(&mut db, node_id, vertices, all_vertices)?;
    Ok(())
}

/// Run the iterative/approximate mode's rounds for one bag (spec §4.G):
/// each entry in `iteration.limit_result_rows` caps/samples a slice of
/// the bag's raw candidate rows and merges it into the bag table with
/// `GREATEST(existing, incoming)` on every extra column, keyed on
/// `constraint_relevant`, so repeated rounds converge monotonically
/// instead of double-counting a key seen in more than one round.
fn run_iterative_rounds(
    db: &mut Gateway,
    node_id: u32,
    constraint_relevant: &[u32],
    variant: &dyn ProblemVariant,
    iteration: &IterationOpts,
) -> Result<u64> {
    let table = crate::db::sql::td_node_table(node_id);
    let candidates_rel = crate::db::sql::td_node_candidates_view(node_id);
    let key_columns: Vec<String> = constraint_relevant.iter().map(|&v| format!("v{v}")).collect();
    let key_refs: Vec<&str> = key_columns.iter().map(String::as_str).collect();
    let extra_names: Vec<String> = variant.td_node_extra_columns().into_iter().map(|c| c.name).collect();

    let prefixed_table = db.prefixed_name(&table);
    let merges: Vec<(String, String)> = extra_names
        .iter()
        .map(|name| (name.clone(), format!("GREATEST({prefixed_table}.{name}, EXCLUDED.{name})")))
        .collect();
    let merge_refs: Vec<(&str, &str)> = merges.iter().map(|(c, e)| (c.as_str(), e.as_str())).collect();

    let mut total_rows = 0u64;
    for (round, &cap) in iteration.limit_result_rows.iter().enumerate() {
        let round_sql = crate::dp::transition::build_round_select(&candidates_rel, cap, iteration.randomize);
        let select = db.replace_dynamic_tabs(&round_sql, &[candidates_rel.clone()]);

        let rows = db.insert_select_upsert(&table, &select, &key_refs, &merge_refs)?;
        total_rows += rows;
        debug!(node_id, round, cap, rows, "iterative round merged into bag table");
    }
    Ok(total_rows)
}
