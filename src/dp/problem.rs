//! DP core: the problem-variant trait and the generic setup/solve driver
//! every concrete problem (`problems::sat`, `problems::pmc`, …) plugs
//! into (spec §4.G, grounded on `Problem`/`NodeWorker` in the reference
//! implementation).

use std::sync::Arc;
use std::time::SystemTime;

use tracing::info;

use crate::cancel::CancelToken;
use crate::db::sql::ColumnDef;
use crate::db::{Gateway, Pool};
use crate::dp::worker::run_workers;
use crate::error::Result;
use crate::treedecomp::TreeDecomp;

/// What a concrete problem (SAT, #SAT, PMC, nested PMC, VertexCover)
/// contributes to the generic per-bag DP transition and to the
/// once-per-problem setup/finalize steps.
pub trait ProblemVariant: Send + Sync {
    fn type_name(&self) -> &'static str;

    /// SQL column for a bag vertex, e.g. `("v3", "BOOLEAN")`.
    fn td_node_column_def(&self, var: u32) -> ColumnDef {
        ColumnDef::new(format!("v{var}"), "BOOLEAN")
    }

    /// Extra columns every bag table carries beyond one per vertex (e.g.
    /// `model_count NUMERIC`).
    fn td_node_extra_columns(&self) -> Vec<ColumnDef> {
        Vec::new()
    }

    /// Extra `SELECT` expressions for a bag's candidate rows (e.g. the
    /// running model-count product across children).
    fn candidate_extra_cols(&self, node: &crate::treedecomp::Node, td: &TreeDecomp) -> Vec<String> {
        let _ = (node, td);
        Vec::new()
    }

    /// `WHERE` clause filtering candidate rows against the clauses whose
    /// variables are fully contained in this bag.
    fn filter_where(&self, node: &crate::treedecomp::Node) -> Option<String> {
        let _ = node;
        None
    }

    /// Aggregate expression folding a named extra column across candidate
    /// rows that collapse onto the same `GROUP BY stored_vertices` key
    /// once a bag forgets a vertex. `SUM` marginalizes a running
    /// count/product correctly for every counting variant; VertexCover
    /// overrides this to `MIN` for its minimum-size accumulator.
    fn aggregate_extra_col(&self, column_name: &str) -> String {
        format!("SUM({column_name})")
    }

    /// Create the variant's own summary table (`problem_sat`, …) and
    /// insert its row; called once, after the generic `problem` /
    /// `td_node_status` tables exist.
    fn setup_extra(&self, db: &mut Gateway, problem_id: i32) -> Result<()>;

    /// Final aggregation at the root bag once every worker has finished.
    fn after_solve(&self, db: &mut Gateway, problem_id: i32, td: &TreeDecomp) -> Result<()>;

    /// Per-bag post-processing once a bag's own rows are populated, before
    /// its `Event` fires (nested PMC's per-row recursive solve hooks in
    /// here; most variants leave this a no-op).
    fn after_solve_node(&self, db: &mut Gateway, node_id: u32, vertices: &[u32], all_vertices: &[u32]) -> Result<()> {
        let _ = (db, node_id, vertices, all_vertices);
        Ok(())
    }
}

/// Per-problem knobs for the iterative/approximate solving mode (spec
/// §4.F "Upsert semantics" / §4.G "Iterative / approximate mode" / §8
/// "Merge monotonicity"). When `limit_result_rows` is non-empty,
/// `dp::worker` runs one round per entry: each round inserts a
/// capped/sampled slice of a bag's raw candidate rows and merges it into
/// the bag table with `GREATEST(existing, incoming)` rather than the
/// exact `GROUP BY` fold `dp::transition::build_assignment_view` applies
/// by default, so repeated rounds converge monotonically on a lower-bound
/// `model_count` instead of ever double-counting or regressing.
#[derive(Clone, Default)]
pub struct IterationOpts {
    pub limit_result_rows: Vec<u32>,
    pub randomize: Option<crate::cli::Randomize>,
    pub candidate_store: Option<crate::cli::CandidateStore>,
}

impl IterationOpts {
    pub fn from_type_opts(opts: &crate::cli::TypeOpts) -> Self {
        IterationOpts {
            limit_result_rows: opts.limit_result_rows.clone(),
            randomize: opts.randomize,
            candidate_store: opts.candidate_store,
        }
    }

    pub fn is_iterative(&self) -> bool {
        !self.limit_result_rows.is_empty()
    }
}

/// Generic driver: owns the tree decomposition and a connection pool,
/// and runs setup/solve for any `ProblemVariant`.
pub struct Problem {
    pub id: i32,
    pub name: String,
    pub td: TreeDecomp,
    pool: Arc<Pool>,
    iteration: IterationOpts,
}

impl Problem {
    pub fn create(
        name: &str,
        type_name: &str,
        pool: Arc<Pool>,
        td: TreeDecomp,
        variant: &dyn ProblemVariant,
        iteration: IterationOpts,
    ) -> Result<Self> {
        let mut db = Gateway::new(Arc::clone(&pool));
        db.ignore_next_praefix(1);
        db.create_table(
            "problem",
            &[
                ColumnDef::new("id", "SERIAL NOT NULL PRIMARY KEY"),
                ColumnDef::new("name", "VARCHAR(255) NOT NULL"),
                ColumnDef::new("type", "VARCHAR(32) NOT NULL"),
                ColumnDef::new("num_bags", "INTEGER"),
                ColumnDef::new("tree_width", "INTEGER"),
                ColumnDef::new("num_vertices", "INTEGER"),
                ColumnDef::new("start_time", "TIMESTAMP"),
                ColumnDef::new("end_time", "TIMESTAMP"),
            ],
        )?;
        db.ignore_next_praefix(1);
        let row = db.query_one(
            "INSERT INTO \"problem\" (\"name\",\"type\",\"num_bags\",\"tree_width\",\"num_vertices\") VALUES ($1,$2,$3,$4,$5) RETURNING id",
            &[&name, &type_name, &(td.num_bags as i32), &(td.tree_width as i32), &(td.num_orig_vertices as i32)],
        )?;
        let id: i32 = row.get(0);

        let mut problem = Problem {
            id,
            name: name.to_string(),
            td,
            pool,
            iteration,
        };
        problem.setup(variant)?;
        Ok(problem)
    }

    fn gateway(&self) -> Gateway {
        let mut db = Gateway::new(Arc::clone(&self.pool));
        db.set_praefix(format!("p{}_", self.id));
        db
    }

    fn setup(&mut self, variant: &dyn ProblemVariant) -> Result<()> {
        let mut db = self.gateway();

        db.ignore_next_praefix(1);
        db.create_table(
            "td_node_status",
            &[
                ColumnDef::new("node", "INTEGER NOT NULL PRIMARY KEY"),
                ColumnDef::new("start_time", "TIMESTAMP"),
                ColumnDef::new("end_time", "TIMESTAMP"),
                ColumnDef::new("rows", "INTEGER"),
            ],
        )?;
        for n in self.td.nodes() {
            db.ignore_next_praefix(1);
            db.execute("INSERT INTO \"td_node_status\" (\"node\") VALUES ($1)", &[&(n.id as i32)])?;
        }

        for n in self.td.nodes() {
            db.drop_table(&crate::db::sql::td_node_table(n.id))?;
        }
        db.drop_table("td_edge")?;
        db.drop_table("td_bag")?;

        for n in self.td.nodes() {
            let mut cols: Vec<ColumnDef> = n.vertices.iter().map(|&v| variant.td_node_column_def(v)).collect();
            cols.extend(variant.td_node_extra_columns());
            let table = crate::db::sql::td_node_table(n.id);
            db.create_table(&table, &cols)?;

            let constraint_relevant: Vec<String> = if n.is_root() {
                n.vertices.iter().map(|v| format!("v{v}")).collect()
            } else {
                self.td.stored_vertices(n).iter().map(|v| format!("v{v}")).collect()
            };
            let prefixed_table = db.prefixed_name(&table);
            let index_name = db.prefixed_name(&format!("{table}_constraint_relevant"));
            let index_sql = crate::db::sql::create_unique_index(&index_name, &prefixed_table, &constraint_relevant);
            db.execute_ddl(&index_sql)?;
        }
        db.create_table(
            "td_edge",
            &[ColumnDef::new("node", "INTEGER NOT NULL"), ColumnDef::new("parent", "INTEGER NOT NULL")],
        )?;
        db.create_table(
            "td_bag",
            &[ColumnDef::new("bag", "INTEGER NOT NULL"), ColumnDef::new("node", "INTEGER")],
        )?;

        for n in self.td.nodes() {
            for &v in &n.vertices {
                db.execute("INSERT INTO \"td_bag\" (\"bag\",\"node\") VALUES ($1,$2)", &[&(n.id as i32), &(v as i32)])?;
            }
        }
        for &(node, parent) in &self.td.edges {
            db.execute(
                "INSERT INTO \"td_edge\" (\"node\",\"parent\") VALUES ($1,$2)",
                &[&(parent as i32), &(node as i32)],
            )?;
        }

        for n in self.td.postorder() {
            let select = crate::dp::transition::build_assignment_view(&self.td, n, variant, &db);
            db.create_view(&crate::db::sql::td_node_assignment_view(n.id), &select)?;

            if self.iteration.is_iterative() {
                let candidates = crate::dp::transition::build_candidates_relation(&self.td, n, variant, &db);
                let relation = crate::db::sql::td_node_candidates_view(n.id);
                // `candidate_store=table` materializes the join once per
                // bag instead of recomputing it on every round.
                match self.iteration.candidate_store {
                    Some(crate::cli::CandidateStore::Table) => db.create_table_as(&relation, &candidates)?,
                    _ => db.create_view(&relation, &candidates)?,
                }
            }
        }

        variant.setup_extra(&mut db, self.id)?;
        Ok(())
    }

    pub fn solve(&mut self, variant: Arc<dyn ProblemVariant>, cancel: &CancelToken, max_worker_threads: usize) -> Result<()> {
        let mut db = self.gateway();
        db.ignore_next_praefix(1);
        db.execute(
            "UPDATE \"problem\" SET \"start_time\" = statement_timestamp() WHERE \"id\" = $1",
            &[&self.id],
        )?;

        run_workers(
            Arc::clone(&self.pool),
            self.id,
            &self.td,
            Arc::clone(&variant),
            cancel,
            max_worker_threads,
            self.iteration.clone(),
        )?;

        let mut db = self.gateway();
        db.ignore_next_praefix(1);
        db.execute(
            "UPDATE \"problem\" SET \"end_time\" = statement_timestamp() WHERE \"id\" = $1",
            &[&self.id],
        )?;

        variant.after_solve(&mut db, self.id, &self.td)?;
        info!(problem_id = self.id, started_at = ?SystemTime::now(), "problem solved");
        Ok(())
    }
}
