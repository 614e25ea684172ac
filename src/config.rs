//! Configuration system.
//!
//! Hierarchical configuration loading, mirroring the spec's JSON shape
//! (`db`, `db_admin`, `htd`, `nesthdb`, `dpdb`) but loaded through `figment`
//! layering:
//! - `config.toml` (defaults)
//! - `config.local.toml` (git-ignored local overrides)
//! - `DPSOLVE_*` environment variables (double-underscore nested keys)
//!
//! ```bash
//! DPSOLVE_NESTHDB__THRESHOLD_HYBRID=24
//! ```

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::extsolve::OutputParserSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub db: DbConfig,
    pub db_admin: DbConfig,
    pub htd: ExternalToolConfig,
    pub nesthdb: NestHdbConfig,
    #[serde(default)]
    pub dpdb: DpdbConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub dsn: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalToolConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub parameters: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub seed_arg: Option<String>,
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub output_parser: Option<OutputParserSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspEncoding {
    pub file: PathBuf,
    pub size: usize,
    #[serde(default = "default_asp_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspConfig {
    #[serde(default = "default_asp_path")]
    pub path: PathBuf,
    pub encodings: Vec<AspEncoding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestHdbConfig {
    #[serde(default)]
    pub preprocessor: Option<SolverConfig>,
    pub sat_solver: SolverConfig,
    pub sharpsat_solver: SolverConfig,
    pub pmc_solver: SolverConfig,
    pub asp: AspConfig,
    #[serde(default = "default_threshold_abstract")]
    pub threshold_abstract: u32,
    #[serde(default = "default_threshold_hybrid")]
    pub threshold_hybrid: u32,
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: u32,
    #[serde(default = "default_retry_codes")]
    pub retry_codes: Vec<i32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_solver_threads")]
    pub max_solver_threads: usize,
    #[serde(default)]
    pub disable_cache: bool,
    /// Bags whose inner (non-bag) vertex count stays at or below this are
    /// counted inline rather than dispatched to a recursive subsolve.
    #[serde(default)]
    pub inner_vars_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DpdbConfig {
    #[serde(default = "default_max_worker_threads")]
    pub max_worker_threads: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            dsn: "host=localhost dbname=dpsolve".to_string(),
            max_connections: default_max_connections(),
        }
    }
}

impl DpdbConfig {
    fn with_default_workers() -> usize {
        default_max_worker_threads()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// When set, logs roll daily into this directory instead of going to
    /// stderr; the `--log-level` CLI flag still picks the filter.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_max_connections() -> usize {
    12
}
fn default_asp_timeout() -> u64 {
    30
}
fn default_asp_path() -> PathBuf {
    PathBuf::from("clingo")
}
fn default_threshold_abstract() -> u32 {
    20
}
fn default_threshold_hybrid() -> u32 {
    30
}
fn default_max_recursion_depth() -> u32 {
    1
}
fn default_retry_codes() -> Vec<i32> {
    vec![245, 250]
}
fn default_max_retries() -> u32 {
    128
}
fn default_max_solver_threads() -> usize {
    12
}
fn default_max_worker_threads() -> usize {
    num_cpus::get()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from default locations:
    /// `config.toml` -> `config.local.toml` -> `DPSOLVE_*` env vars.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("DPSOLVE_").split("__"))
            .extract()
    }

    /// Load configuration from an explicit file path, then absolutize any
    /// relative tool paths against the file's parent directory (the "repo
    /// root" for that config).
    pub fn from_file(path: &Path) -> Result<Self, figment::Error> {
        let mut cfg: Config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("DPSOLVE_").split("__"))
            .extract()?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        cfg.absolutize(root);
        Ok(cfg)
    }

    fn absolutize(&mut self, root: &Path) {
        absolutize_path(&mut self.htd.path, root);
        if let Some(pp) = &mut self.nesthdb.preprocessor {
            absolutize_path(&mut pp.path, root);
        }
        absolutize_path(&mut self.nesthdb.sat_solver.path, root);
        absolutize_path(&mut self.nesthdb.sharpsat_solver.path, root);
        absolutize_path(&mut self.nesthdb.pmc_solver.path, root);
        absolutize_path(&mut self.nesthdb.asp.path, root);
        for enc in &mut self.nesthdb.asp.encodings {
            absolutize_path(&mut enc.file, root);
        }
    }
}

fn absolutize_path(p: &mut PathBuf, root: &Path) {
    if p.is_relative() {
        *p = root.join(&p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            db: DbConfig::default(),
            db_admin: DbConfig::default(),
            htd: ExternalToolConfig {
                path: PathBuf::from("htd_main"),
                parameters: "--opt width".to_string(),
            },
            nesthdb: NestHdbConfig {
                preprocessor: None,
                sat_solver: SolverConfig {
                    path: PathBuf::from("cadical"),
                    seed_arg: None,
                    args: String::new(),
                    output_parser: None,
                },
                sharpsat_solver: SolverConfig {
                    path: PathBuf::from("sharpsat"),
                    seed_arg: None,
                    args: String::new(),
                    output_parser: None,
                },
                pmc_solver: SolverConfig {
                    path: PathBuf::from("pmc"),
                    seed_arg: None,
                    args: String::new(),
                    output_parser: None,
                },
                asp: AspConfig {
                    path: default_asp_path(),
                    encodings: vec![],
                },
                threshold_abstract: default_threshold_abstract(),
                threshold_hybrid: default_threshold_hybrid(),
                max_recursion_depth: default_max_recursion_depth(),
                retry_codes: default_retry_codes(),
                max_retries: default_max_retries(),
                max_solver_threads: default_max_solver_threads(),
                disable_cache: false,
                inner_vars_threshold: 0,
            },
            dpdb: DpdbConfig {
                max_worker_threads: DpdbConfig::with_default_workers(),
            },
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = sample();
        let s = toml::to_string(&cfg).unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(back.nesthdb.threshold_hybrid, cfg.nesthdb.threshold_hybrid);
        assert_eq!(back.nesthdb.retry_codes, vec![245, 250]);
    }

    #[test]
    fn absolutizes_relative_tool_paths() {
        let mut cfg = sample();
        cfg.absolutize(Path::new("/opt/dpsolve"));
        assert_eq!(cfg.htd.path, PathBuf::from("/opt/dpsolve/htd_main"));
    }
}
