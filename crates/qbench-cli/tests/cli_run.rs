//! End-to-end CLI runs against a temporary SQLite database.

use std::path::{Path, PathBuf};

use qbench_cli::run_from;

const CATALOG: &str = "\
-- Query 1: All orders
SELECT * FROM orders;

-- Query 2: Revenue per customer
SELECT customer_id, SUM(total)
FROM orders
GROUP BY customer_id;
";

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = rusqlite::Connection::open(dir.path().join("bench.sqlite3")).expect("db");
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER, total REAL);
             INSERT INTO orders (customer_id, total) VALUES (1, 5.0), (2, 7.5), (2, 1.25);",
        )
        .expect("seed");
        std::fs::write(dir.path().join("queries.sql"), CATALOG).expect("catalog");
        std::fs::write(dir.path().join("empty.json5"), "{}").expect("config");
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn args(&self, command: &str, extra: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "qbench".into(),
            command.into(),
            "--config".into(),
            display(&self.path("empty.json5")),
            "--database".into(),
            display(&self.path("bench.sqlite3")),
            "--queries-file".into(),
            display(&self.path("queries.sql")),
            "--results-dir".into(),
            display(&self.path("results")),
        ];
        args.extend(extra.iter().map(|s| (*s).to_string()));
        args
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn latency_run_writes_report_files() {
    let fx = Fixture::new();
    let code = run_from(fx.args(
        "latency",
        &["--warmup-runs", "1", "--measurement-runs", "3", "--index-config", "with_index"],
    ));
    assert_eq!(code, 0);

    let json = fx.path("results").join("latency_with_index_small.json");
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).expect("json")).expect("parse");
    assert_eq!(report["metadata"]["total_queries"], 2);
    assert_eq!(report["queries"][0]["statistics"]["runs"], 3);
    assert!(fx.path("results").join("latency_with_index_small.csv").exists());
}

#[test]
fn query_selection_limits_the_pass() {
    let fx = Fixture::new();
    let code = run_from(fx.args("latency", &["--measurement-runs", "2", "--query", "2"]));
    assert_eq!(code, 0);
    let json = fx.path("results").join("latency_no_index_small.json");
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(json).expect("json")).expect("parse");
    assert_eq!(report["queries"].as_array().map(Vec::len), Some(1));
    assert_eq!(report["queries"][0]["query_number"], 2);
}

#[test]
fn out_of_range_concurrency_exits_with_usage_error() {
    let fx = Fixture::new();
    assert_eq!(run_from(fx.args("throughput", &["--concurrency", "17"])), 2);
    assert!(!fx.path("results").exists());
}

#[test]
fn latency_ignores_throughput_only_settings() {
    let fx = Fixture::new();
    let code = run_from(fx.args(
        "latency",
        &["--measurement-runs", "2", "--concurrency", "32", "--duration", "5"],
    ));
    assert_eq!(code, 0);
    assert!(fx.path("results").join("latency_no_index_small.json").exists());
}

#[test]
fn unknown_query_number_exits_with_usage_error() {
    let fx = Fixture::new();
    assert_eq!(run_from(fx.args("queries", &["--query", "42"])), 2);
}

#[test]
fn missing_catalog_exits_with_usage_error() {
    let fx = Fixture::new();
    let mut args = fx.args("latency", &[]);
    let pos = args
        .iter()
        .position(|a| a == "--queries-file")
        .expect("flag");
    args[pos + 1] = display(&fx.path("nope.sql"));
    assert_eq!(run_from(args), 2);
}

#[test]
fn missing_database_fails_every_query_and_exits_one() {
    let fx = Fixture::new();
    let mut args = fx.args("latency", &["--measurement-runs", "2"]);
    let pos = args.iter().position(|a| a == "--database").expect("flag");
    args[pos + 1] = display(&fx.path("absent.sqlite3"));

    assert_eq!(run_from(args), 1);
    // the report is still written, with connect errors per query
    let json = fx.path("results").join("latency_no_index_small.json");
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(json).expect("json")).expect("parse");
    assert_eq!(report["metadata"]["failed_queries"], 2);
    assert_eq!(report["queries"][0]["error"]["phase"], "connect");
}

#[test]
fn compare_reports_speedup() {
    let fx = Fixture::new();
    assert_eq!(
        run_from(fx.args("latency", &["--measurement-runs", "3", "--index-config", "no_index"])),
        0
    );
    assert_eq!(
        run_from(fx.args("latency", &["--measurement-runs", "3", "--index-config", "with_index"])),
        0
    );
    let results = fx.path("results");
    let code = run_from([
        "qbench".to_string(),
        "compare".to_string(),
        display(&results.join("latency_no_index_small.json")),
        display(&results.join("latency_with_index_small.json")),
    ]);
    assert_eq!(code, 0);
}

#[test]
fn config_and_queries_commands_succeed() {
    let fx = Fixture::new();
    assert_eq!(run_from(fx.args("config", &[])), 0);
    assert_eq!(run_from(fx.args("queries", &[])), 0);
}
