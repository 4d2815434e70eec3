use serde_json::Value;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "interlace-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("hello_world")
        .join(name)
        .display()
        .to_string()
}

fn run_interlace<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_interlace");
    Command::new(bin)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("interlace command should execute")
}

fn assert_exit(output: &Output, code: i32) {
    if output.status.code() != Some(code) {
        panic!(
            "expected exit {code}, got {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "expected valid JSON stdout, got error: {e}\nstdout:\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

const TNS: &str = "tns=http://example.com/dfdl/helloworld/";

#[test]
fn run_hello_world_from_flags_json() {
    let output = run_interlace([
        "run",
        "--schema",
        &fixture("hello_world.toml"),
        "--data",
        &fixture("hello.dat"),
        "--rules",
        &fixture("no_third_word.rules.toml"),
        "--query",
        "/tns:helloWorld/word[2]",
        "--ns",
        TNS,
        "--json",
    ]);
    assert_exit(&output, 0);

    let payload = parse_json_stdout(&output);
    assert_eq!(payload["status"]["kind"], "completed");
    assert_eq!(payload["queryValue"]["type"], "text");
    assert_eq!(payload["queryValue"]["value"], "World");
    assert_eq!(payload["roundTrip"]["verdict"], "identical");
    assert!(
        payload["schemaDigest"]
            .as_str()
            .expect("schemaDigest should be a string")
            .starts_with("sha256:")
    );
    let stages = payload["stages"].as_array().expect("stages should be an array");
    assert_eq!(stages.len(), 7);
    assert_eq!(stages[0]["stage"], "compile");
    assert_eq!(stages[5]["outcome"], "skipped");
}

#[test]
fn run_from_config_writes_output_bytes() {
    let tmp = TempDirGuard::new("config");
    let out = tmp.path().join("out.dat");
    let output = run_interlace([
        "run",
        "--config",
        &fixture("interlace.toml"),
        "--out",
        &out.display().to_string(),
    ]);
    assert_exit(&output, 0);

    let text = stdout_text(&output);
    assert!(text.contains("interlace run"), "{text}");
    assert!(text.contains("Status: completed"), "{text}");
    assert!(text.contains("Query: World"), "{text}");
    assert!(text.contains("Round Trip: identical"), "{text}");
    assert_eq!(fs::read(&out).expect("output should be written"), b"Hello\nWorld\n");
}

#[test]
fn third_word_fails_rules_but_exits_zero_unless_strict() {
    let args = |strict: bool| {
        let mut args = vec![
            "run".to_string(),
            "--config".to_string(),
            fixture("interlace.toml"),
            "--data".to_string(),
            fixture("three_words.dat"),
        ];
        if strict {
            args.push("--strict".to_string());
        }
        args
    };

    let relaxed = run_interlace(args(false));
    assert_exit(&relaxed, 0);
    assert!(stdout_text(&relaxed).contains("Status: completed with failures"));
    let stderr = stderr_text(&relaxed);
    assert_eq!(
        stderr
            .lines()
            .filter(|line| line.starts_with("error[rule_validation/rule_violation]"))
            .count(),
        1,
        "{stderr}"
    );
    assert!(stderr.contains("(no-third-word)"), "{stderr}");

    let strict = run_interlace(args(true));
    assert_exit(&strict, 5);
}

#[test]
fn truncated_data_exits_with_decode_code() {
    let output = run_interlace([
        "run",
        "--schema",
        &fixture("hello_world.toml"),
        "--data",
        &fixture("truncated.dat"),
        "--json",
    ]);
    assert_exit(&output, 2);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["status"]["kind"], "aborted");
    assert_eq!(payload["status"]["class"], "decode");
}

#[test]
fn missing_data_file_is_a_usage_error() {
    let output = run_interlace([
        "run",
        "--schema",
        &fixture("hello_world.toml"),
        "--data",
        &fixture("absent.dat"),
    ]);
    assert_exit(&output, 64);
    assert!(stderr_text(&output).contains("failed to open"));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let output = run_interlace(["run", "--no-such-flag"]);
    assert_exit(&output, 64);
}

#[test]
fn decode_query_encode_round_trip_through_files() {
    let tmp = TempDirGuard::new("roundtrip");
    let doc = tmp.path().join("doc.json");
    let doc_arg = doc.display().to_string();
    let bytes = tmp.path().join("bytes.dat");

    let decoded = run_interlace([
        "decode",
        "--schema",
        &fixture("hello_world.toml"),
        "--data",
        &fixture("hello.dat"),
        "--out",
        &doc_arg,
    ]);
    assert_exit(&decoded, 0);
    assert!(doc.exists());

    let query = run_interlace(["query", "--document", &doc_arg, "--expr", "word[2]"]);
    assert_exit(&query, 0);
    assert_eq!(stdout_text(&query).trim_end(), "World");

    let query_json = run_interlace([
        "query",
        "--document",
        &doc_arg,
        "--expr",
        "count(/tns:helloWorld/word)",
        "--ns",
        TNS,
        "--json",
    ]);
    assert_exit(&query_json, 0);
    let payload = parse_json_stdout(&query_json);
    assert_eq!(payload["type"], "number");
    assert_eq!(payload["value"], 2.0);

    let encoded = run_interlace([
        "encode",
        "--schema",
        &fixture("hello_world.toml"),
        "--document",
        &doc_arg,
        "--out",
        &bytes.display().to_string(),
    ]);
    assert_exit(&encoded, 0);
    assert_eq!(fs::read(&bytes).expect("bytes should be written"), b"Hello\nWorld\n");
}

#[test]
fn unbound_query_prefix_fails_the_query_command() {
    let tmp = TempDirGuard::new("unbound");
    let doc = tmp.path().join("doc.json").display().to_string();
    assert_exit(
        &run_interlace([
            "decode",
            "--schema",
            &fixture("hello_world.toml"),
            "--data",
            &fixture("hello.dat"),
            "--out",
            &doc,
        ]),
        0,
    );

    let output = run_interlace(["query", "--document", &doc, "--expr", "/tns:helloWorld/word[2]"]);
    assert_exit(&output, 1);
    assert!(stderr_text(&output).contains("`tns`"));
}

#[test]
fn validate_exits_one_when_capped_schema_rejects_third_word() {
    let valid = run_interlace([
        "validate",
        "--schema",
        &fixture("hello_world.toml"),
        "--data",
        &fixture("three_words.dat"),
        "--json",
    ]);
    assert_exit(&valid, 0);
    assert_eq!(parse_json_stdout(&valid)["valid"], true);

    let capped = run_interlace([
        "validate",
        "--schema",
        &fixture("hello_world.toml"),
        "--schema-def",
        &fixture("hello_world_capped.toml"),
        "--rules",
        &fixture("no_third_word.rules.toml"),
        "--data",
        &fixture("three_words.dat"),
        "--json",
    ]);
    assert_exit(&capped, 1);
    let payload = parse_json_stdout(&capped);
    assert_eq!(payload["valid"], false);
    assert_eq!(
        payload["structural"]["diagnostics"]
            .as_array()
            .expect("structural diagnostics")
            .len(),
        1
    );
    assert_eq!(
        payload["rules"]["diagnostics"][0]["ruleId"],
        "no-third-word"
    );
}

#[test]
fn validate_reports_rules_when_the_schema_definition_is_broken() {
    let tmp = TempDirGuard::new("broken-schema-def");
    let broken = tmp.path().join("broken.toml");
    fs::write(&broken, "[root]\nname = [\n").expect("broken schema should be written");
    let broken = broken.display().to_string();
    let args = |json: bool| {
        let mut args = vec![
            "validate".to_string(),
            "--schema".to_string(),
            fixture("hello_world.toml"),
            "--data".to_string(),
            fixture("three_words.dat"),
            "--schema-def".to_string(),
            broken.clone(),
            "--rules".to_string(),
            fixture("no_third_word.rules.toml"),
        ];
        if json {
            args.push("--json".to_string());
        }
        args
    };

    let output = run_interlace(args(true));
    assert_exit(&output, 1);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["valid"], false);
    assert_eq!(payload["structural"]["valid"], false);
    assert_eq!(payload["structural"]["diagnostics"][0]["class"], "configuration");
    assert_eq!(payload["rules"]["diagnostics"][0]["ruleId"], "no-third-word");

    let human = run_interlace(args(false));
    assert_exit(&human, 1);
    let stderr = stderr_text(&human);
    assert!(
        stderr.contains("error[structural_validation/configuration]"),
        "{stderr}"
    );
    assert!(stderr.contains("(no-third-word)"), "{stderr}");
}

#[test]
fn transform_changes_output_bytes() {
    let tmp = TempDirGuard::new("transform");
    let out = tmp.path().join("shout.dat");
    let output = run_interlace([
        "run",
        "--schema",
        &fixture("hello_world.toml"),
        "--data",
        &fixture("hello.dat"),
        "--transform",
        &fixture("shout.transform.toml"),
        "--out",
        &out.display().to_string(),
        "--json",
    ]);
    assert_exit(&output, 0);
    assert_eq!(parse_json_stdout(&output)["roundTrip"]["verdict"], "not_applicable");
    assert_eq!(fs::read(&out).expect("output should be written"), b"HELLO\nWORLD\n");
}
