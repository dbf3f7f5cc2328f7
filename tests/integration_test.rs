// Integration tests for the sigscictl command surface

use assert_cmd::Command;

fn sigscictl() -> Command {
    let mut cmd = Command::cargo_bin("sigscictl").unwrap();
    // Keep the test hermetic: config comes from env, not the runner's files.
    cmd.env("SIGSCICTL_CONFIG_DIR", env!("CARGO_TARGET_TMPDIR"))
        .env("SIGSCI_EMAIL", "test@example.test")
        .env("SIGSCI_PASSWORD", "secret")
        .env("SIGSCI_CORP", "testcorp")
        .env("SIGSCI_SITE", "testsite");
    cmd
}

#[test]
fn requests_help_documents_the_search_flags() {
    sigscictl()
        .args(["requests", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--from"))
        .stdout(predicates::str::contains("--until"))
        .stdout(predicates::str::contains("--tags"))
        .stdout(predicates::str::contains("--ctags"))
        .stdout(predicates::str::contains("--field"));
}

#[test]
fn sort_help_states_that_pagination_always_runs_ascending() {
    sigscictl()
        .args(["requests", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("ascending"));
}

#[test]
fn feed_and_timeseries_subcommands_exist() {
    for sub in ["feed", "timeseries"] {
        sigscictl()
            .args([sub, "--help"])
            .assert()
            .success()
            .stdout(predicates::str::contains("--tags"));
    }
}

#[test]
fn invalid_time_expressions_fail_before_any_network_traffic() {
    // No mock server is running; a network attempt would surface as a
    // different error than the expression diagnostic.
    sigscictl()
        .env("SIGSCI_BASE_URL", "http://127.0.0.1:9")
        .args(["requests", "--from", "-6x"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid time expression"));
}

#[test]
fn unsupported_tags_are_rejected_with_a_pointer_to_list_tags() {
    sigscictl()
        .env("SIGSCI_BASE_URL", "http://127.0.0.1:9")
        .args(["requests", "--tags", "NOTATAG"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("unsupported tag"))
        .stderr(predicates::str::contains("list-tags"));
}

#[test]
fn list_tags_prints_the_builtin_set_without_credentials() {
    let mut cmd = Command::cargo_bin("sigscictl").unwrap();
    cmd.arg("list-tags")
        .assert()
        .success()
        .stdout(predicates::str::contains("Supported tags:"))
        .stdout(predicates::str::contains("SQLI"))
        .stdout(predicates::str::contains("TRAVERSAL"));
}

#[test]
fn readonly_config_resources_reject_add() {
    sigscictl()
        .args(["config", "add", "integrations", "--file", "whatever.json"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("read-only"));
}
