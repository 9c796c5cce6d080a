use std::fs;

use pretty_assertions::assert_eq;
use rstest::rstest;
use satstac::env::FauxEnv;
use satstac::pipeline::{CacheKeyContext, Pipeline, Step, render_cache_key};

const CIRCLECI: &str = "tests/fixtures/circleci.yml";

fn pipeline() -> Pipeline {
    let pipeline = Pipeline::from_file(CIRCLECI).unwrap();
    pipeline.check().unwrap();
    pipeline
}

#[rstest]
#[case("master", &["build_and_test_37", "deploy"])]
#[case("develop", &["build_and_test_37"])]
#[trace]
fn plan_per_branch(#[case] branch: &str, #[case] expected: &[&str]) {
    let pipeline = pipeline();
    let wf = pipeline.workflow("build_test_deploy").unwrap();
    let planned: Vec<&str> = wf.plan(branch).unwrap().iter().map(|j| j.job.as_str()).collect();
    assert_eq!(planned, expected);
}

#[test]
fn deploy_runs_after_tests_on_master() {
    let pipeline = pipeline();
    let wf = pipeline.workflow("build_test_deploy").unwrap();
    assert!(!wf.can_start("deploy", "master", &[]));
    assert!(wf.can_start("deploy", "master", &["build_and_test_37"]));
    assert!(!wf.can_start("deploy", "feature/bands", &["build_and_test_37"]));
}

#[test]
fn cache_keys_are_shared() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("requirements.txt"), "").unwrap();
    let ctx = CacheKeyContext {
        base_dir: dir.path().to_path_buf(),
        ..CacheKeyContext::new("master", "4f1c2a9")
    };
    let env = FauxEnv::default();

    let steps = &pipeline().jobs["build_and_test_37"].steps;
    let restore: Vec<String> = steps[1]
        .cache_keys()
        .iter()
        .map(|k| render_cache_key(k, &ctx, &env).unwrap())
        .collect();
    assert_eq!(
        restore,
        [
            "v1-dependencies-master-47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=",
            "v1-dependencies-",
        ]
    );

    let Some(Step::SaveCache { key, paths }) = steps.last() else {
        panic!("last step should save the cache");
    };
    assert_eq!(paths, &["./venv"]);
    assert_eq!(render_cache_key(key, &ctx, &env).unwrap(), restore[0]);
}

#[test]
fn deploy_needs_pypi_credentials() {
    assert_eq!(pipeline().required_env_vars(), ["PYPI_PASS", "PYPI_USER"]);
}
