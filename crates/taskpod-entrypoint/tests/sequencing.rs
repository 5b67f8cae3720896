//! Protocol-level tests: several runners share a directory the way step
//! containers share the run-state volumes, and ordering emerges purely from
//! the out-file chain.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use taskpod_entrypoint::{StepRunConfig, StepRunner, StepState};
use taskpod_model::{Flag, OnError};

fn step_config(dir: &Path, index: usize, name: &str, script: &str) -> StepRunConfig {
    StepRunConfig {
        step_name: name.to_string(),
        step_index: index,
        wait_file: (index > 0).then(|| dir.join(format!("{}/out", index - 1))),
        post_file: dir.join(format!("{index}/out")),
        on_error: OnError::default(),
        timeout_ms: None,
        hermetic: Flag::disabled(),
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        task_results: Vec::new(),
        results_dir: dir.join("results"),
        step_results: Vec::new(),
        step_results_dir: dir.join(format!("steps/{name}/results")),
    }
}

async fn run_all(configs: Vec<StepRunConfig>, cancel: &CancellationToken) -> Vec<StepState> {
    // spawn in reverse so ordering cannot come from spawn order
    let mut handles = Vec::new();
    for config in configs.into_iter().rev() {
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let index = config.step_index;
            let record = StepRunner::new(config).unwrap().run(&cancel).await.unwrap();
            (index, record)
        }));
    }
    let mut records: Vec<_> = Vec::new();
    for handle in handles {
        records.push(handle.await.unwrap());
    }
    records.sort_by_key(|(index, _)| *index);
    records.into_iter().map(|(_, r)| r.state).collect()
}

#[tokio::test]
async fn steps_execute_in_declaration_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let configs = (0..3)
        .map(|i| {
            step_config(
                dir.path(),
                i,
                &format!("s{i}"),
                &format!("echo {i} >> {}", log.display()),
            )
        })
        .collect();

    let states = run_all(configs, &CancellationToken::new()).await;
    assert_eq!(states, vec![StepState::Succeeded; 3]);
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "0\n1\n2\n");
}

#[tokio::test]
async fn failure_under_stop_and_fail_skips_downstream() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let configs = vec![
        step_config(dir.path(), 0, "boom", "exit 1"),
        step_config(dir.path(), 1, "after", &format!("touch {}", marker.display())),
    ];

    let states = run_all(configs, &CancellationToken::new()).await;
    assert_eq!(states, vec![StepState::Failed, StepState::Skipped]);
    // the skipped step's command never executed
    assert!(!marker.exists());
}

#[tokio::test]
async fn skip_propagates_down_the_whole_line() {
    let dir = tempfile::tempdir().unwrap();
    let configs = vec![
        step_config(dir.path(), 0, "boom", "exit 1"),
        step_config(dir.path(), 1, "a", "true"),
        step_config(dir.path(), 2, "b", "true"),
    ];

    let states = run_all(configs, &CancellationToken::new()).await;
    assert_eq!(
        states,
        vec![StepState::Failed, StepState::Skipped, StepState::Skipped]
    );
}

#[tokio::test]
async fn tolerated_failure_lets_the_line_proceed() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = step_config(dir.path(), 0, "flaky", "exit 1");
    first.on_error = OnError::Continue;
    let configs = vec![first, step_config(dir.path(), 1, "after", "true")];

    let states = run_all(configs, &CancellationToken::new()).await;
    assert_eq!(states, vec![StepState::Failed, StepState::Succeeded]);
}

#[tokio::test]
async fn timeout_kills_the_command_and_skips_downstream() {
    let dir = tempfile::tempdir().unwrap();
    let mut slow = step_config(dir.path(), 0, "slow", "sleep 30");
    slow.timeout_ms = Some(200);
    let configs = vec![slow, step_config(dir.path(), 1, "after", "true")];

    let states = run_all(configs, &CancellationToken::new()).await;
    assert_eq!(states, vec![StepState::TimedOut, StepState::Skipped]);
}

#[tokio::test]
async fn cancellation_reaches_waiting_and_running_steps() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    // step 1 waits on step 0, which sleeps until cancelled
    let running = StepRunner::new(step_config(dir.path(), 0, "slow", "sleep 30")).unwrap();
    let waiting = StepRunner::new(step_config(dir.path(), 1, "after", "true")).unwrap();

    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let r = running.run(&cancel).await.unwrap();
            let w = waiting.run(&cancel).await.unwrap();
            (r.state, w.state)
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    cancel.cancel();

    let (running_state, waiting_state) = handle.await.unwrap();
    assert_eq!(running_state, StepState::Cancelled);
    assert_eq!(waiting_state, StepState::Skipped);
}

#[tokio::test]
async fn cancelled_wait_writes_a_cancelled_record() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let record = StepRunner::new(step_config(dir.path(), 1, "after", "true"))
        .unwrap()
        .run(&cancel)
        .await
        .unwrap();
    assert_eq!(record.state, StepState::Cancelled);
    assert!(dir.path().join("1/out").exists());
}

/// Remap the absolute run-state paths the assembler emits onto a temp dir.
fn remap(path: &Path, root: &Path) -> PathBuf {
    match path.strip_prefix("/taskpod/run") {
        Ok(rest) => root.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[tokio::test]
async fn greeting_task_runs_end_to_end() {
    use taskpod_build::{BuildSettings, PodBuilder};
    use taskpod_model::{Param, ParamSpec, RunContext, Step, TaskSpec};
    use taskpod_resolve::resolve;

    let spec = TaskSpec {
        steps: vec![
            Step::new("greet", "busybox")
                .with_command(["/bin/sh", "-c"])
                .with_args(["echo $(params.greeting)"]),
        ],
        params: vec![ParamSpec::new("greeting")],
        ..Default::default()
    };
    let context = RunContext::new("greeting-run", "default");

    let resolved = resolve(&spec, &[Param::new("greeting", "hello")], &[], &context).unwrap();
    let pod = PodBuilder::new()
        .build(&resolved, &[], &context, &BuildSettings::default())
        .unwrap();

    let step = pod.container("step-greet").unwrap();
    assert_eq!(step.args.last().map(String::as_str), Some("echo hello"));

    // simulate the wrapper on a temp dir instead of the pod volumes
    let dir = tempfile::tempdir().unwrap();
    let mut config = StepRunConfig::from_wrapper_args(&step.args).unwrap();
    config.post_file = remap(&config.post_file, dir.path());
    config.wait_file = config.wait_file.as_deref().map(|p| remap(p, dir.path()));

    let record = StepRunner::new(config)
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(record.state, StepState::Succeeded);
    assert_eq!(record.exit_code, Some(0));
}
