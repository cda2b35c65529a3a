// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ssh::fake::FakeLauncher;
use ev_core::DeploymentConfig;
use std::path::Path;
use tempfile::TempDir;

struct EchoRenderer;

impl CommandRenderer for EchoRenderer {
    fn render(&self, task: &TaskSpec, _config: &RunConfig) -> String {
        format!("run-eval {}.{}", task.harness, task.name)
    }
}

fn test_config(output_dir: &Path) -> RunConfig {
    RunConfig {
        executor: "slurm".to_string(),
        deployment: DeploymentConfig {
            image: "registry.example.com/harness:1.0".to_string(),
            env: Default::default(),
        },
        tasks: vec![TaskSpec::new("lmeval", "gsm8k")],
        local: None,
        slurm: Some(SlurmConfig {
            hostname: "cluster.example.com".to_string(),
            username: "eval".to_string(),
            account: "research".to_string(),
            partition: "gpu".to_string(),
            walltime: "04:00:00".to_string(),
            remote_base_dir: PathBuf::from("/scratch/eval"),
            output_dir: output_dir.to_path_buf(),
        }),
        cloud: None,
    }
}

fn harness(tmp: &TempDir) -> (Arc<FakeLauncher>, SlurmExecutor) {
    let launcher = Arc::new(FakeLauncher::new());
    launcher.respond("-O check", "Master running");
    let pool = Arc::new(
        SshConnectionPool::new(Arc::clone(&launcher) as Arc<dyn crate::ssh::SshLauncher>)
            .with_control_dir(tmp.path().join("ssh")),
    );
    let db = ExecutionDb::open(tmp.path().join("db")).unwrap();
    (launcher, SlurmExecutor::new(db, pool))
}

#[test]
fn sbatch_output_parses_the_job_id() {
    let id = SlurmExecutor::parse_sbatch_output("Submitted batch job 4242\n").unwrap();
    assert_eq!(id, "4242");

    // Cluster MOTD noise before the real line.
    let id =
        SlurmExecutor::parse_sbatch_output("Welcome to cluster\nSubmitted batch job 7\n").unwrap();
    assert_eq!(id, "7");

    assert!(SlurmExecutor::parse_sbatch_output("sbatch: error: invalid partition").is_err());
}

#[test]
fn slurm_states_map_onto_execution_states() {
    assert_eq!(SlurmExecutor::map_state("PENDING"), ExecutionState::Pending);
    assert_eq!(SlurmExecutor::map_state("RUNNING"), ExecutionState::Running);
    assert_eq!(SlurmExecutor::map_state("COMPLETED"), ExecutionState::Success);
    assert_eq!(SlurmExecutor::map_state("FAILED"), ExecutionState::Failed);
    assert_eq!(SlurmExecutor::map_state("TIMEOUT"), ExecutionState::Failed);
    assert_eq!(
        SlurmExecutor::map_state("CANCELLED by 1234"),
        ExecutionState::Killed
    );
}

#[tokio::test]
async fn dry_run_renders_the_script_but_touches_nothing_remote() {
    let tmp = TempDir::new().unwrap();
    let (launcher, exec) = harness(&tmp);
    let config = test_config(&tmp.path().join("out"));

    let invocation = exec
        .execute_eval(&config, &EchoRenderer, true)
        .await
        .unwrap();

    assert!(launcher.commands().is_empty());

    let script_path = tmp
        .path()
        .join("out")
        .join(invocation.as_str())
        .join("0")
        .join("job.sbatch");
    let script = std::fs::read_to_string(script_path).unwrap();
    assert!(script.contains("#SBATCH --account=research"));
    assert!(script.contains("#SBATCH --partition=gpu"));
    assert!(script.contains("#SBATCH --time=04:00:00"));
    assert!(script.contains("run-eval lmeval.gsm8k"));

    let job = exec.db.get_job(&invocation.job(0)).unwrap().unwrap();
    assert_eq!(job.field(SLURM_JOB_ID_FIELD), None);
}

#[tokio::test]
async fn submission_stages_the_script_and_records_the_scheduler_id() {
    let tmp = TempDir::new().unwrap();
    let (launcher, exec) = harness(&tmp);
    launcher.respond("sbatch", "Submitted batch job 4242");
    let config = test_config(&tmp.path().join("out"));

    let invocation = exec
        .execute_eval(&config, &EchoRenderer, false)
        .await
        .unwrap();

    let job = exec.db.get_job(&invocation.job(0)).unwrap().unwrap();
    assert_eq!(job.field(SLURM_JOB_ID_FIELD), Some("4242"));

    let commands = launcher.commands();
    let remote_dir = format!("/scratch/eval/{}/0", invocation);
    assert!(commands
        .iter()
        .any(|c| c.contains(&format!("mkdir -p {}", remote_dir))));
    assert!(commands
        .iter()
        .any(|c| c.starts_with("scp") && c.contains("job.sbatch")));
    assert!(commands
        .iter()
        .any(|c| c.contains(&format!("sbatch {}/job.sbatch", remote_dir))));
}

#[tokio::test]
async fn status_prefers_the_queue_and_falls_back_to_accounting() {
    let tmp = TempDir::new().unwrap();
    let (launcher, exec) = harness(&tmp);
    launcher.respond("sbatch", "Submitted batch job 100");
    let config = test_config(&tmp.path().join("out"));
    let invocation = exec
        .execute_eval(&config, &EchoRenderer, false)
        .await
        .unwrap();
    let jobs: Vec<_> = exec.db.get_jobs(&invocation).unwrap().into_values().collect();

    launcher.respond("squeue", "100 RUNNING");
    let statuses = exec.get_status(&jobs).await.unwrap();
    assert_eq!(statuses[0].state, ExecutionState::Running);
}

#[tokio::test]
async fn status_of_a_finished_job_comes_from_sacct() {
    let tmp = TempDir::new().unwrap();
    let (launcher, exec) = harness(&tmp);
    launcher.respond("sbatch", "Submitted batch job 100");
    let config = test_config(&tmp.path().join("out"));
    let invocation = exec
        .execute_eval(&config, &EchoRenderer, false)
        .await
        .unwrap();
    let jobs: Vec<_> = exec.db.get_jobs(&invocation).unwrap().into_values().collect();

    // Job aged out of squeue; only accounting remembers it.
    launcher.respond("squeue", "");
    launcher.respond("sacct", "COMPLETED");
    let statuses = exec.get_status(&jobs).await.unwrap();
    assert_eq!(statuses[0].state, ExecutionState::Success);
}

#[tokio::test]
async fn unsubmitted_job_is_pending_and_cannot_be_killed() {
    let tmp = TempDir::new().unwrap();
    let (launcher, exec) = harness(&tmp);
    let config = test_config(&tmp.path().join("out"));
    let invocation = exec
        .execute_eval(&config, &EchoRenderer, true)
        .await
        .unwrap();
    let jobs: Vec<_> = exec.db.get_jobs(&invocation).unwrap().into_values().collect();

    launcher.respond("squeue", "");
    launcher.respond("sacct", "");
    let statuses = exec.get_status(&jobs).await.unwrap();
    assert_eq!(statuses[0].state, ExecutionState::Pending);

    let err = exec.kill_job(&jobs[0]).await.unwrap_err();
    assert!(matches!(err, ExecutorError::NotSubmitted { .. }));
}

#[tokio::test]
async fn kill_cancels_a_running_job() {
    let tmp = TempDir::new().unwrap();
    let (launcher, exec) = harness(&tmp);
    launcher.respond("sbatch", "Submitted batch job 100");
    launcher.respond("squeue", "100 RUNNING");
    let config = test_config(&tmp.path().join("out"));
    let invocation = exec
        .execute_eval(&config, &EchoRenderer, false)
        .await
        .unwrap();
    let job = exec.db.get_job(&invocation.job(0)).unwrap().unwrap();

    exec.kill_job(&job).await.unwrap();
    assert!(launcher
        .commands()
        .iter()
        .any(|c| c.contains("scancel 100")));
}

#[tokio::test]
async fn fetch_artifacts_downloads_each_run_directory() {
    let tmp = TempDir::new().unwrap();
    let (launcher, exec) = harness(&tmp);
    launcher.respond("sbatch", "Submitted batch job 100");
    let config = test_config(&tmp.path().join("out"));
    let invocation = exec
        .execute_eval(&config, &EchoRenderer, false)
        .await
        .unwrap();
    let jobs: Vec<_> = exec.db.get_jobs(&invocation).unwrap().into_values().collect();

    let fetched = exec.fetch_artifacts(&jobs).await.unwrap();
    assert_eq!(fetched.len(), 1);
    let remote_dir = format!("/scratch/eval/{}/0", invocation);
    assert!(launcher
        .commands()
        .iter()
        .any(|c| c.starts_with("scp") && c.contains(&remote_dir)));
}
