// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::fake::FakeLauncher;
use super::*;
use tempfile::TempDir;

fn pool_with(launcher: Arc<FakeLauncher>, dir: &TempDir) -> SshConnectionPool {
    SshConnectionPool::new(launcher).with_control_dir(dir.path())
}

#[tokio::test]
async fn first_command_establishes_a_master() {
    let tmp = TempDir::new().unwrap();
    let launcher = Arc::new(FakeLauncher::new());
    launcher.fail("-O check", "No ControlPath specified");
    launcher.respond("squeue", "12345 RUNNING");

    let pool = pool_with(Arc::clone(&launcher), &tmp);
    let target = SshTarget::new("eval", "cluster.example.com");
    let out = pool.run(&target, "squeue --me").await.unwrap();
    assert_eq!(out, "12345 RUNNING");

    let commands = launcher.commands();
    // check, open master, then the actual command
    assert_eq!(commands.len(), 3);
    assert!(commands[0].contains("-O check"));
    assert!(commands[1].contains("-N -f eval@cluster.example.com"));
    assert!(commands[2].ends_with("eval@cluster.example.com squeue --me"));
}

#[tokio::test]
async fn live_master_is_reused_without_reopening() {
    let tmp = TempDir::new().unwrap();
    let launcher = Arc::new(FakeLauncher::new());
    launcher.respond("-O check", "Master running");
    launcher.respond("hostname", "head01");

    let pool = pool_with(Arc::clone(&launcher), &tmp);
    let target = SshTarget::new("eval", "cluster.example.com");
    pool.run(&target, "hostname").await.unwrap();
    pool.run(&target, "hostname").await.unwrap();

    let commands = launcher.commands();
    // One check, then two commands; no second check, no master open.
    assert_eq!(commands.len(), 3);
    assert_eq!(
        commands.iter().filter(|c| c.contains("-O check")).count(),
        1
    );
    assert!(!commands.iter().any(|c| c.contains("-N -f")));
}

#[tokio::test]
async fn unreachable_host_is_backend_unavailable() {
    let tmp = TempDir::new().unwrap();
    let launcher = Arc::new(FakeLauncher::new());
    launcher.fail("-O check", "no master");
    launcher.fail("-N -f", "Permission denied (publickey)");

    let pool = pool_with(Arc::clone(&launcher), &tmp);
    let target = SshTarget::new("eval", "cluster.example.com");
    let err = pool.run(&target, "hostname").await.unwrap_err();
    match err {
        ExecutorError::BackendUnavailable { backend, reason } => {
            assert_eq!(backend, "ssh");
            assert!(reason.contains("eval@cluster.example.com"));
            assert!(reason.contains("ssh-agent"));
        }
        other => panic!("expected BackendUnavailable, got {other}"),
    }
}

#[tokio::test]
async fn every_command_pins_the_control_path() {
    let tmp = TempDir::new().unwrap();
    let launcher = Arc::new(FakeLauncher::new());
    launcher.respond("-O check", "Master running");

    let pool = pool_with(Arc::clone(&launcher), &tmp);
    let target = SshTarget::new("eval", "cluster.example.com");
    pool.run(&target, "true").await.unwrap();
    pool.upload(&target, "/tmp/job.sbatch", "/scratch/job.sbatch")
        .await
        .unwrap();

    let expected = format!(
        "ControlPath={}",
        tmp.path().join("cm-eval@cluster.example.com.sock").display()
    );
    for command in launcher.commands() {
        assert!(command.contains(&expected), "missing control path: {command}");
    }
}

#[tokio::test]
async fn three_jobs_on_one_host_share_one_master() {
    let tmp = TempDir::new().unwrap();
    let launcher = Arc::new(FakeLauncher::new());
    launcher.fail("-O check", "no master");

    let pool = pool_with(Arc::clone(&launcher), &tmp);
    let targets = vec![
        SshTarget::new("eval", "cluster.example.com"),
        SshTarget::new("eval", "cluster.example.com"),
        SshTarget::new("eval", "cluster.example.com"),
    ];
    let paths = pool.setup_masters(&targets).await.unwrap();
    assert_eq!(paths.len(), 1);

    let opens = launcher
        .commands()
        .iter()
        .filter(|c| c.contains("-N -f"))
        .count();
    assert_eq!(opens, 1);
}

#[tokio::test]
async fn cleanup_closes_masters_even_after_a_failed_operation() {
    let tmp = TempDir::new().unwrap();
    let launcher = Arc::new(FakeLauncher::new());
    launcher.fail("-O check", "no master");
    launcher.fail("squeue", "slurm_load_jobs error");

    let pool = pool_with(Arc::clone(&launcher), &tmp);
    let target = SshTarget::new("eval", "cluster.example.com");
    pool.setup_masters(std::slice::from_ref(&target)).await.unwrap();

    assert!(pool.run(&target, "squeue --me").await.is_err());
    pool.cleanup_masters().await;

    assert!(launcher
        .commands()
        .iter()
        .any(|c| c.contains("-O exit eval@cluster.example.com")));
}

#[tokio::test]
async fn upload_and_download_use_scp() {
    let tmp = TempDir::new().unwrap();
    let launcher = Arc::new(FakeLauncher::new());
    launcher.respond("-O check", "Master running");

    let pool = pool_with(Arc::clone(&launcher), &tmp);
    let target = SshTarget::new("eval", "cluster.example.com");
    pool.upload(&target, "/tmp/a.sh", "/scratch/a.sh").await.unwrap();
    pool.download(&target, "/scratch/results", "/tmp/results")
        .await
        .unwrap();

    let commands = launcher.commands();
    assert!(commands
        .iter()
        .any(|c| c.starts_with("scp") && c.ends_with("/tmp/a.sh eval@cluster.example.com:/scratch/a.sh")));
    assert!(commands
        .iter()
        .any(|c| c.contains("-r eval@cluster.example.com:/scratch/results /tmp/results")));
}
