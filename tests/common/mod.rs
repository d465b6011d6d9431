#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use supervisor_tree::{
    spawn, Context, Process, ProcessError, ProcessOptions, SupervisedTask, Supervisor, TaskResult,
};

// Helper function to run a supervisor as a root process
pub fn spawn_supervisor(supervisor: &Supervisor) -> Process {
    spawn(
        &Context::background(),
        supervisor.clone(),
        ProcessOptions::new(),
    )
}

#[derive(Clone, Default)]
pub struct CompletingTask {
    pub run_count: Arc<AtomicUsize>,
}

impl SupervisedTask for CompletingTask {
    async fn run(&mut self, _ctx: Context) -> TaskResult {
        self.run_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FailingTask {
    pub run_count: Arc<AtomicUsize>,
}

impl SupervisedTask for FailingTask {
    async fn run(&mut self, _ctx: Context) -> TaskResult {
        self.run_count.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("task failed"))
    }
}

#[derive(Clone)]
pub struct PanickingTask {
    pub payload: &'static str,
}

impl SupervisedTask for PanickingTask {
    async fn run(&mut self, _ctx: Context) -> TaskResult {
        panic!("{}", self.payload);
    }
}

/// Returns as soon as its context is cancelled, reporting the cancellation.
#[derive(Clone, Default)]
pub struct ObedientTask {
    pub run_count: Arc<AtomicUsize>,
}

impl SupervisedTask for ObedientTask {
    async fn run(&mut self, ctx: Context) -> TaskResult {
        self.run_count.fetch_add(1, Ordering::SeqCst);
        ctx.cancelled().await;
        Err(ProcessError::Cancelled.into())
    }
}

/// Ignores cancellation and returns `Ok(())` after `hold`.
#[derive(Clone)]
pub struct StubbornTask {
    pub hold: Duration,
}

impl SupervisedTask for StubbornTask {
    async fn run(&mut self, _ctx: Context) -> TaskResult {
        tokio::time::sleep(self.hold).await;
        Ok(())
    }
}

pub fn runs(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
