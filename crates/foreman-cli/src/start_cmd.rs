//! `foreman start` command: run the control loop to completion, with the
//! teacher's double-signal graceful shutdown (first Ctrl+C drains in
//! flight, second forces exit).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use foreman_core::control_loop::{ControlLoop, LoopExit};
use foreman_core::provider::registry::ProviderRegistry;
use foreman_core::state::StateManager;
use foreman_core::{Config, ForemanError};
use foreman_db::model::HaltReason;
use foreman_db::KvStore;

pub async fn run_start(state_store: Arc<dyn KvStore>, queue_store: Arc<dyn KvStore>, config: Config, providers: ProviderRegistry) -> Result<()> {
    let state_key = config.kv.state_key.clone();
    let inspector = StateManager::new(Arc::clone(&state_store), state_key);
    let control_loop = ControlLoop::new(state_store, queue_store, config, providers);

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    let got_first_clone = Arc::clone(&got_first_signal);

    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nShutting down gracefully (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    let exit = control_loop.run(cancel).await?;

    match exit {
        LoopExit::Completed => {
            println!("Goal completed.");
            Ok(())
        }
        LoopExit::Cancelled => {
            println!("Loop cancelled by operator. In-flight work drained.");
            println!("Run `foreman resume` then `foreman start` to continue.");
            Ok(())
        }
        LoopExit::Halted => {
            let state = inspector.load_required().await?;
            println!("Halted: {}", state.halt_reason.map(|r| r.to_string()).unwrap_or_default());
            if let Some(details) = &state.halt_details {
                println!("Details: {details}");
            }
            if !state.blocked_tasks.is_empty() {
                println!("Blocked tasks:");
                for blocked in &state.blocked_tasks {
                    println!("  - {} ({})", blocked.task.task_id, blocked.reason);
                }
            }
            if matches!(state.halt_reason, Some(HaltReason::InvariantViolation)) {
                Err(ForemanError::InvariantViolation(state.halt_details.unwrap_or_default()).into())
            } else {
                anyhow::bail!("control loop halted")
            }
        }
    }
}
