//! intfd event loop.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::IntfdConfig;
use crate::control::{ControlCommand, ControlReply, ControlRequest};
use crate::error::IntfdResult;
use crate::intf_mgr::IntfMgr;
use crate::orch::Orch;
use crate::store::InterfaceStore;

/// Whether the loop keeps running after a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit,
}

/// Runs one store round: pull changes, evaluate, flush.
pub async fn sync_once<S>(mgr: &mut IntfMgr, store: &mut S, batch_size: usize) -> IntfdResult<()>
where
    S: InterfaceStore + ?Sized,
{
    mgr.poll_store(store, batch_size).await?;
    if mgr.has_pending_tasks() {
        mgr.do_task().await;
    }
    if mgr.has_unflushed() {
        mgr.flush(store).await?;
    }
    Ok(())
}

/// Answers one control request.
pub fn handle_control(mgr: &IntfMgr, request: ControlRequest) -> LoopControl {
    debug!("Control request: {:?}", request.command);

    let (reply, control): (ControlReply, _) = match &request.command {
        ControlCommand::Dump(interface) => (
            mgr.dump(interface.as_deref()).map_err(|e| e.to_string()),
            LoopControl::Continue,
        ),
        ControlCommand::DumpJson(interface) => (
            mgr.dump_json(interface.as_deref())
                .map(|json| json + "\n")
                .map_err(|e| e.to_string()),
            LoopControl::Continue,
        ),
        ControlCommand::Exit => (Ok("OK\n".to_string()), LoopControl::Exit),
    };

    if request.reply.send(reply).is_err() {
        debug!("Control client went away before the reply");
    }
    control
}

/// Runs the daemon until `shutdown` resolves or an `exit` request arrives.
///
/// Store errors that may clear on retry are logged and retried on the next
/// tick; any other error stops the loop.
pub async fn run<S, F>(
    mgr: &mut IntfMgr,
    store: &mut S,
    config: &IntfdConfig,
    mut control: mpsc::Receiver<ControlRequest>,
    shutdown: F,
) -> IntfdResult<()>
where
    S: InterfaceStore + ?Sized,
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(
        "Starting event loop with {}ms poll interval",
        config.daemon.poll_interval_ms
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            Some(request) = control.recv() => {
                if handle_control(mgr, request) == LoopControl::Exit {
                    info!("Exit requested over control socket");
                    break;
                }
            }
            _ = ticker.tick() => {
                match sync_once(mgr, store, config.database.batch_size).await {
                    Ok(()) => {}
                    Err(e) if e.is_retryable() => warn!("Store round failed, will retry: {}", e),
                    Err(e) => {
                        error!("Store round failed: {}", e);
                        return Err(e);
                    }
                }
            }
        }
    }

    if mgr.has_unflushed() {
        if let Err(e) = mgr.flush(store).await {
            warn!("Final flush failed: {}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sonic_intfd_arbiter::Arbiter;
    use tokio::sync::oneshot;

    use super::*;
    use crate::store::MemoryStore;
    use crate::tables::CFG_INTERFACE_TABLE_NAME;

    fn request(command: ControlCommand) -> (ControlRequest, oneshot::Receiver<ControlReply>) {
        let (reply, rx) = oneshot::channel();
        (ControlRequest { command, reply }, rx)
    }

    #[tokio::test]
    async fn test_sync_once_writes_forwarding_state() {
        let mut mgr = IntfMgr::new(Arc::new(Arbiter::builtin()));
        let mut store = MemoryStore::new();
        store.set_entry(CFG_INTERFACE_TABLE_NAME, "1", &[("admin", "up")]);

        sync_once(&mut mgr, &mut store, 16).await.unwrap();

        let row = store.forwarding_state("1").unwrap();
        assert_eq!(row.get("interface.forwarding-state").unwrap(), "forwarding");
        assert!(!mgr.has_unflushed());
    }

    #[tokio::test]
    async fn test_handle_control_dump_and_exit() {
        let mut mgr = IntfMgr::new(Arc::new(Arbiter::builtin()));
        let mut store = MemoryStore::new();
        store.set_entry(CFG_INTERFACE_TABLE_NAME, "1", &[("admin", "down")]);
        sync_once(&mut mgr, &mut store, 16).await.unwrap();

        let (req, rx) = request(ControlCommand::Dump(Some("1".to_string())));
        assert_eq!(handle_control(&mgr, req), LoopControl::Continue);
        assert!(rx.await.unwrap().unwrap().starts_with("Interface 1: blocked"));

        let (req, rx) = request(ControlCommand::Dump(Some("9".to_string())));
        handle_control(&mgr, req);
        assert!(rx.await.unwrap().is_err());

        let (req, rx) = request(ControlCommand::Exit);
        assert_eq!(handle_control(&mgr, req), LoopControl::Exit);
        assert_eq!(rx.await.unwrap().unwrap(), "OK\n");
    }

    #[tokio::test]
    async fn test_run_stops_on_exit_request() {
        let mut mgr = IntfMgr::new(Arc::new(Arbiter::builtin()));
        let mut store = MemoryStore::new();
        store.set_entry(CFG_INTERFACE_TABLE_NAME, "1", &[("admin", "up")]);
        let mut config = IntfdConfig::default();
        config.daemon.poll_interval_ms = 10;

        let (tx, rx) = mpsc::channel(1);
        let (req, reply) = request(ControlCommand::Exit);
        tx.send(req).await.unwrap();

        run(&mut mgr, &mut store, &config, rx, std::future::pending())
            .await
            .unwrap();

        assert_eq!(reply.await.unwrap().unwrap(), "OK\n");
    }

    #[tokio::test]
    async fn test_run_retries_after_store_failure() {
        let mut mgr = IntfMgr::new(Arc::new(Arbiter::builtin()));
        let mut store = MemoryStore::new();
        store.set_fail_writes(true);
        store.set_entry(CFG_INTERFACE_TABLE_NAME, "1", &[("admin", "up")]);
        let mut config = IntfdConfig::default();
        config.daemon.poll_interval_ms = 5;

        let (_tx, rx) = mpsc::channel(1);
        let shutdown = tokio::time::sleep(std::time::Duration::from_millis(50));
        run(&mut mgr, &mut store, &config, rx, shutdown).await.unwrap();

        assert!(mgr.has_unflushed());
        assert!(store.forwarding_state("1").is_none());

        store.set_fail_writes(false);
        sync_once(&mut mgr, &mut store, 16).await.unwrap();
        assert!(store.forwarding_state("1").is_some());
    }
}
