use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread::{self, JoinHandle},
    time::Instant,
};

use super::channel::TypingChannel;

const TYPING_EXPIRY_WORKER_STARTED: &str = "TYPING_EXPIRY_WORKER_STARTED";
const TYPING_EXPIRY_WORKER_SHUTDOWN_FAILED: &str = "TYPING_EXPIRY_WORKER_SHUTDOWN_FAILED";

#[derive(Debug)]
pub(super) enum ExpiryCommand {
    Wake,
    Stop,
}

/// Background thread that ends typing pairs once their deadline passes.
///
/// It sleeps until the channel's earliest deadline and is woken early by every
/// `start_typing`. Dropping the worker stops and joins the thread.
#[derive(Debug)]
pub struct TypingExpiryWorker {
    channel: TypingChannel,
    stop_tx: Option<mpsc::Sender<ExpiryCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl TypingExpiryWorker {
    pub fn start(channel: TypingChannel) -> Result<Self, ExpiryWorkerStartError> {
        let (command_tx, command_rx) = mpsc::channel();
        channel.attach_waker(Some(command_tx.clone()));

        let worker_channel = channel.clone();
        let worker = thread::Builder::new()
            .name("parley-typing-expiry".to_owned())
            .spawn(move || run_worker(worker_channel, command_rx))
            .map_err(|source| {
                channel.attach_waker(None);
                ExpiryWorkerStartError::WorkerSpawn(source)
            })?;

        tracing::debug!(
            code = TYPING_EXPIRY_WORKER_STARTED,
            window_ms = channel.window().as_millis() as u64,
            "typing expiry worker started"
        );

        Ok(Self {
            channel,
            stop_tx: Some(command_tx),
            worker: Some(worker),
        })
    }
}

impl Drop for TypingExpiryWorker {
    fn drop(&mut self) {
        self.channel.attach_waker(None);

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(ExpiryCommand::Stop);
        }

        if let Some(worker) = self.worker.take() {
            if let Err(error) = worker.join() {
                tracing::warn!(
                    code = TYPING_EXPIRY_WORKER_SHUTDOWN_FAILED,
                    error = ?error,
                    "typing expiry worker panicked on shutdown"
                );
            }
        }
    }
}

fn run_worker(channel: TypingChannel, commands: Receiver<ExpiryCommand>) {
    loop {
        let command = match channel.next_deadline() {
            Some(deadline) => {
                commands.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match command {
            Ok(ExpiryCommand::Stop) | Err(RecvTimeoutError::Disconnected) => return,
            Ok(ExpiryCommand::Wake) | Err(RecvTimeoutError::Timeout) => {
                channel.expire_due(Instant::now());
            }
        }
    }
}

#[derive(Debug)]
pub enum ExpiryWorkerStartError {
    WorkerSpawn(std::io::Error),
}

impl std::fmt::Display for ExpiryWorkerStartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WorkerSpawn(source) => write!(f, "worker spawn failed: {source}"),
        }
    }
}

impl std::error::Error for ExpiryWorkerStartError {}
