// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded, panic-guarded strategy execution.
//!
//! Each engine owns one [`Watchdog`]. The strategy runs on a dedicated worker
//! thread and the caller waits at most the configured bound for the reply.
//! A worker that misses the deadline is abandoned (its channels are dropped,
//! so it exits as soon as the strategy returns, if ever) and a fresh worker is
//! spawned on the next call.
//!
//! With no bound configured the strategy runs inline on the caller's thread,
//! still behind `catch_unwind`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use crate::control::ControlOutput;
use crate::error::StrategyError;
use crate::strategy::{ControlStrategy, SensorInput};

/// Why a strategy call produced no usable output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyFault {
    #[error(transparent)]
    Failed(StrategyError),
    #[error("strategy `{strategy}` panicked: {message}")]
    Panicked { strategy: String, message: String },
    #[error("strategy `{strategy}` did not return within {timeout:?}")]
    TimedOut { strategy: String, timeout: Duration },
    /// Output rejected by sanitization (non-finite values).
    #[error("invalid output: {0}")]
    Invalid(StrategyError),
}

impl StrategyFault {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StrategyFault::TimedOut { .. })
    }
}

type Reply = std::thread::Result<Result<ControlOutput, StrategyError>>;

struct Worker {
    jobs: Option<Sender<SensorInput>>,
    replies: Receiver<Reply>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(strategy: Arc<dyn ControlStrategy>) -> std::io::Result<Self> {
        let (job_tx, job_rx) = channel::bounded::<SensorInput>(1);
        let (reply_tx, reply_rx) = channel::bounded::<Reply>(1);
        let thread = std::thread::Builder::new()
            .name(format!("gtdrive-strategy-{}", strategy.name()))
            .spawn(move || {
                // Exits when the owning Watchdog drops or abandons the job sender.
                for input in job_rx.iter() {
                    let reply =
                        panic::catch_unwind(AssertUnwindSafe(|| strategy.compute(&input)));
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            jobs: Some(job_tx),
            replies: reply_rx,
            thread: Some(thread),
        })
    }

    /// Stop a healthy worker and wait for it.
    fn shutdown(mut self) {
        drop(self.jobs.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Runs one strategy under a time bound.
pub struct Watchdog {
    strategy: Arc<dyn ControlStrategy>,
    timeout: Option<Duration>,
    worker: Option<Worker>,
    abandoned: u32,
}

impl Watchdog {
    /// `timeout == None` runs the strategy inline.
    pub fn new(strategy: Arc<dyn ControlStrategy>, timeout: Option<Duration>) -> Self {
        Self {
            strategy,
            timeout,
            worker: None,
            abandoned: 0,
        }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Workers given up on after a timeout, over the watchdog's lifetime.
    pub fn abandoned_workers(&self) -> u32 {
        self.abandoned
    }

    /// Invoke the strategy and sanitize its output.
    pub fn run(&mut self, input: SensorInput) -> Result<ControlOutput, StrategyFault> {
        let reply = match self.timeout {
            None => panic::catch_unwind(AssertUnwindSafe(|| self.strategy.compute(&input))),
            Some(timeout) => self.run_bounded(input, timeout)?,
        };
        let name = self.strategy.name();
        match reply {
            Ok(Ok(output)) => output.sanitized(name).map_err(StrategyFault::Invalid),
            Ok(Err(err)) => Err(StrategyFault::Failed(err)),
            Err(payload) => Err(StrategyFault::Panicked {
                strategy: name.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    fn run_bounded(&mut self, input: SensorInput, timeout: Duration) -> Result<Reply, StrategyFault> {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => Worker::spawn(Arc::clone(&self.strategy)).map_err(|err| {
                StrategyFault::Failed(StrategyError::new(
                    self.strategy.name(),
                    format!("cannot spawn worker thread: {err}"),
                ))
            })?,
        };

        let sent = worker
            .jobs
            .as_ref()
            .map(|jobs| jobs.send(input).is_ok())
            .unwrap_or(false);
        if !sent {
            // Worker died between calls; the next call gets a new one.
            return Err(StrategyFault::Failed(StrategyError::new(
                self.strategy.name(),
                "worker thread exited",
            )));
        }

        match worker.replies.recv_timeout(timeout) {
            Ok(reply) => {
                self.worker = Some(worker);
                Ok(reply)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.abandoned += 1;
                log::warn!(
                    "[gtdrive] strategy `{}` exceeded {:?}, abandoning worker #{}",
                    self.strategy.name(),
                    timeout,
                    self.abandoned
                );
                // Dropping without joining detaches the stuck thread.
                drop(worker);
                Err(StrategyFault::TimedOut {
                    strategy: self.strategy.name().to_string(),
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(StrategyFault::Failed(StrategyError::new(
                self.strategy.name(),
                "worker thread exited",
            ))),
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ReferenceStrategy;
    use prost::bytes::Bytes;
    use std::time::Instant;

    fn stalling(input: &SensorInput) -> Result<ControlOutput, StrategyError> {
        if input.payload.first() == Some(&0xEE) {
            std::thread::sleep(Duration::from_millis(500));
        }
        Ok(ControlOutput::safe_stop())
    }

    fn panicking(_input: &SensorInput) -> Result<ControlOutput, StrategyError> {
        panic!("policy exploded")
    }

    #[test]
    fn test_inline_and_bounded_agree() {
        let strategy: Arc<dyn ControlStrategy> = Arc::new(ReferenceStrategy);
        let mut inline = Watchdog::new(Arc::clone(&strategy), None);
        let mut bounded = Watchdog::new(strategy, Some(Duration::from_secs(5)));
        let input = SensorInput {
            payload: Bytes::from_static(&[1, 2, 3]),
            ..SensorInput::default()
        };
        let a = inline.run(input.clone()).expect("inline");
        let b = bounded.run(input).expect("bounded");
        assert_eq!(a, b);
        assert_eq!(a.throttle, 0.5);
    }

    #[test]
    fn test_panic_is_caught() {
        for timeout in [None, Some(Duration::from_secs(5))] {
            let mut watchdog = Watchdog::new(Arc::new(panicking), timeout);
            match watchdog.run(SensorInput::default()) {
                Err(StrategyFault::Panicked { message, .. }) => {
                    assert!(message.contains("policy exploded"))
                }
                other => panic!("expected panic fault, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_timeout_abandons_worker() {
        let mut watchdog = Watchdog::new(Arc::new(stalling), Some(Duration::from_millis(50)));
        let started = Instant::now();
        let fault = watchdog
            .run(SensorInput {
                payload: Bytes::from_static(&[0xEE]),
                ..SensorInput::default()
            })
            .unwrap_err();
        assert!(fault.is_timeout());
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(watchdog.abandoned_workers(), 1);

        // A fresh worker serves the next call.
        let out = watchdog.run(SensorInput::default()).expect("recovered");
        assert_eq!(out, ControlOutput::safe_stop());
    }

    #[test]
    fn test_non_finite_output_is_invalid() {
        let nan = |_: &SensorInput| -> Result<ControlOutput, StrategyError> {
            Ok(ControlOutput {
                throttle: f64::NAN,
                ..ControlOutput::default()
            })
        };
        let mut watchdog = Watchdog::new(Arc::new(nan), None);
        assert!(matches!(
            watchdog.run(SensorInput::default()),
            Err(StrategyFault::Invalid(_))
        ));
    }
}
