//! The transmit (QoS) scheduler (component F): a priority send queue with
//! retry/backoff, reply-header correlation, and duty-cycle deprecation of
//! devices that stop answering.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::address::DeviceId;
use crate::error::{Error, Result};
use crate::packet::Verb;
use crate::payload::Message;

/// Consecutive unanswered sends after which a device is deprecated: no
/// further commands are sent to it until it speaks again unprompted.
pub const DUTY_CYCLE_DEPRECATION_THRESHOLD: u32 = 12;

const BASE_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Lowest,
    Low,
    Default,
    High,
    Highest,
}

/// One outgoing command: a fully serialised wire line plus the reply
/// contract the engine should wait on.
#[derive(Debug, Clone)]
pub struct OutgoingCommand {
    pub line: String,
    pub code: u16,
    pub verb: Verb,
    pub dst: DeviceId,
    pub priority: Priority,
    pub max_retries: u32,
    pub timeout: Duration,
    pub disable_backoff: bool,
}

impl OutgoingCommand {
    pub fn new(line: String, code: u16, verb: Verb, dst: DeviceId) -> Self {
        OutgoingCommand {
            line,
            code,
            verb,
            dst,
            priority: Priority::Default,
            max_retries: 3,
            timeout: Duration::from_secs(3),
            disable_backoff: false,
        }
    }
}

struct Submission {
    cmd: OutgoingCommand,
    reply: oneshot::Sender<Result<Message>>,
}

struct Queued {
    seq: u64,
    submission: Submission,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.submission.cmd.priority == other.submission.cmd.priority && self.seq == other.seq
    }
}
impl Eq for Queued {}
impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; within a priority, lower seq (older) first.
        self.submission
            .cmd
            .priority
            .cmp(&other.submission.cmd.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inflight {
    submission: Submission,
    attempts_left: u32,
    deadline: Instant,
}

/// A handle used to submit commands to a running [`Engine`].
#[derive(Clone)]
pub struct Handle {
    submit: mpsc::Sender<(OutgoingCommand, oneshot::Sender<Result<Message>>)>,
}

impl Handle {
    /// Submit a command and await its correlated reply (or the expiry
    /// error once retries are exhausted).
    pub async fn send(&self, cmd: OutgoingCommand) -> Result<Message> {
        let (tx, rx) = oneshot::channel();
        self.submit
            .send((cmd, tx))
            .await
            .map_err(|_| Error::Transport("qos engine has shut down".into()))?;
        rx.await
            .map_err(|_| Error::Transport("qos engine dropped the reply channel".into()))?
    }
}

pub struct Engine {
    outbound: mpsc::Sender<String>,
    queue: BinaryHeap<Queued>,
    inflight: Option<Inflight>,
    seq: u64,
    no_reply_streak: HashMap<DeviceId, u32>,
    deprecated: HashMap<DeviceId, ()>,
}

type SubmitRx = mpsc::Receiver<(OutgoingCommand, oneshot::Sender<Result<Message>>)>;

impl Engine {
    /// Build a new engine plus the [`Handle`] callers use to submit
    /// commands. The returned receiver must be driven by [`Engine::run`].
    pub fn new(outbound: mpsc::Sender<String>) -> (Self, Handle, SubmitRx) {
        let (submit_tx, submit_rx) = mpsc::channel(256);
        let engine = Engine {
            outbound,
            queue: BinaryHeap::new(),
            inflight: None,
            seq: 0,
            no_reply_streak: HashMap::new(),
            deprecated: HashMap::new(),
        };
        let handle = Handle { submit: submit_tx };
        (engine, handle, submit_rx)
    }

    pub fn is_deprecated(&self, id: DeviceId) -> bool {
        self.deprecated.contains_key(&id)
    }

    /// Drive the engine until `submissions` closes or a transport error
    /// propagates. `replies` carries every decoded inbound [`Message`]; the
    /// dispatcher feeds all of them here, not just ones addressed to us —
    /// correlation filters by `(code, verb, src)`.
    pub async fn run(
        mut self,
        mut submissions: mpsc::Receiver<(OutgoingCommand, oneshot::Sender<Result<Message>>)>,
        mut replies: mpsc::Receiver<Message>,
    ) -> Result<()> {
        loop {
            let sleep = match &self.inflight {
                Some(inf) => tokio::time::sleep_until(inf.deadline),
                None => tokio::time::sleep(Duration::from_secs(3600)),
            };
            tokio::pin!(sleep);

            tokio::select! {
                Some((cmd, reply)) = submissions.recv() => {
                    self.seq += 1;
                    self.queue.push(Queued { seq: self.seq, submission: Submission { cmd, reply } });
                    self.maybe_send_next().await?;
                }
                Some(msg) = replies.recv() => {
                    self.on_reply(msg);
                    self.maybe_send_next().await?;
                }
                () = &mut sleep, if self.inflight.is_some() => {
                    self.on_timeout().await?;
                    self.maybe_send_next().await?;
                }
                else => return Ok(()),
            }
        }
    }

    async fn maybe_send_next(&mut self) -> Result<()> {
        if self.inflight.is_some() {
            return Ok(());
        }
        while let Some(queued) = self.queue.pop() {
            if self.is_deprecated(queued.submission.cmd.dst) {
                let _ = queued.submission.reply.send(Err(Error::Transport(format!(
                    "{} is deprecated (duty-cycle)",
                    queued.submission.cmd.dst
                ))));
                continue;
            }
            self.outbound
                .send(queued.submission.cmd.line.clone())
                .await
                .map_err(|_| Error::Transport("serial transport has shut down".into()))?;
            let deadline = Instant::now() + queued.submission.cmd.timeout;
            self.inflight = Some(Inflight {
                attempts_left: queued.submission.cmd.max_retries,
                submission: queued.submission,
                deadline,
            });
            return Ok(());
        }
        Ok(())
    }

    fn on_reply(&mut self, msg: Message) {
        let Some(inf) = &self.inflight else { return };
        let expected = inf.submission.cmd.verb.expected_reply();
        let matches = expected == Some(msg.verb)
            && msg.code == inf.submission.cmd.code
            && msg.src == inf.submission.cmd.dst;
        if !matches {
            return;
        }
        let inf = self.inflight.take().unwrap();
        self.no_reply_streak.remove(&inf.submission.cmd.dst);
        self.deprecated.remove(&inf.submission.cmd.dst);
        let _ = inf.submission.reply.send(Ok(msg));
    }

    async fn on_timeout(&mut self) -> Result<()> {
        let Some(mut inf) = self.inflight.take() else {
            return Ok(());
        };
        if inf.attempts_left == 0 {
            let dst = inf.submission.cmd.dst;
            let streak = self.no_reply_streak.entry(dst).or_insert(0);
            *streak += 1;
            if *streak >= DUTY_CYCLE_DEPRECATION_THRESHOLD {
                warn!(%dst, "deprecating device after {streak} consecutive unanswered sends");
                self.deprecated.insert(dst, ());
            }
            let retries = inf.submission.cmd.max_retries;
            let _ = inf.submission.reply.send(Err(Error::ExpiredCallback { retries }));
            return Ok(());
        }
        inf.attempts_left -= 1;
        let attempt = inf.submission.cmd.max_retries - inf.attempts_left;
        if !inf.submission.cmd.disable_backoff {
            let backoff = backoff_for_attempt(attempt);
            debug!(?backoff, attempt, "retrying with backoff");
            tokio::time::sleep(backoff).await;
        }
        self.outbound
            .send(inf.submission.cmd.line.clone())
            .await
            .map_err(|_| Error::Transport("serial transport has shut down".into()))?;
        inf.deadline = Instant::now() + inf.submission.cmd.timeout;
        self.inflight = Some(inf);
        Ok(())
    }
}

fn backoff_for_attempt(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF.saturating_mul(1u32 << attempt.min(8));
    let capped = exp.min(MAX_BACKOFF);
    let jitter_ms = rand::thread_rng().gen_range(0..=50);
    capped + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ord_ranks_highest_above_default() {
        assert!(Priority::Highest > Priority::Default);
        assert!(Priority::Lowest < Priority::Low);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        assert!(backoff_for_attempt(1) < backoff_for_attempt(4));
        assert!(backoff_for_attempt(20) <= MAX_BACKOFF + Duration::from_millis(50));
    }

    fn no_retry_probe(relay: DeviceId) -> OutgoingCommand {
        let mut cmd = OutgoingCommand::new("RQ".into(), 0x0008, Verb::Rq, relay);
        cmd.max_retries = 0;
        cmd.disable_backoff = true;
        cmd.timeout = Duration::from_millis(5);
        cmd
    }

    /// §8 S4: 12 consecutive unanswered sends to the same device deprecate
    /// it; the 13th is suppressed — rejected before a single byte is
    /// written, not merely retried and dropped.
    #[tokio::test]
    async fn s4_thirteenth_send_is_suppressed_after_duty_cycle_deprecation() {
        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        let (engine, handle, submit_rx) = Engine::new(out_tx);
        let (reply_tx, reply_rx) = mpsc::channel::<Message>(8);
        let engine_join = tokio::spawn(engine.run(submit_rx, reply_rx));

        let relay = DeviceId::new(13, 1);
        for _ in 0..DUTY_CYCLE_DEPRECATION_THRESHOLD {
            let result = handle.send(no_retry_probe(relay)).await;
            assert!(result.is_err(), "unanswered send must expire");
        }
        let mut written = 0usize;
        while out_rx.try_recv().is_ok() {
            written += 1;
        }
        assert_eq!(written, DUTY_CYCLE_DEPRECATION_THRESHOLD as usize);

        let result = handle.send(no_retry_probe(relay)).await;
        assert!(
            matches!(result, Err(Error::Transport(_))),
            "13th send must be rejected as deprecated, not merely time out"
        );
        assert!(
            out_rx.try_recv().is_err(),
            "a deprecated send must write no bytes at all"
        );

        drop(reply_tx);
        engine_join.abort();
    }
}
