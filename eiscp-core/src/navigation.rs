//! Macro execution with per-step confirmation.
//!
//! The receiver drops keypresses and answers slowly, so navigation steps are
//! not fired blindly. Each predicated step is issued, given at least the
//! command interval to take effect, and checked against the live state:
//!
//! ```text
//!  snapshot ─► issue ─► wait interval ─► expectation met? ──yes──► next step
//!                ▲                             │
//!                └──────── no, budget left ────┘
//!                          no budget ──► MacroStepTimeout
//! ```
//!
//! All steps of a macro share one deadline. A timeout aborts the remaining
//! steps; nothing is rolled back.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::EiscpError;
use crate::state::DeviceState;

/// Highest cursor line on a menu page.
pub const MAX_CURSOR: u32 = 9;

// ── Step ─────────────────────────────────────────────────────────

/// One macro token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `0`-`9`: open that line of the current menu.
    Select(u8),
    /// `u`: cursor up.
    Up,
    /// `d`: cursor down.
    Down,
    /// `top`: back to the top menu.
    Top,
    /// Any other name: a literal command, sent once and not confirmed.
    Command(String),
}

impl Step {
    pub fn parse(token: &str) -> Self {
        match token {
            "u" => Step::Up,
            "d" => Step::Down,
            "top" => Step::Top,
            t if t.len() == 1 && t.as_bytes()[0].is_ascii_digit() => {
                Step::Select(t.as_bytes()[0] - b'0')
            }
            other => Step::Command(other.to_string()),
        }
    }

    /// Opcode of a navigation step. For `Command` this is the name itself;
    /// the command table substitutes the real opcode.
    pub fn opcode(&self) -> String {
        match self {
            Step::Select(line) => format!("NLSL{line}"),
            Step::Up => "NTCUP".to_string(),
            Step::Down => "NTCDOWN".to_string(),
            Step::Top => "NTCTOP".to_string(),
            Step::Command(name) => name.clone(),
        }
    }

    /// What the state must look like once this step has taken effect.
    pub fn expectation(&self, before: &DeviceState) -> Expectation {
        match self {
            Step::Select(_) => Expectation::Depth(before.depth + 1),
            Step::Top => Expectation::Depth(0),
            Step::Up if before.cursor == 0 => Expectation::AnyCursor,
            Step::Up => Expectation::Cursor(before.cursor - 1),
            Step::Down if before.cursor >= MAX_CURSOR => Expectation::Cursor(0),
            Step::Down => Expectation::Cursor(before.cursor + 1),
            Step::Command(_) => Expectation::Unchecked,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Select(line) => write!(f, "{line}"),
            Step::Up => write!(f, "u"),
            Step::Down => write!(f, "d"),
            Step::Top => write!(f, "top"),
            Step::Command(name) => write!(f, "{name}"),
        }
    }
}

// ── Expectation ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    Depth(u32),
    Cursor(u32),
    /// Cursor was already on the first line; wherever it lands is fine.
    AnyCursor,
    Unchecked,
}

impl Expectation {
    pub fn is_met(&self, state: &DeviceState) -> bool {
        match *self {
            Expectation::Depth(depth) => state.depth == depth,
            Expectation::Cursor(cursor) => state.cursor == cursor,
            Expectation::AnyCursor | Expectation::Unchecked => true,
        }
    }
}

// ── Plans ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub step: Step,
    pub opcode: String,
}

/// A resolved macro destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroPlan {
    pub name: String,
    pub target: String,
    pub steps: Vec<PlannedStep>,
}

impl fmt::Display for MacroPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [", self.name, self.target)?;
        for (i, planned) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", planned.step)?;
        }
        write!(f, "]")
    }
}

/// Outcome of a completed macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroReport {
    pub steps: usize,
    /// Commands written, retries included.
    pub issued: usize,
    pub elapsed: Duration,
}

// ── Remote ───────────────────────────────────────────────────────

/// The device as seen by the navigation engine.
#[async_trait]
pub trait Remote: Send + Sync {
    async fn send_raw(&self, opcode: &str) -> Result<(), EiscpError>;

    fn snapshot(&self) -> Result<DeviceState, EiscpError>;
}

// ── Navigator ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Navigator {
    interval: Duration,
    timeout: Duration,
}

impl Navigator {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.command_interval(), config.macro_timeout())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run every step of `plan` in order.
    ///
    /// A retry is only issued if a full issue-and-wait cycle still fits in
    /// the macro budget, so `MacroStepTimeout` is returned no later than the
    /// deadline.
    pub async fn run(&self, remote: &dyn Remote, plan: &MacroPlan) -> Result<MacroReport, EiscpError> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut issued = 0;

        debug!(%plan, "macro start");
        for (position, planned) in plan.steps.iter().enumerate() {
            let before = remote.snapshot()?;
            let expectation = planned.step.expectation(&before);
            let mut attempts: u32 = 0;

            loop {
                if Instant::now() + self.interval > deadline {
                    warn!(
                        step = %planned.step,
                        position,
                        attempts,
                        ?expectation,
                        "macro step timed out"
                    );
                    return Err(EiscpError::MacroStepTimeout {
                        step: planned.step.to_string(),
                        position,
                        attempts,
                        elapsed: started.elapsed(),
                    });
                }

                remote.send_raw(&planned.opcode).await?;
                attempts += 1;
                issued += 1;
                tokio::time::sleep(self.interval).await;

                if expectation.is_met(&remote.snapshot()?) {
                    debug!(step = %planned.step, position, attempts, "step confirmed");
                    break;
                }
                debug!(step = %planned.step, position, attempts, "step unconfirmed, retrying");
            }
        }

        Ok(MacroReport {
            steps: plan.steps.len(),
            issued,
            elapsed: started.elapsed(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Reaction = Box<dyn Fn(&str, usize, &mut DeviceState) + Send + Sync>;

    /// Simulated receiver. `react` sees each opcode with the number of times
    /// that opcode has been sent so far.
    struct FakeRemote {
        state: Mutex<DeviceState>,
        sent: Mutex<Vec<String>>,
        react: Reaction,
    }

    impl FakeRemote {
        fn new(react: impl Fn(&str, usize, &mut DeviceState) + Send + Sync + 'static) -> Self {
            Self {
                state: Mutex::new(DeviceState::default()),
                sent: Mutex::new(Vec::new()),
                react: Box::new(react),
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Remote for FakeRemote {
        async fn send_raw(&self, opcode: &str) -> Result<(), EiscpError> {
            let count = {
                let mut sent = self.sent.lock().unwrap();
                sent.push(opcode.to_string());
                sent.iter().filter(|s| *s == opcode).count()
            };
            (self.react)(opcode, count, &mut self.state.lock().unwrap());
            Ok(())
        }

        fn snapshot(&self) -> Result<DeviceState, EiscpError> {
            Ok(self.state.lock().unwrap().clone())
        }
    }

    struct Disconnected;

    #[async_trait]
    impl Remote for Disconnected {
        async fn send_raw(&self, _: &str) -> Result<(), EiscpError> {
            Err(EiscpError::NotConnected)
        }

        fn snapshot(&self) -> Result<DeviceState, EiscpError> {
            Ok(DeviceState::default())
        }
    }

    fn plan(steps: &[(&str, &str)]) -> MacroPlan {
        MacroPlan {
            name: "test".into(),
            target: "t".into(),
            steps: steps
                .iter()
                .map(|(token, opcode)| PlannedStep {
                    step: Step::parse(token),
                    opcode: opcode.to_string(),
                })
                .collect(),
        }
    }

    fn navigator(interval_ms: u64, timeout_ms: u64) -> Navigator {
        Navigator::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn parse_tokens() {
        assert_eq!(Step::parse("7"), Step::Select(7));
        assert_eq!(Step::parse("u"), Step::Up);
        assert_eq!(Step::parse("d"), Step::Down);
        assert_eq!(Step::parse("top"), Step::Top);
        assert_eq!(Step::parse("12"), Step::Command("12".into()));
        assert_eq!(Step::Select(4).opcode(), "NLSL4");
    }

    #[test]
    fn expectations() {
        let mut state = DeviceState {
            depth: 2,
            cursor: 4,
            ..Default::default()
        };
        assert_eq!(Step::Select(1).expectation(&state), Expectation::Depth(3));
        assert_eq!(Step::Top.expectation(&state), Expectation::Depth(0));
        assert_eq!(Step::Up.expectation(&state), Expectation::Cursor(3));
        assert_eq!(Step::Down.expectation(&state), Expectation::Cursor(5));

        state.cursor = 0;
        assert_eq!(Step::Up.expectation(&state), Expectation::AnyCursor);

        state.cursor = MAX_CURSOR;
        let wrap = Step::Down.expectation(&state);
        assert!(wrap.is_met(&DeviceState::default()));
        assert!(!wrap.is_met(&DeviceState {
            cursor: 8,
            ..Default::default()
        }));
    }

    #[tokio::test]
    async fn digit_step_retries_until_depth_increases() {
        let remote = FakeRemote::new(|opcode, count, state| {
            // the first two presses are lost
            if opcode == "NLSL1" && count == 3 {
                state.depth += 1;
            }
        });
        let nav = navigator(10, 2_000);
        let report = nav
            .run(&remote, &plan(&[("1", "NLSL1"), ("play", "NTCPLAY")]))
            .await
            .unwrap();

        assert_eq!(remote.sent(), ["NLSL1", "NLSL1", "NLSL1", "NTCPLAY"]);
        assert_eq!(report.issued, 4);
        assert_eq!(report.steps, 2);
        assert!(report.elapsed < nav.timeout());
    }

    #[tokio::test]
    async fn unconfirmed_step_times_out_and_aborts() {
        let remote = FakeRemote::new(|_, _, _| {});
        let nav = navigator(10, 100);
        let started = Instant::now();
        let err = nav
            .run(&remote, &plan(&[("2", "NLSL2"), ("play", "NTCPLAY")]))
            .await
            .unwrap_err();

        assert!(started.elapsed() <= Duration::from_millis(100) + Duration::from_millis(30));
        match err {
            EiscpError::MacroStepTimeout {
                step,
                position,
                attempts,
                ..
            } => {
                assert_eq!(step, "2");
                assert_eq!(position, 0);
                assert!(attempts >= 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!remote.sent().iter().any(|s| s == "NTCPLAY"));
    }

    #[tokio::test]
    async fn interval_is_kept_even_when_already_satisfied() {
        // depth starts at 0, so `top` is met immediately
        let remote = FakeRemote::new(|_, _, _| {});
        let nav = navigator(40, 2_000);
        let started = Instant::now();
        let report = nav
            .run(&remote, &plan(&[("top", "NTCTOP"), ("net", "SLI2B"), ("u", "NTCUP")]))
            .await
            .unwrap();

        assert_eq!(report.issued, 3);
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn cursor_steps_follow_the_device() {
        let remote = FakeRemote::new(|opcode, _, state| match opcode {
            "NTCDOWN" => state.cursor = (state.cursor + 1) % (MAX_CURSOR + 1),
            "NTCUP" => state.cursor = state.cursor.saturating_sub(1),
            _ => {}
        });
        remote.state.lock().unwrap().cursor = MAX_CURSOR;
        let nav = navigator(5, 2_000);
        nav.run(&remote, &plan(&[("d", "NTCDOWN"), ("d", "NTCDOWN"), ("u", "NTCUP")]))
            .await
            .unwrap();

        assert_eq!(remote.snapshot().unwrap().cursor, 0);
        assert_eq!(remote.sent().len(), 3);
    }

    #[tokio::test]
    async fn send_errors_abort_the_macro() {
        let nav = navigator(5, 1_000);
        let err = nav
            .run(&Disconnected, &plan(&[("1", "NLSL1")]))
            .await
            .unwrap_err();
        assert!(matches!(err, EiscpError::NotConnected));
    }

    #[test]
    fn plan_display() {
        let p = plan(&[("net", "SLI2B"), ("top", "NTCTOP"), ("0", "NLSL0")]);
        assert_eq!(p.to_string(), "test t [net top 0]");
    }
}
