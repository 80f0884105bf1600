/// Secure signing of anchoring transactions.
///
/// The signing key lives on a removable medium. In safe mode the signer
/// refuses to read it while the host is online: `start` waits until the
/// network is down and the medium is plugged in, `stop` drops the key
/// first and then waits until the medium is removed and the network is
/// back. The key is only held in memory between those two points.
///
/// ```text
///   Idle ──start──▶ Armed(key) ──sign*──▶ Armed(key) ──stop──▶ Idle
/// ```
pub mod medium;
pub mod probe;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::anchor::{SignedTransaction, UnsignedTransaction};
use crate::clock::{sleep_or_cancel, Clock, TokioClock};
use crate::crypto::sensitive::SensitiveVec;
use crate::error::{AnchorError, Result};

pub use medium::{FileKeyMedium, KeyMedium};
pub use probe::{HttpProbe, NetworkProbe};

/// Chain-specific signing with raw key material.
pub trait ChainSigner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sign every input the key controls. Must fail rather than return a
    /// partially signed transaction.
    fn sign(&self, key: &SensitiveVec, tx: UnsignedTransaction) -> Result<SignedTransaction>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeModeSettings {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    /// Give up waiting after this long. `None` waits indefinitely.
    pub max_wait_secs: Option<u64>,
}

impl Default for SafeModeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 10,
            max_wait_secs: None,
        }
    }
}

impl SafeModeSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

enum SignerState {
    Idle,
    Armed(SensitiveVec),
}

impl SignerState {
    fn name(&self) -> &'static str {
        match self {
            SignerState::Idle => "idle",
            SignerState::Armed(_) => "armed",
        }
    }
}

/// Host conditions safe mode waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostCondition {
    /// Network down, key medium present.
    ReadyToSign,
    /// Network up, key medium removed.
    SafeToResume,
}

impl HostCondition {
    fn holds(self, online: bool, medium_present: bool) -> bool {
        match self {
            HostCondition::ReadyToSign => !online && medium_present,
            HostCondition::SafeToResume => online && !medium_present,
        }
    }

    fn during(self) -> &'static str {
        match self {
            HostCondition::ReadyToSign => "waiting to go offline with the key medium attached",
            HostCondition::SafeToResume => "waiting for the key medium to be removed",
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            HostCondition::ReadyToSign => {
                "Turn off your internet and plug in your key medium to continue"
            }
            HostCondition::SafeToResume => {
                "Remove your key medium and turn your internet back on to continue"
            }
        }
    }
}

pub struct SecureSigner {
    state: SignerState,
    chain_signer: Box<dyn ChainSigner>,
    medium: Arc<dyn KeyMedium>,
    probe: Arc<dyn NetworkProbe>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    safe_mode: SafeModeSettings,
}

impl SecureSigner {
    pub fn new(
        chain_signer: Box<dyn ChainSigner>,
        medium: Arc<dyn KeyMedium>,
        probe: Arc<dyn NetworkProbe>,
        safe_mode: SafeModeSettings,
    ) -> Self {
        Self {
            state: SignerState::Idle,
            chain_signer,
            medium,
            probe,
            clock: Arc::new(TokioClock),
            cancel: CancellationToken::new(),
            safe_mode,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, SignerState::Armed(_))
    }

    /// Load the key, waiting for safe-mode conditions first.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_armed() {
            return Err(AnchorError::SignerState {
                expected: "idle",
                actual: self.state.name(),
            });
        }

        info!(signer = self.chain_signer.name(), medium = %self.medium.describe(), "Starting secure signer");
        if self.safe_mode.enabled {
            self.wait_for(HostCondition::ReadyToSign).await?;
        } else {
            warn!("Safe mode is disabled; reading the signing key without checking that the host is offline");
        }

        let key = self.medium.read_key()?.trimmed();
        if key.is_empty() {
            return Err(AnchorError::KeyMedium(format!(
                "{} holds an empty key",
                self.medium.describe()
            )));
        }
        self.state = SignerState::Armed(key);
        Ok(())
    }

    /// Sign with the loaded key. Any signing failure discards the key.
    pub fn sign(&mut self, tx: UnsignedTransaction) -> Result<SignedTransaction> {
        let SignerState::Armed(key) = &self.state else {
            return Err(AnchorError::SignerState {
                expected: "armed",
                actual: self.state.name(),
            });
        };

        match self.chain_signer.sign(key, tx) {
            Ok(signed) => Ok(signed),
            Err(e) => {
                error!(signer = self.chain_signer.name(), error = %e, "Signing failed; discarding key material");
                self.discard_key();
                Err(e)
            }
        }
    }

    /// Discard the key, then wait for safe-mode resume conditions.
    pub async fn stop(&mut self) -> Result<()> {
        self.discard_key();
        info!("Stopping secure signer");
        if self.safe_mode.enabled {
            self.wait_for(HostCondition::SafeToResume).await
        } else {
            warn!("Safe mode is disabled; not waiting for the key medium to be removed");
            Ok(())
        }
    }

    /// Start a signing session. The key is discarded when the session is
    /// finished or dropped.
    pub async fn session(&mut self) -> Result<SigningSession<'_>> {
        self.start().await?;
        Ok(SigningSession {
            signer: self,
            finished: false,
        })
    }

    fn discard_key(&mut self) {
        // Dropping the SensitiveVec zeroizes it.
        self.state = SignerState::Idle;
    }

    async fn wait_for(&self, condition: HostCondition) -> Result<()> {
        let poll = Duration::from_secs(self.safe_mode.poll_interval_secs);
        let max_wait = self.safe_mode.max_wait_secs.map(Duration::from_secs);
        let mut waited = Duration::ZERO;

        loop {
            if self.cancel.is_cancelled() {
                return Err(AnchorError::Cancelled(condition.during().to_string()));
            }

            let online = self.probe.is_online().await;
            let present = self.medium.is_present();
            if condition.holds(online, present) {
                return Ok(());
            }

            if let Some(max) = max_wait {
                if waited >= max {
                    return Err(AnchorError::Timeout {
                        during: condition.during().to_string(),
                        secs: waited.as_secs(),
                    });
                }
            }

            warn!(online, medium_present = present, "{}", condition.prompt());
            sleep_or_cancel(self.clock.as_ref(), poll, &self.cancel, condition.during()).await?;
            waited += poll;
        }
    }
}

/// Scope in which the signer holds its key.
///
/// Call [`SigningSession::finish`] to stop the signer. A session dropped
/// without finishing still discards the key, but skips the safe-mode
/// resume wait.
pub struct SigningSession<'a> {
    signer: &'a mut SecureSigner,
    finished: bool,
}

impl SigningSession<'_> {
    pub fn sign(&mut self, tx: UnsignedTransaction) -> Result<SignedTransaction> {
        self.signer.sign(tx)
    }

    pub async fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.signer.stop().await
    }
}

impl Drop for SigningSession<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.signer.discard_key();
            warn!("Signing session ended without stop; key material discarded");
        }
    }
}
