//! Shared test utilities: deterministic keys and in-memory stand-ins for
//! providers, connectors, key media, probes and clocks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{Address, Network, PrivateKey, PublicKey, Txid};
use tokio_util::sync::CancellationToken;

use crate::anchor::bitcoin::{build_transaction, op_return_script, BitcoinSigner};
use crate::anchor::broadcast::{BroadcastCoordinator, BroadcastProvider, BroadcastSettings};
use crate::anchor::{SignedTransaction, UnsignedTransaction};
use crate::chain::Chain;
use crate::clock::Clock;
use crate::crypto::sensitive::SensitiveVec;
use crate::error::{AnchorError, Result};
use crate::funding::{Amount, FundingConnector, FundingInput, NonceSource};
use crate::signer::{ChainSigner, KeyMedium, NetworkProbe, SafeModeSettings, SecureSigner};

/// Hex private key for Ethereum signing tests.
pub const TEST_ETH_KEY: &str =
    "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// Deterministically derive a secret key from a single byte (tests only)
fn deterministic_secret(byte: u8) -> SecretKey {
    SecretKey::from_slice(&[byte; 32]).expect("32-byte array should always be a valid SecretKey")
}

pub fn test_private_key(network: Network) -> PrivateKey {
    PrivateKey::new(deterministic_secret(1), network)
}

pub fn test_wif(network: Network) -> String {
    test_private_key(network).to_wif()
}

/// P2PKH address controlled by [`test_private_key`].
pub fn test_address(network: Network) -> Address {
    let secp = Secp256k1::new();
    let public_key = PublicKey::from_private_key(&secp, &test_private_key(network));
    Address::p2pkh(public_key, network)
}

/// A regtest input spendable by the test key.
pub fn funding_input(id: u8, value: u64) -> FundingInput {
    FundingInput {
        txid: Txid::from_byte_array([id; 32]),
        vout: u32::from(id),
        value,
        script_pubkey: test_address(Network::Regtest).script_pubkey(),
    }
}

/// A signed regtest anchoring transaction.
pub fn sample_signed_tx() -> SignedTransaction {
    let unsigned = build_transaction(
        &[0x5A; 32],
        vec![funding_input(1, 100_000)],
        60_000,
        &test_address(Network::Regtest),
        vec![],
    )
    .unwrap();
    let key = SensitiveVec::new(test_wif(Network::Regtest).into_bytes());
    BitcoinSigner::new(Network::Regtest).sign(&key, unsigned).unwrap()
}

/// Signer with safe mode off, holding the regtest test key.
pub fn test_signer(network: Network) -> SecureSigner {
    secure_signer_with_key(Box::new(BitcoinSigner::new(network)), &test_wif(network))
}

pub fn secure_signer(chain_signer: Box<dyn ChainSigner>) -> SecureSigner {
    secure_signer_with_key(chain_signer, &test_wif(Network::Regtest))
}

pub fn secure_signer_with_key(chain_signer: Box<dyn ChainSigner>, key: &str) -> SecureSigner {
    SecureSigner::new(
        chain_signer,
        Arc::new(MemoryKeyMedium::new(key.as_bytes().to_vec())),
        Arc::new(ScriptedProbe::always(true)),
        SafeModeSettings::disabled(),
    )
    .with_clock(Arc::new(InstantClock::default()))
}

/// Default broadcast settings on an instant clock.
pub fn instant_coordinator(chain: Chain) -> BroadcastCoordinator {
    BroadcastCoordinator::new(chain, BroadcastSettings::default())
        .with_clock(Arc::new(InstantClock::default()))
}

/// Key medium backed by memory; can be unplugged.
pub struct MemoryKeyMedium {
    key: Vec<u8>,
    present: AtomicBool,
    reads: AtomicUsize,
}

impl MemoryKeyMedium {
    pub fn new(key: Vec<u8>) -> Self {
        Self {
            key,
            present: AtomicBool::new(true),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn regtest() -> Self {
        Self::new(test_wif(Network::Regtest).into_bytes())
    }

    pub fn unplug(&self) {
        self.present.store(false, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl KeyMedium for MemoryKeyMedium {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    fn read_key(&self) -> Result<SensitiveVec> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(SensitiveVec::new(self.key.clone()))
    }
}

/// Answers connectivity checks from a script, then a fixed fallback.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
}

impl ScriptedProbe {
    pub fn new(script: Vec<bool>, fallback: bool) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
        }
    }

    pub fn always(online: bool) -> Self {
        Self::new(Vec::new(), online)
    }
}

#[async_trait]
impl NetworkProbe for ScriptedProbe {
    async fn is_online(&self) -> bool {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

/// Records requested sleeps and returns immediately.
#[derive(Default)]
pub struct InstantClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl InstantClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for InstantClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

/// Cancels the token as soon as anything sleeps, then never wakes.
pub struct CancellingClock {
    cancel: CancellationToken,
}

impl CancellingClock {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl Clock for CancellingClock {
    async fn sleep(&self, _duration: Duration) {
        self.cancel.cancel();
        std::future::pending::<()>().await;
    }
}

/// Always fails to sign.
pub struct BrokenSigner;

impl ChainSigner for BrokenSigner {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn sign(&self, _key: &SensitiveVec, _tx: UnsignedTransaction) -> Result<SignedTransaction> {
        Err(AnchorError::Signing("unable to sign".into()))
    }
}

/// Signs correctly, then flips one byte of the OP_RETURN payload.
pub struct CorruptingSigner {
    inner: BitcoinSigner,
}

impl CorruptingSigner {
    pub fn new(inner: BitcoinSigner) -> Self {
        Self { inner }
    }
}

impl ChainSigner for CorruptingSigner {
    fn name(&self) -> &'static str {
        "corrupting"
    }

    fn sign(&self, key: &SensitiveVec, tx: UnsignedTransaction) -> Result<SignedTransaction> {
        let SignedTransaction::Bitcoin(mut tx) = self.inner.sign(key, tx)? else {
            panic!("expected bitcoin transaction");
        };
        let output = tx
            .output
            .iter_mut()
            .find(|o| o.script_pubkey.is_op_return())
            .expect("anchoring transaction has an OP_RETURN output");
        // OP_RETURN, OP_PUSHBYTES_32, then the payload.
        let mut payload = [0u8; 32];
        payload.copy_from_slice(&output.script_pubkey.as_bytes()[2..34]);
        payload[0] ^= 0x01;
        output.script_pubkey = op_return_script(&payload);
        Ok(SignedTransaction::Bitcoin(tx))
    }
}

enum Behavior {
    /// Return the transaction's own id.
    Echo,
    Fixed(String),
    Fail,
    /// Fail this many calls, then return the id.
    FailThen(usize, String),
    /// Never answer.
    Hang,
}

/// Broadcast provider stand-in that counts calls.
pub struct StubProvider {
    name: String,
    behavior: Behavior,
    calls: AtomicUsize,
    last: Mutex<Option<SignedTransaction>>,
}

impl StubProvider {
    fn with_behavior(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn echoing(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Echo)
    }

    pub fn fixed(name: &str, tx_id: &str) -> Self {
        Self::with_behavior(name, Behavior::Fixed(tx_id.to_string()))
    }

    pub fn failing(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Fail)
    }

    pub fn failing_then(name: &str, failures: usize, tx_id: &str) -> Self {
        Self::with_behavior(name, Behavior::FailThen(failures, tx_id.to_string()))
    }

    pub fn hanging(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_broadcast(&self) -> Option<SignedTransaction> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl BroadcastProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn broadcast_tx(&self, tx: &SignedTransaction) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(tx.clone());

        match &self.behavior {
            Behavior::Echo => Ok(tx.tx_id()),
            Behavior::Fixed(id) => Ok(id.clone()),
            Behavior::Fail => Err(AnchorError::provider(&self.name, "connection refused")),
            Behavior::FailThen(failures, id) if call >= *failures => Ok(id.clone()),
            Behavior::FailThen(..) => Err(AnchorError::provider(&self.name, "503 Service Unavailable")),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// Funding connector over a fixed input pool or balance.
pub struct StubConnector {
    inputs: Vec<FundingInput>,
    balance: Amount,
    input_calls: AtomicUsize,
}

impl StubConnector {
    pub fn with_inputs(inputs: Vec<FundingInput>) -> Self {
        let balance = inputs.iter().map(|i| Amount::from(i.value)).sum();
        Self {
            inputs,
            balance,
            input_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_balance(balance: Amount) -> Self {
        Self {
            inputs: Vec::new(),
            balance,
            input_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `spendable_inputs` calls, i.e. transaction builds started.
    pub fn input_calls(&self) -> usize {
        self.input_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FundingConnector for StubConnector {
    fn name(&self) -> &str {
        "stub"
    }

    async fn spendable_inputs(&self, _address: &str) -> Result<Vec<FundingInput>> {
        self.input_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inputs.clone())
    }

    async fn balance(&self, _address: &str) -> Result<Amount> {
        Ok(self.balance)
    }
}

pub struct StubNonces(pub u64);

#[async_trait]
impl NonceSource for StubNonces {
    async fn nonce(&self, _address: &str) -> Result<u64> {
        Ok(self.0)
    }
}
