/// Bitcoin OP_RETURN anchoring.
///
/// The anchoring transaction spends P2PKH outputs of the issuing address
/// and writes the 32-byte commitment into an OP_RETURN output. Outputs are
/// laid out as:
///
/// - payment outputs, in configured order
/// - change back to the issuing address, when positive
/// - OP_RETURN <commitment> (0 sats, always last)
///
/// OP_RETURN outputs are provably unspendable and kept by every full node,
/// so the transaction id is a timestamped existence proof for the root.
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::address::NetworkUnchecked;
use bitcoin::absolute::LockTime;
use bitcoin::blockdata::opcodes::all::OP_RETURN;
use bitcoin::blockdata::script::{Builder as ScriptBuilder, PushBytesBuf, ScriptBuf};
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount as Sats, EcdsaSighashType, Network, NetworkKind, PrivateKey, PublicKey,
    Sequence, Transaction, TxIn, TxOut, Witness,
};
use tracing::{debug, error, info};

use super::broadcast::{BroadcastCoordinator, BroadcastProvider};
use super::cost::BitcoinCostConstants;
use super::providers::ProviderRegistry;
use super::verify::verify_transaction;
use super::{sign_in_session, SignedTransaction, TransactionHandler, UnsignedTransaction};
use crate::chain::Chain;
use crate::crypto::sensitive::SensitiveVec;
use crate::error::{AnchorError, Result};
use crate::funding::{
    select_inputs, Amount, FundingConnector, FundingInput, PaymentOutput, SelectionStrategy,
    SmallestFirst,
};
use crate::signer::{ChainSigner, SecureSigner};

/// Inputs assumed by the pre-flight balance check.
const ESTIMATED_NUM_INPUTS: usize = 1;

/// Parse `address` and check that it belongs to `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    address
        .parse::<Address<NetworkUnchecked>>()
        .and_then(|a| a.require_network(network))
        .map_err(|e| AnchorError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// `OP_RETURN <commitment>`.
pub fn op_return_script(commitment: &[u8; 32]) -> ScriptBuf {
    ScriptBuilder::new()
        .push_opcode(OP_RETURN)
        .push_slice(commitment)
        .into_script()
}

/// Build the unsigned anchoring transaction.
///
/// Fails with `InsufficientFunds` if the inputs cannot cover the payments
/// plus `fee`.
pub fn build_transaction(
    commitment: &[u8; 32],
    inputs: Vec<FundingInput>,
    fee: u64,
    change_address: &Address,
    payments: Vec<TxOut>,
) -> Result<UnsignedTransaction> {
    let value_in: u64 = inputs.iter().map(|i| i.value).sum();
    let paid: u64 = payments.iter().map(|o| o.value.to_sat()).sum();
    let spend = paid.saturating_add(fee);

    let change = value_in.checked_sub(spend).ok_or_else(|| AnchorError::InsufficientFunds {
        address: change_address.to_string(),
        required: Amount::from(spend),
        available: Amount::from(value_in),
    })?;

    let mut output = payments;
    if change > 0 {
        output.push(TxOut {
            value: Sats::from_sat(change),
            script_pubkey: change_address.script_pubkey(),
        });
    }
    output.push(TxOut {
        value: Sats::ZERO,
        script_pubkey: op_return_script(commitment),
    });

    let input = inputs
        .iter()
        .map(|i| TxIn {
            previous_output: i.outpoint(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        })
        .collect();
    let prevouts = inputs
        .into_iter()
        .map(|i| TxOut {
            value: Sats::from_sat(i.value),
            script_pubkey: i.script_pubkey,
        })
        .collect();

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    };
    Ok(UnsignedTransaction::Bitcoin { tx, prevouts })
}

/// P2PKH signer for a WIF-encoded key.
#[derive(Debug, Clone, Copy)]
pub struct BitcoinSigner {
    network: Network,
}

impl BitcoinSigner {
    pub fn new(network: Network) -> Self {
        Self { network }
    }
}

impl ChainSigner for BitcoinSigner {
    fn name(&self) -> &'static str {
        "bitcoin-p2pkh"
    }

    fn sign(&self, key: &SensitiveVec, tx: UnsignedTransaction) -> Result<SignedTransaction> {
        let UnsignedTransaction::Bitcoin { mut tx, prevouts } = tx else {
            return Err(AnchorError::Signing("not a bitcoin transaction".into()));
        };
        if prevouts.len() != tx.input.len() {
            return Err(AnchorError::Signing(format!(
                "{} inputs but {} previous outputs",
                tx.input.len(),
                prevouts.len()
            )));
        }

        let private_key = PrivateKey::from_wif(key.as_str()?)
            .map_err(|e| AnchorError::Signing(format!("Invalid WIF key: {e}")))?;
        if private_key.network != NetworkKind::from(self.network) {
            return Err(AnchorError::Signing(format!(
                "key is not for {}",
                self.network
            )));
        }

        let secp = Secp256k1::new();
        let public_key = PublicKey::from_private_key(&secp, &private_key);
        let own_script = ScriptBuf::new_p2pkh(&public_key.pubkey_hash());
        let sighash_type = EcdsaSighashType::All;

        let mut script_sigs = Vec::with_capacity(tx.input.len());
        {
            let cache = SighashCache::new(&tx);
            for (index, prevout) in prevouts.iter().enumerate() {
                if prevout.script_pubkey != own_script {
                    script_sigs.push(None);
                    continue;
                }
                let sighash = cache
                    .legacy_signature_hash(index, &prevout.script_pubkey, sighash_type.to_u32())
                    .map_err(|e| AnchorError::Signing(format!("Sighash error: {e}")))?;
                let msg = Message::from_digest(sighash.to_byte_array());
                let signature = bitcoin::ecdsa::Signature {
                    signature: secp.sign_ecdsa(&msg, &private_key.inner),
                    sighash_type,
                };
                let sig_push = PushBytesBuf::try_from(signature.to_vec())
                    .map_err(|e| AnchorError::Signing(format!("Signature push error: {e}")))?;
                let script_sig = ScriptBuilder::new()
                    .push_slice(&sig_push)
                    .push_key(&public_key)
                    .into_script();
                script_sigs.push(Some(script_sig));
            }
        }

        for (input, script_sig) in tx.input.iter_mut().zip(script_sigs) {
            if let Some(script_sig) = script_sig {
                input.script_sig = script_sig;
            }
        }

        if let Some(index) = tx.input.iter().position(|i| i.script_sig.is_empty()) {
            error!(
                tx = %bitcoin::consensus::encode::serialize_hex(&tx),
                index,
                "Unable to sign transaction: input is not spendable by the issuing key"
            );
            return Err(AnchorError::Signing(format!("input {index} was left unsigned")));
        }

        Ok(SignedTransaction::Bitcoin(tx))
    }
}

pub struct BitcoinTransactionHandler {
    chain: Chain,
    address: Address,
    costs: BitcoinCostConstants,
    connector: Arc<dyn FundingConnector>,
    selection: Box<dyn SelectionStrategy>,
    payments: Vec<TxOut>,
    prepared_inputs: Option<Vec<FundingInput>>,
    signer: SecureSigner,
    broadcaster: BroadcastCoordinator,
    providers: Vec<Arc<dyn BroadcastProvider>>,
}

impl BitcoinTransactionHandler {
    pub fn new(
        chain: Chain,
        issuing_address: &str,
        costs: BitcoinCostConstants,
        registry: &ProviderRegistry,
        signer: SecureSigner,
        broadcaster: BroadcastCoordinator,
    ) -> Result<Self> {
        let network = chain.bitcoin_network().ok_or_else(|| {
            AnchorError::Config(format!("{chain} is not a bitcoin chain"))
        })?;

        Ok(Self {
            chain,
            address: parse_address(issuing_address, network)?,
            costs,
            connector: registry.connector()?,
            selection: Box::new(SmallestFirst),
            payments: Vec::new(),
            prepared_inputs: None,
            signer,
            broadcaster,
            providers: registry.broadcasters().to_vec(),
        })
    }

    pub fn with_selection(mut self, selection: Box<dyn SelectionStrategy>) -> Self {
        self.selection = selection;
        self
    }

    /// Extra outputs paid by the anchoring transaction. Each must be at
    /// least the dust threshold.
    pub fn with_payments(mut self, payments: &[PaymentOutput]) -> Result<Self> {
        let network = self.address_network()?;
        self.payments = payments
            .iter()
            .map(|p| {
                if p.value < self.costs.min_per_output {
                    return Err(AnchorError::Config(format!(
                        "payment of {} sat to {} is below the dust threshold of {} sat",
                        p.value, p.address, self.costs.min_per_output
                    )));
                }
                Ok(TxOut {
                    value: Sats::from_sat(p.value),
                    script_pubkey: parse_address(&p.address, network)?.script_pubkey(),
                })
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// Spend exactly these inputs on the next transaction instead of
    /// querying the connector.
    pub fn with_prepared_inputs(mut self, inputs: Vec<FundingInput>) -> Self {
        self.prepared_inputs = Some(inputs);
        self
    }

    pub fn signer(&self) -> &SecureSigner {
        &self.signer
    }

    fn address_network(&self) -> Result<Network> {
        self.chain
            .bitcoin_network()
            .ok_or_else(|| AnchorError::Config(format!("{} is not a bitcoin chain", self.chain)))
    }

    /// Payment outputs plus change.
    fn num_outputs(&self) -> usize {
        self.payments.len() + 1
    }

    fn payments_total(&self) -> u64 {
        self.payments.iter().map(|o| o.value.to_sat()).sum()
    }

    /// Amount the inputs must exceed when `num_inputs` are spent.
    fn required(&self, num_inputs: usize) -> Amount {
        Amount::from(self.costs.fee(num_inputs, self.num_outputs()))
            + Amount::from(self.payments_total())
    }

    async fn create_transaction(&mut self, commitment: &[u8; 32]) -> Result<UnsignedTransaction> {
        let address = self.address.to_string();
        let inputs = match self.prepared_inputs.take() {
            Some(inputs) => inputs,
            None => {
                let pool = self.connector.spendable_inputs(&address).await?;
                debug!(connector = self.connector.name(), available = pool.len(), "Fetched spendable inputs");
                select_inputs(self.selection.as_ref(), pool, &address, |n| self.required(n))?
            }
        };

        let fee = self.costs.fee(inputs.len(), self.num_outputs());
        let unsigned =
            build_transaction(commitment, inputs, fee, &self.address, self.payments.clone())?;
        if let UnsignedTransaction::Bitcoin { tx, .. } = &unsigned {
            debug!(
                unsigned_tx = %bitcoin::consensus::encode::serialize_hex(tx),
                fee,
                "Created unsigned transaction"
            );
        }
        Ok(unsigned)
    }
}

#[async_trait]
impl TransactionHandler for BitcoinTransactionHandler {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn ensure_balance(&self) -> Result<()> {
        let address = self.address.to_string();
        let available = self.connector.balance(&address).await?;
        let required = self.required(ESTIMATED_NUM_INPUTS);

        if available < required {
            error!(
                address = %address,
                required,
                available,
                "Issuing address needs more funds to issue this batch"
            );
            return Err(AnchorError::InsufficientFunds {
                address,
                required,
                available,
            });
        }
        info!(address = %address, available, required, "Issuing address balance is sufficient");
        Ok(())
    }

    async fn issue_transaction(&mut self, commitment: &[u8; 32]) -> Result<String> {
        let unsigned = self.create_transaction(commitment).await?;
        let signed = sign_in_session(&mut self.signer, unsigned).await?;
        debug!(signed_tx = %signed.to_hex(), "Signed transaction");
        verify_transaction(&signed, commitment)?;
        self.broadcaster.broadcast(&signed, &self.providers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::verify::extract_payload;
    use crate::chain::BlockchainType;
    use crate::funding::Shuffled;
    use crate::test_utils::{
        funding_input, instant_coordinator, test_address, test_signer, CorruptingSigner,
        StubConnector, StubProvider,
    };

    fn regtest_address() -> Address {
        test_address(Network::Regtest)
    }

    fn unsigned_tx(unsigned: &UnsignedTransaction) -> &Transaction {
        match unsigned {
            UnsignedTransaction::Bitcoin { tx, .. } => tx,
            UnsignedTransaction::Ethereum(_) => panic!("expected bitcoin"),
        }
    }

    fn handler_with(
        connector: Arc<StubConnector>,
        provider: Arc<StubProvider>,
        signer: SecureSigner,
    ) -> BitcoinTransactionHandler {
        let registry = ProviderRegistry::new()
            .with_connector(connector)
            .with_broadcaster(provider);
        BitcoinTransactionHandler::new(
            Chain::BitcoinRegtest,
            &regtest_address().to_string(),
            BitcoinCostConstants::default(),
            &registry,
            signer,
            instant_coordinator(Chain::BitcoinRegtest),
        )
        .unwrap()
    }

    #[test]
    fn test_build_output_layout() {
        let address = regtest_address();
        let payment = TxOut {
            value: Sats::from_sat(2_750),
            script_pubkey: address.script_pubkey(),
        };
        let unsigned = build_transaction(
            &[9u8; 32],
            vec![funding_input(1, 100_000)],
            60_000,
            &address,
            vec![payment.clone()],
        )
        .unwrap();
        let tx = unsigned_tx(&unsigned);

        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.output.len(), 3);
        assert_eq!(tx.output[0], payment);
        assert_eq!(tx.output[1].value, Sats::from_sat(100_000 - 60_000 - 2_750));
        assert_eq!(tx.output[1].script_pubkey, address.script_pubkey());
        assert!(tx.output[2].script_pubkey.is_op_return());
        assert_eq!(tx.output[2].value, Sats::ZERO);
        assert!(tx.input.iter().all(|i| i.script_sig.is_empty()));
    }

    #[test]
    fn test_build_without_change() {
        let address = regtest_address();
        let unsigned =
            build_transaction(&[1u8; 32], vec![funding_input(1, 60_000)], 60_000, &address, vec![])
                .unwrap();
        let tx = unsigned_tx(&unsigned);
        assert_eq!(tx.output.len(), 1);
        assert!(tx.output[0].script_pubkey.is_op_return());
    }

    #[test]
    fn test_build_rejects_underfunded_inputs() {
        let err = build_transaction(
            &[1u8; 32],
            vec![funding_input(1, 1_000)],
            60_000,
            &regtest_address(),
            vec![],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AnchorError::InsufficientFunds { required: 60_000, available: 1_000, .. }
        ));
    }

    #[test]
    fn test_op_return_carries_commitment() {
        let unsigned = build_transaction(
            &[0xAB; 32],
            vec![funding_input(1, 100_000)],
            60_000,
            &regtest_address(),
            vec![],
        )
        .unwrap();
        let tx = unsigned_tx(&unsigned).clone();
        let raw = bitcoin::consensus::encode::serialize(&tx);
        assert_eq!(extract_payload(BlockchainType::Bitcoin, &raw).unwrap(), vec![0xAB; 32]);
    }

    #[test]
    fn test_signer_signs_every_input() {
        let key = SensitiveVec::new(crate::test_utils::test_wif(Network::Regtest).into_bytes());
        let unsigned = build_transaction(
            &[3u8; 32],
            vec![funding_input(1, 50_000), funding_input(2, 50_000)],
            60_000,
            &regtest_address(),
            vec![],
        )
        .unwrap();

        let signed = BitcoinSigner::new(Network::Regtest).sign(&key, unsigned).unwrap();
        let SignedTransaction::Bitcoin(tx) = signed else {
            panic!("expected bitcoin");
        };
        assert!(tx.input.iter().all(|i| !i.script_sig.is_empty()));
        // <sig> <pubkey>
        assert_eq!(tx.input[0].script_sig.instructions().count(), 2);
    }

    #[test]
    fn test_signer_refuses_foreign_inputs() {
        let key = SensitiveVec::new(crate::test_utils::test_wif(Network::Regtest).into_bytes());
        let mut foreign = funding_input(2, 50_000);
        foreign.script_pubkey = op_return_script(&[1u8; 32]);
        let unsigned = build_transaction(
            &[3u8; 32],
            vec![funding_input(1, 50_000), foreign],
            60_000,
            &regtest_address(),
            vec![],
        )
        .unwrap();

        let err = BitcoinSigner::new(Network::Regtest).sign(&key, unsigned).unwrap_err();
        assert!(matches!(err, AnchorError::Signing(msg) if msg.contains("input 1")));
    }

    #[test]
    fn test_signer_rejects_key_for_other_network() {
        let key = SensitiveVec::new(crate::test_utils::test_wif(Network::Bitcoin).into_bytes());
        let unsigned = build_transaction(
            &[3u8; 32],
            vec![funding_input(1, 100_000)],
            60_000,
            &regtest_address(),
            vec![],
        )
        .unwrap();
        assert!(matches!(
            BitcoinSigner::new(Network::Regtest).sign(&key, unsigned),
            Err(AnchorError::Signing(_))
        ));
    }

    #[test]
    fn test_payments_below_dust_rejected() {
        let connector = Arc::new(StubConnector::with_inputs(vec![]));
        let provider = Arc::new(StubProvider::echoing("p"));
        let handler = handler_with(connector, provider, test_signer(Network::Regtest));
        let payment = PaymentOutput {
            address: regtest_address().to_string(),
            value: 100,
        };
        assert!(matches!(handler.with_payments(&[payment]), Err(AnchorError::Config(_))));
    }

    #[test]
    fn test_issuing_address_must_match_network() {
        let registry = ProviderRegistry::new().with_connector(Arc::new(StubConnector::with_inputs(vec![])));
        let result = BitcoinTransactionHandler::new(
            Chain::BitcoinRegtest,
            &test_address(Network::Bitcoin).to_string(),
            BitcoinCostConstants::default(),
            &registry,
            test_signer(Network::Regtest),
            instant_coordinator(Chain::BitcoinRegtest),
        );
        assert!(matches!(result, Err(AnchorError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_zero_balance_fails_before_any_transaction_work() {
        let connector = Arc::new(StubConnector::with_balance(0));
        let provider = Arc::new(StubProvider::echoing("p"));
        let handler = handler_with(connector.clone(), provider.clone(), test_signer(Network::Regtest));

        let err = handler.ensure_balance().await.unwrap_err();
        assert!(matches!(err, AnchorError::InsufficientFunds { available: 0, required: 60_000, .. }));
        assert_eq!(connector.input_calls(), 0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_balance_just_above_fee_is_enough() {
        // fee(1, 1) = max(250 * 236, 60_000)
        let connector = Arc::new(StubConnector::with_inputs(vec![funding_input(1, 60_001)]));
        let provider = Arc::new(StubProvider::echoing("esplora"));
        let mut handler = handler_with(connector, provider.clone(), test_signer(Network::Regtest));

        handler.ensure_balance().await.unwrap();
        handler.issue_transaction(&[5u8; 32]).await.unwrap();

        let SignedTransaction::Bitcoin(tx) = provider.last_broadcast().unwrap() else {
            panic!("expected bitcoin");
        };
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].value.to_sat(), 1);
    }

    #[tokio::test]
    async fn test_balance_below_fee_is_rejected() {
        let connector = Arc::new(StubConnector::with_inputs(vec![funding_input(1, 59_999)]));
        let provider = Arc::new(StubProvider::echoing("esplora"));
        let handler = handler_with(connector, provider, test_signer(Network::Regtest));

        let err = handler.ensure_balance().await.unwrap_err();
        assert!(matches!(
            err,
            AnchorError::InsufficientFunds { available: 59_999, required: 60_000, .. }
        ));
    }

    #[tokio::test]
    async fn test_issue_transaction_end_to_end() {
        let connector = Arc::new(StubConnector::with_inputs(vec![
            funding_input(1, 40_000),
            funding_input(2, 70_000),
        ]));
        let provider = Arc::new(StubProvider::echoing("esplora"));
        let mut handler = handler_with(connector.clone(), provider.clone(), test_signer(Network::Regtest));

        handler.ensure_balance().await.unwrap();
        let tx_id = handler.issue_transaction(&[5u8; 32]).await.unwrap();

        assert_eq!(provider.calls(), 1);
        let broadcast = provider.last_broadcast().unwrap();
        assert_eq!(tx_id, broadcast.tx_id());
        let SignedTransaction::Bitcoin(tx) = broadcast else {
            panic!("expected bitcoin");
        };
        // 40k alone cannot cover the 60k fee, so both inputs are spent.
        assert_eq!(tx.input.len(), 2);
        assert!(tx.output.last().unwrap().script_pubkey.is_op_return());
        assert!(!handler.signer().is_armed());
    }

    #[tokio::test]
    async fn test_prepared_inputs_skip_connector() {
        let connector = Arc::new(StubConnector::with_inputs(vec![funding_input(9, 500_000)]));
        let provider = Arc::new(StubProvider::echoing("esplora"));
        let mut handler = handler_with(connector.clone(), provider, test_signer(Network::Regtest))
            .with_selection(Box::new(Shuffled::with_seed(1)))
            .with_prepared_inputs(vec![funding_input(4, 80_000)]);

        handler.issue_transaction(&[5u8; 32]).await.unwrap();
        assert_eq!(connector.input_calls(), 0);
    }

    #[tokio::test]
    async fn test_tampered_payload_never_broadcast() {
        let connector = Arc::new(StubConnector::with_inputs(vec![funding_input(1, 100_000)]));
        let provider = Arc::new(StubProvider::echoing("esplora"));
        let signer = crate::test_utils::secure_signer(Box::new(CorruptingSigner::new(
            BitcoinSigner::new(Network::Regtest),
        )));
        let mut handler = handler_with(connector, provider.clone(), signer);

        let err = handler.issue_transaction(&[5u8; 32]).await.unwrap_err();
        assert!(matches!(err, AnchorError::UnverifiedTransaction { .. }));
        assert_eq!(provider.calls(), 0);
    }
}
