//! Transaction assembly with fee convergence.
//!
//! [`TransactionBuilder`] collects payments, runs coin selection and hands
//! the result to [`TransactionAssembler`], which:
//! 1. drafts the body with placeholder witnesses of the expected count,
//! 2. charges `min_fee_a * size + min_fee_b` against the pure-ADA change
//!    output, repeating until the fee covers the draft,
//! 3. strips the placeholders and checks value conservation.
//!
//! The unsigned result goes through a [`WitnessStage`] in
//! [`TransactionAssembler::finalize`].

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use rental_core::address::Address;
use rental_core::constants::{
    DEFAULT_TTL_HORIZON_SLOTS, DEFAULT_WITNESS_COUNT, INITIAL_SIZE_ESTIMATE, MAX_FEE_PASSES,
    MAX_NEGOTIATION_ROUNDS,
};
use rental_core::error::TransactionError;
use rental_core::types::{
    Balance, ChainTip, ProtocolParameters, Transaction, TransactionBody, TxOutput, Utxo, WitnessSet,
};

use crate::coin_selection::{CoinSelection, RandomImprove, SelectionRequest, SelectionStrategy};
use crate::error::WalletError;
use crate::witness::WitnessStage;

/// A fee-converged transaction without witnesses.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    /// Body with an empty witness set.
    pub tx: Transaction,
    /// Selection the body was built from. Its change is gross of the fee.
    pub selection: CoinSelection,
    /// Requested payment outputs.
    pub payments: Vec<TxOutput>,
    /// Witness count the fee was converged for.
    pub witness_count: usize,
    /// Size of the draft with placeholder witnesses.
    pub draft_size: usize,
    /// Parameters the fee was computed with.
    pub params: ProtocolParameters,
}

impl UnsignedTransaction {
    pub fn fee(&self) -> u64 {
        self.tx.body.fee
    }

    /// Body CBOR as lowercase hex.
    pub fn body_hex(&self) -> Result<String, WalletError> {
        Ok(hex::encode(self.tx.body.to_cbor()?))
    }
}

/// Stateless assembly steps.
pub struct TransactionAssembler;

impl TransactionAssembler {
    /// Assemble a body paying `outputs` from `inputs`, returning `change` to
    /// the sender and deducting the fee from the last pure-ADA change output.
    ///
    /// `change` is gross: the fee has not been taken out yet.
    pub fn build(
        inputs: &[Utxo],
        outputs: &[TxOutput],
        change: &[TxOutput],
        params: &ProtocolParameters,
        ttl: u64,
        witness_count: usize,
    ) -> Result<Transaction, WalletError> {
        if inputs.is_empty() {
            return Err(WalletError::BuildError("no inputs".into()));
        }
        let mut seen = HashSet::with_capacity(inputs.len());
        for u in inputs {
            if !seen.insert(u.outpoint) {
                return Err(WalletError::DuplicateUtxo(u.outpoint.to_string()));
            }
        }
        let mut sorted: Vec<&Utxo> = inputs.iter().collect();
        sorted.sort_by_key(|u| u.outpoint);

        let designated = change
            .iter()
            .rposition(|o| o.is_change() && o.balance.is_pure_ada())
            .ok_or(WalletError::NoChangeOutput)?;
        let gross = change[designated].balance.lovelace;
        let change_floor = params.min_lovelace_for(&change[designated].address, &Balance::default())?;

        let draft_body = |fee: u64| -> Result<TransactionBody, WalletError> {
            let net = gross
                .checked_sub(fee)
                .ok_or(WalletError::ChangeBelowMinimum { have: 0, need: change_floor, fee })?;
            let mut all = Vec::with_capacity(outputs.len() + change.len());
            all.extend_from_slice(outputs);
            all.extend_from_slice(change);
            all[outputs.len() + designated].balance.lovelace = net;
            Ok(TransactionBody {
                inputs: sorted.iter().map(|u| u.outpoint).collect(),
                outputs: all,
                fee,
                ttl,
            })
        };

        let mut fee = params.min_fee_b;
        let mut converged = None;
        for pass in 1..=MAX_FEE_PASSES {
            let draft = Transaction { body: draft_body(fee)?, witnesses: WitnessSet::mock(witness_count) };
            let size = draft.size()?;
            let required = params.min_fee(size)?;
            debug!(pass, size, fee, required, "fee pass");
            if required <= fee {
                converged = Some((draft, size));
                break;
            }
            fee = required;
        }
        let (draft, size) = converged.ok_or(WalletError::FeeDidNotConverge { passes: MAX_FEE_PASSES })?;

        for (index, output) in draft.body.outputs.iter().enumerate() {
            let need = params.min_ada(output)?;
            if output.balance.lovelace >= need {
                continue;
            }
            if index == outputs.len() + designated {
                return Err(WalletError::ChangeBelowMinimum { have: output.balance.lovelace, need, fee });
            }
            return Err(WalletError::OutputBelowMinimum { index, have: output.balance.lovelace, need });
        }
        if size as u64 > params.max_tx_size {
            return Err(WalletError::TransactionTooLarge { size, max: params.max_tx_size });
        }

        check_conservation(inputs, &draft.body)?;
        Ok(Transaction { body: draft.body, witnesses: WitnessSet::default() })
    }

    /// Attach witnesses from `stage`.
    ///
    /// When the signed transaction needs a higher fee than the body carries
    /// (the stage produced more witnesses than the draft assumed), the body is
    /// re-converged for the actual count and signed once more.
    pub fn finalize(
        unsigned: &UnsignedTransaction,
        stage: &dyn WitnessStage,
        params: &ProtocolParameters,
    ) -> Result<Transaction, WalletError> {
        let witnesses = stage.witness(&unsigned.tx.body)?;
        let signed = Transaction { body: unsigned.tx.body.clone(), witnesses };
        if fee_covers(&signed, params)? {
            return within_limit(signed, params);
        }

        let actual = signed.witnesses.len();
        debug!(expected = unsigned.witness_count, actual, "witness count differs, re-converging fee");
        let body = Self::build(
            &unsigned.selection.inputs,
            &unsigned.payments,
            &unsigned.selection.change,
            params,
            unsigned.tx.body.ttl,
            actual,
        )?
        .body;
        let witnesses = stage.witness(&body)?;
        let signed = Transaction { body, witnesses };
        if !fee_covers(&signed, params)? {
            return Err(WalletError::FeeNotCovered {
                required: params.min_fee(signed.size()?)?,
                fee: signed.body.fee,
            });
        }
        within_limit(signed, params)
    }
}

fn fee_covers(tx: &Transaction, params: &ProtocolParameters) -> Result<bool, WalletError> {
    Ok(params.min_fee(tx.size()?)? <= tx.body.fee)
}

fn within_limit(tx: Transaction, params: &ProtocolParameters) -> Result<Transaction, WalletError> {
    let size = tx.size()?;
    if size as u64 > params.max_tx_size {
        return Err(WalletError::TransactionTooLarge { size, max: params.max_tx_size });
    }
    Ok(tx)
}

/// Inputs must equal outputs plus fee, per asset class.
fn check_conservation(inputs: &[Utxo], body: &TransactionBody) -> Result<(), WalletError> {
    let consumed = Balance::sum(inputs.iter().map(|u| &u.balance))?;
    let produced = body
        .output_total()?
        .checked_add(&Balance::from_lovelace(body.fee))?;
    if consumed != produced {
        return Err(WalletError::ConservationViolation(format!(
            "inputs carry {} lovelace, outputs plus fee {}",
            consumed.lovelace, produced.lovelace
        )));
    }
    Ok(())
}

/// Builder for unsigned transactions.
///
/// # Example
/// ```ignore
/// let mut builder = TransactionBuilder::new();
/// builder.add_payment(provider, Balance::from_lovelace(2_000_000).with_asset(nft, 1));
/// let unsigned = builder.build(&utxos, user.base_address(), &params, &tip)?;
/// let signed = TransactionAssembler::finalize(&unsigned, &ExtendedKeySigner::for_account(&user), &params)?;
/// ```
pub struct TransactionBuilder {
    payments: Vec<TxOutput>,
    ttl_horizon: u64,
    witness_count: usize,
    strategy: Arc<dyn SelectionStrategy>,
}

impl TransactionBuilder {
    /// Builder with random-improve selection, a 2500-slot TTL horizon and two
    /// expected witnesses.
    pub fn new() -> Self {
        Self {
            payments: Vec::new(),
            ttl_horizon: DEFAULT_TTL_HORIZON_SLOTS,
            witness_count: DEFAULT_WITNESS_COUNT,
            strategy: Arc::new(RandomImprove::new()),
        }
    }

    pub fn add_payment(&mut self, address: Address, balance: Balance) -> &mut Self {
        self.payments.push(TxOutput::payment(address, balance));
        self
    }

    /// Slots past the tip after which the transaction expires.
    pub fn set_ttl_horizon(&mut self, slots: u64) -> &mut Self {
        self.ttl_horizon = slots;
        self
    }

    pub fn set_witness_count(&mut self, count: usize) -> &mut Self {
        self.witness_count = count;
        self
    }

    pub fn set_strategy(&mut self, strategy: Arc<dyn SelectionStrategy>) -> &mut Self {
        self.strategy = strategy;
        self
    }

    /// Select inputs from `pool` and assemble a fee-converged body.
    ///
    /// The fee reserve starts at the fee of a typical-size transaction. If
    /// the assembler reports the change too small after the fee, selection
    /// runs again with the reserve raised to that fee.
    pub fn build(
        &self,
        pool: &[Utxo],
        change_address: &Address,
        params: &ProtocolParameters,
        tip: &ChainTip,
    ) -> Result<UnsignedTransaction, WalletError> {
        if self.payments.is_empty() {
            return Err(WalletError::BuildError("no payments".into()));
        }
        let ttl = tip
            .abs_slot
            .checked_add(self.ttl_horizon)
            .ok_or(TransactionError::ValueOverflow)?;

        let mut fee_reserve = params.min_fee(INITIAL_SIZE_ESTIMATE)?;
        let mut last_err = None;
        for round in 1..=MAX_NEGOTIATION_ROUNDS {
            let request = SelectionRequest {
                pool,
                outputs: &self.payments,
                change_address,
                fee_reserve,
                params,
            };
            let selection = self.strategy.select(&request)?;
            match TransactionAssembler::build(
                &selection.inputs,
                &self.payments,
                &selection.change,
                params,
                ttl,
                self.witness_count,
            ) {
                Ok(tx) => {
                    let draft_size = Transaction {
                        body: tx.body.clone(),
                        witnesses: WitnessSet::mock(self.witness_count),
                    }
                    .size()?;
                    info!(
                        strategy = self.strategy.name(),
                        inputs = tx.body.inputs.len(),
                        outputs = tx.body.outputs.len(),
                        fee = tx.body.fee,
                        ttl,
                        "transaction assembled"
                    );
                    return Ok(UnsignedTransaction {
                        tx,
                        selection,
                        payments: self.payments.clone(),
                        witness_count: self.witness_count,
                        draft_size,
                        params: *params,
                    });
                }
                Err(WalletError::ChangeBelowMinimum { have, need, fee }) => {
                    debug!(round, have, need, fee, fee_reserve, "change short after fee, raising reserve");
                    fee_reserve = fee.max(fee_reserve + 1);
                    last_err = Some(WalletError::ChangeBelowMinimum { have, need, fee });
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(WalletError::FeeDidNotConverge { passes: MAX_NEGOTIATION_ROUNDS }))
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin_selection::tests::{ada, nft, params, provider, user, utxo};
    use crate::coin_selection::LargestFirst;
    use crate::keys::Account;
    use crate::mnemonic::tests::phrase_from;
    use crate::mnemonic::SeedPhrase;
    use crate::witness::{verify_witnesses, ExtendedKeySigner};
    use rental_core::address::Network;
    use rental_core::types::VKeyWitness;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tip() -> ChainTip {
        ChainTip { abs_slot: 40_000_000, epoch: 100, block_height: 2_000_000 }
    }

    fn sale_builder() -> TransactionBuilder {
        let mut b = TransactionBuilder::new();
        b.add_payment(provider(), Balance::from_lovelace(2_000_000));
        b.set_strategy(Arc::new(RandomImprove::seeded(9)));
        b
    }

    fn assert_fee_covers_draft(unsigned: &UnsignedTransaction, p: &ProtocolParameters) {
        assert!(unsigned.fee() >= p.min_fee(unsigned.draft_size).unwrap());
    }

    #[test]
    fn builds_sale_from_two_utxos() {
        let pool = vec![ada(1, 1_500_000), ada(2, 3_000_000)];
        let p = params();
        let unsigned = sale_builder().build(&pool, &user(), &p, &tip()).unwrap();

        let body = &unsigned.tx.body;
        assert!(unsigned.tx.witnesses.is_empty());
        assert_eq!(body.ttl, 40_002_500);
        assert_eq!(body.outputs[0].address, provider());
        assert_eq!(body.outputs[0].balance.lovelace, 2_000_000);
        assert_fee_covers_draft(&unsigned, &p);

        let consumed = Balance::sum(unsigned.selection.inputs.iter().map(|u| &u.balance)).unwrap();
        assert_eq!(consumed.lovelace, body.output_total().unwrap().lovelace + body.fee);
        let change = body.outputs.last().unwrap();
        assert!(change.is_change());
        assert!(change.balance.lovelace >= p.min_ada(change).unwrap());
    }

    #[test]
    fn inputs_are_sorted_and_unique() {
        let pool: Vec<Utxo> = (1..=12).rev().map(|i| ada(i, 900_000)).collect();
        let mut b = TransactionBuilder::new();
        b.add_payment(provider(), Balance::from_lovelace(5_000_000));
        b.set_strategy(Arc::new(RandomImprove::seeded(4)));
        let unsigned = b.build(&pool, &user(), &params(), &tip()).unwrap();
        let inputs = &unsigned.tx.body.inputs;
        assert!(inputs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn nft_sale_moves_asset_to_provider() {
        let pool = vec![
            ada(1, 4_000_000),
            utxo(2, Balance::from_lovelace(1_400_000).with_asset(nft(), 1)),
        ];
        let mut b = TransactionBuilder::new();
        b.add_payment(provider(), Balance::from_lovelace(2_000_000).with_asset(nft(), 1));
        b.set_strategy(Arc::new(LargestFirst));
        let unsigned = b.build(&pool, &user(), &params(), &tip()).unwrap();
        let body = &unsigned.tx.body;
        assert_eq!(body.outputs[0].balance.asset(&nft()), 1);
        assert!(body.outputs[1..].iter().all(|o| o.balance.asset(&nft()) == 0));
    }

    #[test]
    fn no_payments_is_build_error() {
        let pool = vec![ada(1, 5_000_000)];
        let err = TransactionBuilder::new().build(&pool, &user(), &params(), &tip()).unwrap_err();
        assert_eq!(err, WalletError::BuildError("no payments".into()));
    }

    #[test]
    fn insufficient_funds_surface_unchanged() {
        let pool = vec![ada(1, 1_000_000)];
        let err = sale_builder().build(&pool, &user(), &params(), &tip()).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { have: 1_000_000, .. }));
    }

    #[test]
    fn assembler_requires_pure_ada_change() {
        let inputs = vec![ada(1, 5_000_000)];
        let outputs = vec![TxOutput::payment(provider(), Balance::from_lovelace(2_000_000))];
        let change = vec![TxOutput::payment(user(), Balance::from_lovelace(3_000_000))];
        let err = TransactionAssembler::build(&inputs, &outputs, &change, &params(), 10, 2).unwrap_err();
        assert_eq!(err, WalletError::NoChangeOutput);
    }

    #[test]
    fn assembler_reports_change_below_minimum() {
        let inputs = vec![ada(1, 3_100_000)];
        let outputs = vec![TxOutput::payment(provider(), Balance::from_lovelace(2_000_000))];
        let change = vec![TxOutput::change(user(), Balance::from_lovelace(1_100_000))];
        let err = TransactionAssembler::build(&inputs, &outputs, &change, &params(), 10, 2).unwrap_err();
        assert!(matches!(err, WalletError::ChangeBelowMinimum { .. }));
    }

    #[test]
    fn assembler_detects_conservation_violation() {
        let inputs = vec![ada(1, 6_000_000)];
        let outputs = vec![TxOutput::payment(provider(), Balance::from_lovelace(2_000_000))];
        let change = vec![TxOutput::change(user(), Balance::from_lovelace(3_000_000))];
        let err = TransactionAssembler::build(&inputs, &outputs, &change, &params(), 10, 2).unwrap_err();
        assert!(matches!(err, WalletError::ConservationViolation(_)));
    }

    #[test]
    fn assembler_rejects_oversized_transaction() {
        let inputs = vec![ada(1, 5_000_000)];
        let outputs = vec![TxOutput::payment(provider(), Balance::from_lovelace(2_000_000))];
        let change = vec![TxOutput::change(user(), Balance::from_lovelace(3_000_000))];
        let p = ProtocolParameters { max_tx_size: 100, ..params() };
        let err = TransactionAssembler::build(&inputs, &outputs, &change, &p, 10, 2).unwrap_err();
        assert!(matches!(err, WalletError::TransactionTooLarge { max: 100, .. }));
    }

    #[test]
    fn fee_grows_with_input_count() {
        let p = params();
        let outputs = vec![TxOutput::payment(provider(), Balance::from_lovelace(2_000_000))];
        let one = vec![ada(1, 6_000_000)];
        let three = vec![ada(1, 2_000_000), ada(2, 2_000_000), ada(3, 2_000_000)];
        let change = vec![TxOutput::change(user(), Balance::from_lovelace(4_000_000))];
        let a = TransactionAssembler::build(&one, &outputs, &change, &p, 10, 2).unwrap();
        let b = TransactionAssembler::build(&three, &outputs, &change, &p, 10, 2).unwrap();
        assert!(b.body.fee > a.body.fee);
    }

    fn account() -> Account {
        let phrase = SeedPhrase::parse(&phrase_from(&[0x5A; 32])).unwrap();
        Account::derive(&phrase, Network::Preprod, 0).unwrap()
    }

    #[test]
    fn finalize_signs_without_changing_body() {
        let pool = vec![ada(1, 1_500_000), ada(2, 3_000_000)];
        let p = params();
        let unsigned = sale_builder().build(&pool, &user(), &p, &tip()).unwrap();
        let acct = account();
        let signed = TransactionAssembler::finalize(&unsigned, &ExtendedKeySigner::for_account(&acct), &p).unwrap();
        assert_eq!(signed.body, unsigned.tx.body);
        assert_eq!(signed.witnesses.len(), 2);
        assert_eq!(signed.size().unwrap(), unsigned.draft_size);
        verify_witnesses(&signed.body, &signed.witnesses).unwrap();
    }

    /// Emits `base + calls` placeholder witnesses, growing on every call.
    struct GrowingStage {
        base: usize,
        calls: AtomicUsize,
    }

    impl WitnessStage for GrowingStage {
        fn witness(&self, _body: &TransactionBody) -> Result<WitnessSet, WalletError> {
            let n = self.base + self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(WitnessSet { vkeys: (0..n).map(|i| VKeyWitness::mock(i as u8)).collect() })
        }
    }

    #[test]
    fn finalize_reconverges_for_extra_witness() {
        let pool = vec![ada(1, 1_500_000), ada(2, 3_000_000)];
        let p = params();
        let unsigned = sale_builder().build(&pool, &user(), &p, &tip()).unwrap();
        let stage = GrowingStage { base: 3, calls: AtomicUsize::new(0) };
        // 3 witnesses on the first call, then 4: only the first mismatch is
        // absorbed.
        let err = TransactionAssembler::finalize(&unsigned, &stage, &p).unwrap_err();
        assert!(matches!(err, WalletError::FeeNotCovered { .. }));
    }

    /// Always emits the same number of placeholder witnesses.
    struct FixedStage(usize);

    impl WitnessStage for FixedStage {
        fn witness(&self, _body: &TransactionBody) -> Result<WitnessSet, WalletError> {
            Ok(WitnessSet::mock(self.0))
        }
    }

    #[test]
    fn finalize_absorbs_stable_witness_mismatch() {
        let pool = vec![ada(1, 1_500_000), ada(2, 3_000_000)];
        let p = params();
        let unsigned = sale_builder().build(&pool, &user(), &p, &tip()).unwrap();
        let signed = TransactionAssembler::finalize(&unsigned, &FixedStage(3), &p).unwrap();
        assert_eq!(signed.witnesses.len(), 3);
        assert!(signed.body.fee > unsigned.fee());
        assert!(p.min_fee(signed.size().unwrap()).unwrap() <= signed.body.fee);
    }

    #[test]
    fn ttl_overflow_rejected() {
        let pool = vec![ada(1, 5_000_000)];
        let tip = ChainTip { abs_slot: u64::MAX, epoch: 0, block_height: 0 };
        let err = sale_builder().build(&pool, &user(), &params(), &tip).unwrap_err();
        assert_eq!(err, WalletError::Transaction(TransactionError::ValueOverflow));
    }

    #[test]
    fn body_hex_is_body_cbor() {
        let pool = vec![ada(1, 5_000_000)];
        let unsigned = sale_builder().build(&pool, &user(), &params(), &tip()).unwrap();
        assert_eq!(hex::decode(unsigned.body_hex().unwrap()).unwrap(), unsigned.tx.body.to_cbor().unwrap());
    }
}
