//! UTXO coin selection.
//!
//! Strategies pick inputs covering the requested outputs plus a fee reserve
//! and compute the change that returns the leftover to the sender:
//!
//! - [`RandomImprove`]: per asset class (native assets first, lovelace
//!   last) sample unused UTXOs at random until the class is covered, then
//!   try to move the class total toward twice its target by adding or
//!   swapping inputs. Sampling is bounded; a sparse pool falls back to
//!   largest-first.
//! - [`LargestFirst`]: deterministic, largest contribution first.
//!
//! Both emit one change output per leftover native asset (carrying its
//! minimum ADA) and one trailing pure-ADA change output that later absorbs
//! the fee.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tracing::debug;

use rental_core::address::Address;
use rental_core::types::{AssetId, Balance, ProtocolParameters, TxOutput, Utxo};

use crate::error::WalletError;

/// Random samples spent per asset class before falling back to largest-first.
pub const MAX_RANDOM_ATTEMPTS: usize = 64;

/// Improvement candidates examined per asset class.
pub const MAX_IMPROVE_ATTEMPTS: usize = 32;

/// Inputs to one selection.
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    /// Candidate UTXOs owned by the sender.
    pub pool: &'a [Utxo],
    /// Outputs that must be funded.
    pub outputs: &'a [TxOutput],
    /// Where change goes.
    pub change_address: &'a Address,
    /// Lovelace kept in the pure-ADA change output, beyond its minimum, to
    /// pay the fee.
    pub fee_reserve: u64,
    pub params: &'a ProtocolParameters,
}

/// Result of coin selection.
#[derive(Debug, Clone)]
pub struct CoinSelection {
    /// Selected inputs, in selection order. Never contains duplicates.
    pub inputs: Vec<Utxo>,
    /// Change outputs. The last one is pure ADA and carries the fee reserve.
    pub change: Vec<TxOutput>,
    /// Reserve the selection was computed against.
    pub fee_reserve: u64,
}

impl CoinSelection {
    pub fn input_total(&self) -> Result<Balance, WalletError> {
        Ok(Balance::sum(self.inputs.iter().map(|u| &u.balance))?)
    }

    pub fn change_total(&self) -> Result<Balance, WalletError> {
        Ok(Balance::sum(self.change.iter().map(|o| &o.balance))?)
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn change_count(&self) -> usize {
        self.change.len()
    }
}

/// An injectable coin-selection policy.
pub trait SelectionStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Select inputs and compute change. Fails with
    /// [`WalletError::InsufficientFunds`] or
    /// [`WalletError::InsufficientAsset`] when the pool cannot cover the
    /// request, never with a partial result.
    fn select(&self, request: &SelectionRequest<'_>) -> Result<CoinSelection, WalletError>;
}

// ---------------------------------------------------------------------------
// Shared machinery
// ---------------------------------------------------------------------------

/// A selection dimension. Natives order before lovelace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum AssetClass {
    Native(AssetId),
    Lovelace,
}

fn quantity(utxo: &Utxo, class: &AssetClass) -> u64 {
    match class {
        AssetClass::Native(id) => utxo.balance.asset(id),
        AssetClass::Lovelace => utxo.balance.lovelace,
    }
}

type Targets = Vec<(AssetClass, u64)>;

/// Validate the request and return per-class targets plus the required total.
fn prepare(req: &SelectionRequest<'_>) -> Result<(Targets, Balance), WalletError> {
    if req.outputs.is_empty() {
        return Err(WalletError::BuildError("no outputs requested".into()));
    }
    for (index, output) in req.outputs.iter().enumerate() {
        let need = req.params.min_ada(output)?;
        if output.balance.lovelace < need {
            return Err(WalletError::OutputBelowMinimum { index, have: output.balance.lovelace, need });
        }
    }

    let mut seen = HashSet::with_capacity(req.pool.len());
    for utxo in req.pool {
        if utxo.balance.lovelace == 0 {
            return Err(WalletError::InvalidUtxo(format!("{} carries no lovelace", utxo.outpoint)));
        }
        if !seen.insert(utxo.outpoint) {
            return Err(WalletError::DuplicateUtxo(utxo.outpoint.to_string()));
        }
    }

    let required = Balance::sum(req.outputs.iter().map(|o| &o.balance))?;
    let available = Balance::sum(req.pool.iter().map(|u| &u.balance))?;

    let mut targets = Vec::new();
    for (id, need) in required.assets() {
        let have = available.asset(id);
        if have < need {
            return Err(WalletError::InsufficientAsset { asset: id.to_string(), have, need });
        }
        targets.push((AssetClass::Native(id.clone()), need));
    }

    let need = required
        .lovelace
        .checked_add(req.fee_reserve)
        .ok_or(rental_core::error::TransactionError::ValueOverflow)?;
    if available.lovelace < need {
        return Err(WalletError::InsufficientFunds { have: available.lovelace, need });
    }
    targets.push((AssetClass::Lovelace, need));
    Ok((targets, required))
}

/// Which pool entries are selected, in order.
struct Selector<'a> {
    pool: &'a [Utxo],
    used: Vec<bool>,
    order: Vec<usize>,
}

impl<'a> Selector<'a> {
    fn new(pool: &'a [Utxo]) -> Self {
        Self { pool, used: vec![false; pool.len()], order: Vec::new() }
    }

    fn total(&self, class: &AssetClass) -> u64 {
        self.order
            .iter()
            .fold(0u64, |acc, &i| acc.saturating_add(quantity(&self.pool[i], class)))
    }

    fn add(&mut self, i: usize) {
        debug_assert!(!self.used[i]);
        self.used[i] = true;
        self.order.push(i);
    }

    fn replace(&mut self, position: usize, i: usize) {
        let old = self.order[position];
        self.used[old] = false;
        self.used[i] = true;
        self.order[position] = i;
    }

    /// Unused pool indices contributing to `class`.
    fn candidates(&self, class: &AssetClass) -> Vec<usize> {
        (0..self.pool.len())
            .filter(|&i| !self.used[i] && quantity(&self.pool[i], class) > 0)
            .collect()
    }

    /// Add the largest contributors to `class` until `target` is reached.
    fn largest_first(&mut self, class: &AssetClass, target: u64) {
        let mut candidates = self.candidates(class);
        candidates.sort_by(|&a, &b| {
            quantity(&self.pool[b], class)
                .cmp(&quantity(&self.pool[a], class))
                .then(self.pool[a].outpoint.cmp(&self.pool[b].outpoint))
        });
        for i in candidates {
            if self.total(class) >= target {
                break;
            }
            self.add(i);
        }
    }

    fn covers(&self, targets: &[(AssetClass, u64)]) -> bool {
        targets.iter().all(|(class, target)| self.total(class) >= *target)
    }

    fn inputs(&self) -> Vec<Utxo> {
        self.order.iter().map(|&i| self.pool[i].clone()).collect()
    }
}

/// Change outputs for a leftover, and the lovelace they need in total
/// (asset change minimums, pure-ADA change minimum, fee reserve).
fn plan_change(leftover: &Balance, req: &SelectionRequest<'_>) -> Result<(Vec<TxOutput>, u64), WalletError> {
    let mut change = Vec::new();
    let mut asset_ada: u64 = 0;
    for (id, qty) in leftover.assets() {
        let mut bundle = Balance::default().with_asset(id.clone(), qty);
        bundle.lovelace = req.params.min_lovelace_for(req.change_address, &bundle)?;
        asset_ada = asset_ada
            .checked_add(bundle.lovelace)
            .ok_or(rental_core::error::TransactionError::ValueOverflow)?;
        change.push(TxOutput::change(req.change_address.clone(), bundle));
    }

    let ada_min = req.params.min_lovelace_for(req.change_address, &Balance::default())?;
    let needed = asset_ada
        .checked_add(ada_min)
        .and_then(|v| v.checked_add(req.fee_reserve))
        .ok_or(rental_core::error::TransactionError::ValueOverflow)?;

    let ada_change = leftover.lovelace.saturating_sub(asset_ada);
    change.push(TxOutput::change(req.change_address.clone(), Balance::from_lovelace(ada_change)));
    Ok((change, needed))
}

/// Compute change, pulling in more lovelace largest-first until the change
/// outputs and fee reserve are funded.
fn finish(
    mut sel: Selector<'_>,
    req: &SelectionRequest<'_>,
    required: &Balance,
) -> Result<CoinSelection, WalletError> {
    loop {
        let inputs = sel.inputs();
        let total = Balance::sum(inputs.iter().map(|u| &u.balance))?;
        let leftover = total
            .checked_sub(required)
            .ok_or_else(|| WalletError::BuildError("selected inputs do not cover outputs".into()))?;
        let (change, needed) = plan_change(&leftover, req)?;

        if leftover.lovelace >= needed {
            return Ok(CoinSelection { inputs, change, fee_reserve: req.fee_reserve });
        }

        let next = sel
            .candidates(&AssetClass::Lovelace)
            .into_iter()
            .max_by(|&a, &b| {
                sel.pool[a]
                    .balance
                    .lovelace
                    .cmp(&sel.pool[b].balance.lovelace)
                    .then(sel.pool[b].outpoint.cmp(&sel.pool[a].outpoint))
            });
        match next {
            Some(i) => {
                debug!(have = leftover.lovelace, needed, "change underfunded, adding input");
                sel.add(i);
            }
            None => {
                let have = Balance::sum(req.pool.iter().map(|u| &u.balance))?.lovelace;
                let need = required.lovelace.saturating_add(needed);
                return Err(WalletError::InsufficientFunds { have, need });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Random-improve
// ---------------------------------------------------------------------------

/// Randomized selection with an improvement pass.
///
/// Each call builds its own RNG: seeded from the configured value when one
/// is set (same seed, same selection), from OS entropy otherwise.
#[derive(Debug, Clone, Default)]
pub struct RandomImprove {
    seed: Option<u64>,
}

impl RandomImprove {
    /// Production selector drawing fresh entropy per call.
    pub fn new() -> Self {
        Self { seed: None }
    }

    /// Reproducible selector.
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn select_class(
        sel: &mut Selector<'_>,
        rng: &mut StdRng,
        class: &AssetClass,
        target: u64,
        done: &[(AssetClass, u64)],
    ) {
        let pool_len = sel.pool.len();

        // Random phase.
        let mut attempts = 0;
        while sel.total(class) < target {
            if attempts >= MAX_RANDOM_ATTEMPTS {
                debug!(?class, target, "random sampling exhausted, falling back to largest-first");
                sel.largest_first(class, target);
                break;
            }
            attempts += 1;
            let i = rng.gen_range(0..pool_len);
            if sel.used[i] || quantity(&sel.pool[i], class) == 0 {
                continue;
            }
            sel.add(i);
        }

        // Improve phase.
        let ideal = target.saturating_mul(2);
        let ceiling = target.saturating_mul(3);
        for _ in 0..MAX_IMPROVE_ATTEMPTS {
            let candidates = sel.candidates(class);
            if candidates.is_empty() {
                break;
            }
            let c = candidates[rng.gen_range(0..candidates.len())];
            let current = sel.total(class);
            let grown = current.saturating_add(quantity(&sel.pool[c], class));
            if grown <= ceiling && grown.abs_diff(ideal) < current.abs_diff(ideal) {
                sel.add(c);
                continue;
            }
            if let Some(position) = Self::best_swap(sel, c, class, ideal, ceiling, done) {
                sel.replace(position, c);
            }
        }
    }

    /// Position of a selected input that `c` can replace while moving the
    /// class total closer to `ideal` and keeping every covered class covered.
    fn best_swap(
        sel: &Selector<'_>,
        c: usize,
        class: &AssetClass,
        ideal: u64,
        ceiling: u64,
        done: &[(AssetClass, u64)],
    ) -> Option<usize> {
        let current = sel.total(class);
        let mut best: Option<(usize, u64)> = None;
        for (position, &j) in sel.order.iter().enumerate() {
            let out = quantity(&sel.pool[j], class);
            if out == 0 {
                continue;
            }
            let swapped = current - out + quantity(&sel.pool[c], class);
            if swapped > ceiling || swapped.abs_diff(ideal) >= current.abs_diff(ideal) {
                continue;
            }
            let still_covered = done.iter().all(|(cls, target)| {
                let total = sel.total(cls) - quantity(&sel.pool[j], cls);
                total.saturating_add(quantity(&sel.pool[c], cls)) >= *target
            });
            if !still_covered {
                continue;
            }
            let distance = swapped.abs_diff(ideal);
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((position, distance));
            }
        }
        best.map(|(position, _)| position)
    }
}

impl SelectionStrategy for RandomImprove {
    fn name(&self) -> &'static str {
        "random-improve"
    }

    fn select(&self, req: &SelectionRequest<'_>) -> Result<CoinSelection, WalletError> {
        let (targets, required) = prepare(req)?;
        let mut rng = self.rng();
        let mut sel = Selector::new(req.pool);

        for (n, (class, target)) in targets.iter().enumerate() {
            Self::select_class(&mut sel, &mut rng, class, *target, &targets[..=n]);
            if sel.total(class) < *target {
                return Err(WalletError::BuildError(format!("{class:?} not covered after selection")));
            }
        }
        debug_assert!(sel.covers(&targets));

        let selection = finish(sel, req, &required)?;
        debug!(
            strategy = self.name(),
            inputs = selection.input_count(),
            change = selection.change_count(),
            reserve = selection.fee_reserve,
            "coin selection complete"
        );
        Ok(selection)
    }
}

// ---------------------------------------------------------------------------
// Largest-first
// ---------------------------------------------------------------------------

/// Deterministic selection spending the largest contributors first.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestFirst;

impl SelectionStrategy for LargestFirst {
    fn name(&self) -> &'static str {
        "largest-first"
    }

    fn select(&self, req: &SelectionRequest<'_>) -> Result<CoinSelection, WalletError> {
        let (targets, required) = prepare(req)?;
        let mut sel = Selector::new(req.pool);
        for (class, target) in &targets {
            sel.largest_first(class, *target);
        }
        if !sel.covers(&targets) {
            return Err(WalletError::BuildError("largest-first did not cover targets".into()));
        }
        finish(sel, req, &required)
    }
}
