//! Settlement contract: the on-chain authority for proxy-settled tokens.
//!
//! Two halves live here. The `abigen!` bindings give the payer read access to
//! the deployed contract (sequential nonces, domain separator) and give a
//! facilitator the `settleERC20` call surface. [`SettlementContract`] is the
//! executable model of the contract's state machine (nonce ledger, fee
//! governance with a 24-hour timelock, facilitator allowlist, pause flag and
//! two-step ownership) and is what the replay and timelock properties are
//! tested against.

use crate::eip712::{self, PROXY_DOMAIN_NAME, PROXY_DOMAIN_VERSION};
use crate::errors::{Result, X402Error};
use ethers::contract::abigen;
use ethers::providers::{Http, Provider};
use ethers::types::{Address, H256, U256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

abigen!(
    SettlementProxy,
    r#"[
        function settleERC20(address token, address from, address to, uint256 value, uint256 nonce, uint256 validAfter, uint256 validBefore, bytes signature) external
        function getNonce(address user, address token) external view returns (uint256)
        function DOMAIN_SEPARATOR() external view returns (bytes32)
    ]"#
);

/// Fee cap: 500 basis points = 5%.
pub const MAX_FEE_BPS: u16 = 500;

/// Mandatory delay between proposing and executing a fee change.
pub const FEE_TIMELOCK_SECS: u64 = 24 * 60 * 60;

const BPS_DENOMINATOR: u64 = 10_000;

/// Reads the next sequential nonce for (user, token) from the deployed
/// settlement contract.
///
/// The payer calls this immediately before signing; a concurrent payment from
/// the same payer/token can still invalidate it between fetch and settlement,
/// which the contract resolves as a clean nonce-mismatch rejection.
pub async fn next_payment_nonce(
    provider: Arc<Provider<Http>>,
    proxy: Address,
    user: Address,
    token: Address,
) -> Result<U256> {
    let contract = SettlementProxy::new(proxy, provider);
    contract
        .get_nonce(user, token)
        .call()
        .await
        .map_err(|e| X402Error::Blockchain {
            reason: format!("getNonce() failed on {:?}: {}", proxy, e),
        })
}

/// Fund movement the contract model runs against.
pub trait TokenLedger {
    /// Moves `value` of `token` from `from` to `to`.
    fn transfer(&mut self, token: Address, from: Address, to: Address, value: U256) -> Result<()>;

    /// Current balance of `holder` in `token`.
    fn balance_of(&self, token: Address, holder: Address) -> U256;
}

/// In-memory ledger used by tests and simulations.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: HashMap<(Address, Address), U256>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `holder` with `value` of `token`.
    pub fn mint(&mut self, token: Address, holder: Address, value: U256) {
        let balance = self.balances.entry((token, holder)).or_default();
        *balance += value;
    }
}

impl TokenLedger for InMemoryLedger {
    fn transfer(&mut self, token: Address, from: Address, to: Address, value: U256) -> Result<()> {
        let from_balance = self.balances.get(&(token, from)).copied().unwrap_or_default();
        if from_balance < value {
            return Err(X402Error::SettlementFailed {
                reason: format!("insufficient balance: {} < {}", from_balance, value),
            });
        }
        self.balances.insert((token, from), from_balance - value);
        let to_balance = self.balances.entry((token, to)).or_default();
        *to_balance += value;
        Ok(())
    }

    fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.balances.get(&(token, holder)).copied().unwrap_or_default()
    }
}

/// Parameters of one `settleERC20` call.
#[derive(Debug, Clone)]
pub struct SettleParams {
    /// Token being moved
    pub token: Address,
    /// Payer (must match the recovered signer)
    pub from: Address,
    /// Payee
    pub to: Address,
    /// Amount in atomic units
    pub value: U256,
    /// Sequential nonce for (from, token)
    pub nonce: U256,
    /// Validity window start (unix seconds)
    pub valid_after: U256,
    /// Validity window end (unix seconds)
    pub valid_before: U256,
    /// 65-byte EIP-712 signature over the `ERC20Payment` digest, hex
    pub signature: String,
}

/// Emitted once per successful settlement, with the caller for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEvent {
    /// Token settled
    pub token: Address,
    /// Payer
    pub from: Address,
    /// Payee
    pub to: Address,
    /// Gross amount
    pub value: U256,
    /// Fee retained by the contract
    pub fee: U256,
    /// Consumed nonce
    pub nonce: U256,
    /// The allowlisted facilitator that submitted the settlement
    pub facilitator: Address,
}

#[derive(Debug, Clone, Copy)]
struct PendingFee {
    new_bps: u16,
    activates_at: u64,
}

/// Executable model of the settlement contract state machine.
#[derive(Debug)]
pub struct SettlementContract {
    address: Address,
    chain_id: U256,
    owner: Address,
    pending_owner: Option<Address>,
    facilitators: HashSet<Address>,
    fee_bps: u16,
    pending_fee: Option<PendingFee>,
    paused: bool,
    nonces: HashMap<(Address, Address), U256>,
    collected_fees: HashMap<Address, U256>,
    entered: bool,
    events: Vec<SettlementEvent>,
}

impl SettlementContract {
    /// Deploys the model at `address` on `chain_id` with the given owner and
    /// zero fee.
    pub fn new(address: Address, chain_id: U256, owner: Address) -> Self {
        Self {
            address,
            chain_id,
            owner,
            pending_owner: None,
            facilitators: HashSet::new(),
            fee_bps: 0,
            pending_fee: None,
            paused: false,
            nonces: HashMap::new(),
            collected_fees: HashMap::new(),
            entered: false,
            events: Vec::new(),
        }
    }

    /// The contract's own address (fee custody, EIP-712 verifying contract).
    pub fn address(&self) -> Address {
        self.address
    }

    /// `DOMAIN_SEPARATOR()`.
    pub fn domain_separator(&self) -> H256 {
        eip712::domain_separator(
            PROXY_DOMAIN_NAME,
            PROXY_DOMAIN_VERSION,
            self.chain_id,
            self.address,
        )
    }

    /// `getNonce(user, token)`: the next expected sequential nonce.
    pub fn nonce_of(&self, user: Address, token: Address) -> U256 {
        self.nonces.get(&(user, token)).copied().unwrap_or_default()
    }

    /// Current fee in basis points.
    pub fn fee_bps(&self) -> u16 {
        self.fee_bps
    }

    /// Whether settlement is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Current owner.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Fees accumulated for a token, awaiting withdrawal.
    pub fn collected_fees(&self, token: Address) -> U256 {
        self.collected_fees.get(&token).copied().unwrap_or_default()
    }

    /// Settlement events in emission order.
    pub fn events(&self) -> &[SettlementEvent] {
        &self.events
    }

    /// `settleERC20`: verifies and executes one payment.
    ///
    /// Callable only by an allowlisted facilitator while unpaused. The stored
    /// nonce is incremented strictly before any transfer so a reentrant call
    /// observes the consumed nonce; a failed transfer restores it and unwinds
    /// any partial leg, matching the deployed contract's wholesale revert.
    pub fn settle<L: TokenLedger>(
        &mut self,
        ledger: &mut L,
        caller: Address,
        now: u64,
        params: &SettleParams,
    ) -> Result<()> {
        if self.entered {
            return Err(X402Error::Unauthorized {
                reason: "reentrant settlement call".to_string(),
            });
        }
        self.entered = true;
        let result = self.settle_inner(ledger, caller, now, params);
        self.entered = false;
        result
    }

    fn settle_inner<L: TokenLedger>(
        &mut self,
        ledger: &mut L,
        caller: Address,
        now: u64,
        params: &SettleParams,
    ) -> Result<()> {
        if !self.facilitators.contains(&caller) {
            return Err(X402Error::Unauthorized {
                reason: format!("{:?} is not an allowlisted facilitator", caller),
            });
        }
        if self.paused {
            return Err(X402Error::Paused);
        }
        if params.value.is_zero() {
            return Err(X402Error::SettlementFailed {
                reason: "value must be nonzero".to_string(),
            });
        }
        if params.to == Address::zero() {
            return Err(X402Error::SettlementFailed {
                reason: "recipient must not be the zero address".to_string(),
            });
        }

        let now = U256::from(now);
        if now < params.valid_after || now > params.valid_before {
            return Err(X402Error::SettlementFailed {
                reason: format!(
                    "authorization outside validity window [{}, {}]",
                    params.valid_after, params.valid_before
                ),
            });
        }

        let stored = self.nonce_of(params.from, params.token);
        if stored != params.nonce {
            return Err(X402Error::NonceMismatch {
                expected: stored.to_string(),
                got: params.nonce.to_string(),
            });
        }
        // Increment before any transfer; a replay now fails the check above.
        self.nonces
            .insert((params.from, params.token), stored + U256::one());

        let digest = eip712::erc20_payment_digest(
            self.chain_id,
            self.address,
            params.token,
            params.from,
            params.to,
            params.value,
            params.nonce,
            params.valid_after,
            params.valid_before,
        );
        let recovered = eip712::recover_signer(digest, &params.signature)?;
        if recovered != params.from {
            return Err(X402Error::Signature {
                reason: format!(
                    "recovered signer {:?} does not match payer {:?}",
                    recovered, params.from
                ),
            });
        }

        let fee = params.value * U256::from(self.fee_bps) / U256::from(BPS_DENOMINATOR);
        let moved = if fee.is_zero() {
            // Zero-fee fast path: one transfer.
            ledger.transfer(params.token, params.from, params.to, params.value)
        } else {
            self.transfer_with_fee(ledger, params, fee)
        };
        if let Err(e) = moved {
            // The deployed contract reverts wholesale; restore the nonce so a
            // failed settlement leaves no trace.
            self.nonces.insert((params.from, params.token), stored);
            return Err(e);
        }

        info!(
            token = ?params.token,
            from = ?params.from,
            to = ?params.to,
            value = %params.value,
            %fee,
            nonce = %params.nonce,
            facilitator = ?caller,
            "payment settled"
        );
        self.events.push(SettlementEvent {
            token: params.token,
            from: params.from,
            to: params.to,
            value: params.value,
            fee,
            nonce: params.nonce,
            facilitator: caller,
        });
        Ok(())
    }

    fn transfer_with_fee<L: TokenLedger>(
        &mut self,
        ledger: &mut L,
        params: &SettleParams,
        fee: U256,
    ) -> Result<()> {
        ledger.transfer(params.token, params.from, params.to, params.value - fee)?;
        if let Err(e) = ledger.transfer(params.token, params.from, self.address, fee) {
            // Unwind the payee leg. It just received exactly this amount, so
            // the reverse transfer cannot fail on a consistent ledger.
            let _ = ledger.transfer(params.token, params.to, params.from, params.value - fee);
            return Err(e);
        }
        let collected = self.collected_fees.entry(params.token).or_default();
        *collected += fee;
        Ok(())
    }

    /// `addFacilitator` (owner only).
    pub fn add_facilitator(&mut self, caller: Address, facilitator: Address) -> Result<()> {
        self.require_owner(caller)?;
        self.facilitators.insert(facilitator);
        Ok(())
    }

    /// `removeFacilitator` (owner only).
    pub fn remove_facilitator(&mut self, caller: Address, facilitator: Address) -> Result<()> {
        self.require_owner(caller)?;
        self.facilitators.remove(&facilitator);
        Ok(())
    }

    /// `proposeFeeChange` (owner only, capped at [`MAX_FEE_BPS`]).
    ///
    /// The change activates [`FEE_TIMELOCK_SECS`] after the proposal, so a
    /// compromised owner cannot instantly raise fees on in-flight signed
    /// authorizations.
    pub fn propose_fee_change(&mut self, caller: Address, new_bps: u16, now: u64) -> Result<()> {
        self.require_owner(caller)?;
        if new_bps > MAX_FEE_BPS {
            return Err(X402Error::Config {
                reason: format!("fee {} bps exceeds cap of {} bps", new_bps, MAX_FEE_BPS),
            });
        }
        self.pending_fee = Some(PendingFee {
            new_bps,
            activates_at: now + FEE_TIMELOCK_SECS,
        });
        Ok(())
    }

    /// `executeFeeChange` (owner only, after the timelock elapses).
    pub fn execute_fee_change(&mut self, caller: Address, now: u64) -> Result<()> {
        self.require_owner(caller)?;
        let pending = self.pending_fee.ok_or_else(|| X402Error::Config {
            reason: "no pending fee change".to_string(),
        })?;
        if now < pending.activates_at {
            return Err(X402Error::TimelockNotElapsed {
                ready_at: pending.activates_at,
            });
        }
        self.fee_bps = pending.new_bps;
        self.pending_fee = None;
        Ok(())
    }

    /// `withdrawFees` (owner only): moves accumulated fees for `token` to `to`.
    pub fn withdraw_fees<L: TokenLedger>(
        &mut self,
        ledger: &mut L,
        caller: Address,
        token: Address,
        to: Address,
    ) -> Result<U256> {
        self.require_owner(caller)?;
        let amount = self.collected_fees(token);
        if !amount.is_zero() {
            ledger.transfer(token, self.address, to, amount)?;
            self.collected_fees.insert(token, U256::zero());
        }
        Ok(amount)
    }

    /// `pause` (owner only): halts settlement, not fee governance.
    pub fn pause(&mut self, caller: Address) -> Result<()> {
        self.require_owner(caller)?;
        self.paused = true;
        Ok(())
    }

    /// `unpause` (owner only).
    pub fn unpause(&mut self, caller: Address) -> Result<()> {
        self.require_owner(caller)?;
        self.paused = false;
        Ok(())
    }

    /// First half of the two-step ownership transfer (owner only).
    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> Result<()> {
        self.require_owner(caller)?;
        self.pending_owner = Some(new_owner);
        Ok(())
    }

    /// Second half: the pending owner claims ownership.
    pub fn accept_ownership(&mut self, caller: Address) -> Result<()> {
        if self.pending_owner != Some(caller) {
            return Err(X402Error::Unauthorized {
                reason: "caller is not the pending owner".to_string(),
            });
        }
        self.owner = caller;
        self.pending_owner = None;
        Ok(())
    }

    fn require_owner(&self, caller: Address) -> Result<()> {
        if caller != self.owner {
            return Err(X402Error::Unauthorized {
                reason: "caller is not the owner".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eip712::signature_to_hex;
    use ethers::signers::{LocalWallet, Signer};

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    struct Fixture {
        contract: SettlementContract,
        ledger: InMemoryLedger,
        payer: LocalWallet,
        facilitator: Address,
        token: Address,
        payee: Address,
    }

    fn fixture() -> Fixture {
        let owner = addr(0x01);
        let mut contract = SettlementContract::new(addr(0xaa), U256::from(8453u64), owner);
        let facilitator = addr(0xfa);
        contract.add_facilitator(owner, facilitator).unwrap();

        let payer = LocalWallet::new(&mut rand::thread_rng());
        let token = addr(0x70);
        let mut ledger = InMemoryLedger::new();
        ledger.mint(token, payer.address(), U256::from(1_000_000u64));

        Fixture {
            contract,
            ledger,
            payer,
            facilitator,
            token,
            payee: addr(0x99),
        }
    }

    fn signed_params(f: &Fixture, value: u64, nonce: u64, now: u64) -> SettleParams {
        let digest = eip712::erc20_payment_digest(
            U256::from(8453u64),
            f.contract.address(),
            f.token,
            f.payer.address(),
            f.payee,
            U256::from(value),
            U256::from(nonce),
            U256::from(now - 60),
            U256::from(now + 300),
        );
        let signature = f.payer.sign_hash(digest).unwrap();
        SettleParams {
            token: f.token,
            from: f.payer.address(),
            to: f.payee,
            value: U256::from(value),
            nonce: U256::from(nonce),
            valid_after: U256::from(now - 60),
            valid_before: U256::from(now + 300),
            signature: signature_to_hex(&signature),
        }
    }

    #[test]
    fn test_settle_moves_funds_and_emits_event() {
        let mut f = fixture();
        let now = 1_700_000_000u64;
        let params = signed_params(&f, 10_000, 0, now);

        f.contract
            .settle(&mut f.ledger, f.facilitator, now, &params)
            .unwrap();

        assert_eq!(f.ledger.balance_of(f.token, f.payee), U256::from(10_000u64));
        assert_eq!(f.contract.nonce_of(f.payer.address(), f.token), U256::one());
        assert_eq!(f.contract.events().len(), 1);
        assert_eq!(f.contract.events()[0].facilitator, f.facilitator);
        assert_eq!(f.contract.events()[0].fee, U256::zero());
    }

    #[test]
    fn test_replay_rejected_on_second_submission() {
        let mut f = fixture();
        let now = 1_700_000_000u64;
        let params = signed_params(&f, 10_000, 0, now);

        f.contract
            .settle(&mut f.ledger, f.facilitator, now, &params)
            .unwrap();
        let err = f
            .contract
            .settle(&mut f.ledger, f.facilitator, now, &params)
            .unwrap_err();

        assert!(matches!(err, X402Error::NonceMismatch { .. }));
        // Funds moved exactly once.
        assert_eq!(f.ledger.balance_of(f.token, f.payee), U256::from(10_000u64));
    }

    #[test]
    fn test_non_allowlisted_caller_rejected() {
        let mut f = fixture();
        let now = 1_700_000_000u64;
        let params = signed_params(&f, 10_000, 0, now);
        let err = f
            .contract
            .settle(&mut f.ledger, addr(0xbad), now, &params)
            .unwrap_err();
        assert!(matches!(err, X402Error::Unauthorized { .. }));
    }

    #[test]
    fn test_zero_value_and_zero_recipient_rejected() {
        let mut f = fixture();
        let now = 1_700_000_000u64;

        let mut zero_value = signed_params(&f, 10_000, 0, now);
        zero_value.value = U256::zero();
        assert!(f
            .contract
            .settle(&mut f.ledger, f.facilitator, now, &zero_value)
            .is_err());

        let mut zero_to = signed_params(&f, 10_000, 0, now);
        zero_to.to = Address::zero();
        assert!(f
            .contract
            .settle(&mut f.ledger, f.facilitator, now, &zero_to)
            .is_err());
    }

    #[test]
    fn test_validity_window_enforced() {
        let mut f = fixture();
        let now = 1_700_000_000u64;
        let params = signed_params(&f, 10_000, 0, now);

        // Too early and too late.
        assert!(f
            .contract
            .settle(&mut f.ledger, f.facilitator, now - 3_600, &params)
            .is_err());
        assert!(f
            .contract
            .settle(&mut f.ledger, f.facilitator, now + 3_600, &params)
            .is_err());
    }

    #[test]
    fn test_tampered_value_fails_signature_check() {
        let mut f = fixture();
        let now = 1_700_000_000u64;
        let mut params = signed_params(&f, 10_000, 0, now);
        params.value = U256::from(999_999u64);

        let err = f
            .contract
            .settle(&mut f.ledger, f.facilitator, now, &params)
            .unwrap_err();
        assert!(matches!(err, X402Error::Signature { .. }));
    }

    #[test]
    fn test_fee_split_and_withdrawal() {
        let mut f = fixture();
        let owner = f.contract.owner();
        let now = 1_700_000_000u64;

        // 2.5% fee after the timelock.
        f.contract.propose_fee_change(owner, 250, now).unwrap();
        f.contract
            .execute_fee_change(owner, now + FEE_TIMELOCK_SECS)
            .unwrap();
        assert_eq!(f.contract.fee_bps(), 250);

        let settle_at = now + FEE_TIMELOCK_SECS + 10;
        let params = signed_params(&f, 10_000, 0, settle_at);
        f.contract
            .settle(&mut f.ledger, f.facilitator, settle_at, &params)
            .unwrap();

        // 10_000 * 250 / 10_000 = 250 fee.
        assert_eq!(f.ledger.balance_of(f.token, f.payee), U256::from(9_750u64));
        assert_eq!(f.contract.collected_fees(f.token), U256::from(250u64));

        let treasury = addr(0x77);
        let withdrawn = f
            .contract
            .withdraw_fees(&mut f.ledger, owner, f.token, treasury)
            .unwrap();
        assert_eq!(withdrawn, U256::from(250u64));
        assert_eq!(f.ledger.balance_of(f.token, treasury), U256::from(250u64));
        assert_eq!(f.contract.collected_fees(f.token), U256::zero());
    }

    struct RejectingLedger {
        inner: InMemoryLedger,
        reject_to: Option<Address>,
    }

    impl TokenLedger for RejectingLedger {
        fn transfer(
            &mut self,
            token: Address,
            from: Address,
            to: Address,
            value: U256,
        ) -> Result<()> {
            if Some(to) == self.reject_to {
                return Err(X402Error::SettlementFailed {
                    reason: "transfer rejected".to_string(),
                });
            }
            self.inner.transfer(token, from, to, value)
        }

        fn balance_of(&self, token: Address, holder: Address) -> U256 {
            self.inner.balance_of(token, holder)
        }
    }

    #[test]
    fn test_failed_fee_leg_unwinds_settlement() {
        let mut f = fixture();
        let owner = f.contract.owner();
        let now = 1_700_000_000u64;
        f.contract.propose_fee_change(owner, 250, now).unwrap();
        f.contract
            .execute_fee_change(owner, now + FEE_TIMELOCK_SECS)
            .unwrap();

        let settle_at = now + FEE_TIMELOCK_SECS + 10;
        let params = signed_params(&f, 10_000, 0, settle_at);

        // The fee leg pays the contract; reject transfers to it.
        let mut ledger = RejectingLedger {
            inner: std::mem::take(&mut f.ledger),
            reject_to: Some(f.contract.address()),
        };
        let err = f
            .contract
            .settle(&mut ledger, f.facilitator, settle_at, &params)
            .unwrap_err();
        assert!(matches!(err, X402Error::SettlementFailed { .. }));

        // No partial state: payee refunded, nonce unconsumed, no fees kept.
        assert_eq!(ledger.balance_of(f.token, f.payee), U256::zero());
        assert_eq!(
            ledger.balance_of(f.token, f.payer.address()),
            U256::from(1_000_000u64)
        );
        assert_eq!(f.contract.nonce_of(f.payer.address(), f.token), U256::zero());
        assert_eq!(f.contract.collected_fees(f.token), U256::zero());

        // The same authorization settles once the ledger recovers.
        ledger.reject_to = None;
        f.contract
            .settle(&mut ledger, f.facilitator, settle_at, &params)
            .unwrap();
        assert_eq!(ledger.balance_of(f.token, f.payee), U256::from(9_750u64));
        assert_eq!(f.contract.collected_fees(f.token), U256::from(250u64));
    }

    #[test]
    fn test_timelock_blocks_early_execution() {
        let mut f = fixture();
        let owner = f.contract.owner();
        let now = 1_700_000_000u64;

        f.contract.propose_fee_change(owner, 100, now).unwrap();
        let err = f
            .contract
            .execute_fee_change(owner, now + FEE_TIMELOCK_SECS - 1)
            .unwrap_err();
        assert!(matches!(err, X402Error::TimelockNotElapsed { .. }));
        assert_eq!(f.contract.fee_bps(), 0);

        f.contract
            .execute_fee_change(owner, now + FEE_TIMELOCK_SECS)
            .unwrap();
        assert_eq!(f.contract.fee_bps(), 100);
    }

    #[test]
    fn test_fee_cap_enforced_at_proposal() {
        let mut f = fixture();
        let owner = f.contract.owner();
        let err = f
            .contract
            .propose_fee_change(owner, MAX_FEE_BPS + 1, 0)
            .unwrap_err();
        assert!(matches!(err, X402Error::Config { .. }));
    }

    #[test]
    fn test_pause_halts_settlement_not_governance() {
        let mut f = fixture();
        let owner = f.contract.owner();
        let now = 1_700_000_000u64;

        f.contract.pause(owner).unwrap();
        let params = signed_params(&f, 10_000, 0, now);
        assert!(matches!(
            f.contract.settle(&mut f.ledger, f.facilitator, now, &params),
            Err(X402Error::Paused)
        ));

        // Governance still runs while paused.
        f.contract.propose_fee_change(owner, 50, now).unwrap();

        f.contract.unpause(owner).unwrap();
        f.contract
            .settle(&mut f.ledger, f.facilitator, now, &params)
            .unwrap();
    }

    #[test]
    fn test_two_step_ownership_transfer() {
        let mut f = fixture();
        let owner = f.contract.owner();
        let next = addr(0x42);

        f.contract.transfer_ownership(owner, next).unwrap();
        // Still the old owner until accepted.
        assert_eq!(f.contract.owner(), owner);
        assert!(f.contract.accept_ownership(addr(0x43)).is_err());

        f.contract.accept_ownership(next).unwrap();
        assert_eq!(f.contract.owner(), next);
        // Old owner lost governance rights.
        assert!(f.contract.pause(owner).is_err());
    }

    #[test]
    fn test_domain_separator_is_stable() {
        let f = fixture();
        assert_eq!(f.contract.domain_separator(), f.contract.domain_separator());
        assert_ne!(f.contract.domain_separator(), H256::zero());
    }
}
