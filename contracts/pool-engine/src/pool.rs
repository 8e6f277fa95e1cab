//! Lending pool state and the transaction wrapper
//!
//! [`LendingPool`] owns the pool balance sheet, the loan table, the share
//! ledger and its collaborators. Public entry points live in the accrual,
//! borrow, liquidation and vault modules; each one runs through
//! [`LendingPool::transact`].

use std::collections::BTreeMap;

use lvpool_common::{
    safe_add, Address, EventLog, EventObserver, Loan, LoanId, PoolConfig, PoolError, PoolEvent,
    PoolId, PoolResult, PoolState, Token, TxType,
};
use sha2::{Digest, Sha256};

use crate::external::{Cfmm, TokenBank};
use crate::guard::ReentrancyLock;
use crate::vault::ShareLedger;
use crate::CallContext;

// ============ Pool ============

pub struct LendingPool<C: Cfmm + Clone, B: TokenBank + Clone> {
    pub(crate) pool_id: PoolId,
    /// Address holding the pool's LP tokens and collateral
    pub(crate) address: Address,
    pub(crate) config: PoolConfig,
    pub(crate) state: PoolState,
    pub(crate) loans: BTreeMap<LoanId, Loan>,
    pub(crate) shares: ShareLedger,
    pub(crate) cfmm: C,
    pub(crate) bank: B,
    pub(crate) loan_nonce: u64,
    events: EventLog,
    observers: Vec<Box<dyn EventObserver>>,
    lock: ReentrancyLock,
}

/// Everything a failed call must roll back
struct Checkpoint<C, B> {
    state: PoolState,
    loans: BTreeMap<LoanId, Loan>,
    shares: ShareLedger,
    cfmm: C,
    bank: B,
    loan_nonce: u64,
    event_count: usize,
}

impl<C: Cfmm + Clone, B: TokenBank + Clone> LendingPool<C, B> {
    pub fn new(
        pool_id: PoolId,
        address: Address,
        config: PoolConfig,
        cfmm: C,
        bank: B,
    ) -> PoolResult<Self> {
        config.validate()?;
        if address == cfmm.address() {
            return Err(PoolError::InvalidAddress { reason: "pool and CFMM share an address" });
        }
        Ok(Self {
            pool_id,
            address,
            config,
            state: PoolState::new(cfmm.asset_count()),
            loans: BTreeMap::new(),
            shares: ShareLedger::default(),
            cfmm,
            bank,
            loan_nonce: 0,
            events: EventLog::new(),
            observers: Vec::new(),
            lock: ReentrancyLock::new(),
        })
    }

    // ============ Transactions ============

    /// Run `op` atomically under the re-entrancy lock.
    ///
    /// On error every owned component is restored and the events appended
    /// by `op` are dropped. On success observers see the new events.
    pub(crate) fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> PoolResult<T>,
    ) -> PoolResult<T> {
        let _guard = self.lock.acquire()?;
        let checkpoint = self.checkpoint();
        match op(self) {
            Ok(value) => {
                self.notify(checkpoint.event_count);
                Ok(value)
            }
            Err(err) => {
                self.restore(checkpoint);
                Err(err)
            }
        }
    }

    fn checkpoint(&self) -> Checkpoint<C, B> {
        Checkpoint {
            state: self.state.clone(),
            loans: self.loans.clone(),
            shares: self.shares.clone(),
            cfmm: self.cfmm.clone(),
            bank: self.bank.clone(),
            loan_nonce: self.loan_nonce,
            event_count: self.events.len(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint<C, B>) {
        self.state = checkpoint.state;
        self.loans = checkpoint.loans;
        self.shares = checkpoint.shares;
        self.cfmm = checkpoint.cfmm;
        self.bank = checkpoint.bank;
        self.loan_nonce = checkpoint.loan_nonce;
        self.events.truncate(checkpoint.event_count);
    }

    fn notify(&mut self, from: usize) {
        let fresh = self.events.since(from);
        for observer in self.observers.iter_mut() {
            for event in fresh {
                observer.on_event(event);
            }
        }
    }

    // ============ Entry Points ============

    /// Open an empty loan owned by the caller
    pub fn create_loan(&mut self, ctx: CallContext) -> PoolResult<LoanId> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            pool.loan_nonce += 1;
            let id = generate_loan_id(&pool.pool_id, &ctx.caller, pool.loan_nonce);
            let loan = Loan::new(
                id,
                ctx.caller,
                pool.pool_id,
                pool.state.asset_count(),
                pool.state.acc_fee_index,
                ctx.period,
            );
            pool.emit(PoolEvent::LoanCreated {
                loan_id: id,
                owner: ctx.caller,
                period: ctx.period,
            });
            pool.emit_loan(&loan, TxType::CreateLoan, ctx.period);
            pool.loans.insert(id, loan);
            Ok(id)
        })
    }

    /// Accrue interest without any other change
    pub fn update_pool(&mut self, ctx: CallContext) -> PoolResult<()> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            pool.emit_pool(TxType::UpdatePool);
            Ok(())
        })
    }

    /// Fold LP tokens sent to the pool without a deposit into idle liquidity
    pub fn sync(&mut self, ctx: CallContext) -> PoolResult<u128> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            let balance = pool.bank.balance_of(Token::Lp, &pool.address);
            let donated = balance.saturating_sub(pool.state.idle_lp_tokens);
            pool.state.idle_lp_tokens = safe_add(pool.state.idle_lp_tokens, donated)?;
            pool.state.sync_totals()?;
            pool.emit_pool(TxType::Sync);
            Ok(donated)
        })
    }

    /// Send asset and LP balances above the tracked amounts to `to`.
    /// Returns the skimmed asset amounts and LP tokens.
    pub fn skim(&mut self, ctx: CallContext, to: Address) -> PoolResult<(Vec<u128>, u128)> {
        self.transact(|pool| {
            pool.update_index(ctx.period)?;
            let mut skimmed = Vec::with_capacity(pool.state.asset_count());
            for i in 0..pool.state.asset_count() {
                let token = Token::Asset(i as u8);
                let excess = pool
                    .bank
                    .balance_of(token, &pool.address)
                    .saturating_sub(pool.state.token_balances[i]);
                pool.push(token, &to, excess)?;
                skimmed.push(excess);
            }
            let lp_excess = pool
                .bank
                .balance_of(Token::Lp, &pool.address)
                .saturating_sub(pool.state.idle_lp_tokens);
            pool.push(Token::Lp, &to, lp_excess)?;
            pool.emit_pool(TxType::Skim);
            Ok((skimmed, lp_excess))
        })
    }

    /// Cross-check pool totals, per-loan records, and tracked balances
    pub fn check_invariants(&self) -> PoolResult<()> {
        self.state.check_invariants()?;

        let mut held = vec![0u128; self.state.asset_count()];
        for loan in self.loans.values() {
            loan.check_invariants()?;
            for (total, amount) in held.iter_mut().zip(&loan.tokens_held) {
                *total = safe_add(*total, *amount)?;
            }
        }
        if held != self.state.token_balances {
            return Err(PoolError::InvariantViolation { check: "token_balances" });
        }
        if self.bank.balance_of(Token::Lp, &self.address) < self.state.idle_lp_tokens {
            return Err(PoolError::InvariantViolation { check: "idle_lp_balance" });
        }
        Ok(())
    }

    // ============ Observers ============

    pub fn add_observer(&mut self, observer: Box<dyn EventObserver>) {
        self.observers.push(observer);
    }

    /// Shared handle on the re-entrancy lock
    pub fn lock_handle(&self) -> ReentrancyLock {
        self.lock.clone()
    }

    // ============ Views ============

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    pub fn loan(&self, loan_id: &LoanId) -> Option<&Loan> {
        self.loans.get(loan_id)
    }

    pub fn loan_count(&self) -> usize {
        self.loans.len()
    }

    /// Loan debt including interest not yet folded in
    pub fn loan_debt(&self, loan_id: &LoanId) -> PoolResult<u128> {
        self.loans
            .get(loan_id)
            .ok_or(PoolError::LoanDoesNotExist { loan_id: *loan_id })?
            .prospective_debt(self.state.acc_fee_index)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn cfmm(&self) -> &C {
        &self.cfmm
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    /// Direct access to the collaborators, outside any transaction
    pub fn collaborators_mut(&mut self) -> (&mut C, &mut B) {
        (&mut self.cfmm, &mut self.bank)
    }

    // ============ Internal Helpers ============

    /// Loan owned by `caller`, cloned for mutation
    pub(crate) fn owned_loan(&self, loan_id: &LoanId, caller: &Address) -> PoolResult<Loan> {
        match self.loans.get(loan_id) {
            Some(loan) if loan.owner == *caller => Ok(loan.clone()),
            _ => Err(PoolError::LoanDoesNotExist { loan_id: *loan_id }),
        }
    }

    /// Any loan, cloned for mutation
    pub(crate) fn existing_loan(&self, loan_id: &LoanId) -> PoolResult<Loan> {
        self.loans
            .get(loan_id)
            .cloned()
            .ok_or(PoolError::LoanDoesNotExist { loan_id: *loan_id })
    }

    pub(crate) fn store_loan(&mut self, loan: Loan) {
        self.loans.insert(loan.id, loan);
    }

    /// Re-read the CFMM after the pool traded with it
    pub(crate) fn refresh_external(&mut self) {
        self.state.last_external_invariant = self.cfmm.invariant();
        self.state.last_external_supply = self.cfmm.total_supply();
        self.state.external_reserves = self.cfmm.reserves();
    }

    pub(crate) fn pull(&mut self, token: Token, from: &Address, amount: u128) -> PoolResult<()> {
        let to = self.address;
        self.bank.transfer(token, from, &to, amount)
    }

    pub(crate) fn push(&mut self, token: Token, to: &Address, amount: u128) -> PoolResult<()> {
        let from = self.address;
        self.bank.transfer(token, &from, to, amount)
    }

    pub(crate) fn emit(&mut self, event: PoolEvent) {
        self.events.emit(event);
    }

    pub(crate) fn emit_loan(&mut self, loan: &Loan, op: TxType, period: u64) {
        self.events.emit(PoolEvent::loan_updated(loan, op, period));
    }

    pub(crate) fn emit_pool(&mut self, op: TxType) {
        self.events.emit(PoolEvent::pool_updated(&self.state, op));
    }
}

// ============ Helper Functions ============

/// Generate a deterministic loan ID
pub fn generate_loan_id(pool_id: &PoolId, owner: &Address, nonce: u64) -> LoanId {
    let mut hasher = Sha256::new();
    hasher.update(pool_id);
    hasher.update(owner);
    hasher.update(nonce.to_le_bytes());
    let result = hasher.finalize();
    let mut id = [0u8; 32];
    id.copy_from_slice(&result);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBank, MockCfmm};

    const POOL: Address = [7u8; 32];
    const CFMM: Address = [9u8; 32];
    const ALICE: Address = [1u8; 32];

    fn pool() -> LendingPool<MockCfmm, MockBank> {
        LendingPool::new(
            [5u8; 32],
            POOL,
            PoolConfig::default(),
            MockCfmm::new(CFMM),
            MockBank::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_loan_ids_unique_and_deterministic() {
        let a = generate_loan_id(&[5u8; 32], &ALICE, 1);
        let b = generate_loan_id(&[5u8; 32], &ALICE, 2);
        assert_ne!(a, b);
        assert_eq!(a, generate_loan_id(&[5u8; 32], &ALICE, 1));
    }

    #[test]
    fn test_new_rejects_shared_address() {
        let result = LendingPool::new(
            [5u8; 32],
            CFMM,
            PoolConfig::default(),
            MockCfmm::new(CFMM),
            MockBank::new(),
        );
        assert!(matches!(result, Err(PoolError::InvalidAddress { .. })));
    }

    #[test]
    fn test_create_loan() {
        let mut pool = pool();
        let id = pool.create_loan(CallContext::new(ALICE, 1)).unwrap();
        let loan = pool.loan(&id).unwrap();
        assert_eq!(loan.owner, ALICE);
        assert_eq!(loan.rate_index, pool.state().acc_fee_index);
        assert_eq!(pool.events().len(), 2);
        assert!(pool.check_invariants().is_ok());
    }

    #[test]
    fn test_failed_call_rolls_back() {
        let mut pool = pool();
        pool.create_loan(CallContext::new(ALICE, 5)).unwrap();
        let events = pool.events().len();

        // clock moving backwards fails inside the transaction
        let err = pool.create_loan(CallContext::new(ALICE, 4)).unwrap_err();
        assert!(matches!(err, PoolError::InvalidInput { param: "period", .. }));
        assert_eq!(pool.loan_count(), 1);
        assert_eq!(pool.events().len(), events);
        assert!(!pool.lock_handle().is_locked());
    }

    #[test]
    fn test_locked_pool_rejects_calls() {
        let mut pool = pool();
        let handle = pool.lock_handle();
        let guard = handle.acquire().unwrap();
        assert_eq!(pool.update_pool(CallContext::new(ALICE, 1)), Err(PoolError::Locked));
        drop(guard);
        assert!(pool.update_pool(CallContext::new(ALICE, 1)).is_ok());
    }

    #[test]
    fn test_sync_and_skim_donations() {
        let mut pool = pool();
        let (_, bank) = pool.collaborators_mut();
        bank.mint(Token::Lp, &POOL, 50).unwrap();
        bank.mint(Token::Asset(0), &POOL, 7).unwrap();

        let (skimmed, lp) = pool.skim(CallContext::new(ALICE, 1), ALICE).unwrap();
        assert_eq!(skimmed, vec![7, 0]);
        assert_eq!(lp, 50);
        assert_eq!(pool.bank().balance_of(Token::Lp, &ALICE), 50);

        let (_, bank) = pool.collaborators_mut();
        bank.mint(Token::Lp, &POOL, 30).unwrap();
        assert_eq!(pool.sync(CallContext::new(ALICE, 1)).unwrap(), 30);
        assert_eq!(pool.state().idle_lp_tokens, 30);
        assert!(pool.check_invariants().is_ok());
    }
}
