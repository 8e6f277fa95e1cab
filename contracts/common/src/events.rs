//! Protocol Events for lvpool
//!
//! Every mutation appends a snapshot event to the [`EventLog`]. Events of a
//! reverted call are dropped; committed events are handed to registered
//! [`EventObserver`]s for indexing.

use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::math::Wad;
use crate::types::{Address, Loan, LoanId, PoolState, TxType};

/// Event types for indexing and filtering
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Loan Events (0x01 - 0x1F)
    LoanCreated = 0x01,
    LoanUpdated = 0x02,
    Liquidation = 0x03,

    // Pool Events (0x20 - 0x3F)
    PoolUpdated = 0x20,

    // Vault Events (0x40 - 0x5F)
    Deposit = 0x40,
    Withdraw = 0x41,
    DevFeeMinted = 0x42,
}

/// Main event enum containing all engine events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PoolEvent {
    // ============ Loan Events ============

    /// Emitted when an empty loan is opened
    LoanCreated {
        loan_id: LoanId,
        owner: Address,
        period: u64,
    },

    /// Loan snapshot after every loan mutation
    LoanUpdated {
        loan_id: LoanId,
        tokens_held: Vec<u128>,
        held_invariant: u128,
        debt_invariant: u128,
        init_debt_invariant: u128,
        debt_lp_tokens: u128,
        rate_index: Wad,
        op: TxType,
        period: u64,
    },

    /// Emitted once per liquidation call
    Liquidation {
        loan_ids: Vec<LoanId>,
        /// Invariant repaid to the pool
        liquidity: u128,
        /// Collateral value considered, in invariant units
        collateral: u128,
        write_down: u128,
        op: TxType,
        period: u64,
    },

    // ============ Pool Events ============

    /// Pool snapshot after every pool mutation
    PoolUpdated {
        idle_lp_tokens: u128,
        borrowed_lp_tokens: u128,
        borrowed_lp_tokens_plus_interest: u128,
        last_period: u64,
        acc_fee_index: Wad,
        lp_invariant: u128,
        borrowed_invariant: u128,
        external_reserves: Vec<u128>,
        op: TxType,
    },

    // ============ Vault Events ============

    /// Emitted on deposit and mint
    Deposit {
        caller: Address,
        owner: Address,
        assets: u128,
        shares: u128,
        period: u64,
    },

    /// Emitted on withdraw and redeem
    Withdraw {
        caller: Address,
        receiver: Address,
        owner: Address,
        assets: u128,
        shares: u128,
        period: u64,
    },

    /// Emitted when accrual dilutes shares toward the fee recipient
    DevFeeMinted {
        recipient: Address,
        shares: u128,
        period: u64,
    },
}

impl PoolEvent {
    /// Loan snapshot for `op`
    pub fn loan_updated(loan: &Loan, op: TxType, period: u64) -> Self {
        Self::LoanUpdated {
            loan_id: loan.id,
            tokens_held: loan.tokens_held.clone(),
            held_invariant: loan.held_invariant,
            debt_invariant: loan.debt_invariant,
            init_debt_invariant: loan.init_debt_invariant,
            debt_lp_tokens: loan.debt_lp_tokens,
            rate_index: loan.rate_index,
            op,
            period,
        }
    }

    /// Pool snapshot for `op`
    pub fn pool_updated(state: &PoolState, op: TxType) -> Self {
        Self::PoolUpdated {
            idle_lp_tokens: state.idle_lp_tokens,
            borrowed_lp_tokens: state.borrowed_lp_tokens,
            borrowed_lp_tokens_plus_interest: state.borrowed_lp_tokens_plus_interest,
            last_period: state.last_period,
            acc_fee_index: state.acc_fee_index,
            lp_invariant: state.lp_invariant,
            borrowed_invariant: state.borrowed_invariant,
            external_reserves: state.external_reserves.clone(),
            op,
        }
    }

    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::LoanCreated { .. } => EventType::LoanCreated,
            Self::LoanUpdated { .. } => EventType::LoanUpdated,
            Self::Liquidation { .. } => EventType::Liquidation,
            Self::PoolUpdated { .. } => EventType::PoolUpdated,
            Self::Deposit { .. } => EventType::Deposit,
            Self::Withdraw { .. } => EventType::Withdraw,
            Self::DevFeeMinted { .. } => EventType::DevFeeMinted,
        }
    }

    /// Operation tag, for snapshot events
    pub fn op(&self) -> Option<TxType> {
        match self {
            Self::LoanUpdated { op, .. }
            | Self::Liquidation { op, .. }
            | Self::PoolUpdated { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Subscriber notified with the committed events of each call
pub trait EventObserver {
    fn on_event(&mut self, event: &PoolEvent);
}

/// Append-only event log
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<PoolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: PoolEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[PoolEvent] {
        &self.events
    }

    /// Events appended since position `from`
    pub fn since(&self, from: usize) -> &[PoolEvent] {
        self.events.get(from..).unwrap_or(&[])
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&PoolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop everything appended after position `len`
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = PoolEvent::LoanCreated {
            loan_id: [1u8; 32],
            owner: [2u8; 32],
            period: 100,
        };
        assert_eq!(event.event_type(), EventType::LoanCreated);
        assert_eq!(event.op(), None);

        let state = PoolState::new(2);
        let snapshot = PoolEvent::pool_updated(&state, TxType::UpdatePool);
        assert_eq!(snapshot.event_type(), EventType::PoolUpdated);
        assert_eq!(snapshot.op(), Some(TxType::UpdatePool));
    }

    #[test]
    fn test_event_serialization() {
        let event = PoolEvent::Liquidation {
            loan_ids: vec![[1u8; 32], [0u8; 32]],
            liquidity: 500,
            collateral: 487,
            write_down: 13,
            op: TxType::BatchLiquidation,
            period: 9,
        };

        let bytes = event.to_bytes();
        let restored = PoolEvent::from_bytes(&bytes).unwrap();

        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_log_truncate() {
        let mut log = EventLog::new();
        log.emit(PoolEvent::DevFeeMinted { recipient: [3u8; 32], shares: 10, period: 1 });
        let mark = log.len();
        log.emit(PoolEvent::Deposit {
            caller: [1u8; 32],
            owner: [1u8; 32],
            assets: 5,
            shares: 5,
            period: 1,
        });
        log.emit(PoolEvent::Withdraw {
            caller: [1u8; 32],
            receiver: [1u8; 32],
            owner: [1u8; 32],
            assets: 5,
            shares: 5,
            period: 1,
        });

        assert_eq!(log.since(mark).len(), 2);
        assert_eq!(log.filter_by_type(EventType::Deposit).len(), 1);

        log.truncate(mark);
        assert_eq!(log.len(), 1);
        assert!(log.since(5).is_empty());
        assert!(!log.is_empty());
    }
}
