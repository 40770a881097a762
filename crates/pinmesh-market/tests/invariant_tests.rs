//! Accounting invariants checked across mixed operation sequences.
//!
//! The load-bearing property: at every observable point, the market account
//! balance equals the sum of all slot escrows, the fee counter, and the
//! stakes of active pinners. Donations via `fund_contract` relax the equality
//! to `>=` since donated funds back nothing.

use pinmesh_economics::{AccountAddress, BalanceManager, EscrowLedger, MemoryStorage, TokenAmount};
use pinmesh_market::{MarketCoordinator, MarketError, ServiceParams, NUM_SLOTS};
use std::sync::Arc;

fn addr(byte: u8) -> AccountAddress {
    AccountAddress::from_bytes([byte; 32])
}

fn tokens(n: u64) -> TokenAmount {
    TokenAmount::from_base_units(n)
}

struct Harness {
    market: MarketCoordinator,
    ledger: Arc<EscrowLedger>,
    pinners: Vec<AccountAddress>,
}

impl Harness {
    fn new(params: ServiceParams) -> Self {
        let ledger = Arc::new(EscrowLedger::new(Arc::new(BalanceManager::new(Arc::new(
            MemoryStorage::new(),
        )))));
        let market = MarketCoordinator::new(params, addr(1), ledger.clone());
        Self {
            market,
            ledger,
            pinners: Vec::new(),
        }
    }

    async fn fund(&self, address: AccountAddress, amount: u64) {
        self.ledger
            .balances()
            .credit(address, tokens(amount))
            .await
            .unwrap();
    }

    async fn register_pinner(&mut self, byte: u8, funding: u64) -> AccountAddress {
        let address = addr(byte);
        self.fund(address, funding).await;
        self.market
            .join_as_pinner(address, format!("n{}", byte), "m".into(), TokenAmount::ZERO)
            .await
            .unwrap();
        self.pinners.push(address);
        address
    }

    /// escrow + fees + stakes must equal the market account balance.
    async fn assert_conserved(&self) {
        let escrow: u64 = self
            .market
            .get_all_slots()
            .await
            .iter()
            .map(|(_, slot)| slot.escrow_balance.to_base_units())
            .sum();
        let fees = self.market.fees_collected().await.to_base_units();

        let mut stakes = 0u64;
        for pinner in &self.pinners {
            if let Some(record) = self.market.get_pinner(pinner).await {
                stakes += record.staked.to_base_units();
            }
        }

        let held = self.market.total_held().await.unwrap().to_base_units();
        assert_eq!(
            escrow + fees + stakes,
            held,
            "escrow {} + fees {} + stakes {} != held {}",
            escrow,
            fees,
            stakes,
            held
        );
    }
}

#[tokio::test]
async fn test_conservation_through_pin_lifecycle() {
    let mut h = Harness::new(ServiceParams {
        pin_fee: tokens(5),
        join_fee: tokens(20),
        pinner_stake: tokens(100),
        epochs_to_live: 2,
        ..Default::default()
    });
    let publisher = addr(2);
    h.fund(publisher, 10_000).await;
    h.assert_conserved().await;

    let pinner_a = h.register_pinner(10, 500).await;
    let pinner_b = h.register_pinner(11, 500).await;
    h.assert_conserved().await;

    let first = h
        .market
        .create_pin(publisher, "QmA", "data.bin", "gw", tokens(10), 3)
        .await
        .unwrap();
    let second = h
        .market
        .create_pin(publisher, "QmB", "data.bin", "gw", tokens(7), 2)
        .await
        .unwrap();
    h.assert_conserved().await;

    h.market.collect_pin(pinner_a, first).await.unwrap();
    h.assert_conserved().await;
    h.market.collect_pin(pinner_b, first).await.unwrap();
    h.assert_conserved().await;

    h.market.cancel_pin(publisher, first).await.unwrap();
    h.assert_conserved().await;

    h.market.advance_ticks(24).await;
    h.market.clear_expired_slot(second).await.unwrap();
    h.assert_conserved().await;

    h.market.leave_as_pinner(pinner_a).await.unwrap();
    h.assert_conserved().await;
}

#[tokio::test]
async fn test_conservation_through_forfeiture_and_withdrawal() {
    let mut h = Harness::new(ServiceParams {
        pin_fee: tokens(5),
        join_fee: tokens(20),
        pinner_stake: tokens(100),
        flag_threshold: 3,
        ..Default::default()
    });

    let target = h.register_pinner(2, 200).await;
    let f1 = h.register_pinner(10, 200).await;
    let f2 = h.register_pinner(11, 200).await;
    let f3 = h.register_pinner(12, 200).await;

    h.market.flag_pinner(f1, target).await.unwrap();
    h.assert_conserved().await;
    h.market.flag_pinner(f2, target).await.unwrap();
    h.assert_conserved().await;
    // Third flag distributes 100 as 33 each plus 1 to fees.
    h.market.flag_pinner(f3, target).await.unwrap();
    h.assert_conserved().await;

    let fees = h.market.fees_collected().await;
    h.market
        .withdraw_fees(addr(1), addr(9), fees)
        .await
        .unwrap();
    h.assert_conserved().await;
}

#[tokio::test]
async fn test_slot_count_never_exceeds_pool_size() {
    let h = Harness::new(ServiceParams {
        epochs_to_live: 2,
        ..Default::default()
    });
    let publisher = addr(2);
    h.fund(publisher, 100_000).await;

    for round in 0..3u32 {
        for i in 0..NUM_SLOTS {
            h.market
                .create_pin(
                    publisher,
                    &format!("Qm{}-{}", round, i),
                    "data.bin",
                    "gw",
                    tokens(10),
                    1,
                )
                .await
                .unwrap();
        }
        assert_eq!(h.market.get_all_slots().await.len(), NUM_SLOTS);
        assert!(matches!(
            h.market
                .create_pin(publisher, "QmFull", "data.bin", "gw", tokens(10), 1)
                .await
                .unwrap_err(),
            MarketError::NoSlotsAvailable
        ));
        h.market.advance_ticks(24).await;
    }
    h.assert_conserved().await;
}

#[tokio::test]
async fn test_digest_uniqueness_across_reuse() {
    let h = Harness::new(ServiceParams {
        epochs_to_live: 2,
        ..Default::default()
    });
    let publisher = addr(2);
    h.fund(publisher, 10_000).await;

    h.market
        .create_pin(publisher, "QmSame", "data.bin", "gw", tokens(10), 1)
        .await
        .unwrap();
    assert!(matches!(
        h.market
            .create_pin(publisher, "QmSame", "data.bin", "gw", tokens(10), 1)
            .await
            .unwrap_err(),
        MarketError::DuplicateContent(_)
    ));

    // Cancelling frees the digest immediately.
    h.market.cancel_pin(publisher, 0).await.unwrap();
    h.market
        .create_pin(publisher, "QmSame", "data.bin", "gw", tokens(10), 1)
        .await
        .unwrap();
    h.assert_conserved().await;
}

#[tokio::test]
async fn test_clear_expired_never_double_pays() {
    let h = Harness::new(ServiceParams {
        epochs_to_live: 2,
        pin_fee: tokens(5),
        ..Default::default()
    });
    let publisher = addr(2);
    h.fund(publisher, 1000).await;

    let index = h
        .market
        .create_pin(publisher, "QmA", "data.bin", "gw", tokens(10), 2)
        .await
        .unwrap();
    h.market.advance_ticks(24).await;

    let refund = h.market.clear_expired_slot(index).await.unwrap();
    assert_eq!(refund, tokens(20));
    let balance_after = h
        .ledger
        .balances()
        .balance_of(publisher)
        .await
        .unwrap();

    assert!(matches!(
        h.market.clear_expired_slot(index).await.unwrap_err(),
        MarketError::InvalidSlot(_)
    ));
    assert_eq!(
        h.ledger.balances().balance_of(publisher).await.unwrap(),
        balance_after
    );
    h.assert_conserved().await;
}

#[tokio::test]
async fn test_first_qualifying_index_is_deterministic() {
    let h = Harness::new(ServiceParams {
        epochs_to_live: 2,
        ..Default::default()
    });
    let publisher = addr(2);
    h.fund(publisher, 10_000).await;

    for i in 0..5 {
        h.market
            .create_pin(publisher, &format!("Qm{}", i), "data.bin", "gw", tokens(10), 1)
            .await
            .unwrap();
    }

    // Free indexes 1 and 3; creates must fill them back lowest-first.
    h.market.cancel_pin(publisher, 3).await.unwrap();
    h.market.cancel_pin(publisher, 1).await.unwrap();

    let first = h
        .market
        .create_pin(publisher, "QmX", "data.bin", "gw", tokens(10), 1)
        .await
        .unwrap();
    let second = h
        .market
        .create_pin(publisher, "QmY", "data.bin", "gw", tokens(10), 1)
        .await
        .unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 3);
}

#[tokio::test]
async fn test_donations_only_increase_held_funds() {
    let h = Harness::new(ServiceParams::default());
    let donor = addr(2);
    h.fund(donor, 100).await;

    h.market.fund_contract(donor, tokens(40)).await.unwrap();

    // held >= escrow + fees + stakes once donations enter the picture.
    let held = h.market.total_held().await.unwrap();
    assert_eq!(held, tokens(40));
    assert_eq!(h.market.fees_collected().await, TokenAmount::ZERO);
    assert!(h.market.get_all_slots().await.is_empty());
}
