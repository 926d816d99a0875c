//! Runtime integration tests
//!
//! Drives both engines through the transaction runtime on the devnet layout:
//! 1. Failed transfers roll back every effect of the transaction
//! 2. Concurrent bidders each win a distinct auction, committed in clock order
//! 3. Auction proceeds and fee vault end to end
//! 4. Vault lifecycle and windowed fees end to end

use mine_auction::WinnerMetadata;
use mine_core::{Address, ErrorKind, Event, EventLog, LedgerClock, ManualClock, ValueTransfer};
use mine_runtime::{devnet, ChainConfig, ChainState, Runtime};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const ALICE: Address = devnet::ACCOUNTS[0];
const BOB: Address = devnet::ACCOUNTS[1];
const CAROL: Address = devnet::ACCOUNTS[2];

fn metadata(name: &str) -> WinnerMetadata {
    WinnerMetadata {
        display_name: name.to_string(),
        network_id: "devnet".to_string(),
        mining_token: devnet::MINE_TOKEN,
        mining_bidder: Address::repeat_byte(0x0b),
    }
}

/// Clock that parks its first reader once armed, until the test releases it
struct GatedClock {
    steps: ManualClock,
    armed: AtomicBool,
    parked: Barrier,
    release: Barrier,
}

impl GatedClock {
    fn new(steps: ManualClock) -> Self {
        Self {
            steps,
            armed: AtomicBool::new(false),
            parked: Barrier::new(2),
            release: Barrier::new(2),
        }
    }
}

impl LedgerClock for GatedClock {
    fn now(&self) -> u64 {
        let now = self.steps.now();
        if self.armed.swap(false, Ordering::SeqCst) {
            self.parked.wait();
            self.release.wait();
        }
        now
    }
}

/// Devnet chain with a 100-step fee window and every account approved
fn chain() -> Runtime<ManualClock> {
    chain_on(ManualClock::new(0))
}

fn chain_on<C: LedgerClock>(clock: C) -> Runtime<C> {
    let mut config = ChainConfig::devnet();
    config.vault.window_size = 100;
    let runtime = Runtime::genesis(&config, clock).unwrap();

    for account in std::iter::once(devnet::OWNER).chain(devnet::ACCOUNTS) {
        for (token, spender) in [
            (devnet::MINE_TOKEN, devnet::AUCTION_ENGINE),
            (devnet::FEE_TOKEN, devnet::AUCTION_ENGINE),
            (devnet::MINE_TOKEN, devnet::VAULT_ENGINE),
            (devnet::FEE_TOKEN, devnet::VAULT_ENGINE),
        ] {
            runtime.approve(account, token, spender, devnet::GRANT).unwrap();
        }
    }
    runtime
}

fn balance(runtime: &Runtime<ManualClock>, token: &Address, account: &Address) -> u64 {
    runtime
        .query(|state| state.ledger.balance_of(token, account))
        .unwrap()
}

#[test]
fn test_failed_transfer_rolls_back_bid() {
    let config = ChainConfig::devnet();
    let (mut state, events) = ChainState::genesis(&config).unwrap();
    state
        .ledger
        .approve(&devnet::MINE_TOKEN, &ALICE, &devnet::AUCTION_ENGINE, devnet::GRANT);
    state.ledger.halt(&devnet::MINE_TOKEN);

    let mut journal = EventLog::new();
    journal.record(0, events);
    let runtime = Runtime::from_parts(state, journal, ManualClock::new(5));
    let before = runtime.snapshot().unwrap();

    // the winner is written before the price is pulled, so a failed pull
    // must take the winner with it
    let err = runtime
        .execute(ALICE, |tx| tx.auction.bid(&mut tx.ctx, metadata("alice")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferFailure);

    let after = runtime.snapshot().unwrap();
    assert_eq!(after, before);
    assert!(after.auction.auction(1).unwrap().winner.is_none());
    assert_eq!(runtime.journal().len(), 1);
}

#[test]
fn test_concurrent_bidders_win_distinct_auctions() {
    let runtime = Arc::new(chain());
    runtime.clock().set(3);

    let handles: Vec<_> = [devnet::OWNER, ALICE, BOB, CAROL]
        .into_iter()
        .map(|bidder| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || {
                runtime
                    .execute(bidder, |tx| tx.auction.bid(&mut tx.ctx, metadata("racer")))
                    .unwrap()
            })
        })
        .collect();

    let receipts: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    let won: BTreeSet<u64> = receipts.iter().map(|r| r.auction_id).collect();
    assert_eq!(won, (1..=4).collect::<BTreeSet<u64>>());

    let state = runtime.snapshot().unwrap();
    assert_eq!(state.auction.current_auction_id(), 5);
    assert_eq!(state.auction.completed_auctions(), 4);
    let winners: BTreeSet<Address> = state
        .auction
        .auctions()
        .filter_map(|auction| auction.winner)
        .collect();
    assert_eq!(winners.len(), 4);
}

#[test]
fn test_commits_follow_the_clock() {
    let steps = ManualClock::new(10);
    let runtime = Arc::new(chain_on(GatedClock::new(steps.clone())));
    runtime.clock().armed.store(true, Ordering::SeqCst);

    let early = {
        let runtime = Arc::clone(&runtime);
        thread::spawn(move || {
            runtime
                .execute(ALICE, |tx| tx.auction.bid(&mut tx.ctx, metadata("early")))
                .unwrap()
        })
    };
    // alice has read step 10 and is parked inside her transaction
    runtime.clock().parked.wait();
    steps.set(100);

    let late = {
        let runtime = Arc::clone(&runtime);
        thread::spawn(move || {
            runtime
                .execute(BOB, |tx| tx.auction.bid(&mut tx.ctx, metadata("late")))
                .unwrap()
        })
    };
    thread::sleep(Duration::from_millis(50));
    runtime.clock().release.wait();

    let early = early.join().unwrap();
    let late = late.join().unwrap();
    assert_eq!((early.auction_id, late.auction_id), (1, 2));
    assert!(late.price < early.price);

    let state = runtime.snapshot().unwrap();
    let starts: Vec<(u64, u64)> = state
        .auction
        .auctions()
        .map(|auction| (auction.id, auction.start_time))
        .collect();
    assert_eq!(starts, vec![(1, 0), (2, 10), (3, 100)]);

    let committed: Vec<u64> = runtime
        .journal()
        .entries()
        .iter()
        .map(|entry| entry.at)
        .collect();
    assert!(committed.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(committed.last(), Some(&100));
}

#[test]
fn test_auction_proceeds_and_fees() {
    let runtime = chain();
    let price_at_10 = runtime.query(|state| state.auction.get_price(10)).unwrap().unwrap();

    runtime.clock().set(10);
    let receipt = runtime
        .execute(ALICE, |tx| tx.auction.bid(&mut tx.ctx, metadata("alice")))
        .unwrap();
    assert_eq!(receipt.price, price_at_10);

    let forwarded = runtime
        .execute(CAROL, |tx| tx.auction.send_to_mine(&mut tx.ctx, 1))
        .unwrap();
    assert_eq!(forwarded, price_at_10);
    assert_eq!(
        balance(&runtime, &devnet::MINE_TOKEN, &devnet::MINING_RECIPIENT),
        price_at_10
    );

    // auction 2 is open, so fees now accrue to auction 1's winner
    let target = runtime
        .execute(BOB, |tx| tx.auction.deposit_fee(&mut tx.ctx, 5_000))
        .unwrap();
    assert_eq!(target, 1);

    let err = runtime
        .execute(BOB, |tx| tx.auction.claim_fee(&mut tx.ctx, 1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAuthorized);

    let before = balance(&runtime, &devnet::FEE_TOKEN, &ALICE);
    let claimed = runtime
        .execute(ALICE, |tx| tx.auction.claim_fee(&mut tx.ctx, 1))
        .unwrap();
    assert_eq!(claimed, 5_000);
    assert_eq!(balance(&runtime, &devnet::FEE_TOKEN, &ALICE), before + 5_000);

    let events: Vec<Event> = runtime
        .recent_events(2)
        .into_iter()
        .map(|recorded| recorded.event)
        .collect();
    assert!(matches!(events[0], Event::FeeDeposited { auction_id: 1, .. }));
    assert!(matches!(events[1], Event::FeeClaimed { amount: 5_000, .. }));
}

#[test]
fn test_vault_window_end_to_end() {
    let runtime = chain();

    let alice_vault = runtime
        .execute(ALICE, |tx| tx.vaults.create_vault(&mut tx.ctx))
        .unwrap();
    let bob_vault = runtime
        .execute(BOB, |tx| tx.vaults.create_vault(&mut tx.ctx))
        .unwrap();

    runtime.clock().set(50);
    runtime
        .execute(CAROL, |tx| tx.vaults.deposit_fees(&mut tx.ctx, 1_000))
        .unwrap();

    runtime.clock().set(100);
    let progress = runtime
        .execute(CAROL, |tx| tx.vaults.finalize_window(&mut tx.ctx, 0, 10))
        .unwrap();
    assert!(progress.finalized);
    assert_eq!(progress.eligible_count, 2);

    let report = runtime
        .execute(CAROL, |tx| tx.vaults.collect_deductions(&mut tx.ctx, 10))
        .unwrap();
    assert_eq!(report.collected, 2 * 100 * mine_vault::DEFAULT_DEDUCTION_RATE);

    let share = runtime
        .execute(ALICE, |tx| tx.vaults.claim_fees(&mut tx.ctx, 0, alice_vault))
        .unwrap();
    assert_eq!(share, 500);

    runtime.clock().set(150);
    let returned = runtime
        .execute(BOB, |tx| tx.vaults.withdraw_vault_tokens(&mut tx.ctx, bob_vault))
        .unwrap();
    assert_eq!(
        returned,
        mine_vault::DEFAULT_REQUIRED_DEPOSIT - 150 * mine_vault::DEFAULT_DEDUCTION_RATE
    );

    // a withdrawn vault has lost its share
    let err = runtime
        .execute(BOB, |tx| tx.vaults.claim_fees(&mut tx.ctx, 0, bob_vault))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);

    let state = runtime.snapshot().unwrap();
    let window = state.vaults.window(0).unwrap();
    assert_eq!(window.total_claimed, 500);
    assert_eq!(
        balance(&runtime, &devnet::FEE_TOKEN, &devnet::VAULT_ENGINE),
        500
    );
}
