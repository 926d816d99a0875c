//! mine - command line driver for the Mine auction chain
//!
//! Chain state lives in a sled database under `--data-dir`. Every command
//! loads it, runs at most one transaction at the stored ledger step and
//! saves the result back.

mod format;

use clap::{Parser, Subcommand};
use format::{format_amount, parse_amount, resolve};
use mine_auction::WinnerMetadata;
use mine_core::{Address, Amount, ManualClock, ValueTransfer};
use mine_runtime::{ChainConfig, ChainState, Runtime, Tx};
use mine_storage::StateStore;
use mine_vault::{effective_balance, is_vault_eligible};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const RULE: &str = "═══════════════════════════════════";

#[derive(Parser)]
#[command(name = "mine")]
#[command(about = "Mine auction and vault chain", version)]
#[command(long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct Cli {
    /// Chain state directory
    #[arg(short, long, global = true, default_value = "mine-data")]
    data_dir: PathBuf,

    /// Chain configuration file (TOML), read by `init`
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Sender of the transaction: a hex address or a well-known name
    #[arg(short, long, global = true, default_value = "owner")]
    from: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new chain from the configuration (devnet if none given)
    Init {
        /// Replace an existing chain
        #[arg(long)]
        force: bool,
    },

    /// Show auction, vault and clock status
    Status {
        /// Number of recent events to show
        #[arg(short, long, default_value = "5")]
        events: usize,
    },

    /// Show the current auction price
    Price {
        /// Ledger step to price at (defaults to now)
        #[arg(long)]
        at: Option<u64>,
    },

    /// Move the ledger clock forward
    Advance { steps: u64 },

    /// Issue tokens to an account (chain owner only)
    Mint {
        token: String,
        account: String,
        #[arg(value_parser = parse_amount)]
        amount: Amount,
    },

    /// Let a spender move the sender's tokens
    Approve {
        token: String,
        spender: String,
        #[arg(value_parser = parse_amount)]
        amount: Amount,
    },

    /// Show token balances of an account
    Balance { account: String },

    /// Buy the current auction at the curve price
    Bid {
        /// Display name of the winner
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "mainnet")]
        network_id: String,
        /// Token mined on behalf of the winner (defaults to the auction token)
        #[arg(long)]
        mining_token: Option<String>,
        /// Account that mines for the winner (defaults to the sender)
        #[arg(long)]
        mining_bidder: Option<String>,
        /// Only buy this auction id
        #[arg(long)]
        auction: Option<u64>,
    },

    /// Forward a won auction's proceeds to the mining recipient
    SendToMine { auction_id: u64 },

    /// Deposit fees for the winner of the latest completed auction
    DepositFee {
        #[arg(value_parser = parse_amount)]
        amount: Amount,
    },

    /// Claim the fees accrued to an auction the sender won
    ClaimFee { auction_id: u64 },

    /// Replace the current auction once it expired unsold
    RestartAuction,

    /// Lock the required deposit in a new vault
    CreateVault,

    /// Show the vaults of an account
    Vault { owner: String },

    /// Realize a vault's pending decay
    SettleVault { owner: String, index: u64 },

    /// Withdraw one of the sender's vaults after its lock period
    WithdrawVault { index: u64 },

    /// Sweep decay from the next batch of vaults
    Crank {
        #[arg(long, default_value = "100")]
        max: u64,
    },

    /// Pool fees into the current window
    DepositFees {
        #[arg(value_parser = parse_amount)]
        amount: Amount,
    },

    /// Tally eligible vaults of a closed window
    FinalizeWindow {
        window: u64,
        #[arg(long, default_value = "100")]
        max: u64,
    },

    /// Claim the sender's share of a window's fees
    ClaimFees { window: u64, vault: u64 },

    /// Show a fee window (defaults to the current one)
    Window { id: Option<u64> },

    /// Pause bidding
    Pause {
        /// Resume bidding instead
        #[arg(long)]
        resume: bool,
    },

    /// Change the mining-deposit recipient
    SetRecipient { recipient: String },

    /// Hand auction ownership to another account
    TransferOwnership { new_owner: String },

    /// Pause bidding and sweep a token held by the auction engine to the owner
    EmergencyWithdraw { token: String },

    /// Show committed events
    Events {
        #[arg(short, long, default_value = "20")]
        count: usize,
    },

    /// Write a JSON dump of the chain
    Export { path: PathBuf },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let store = StateStore::open(&cli.data_dir)?;
    run_with_store(cli, &store)
}

fn run_with_store(cli: Cli, store: &StateStore) -> CliResult<()> {
    let command = match cli.command {
        Commands::Init { force } => return init(store, cli.config.as_deref(), force),
        Commands::Export { path } => {
            let bytes = store.export_json(&path)?;
            println!("📦 Wrote {} bytes to {}", bytes, path.display().green());
            return Ok(());
        }
        command => command,
    };

    let stored = store.load()?.ok_or_else(|| {
        format!(
            "no chain in {}, run `mine init` first",
            store.path().display()
        )
    })?;
    log::debug!(
        "📂 Loaded chain at step {} with {} events",
        stored.clock,
        stored.events.len()
    );
    let journal = stored.journal();
    let runtime = Runtime::from_parts(stored.state, journal, ManualClock::new(stored.clock));

    let changed = dispatch(&runtime, &cli.from, command)?;
    if changed {
        store.save(&runtime.snapshot()?, &runtime.journal(), runtime.now())?;
        log::debug!("💾 Chain saved at step {}", runtime.now());
    }
    Ok(())
}

fn init(store: &StateStore, config_path: Option<&Path>, force: bool) -> CliResult<()> {
    if store.is_initialized()? && !force {
        return Err(format!(
            "a chain already exists in {} (use --force to replace it)",
            store.path().display()
        )
        .into());
    }

    let config = match config_path {
        Some(path) => ChainConfig::load_from_file(path)?,
        None => ChainConfig::devnet(),
    };
    let clock = ManualClock::new(config.genesis.start_step);
    let runtime = Runtime::genesis(&config, clock)?;
    store.save(&runtime.snapshot()?, &runtime.journal(), runtime.now())?;
    config.save_to_file(store.path().join("chain.toml"))?;

    println!("\n{}", "🌱 Chain initialized".green().bold());
    println!("{}", RULE);
    println!("Data dir:     {}", store.path().display());
    println!("Owner:        {}", config.genesis.owner);
    println!("Start step:   {}", config.genesis.start_step);
    println!("Balances:     {}", config.genesis.balances.len());
    println!();
    Ok(())
}

/// Run one command. Returns whether chain state changed.
fn dispatch(runtime: &Runtime<ManualClock>, from: &str, command: Commands) -> CliResult<bool> {
    let state = runtime.snapshot()?;
    let name = |text: &str| -> CliResult<Address> { Ok(resolve(text, &state)?) };
    let sender = name(from)?;
    let now = runtime.now();

    match command {
        Commands::Init { .. } | Commands::Export { .. } => Ok(false),

        Commands::Status { events } => {
            print_status(runtime, &state, now, events)?;
            Ok(false)
        }

        Commands::Price { at } => {
            let at = at.unwrap_or(now);
            let price = state.auction.get_price(at)?;
            println!(
                "💲 Auction #{} at step {}: {}",
                state.auction.current_auction_id(),
                at,
                format_amount(price).green().bold()
            );
            Ok(false)
        }

        Commands::Advance { steps } => {
            let now = runtime.clock().advance(steps);
            println!("⏩ Ledger step is now {}", now.to_string().cyan());
            Ok(true)
        }

        Commands::Mint {
            token,
            account,
            amount,
        } => {
            if sender != *state.auction.owner() {
                return Err(format!("only the chain owner may mint, not {}", sender).into());
            }
            let (token, account) = (name(&token)?, name(&account)?);
            runtime.mint(token, account, amount)?;
            println!("🪙 Minted {} to {}", format_amount(amount).green(), account);
            Ok(true)
        }

        Commands::Approve {
            token,
            spender,
            amount,
        } => {
            let (token, spender) = (name(&token)?, name(&spender)?);
            runtime.approve(sender, token, spender, amount)?;
            println!(
                "✍️  {} may spend {} of {}",
                spender,
                format_amount(amount).green(),
                token.short()
            );
            Ok(true)
        }

        Commands::Balance { account } => {
            let account = name(&account)?;
            print_balances(&state, &account);
            Ok(false)
        }

        Commands::Bid {
            name: display_name,
            network_id,
            mining_token,
            mining_bidder,
            auction,
        } => {
            let metadata = WinnerMetadata {
                display_name,
                network_id,
                mining_token: match mining_token {
                    Some(token) => name(&token)?,
                    None => state.auction.config().auction_token,
                },
                mining_bidder: match mining_bidder {
                    Some(bidder) => name(&bidder)?,
                    None => sender,
                },
            };
            let receipt = send(runtime, sender, |tx| match auction {
                Some(id) => tx.auction.bid_for(&mut tx.ctx, id, metadata),
                None => tx.auction.bid(&mut tx.ctx, metadata),
            })?;
            println!(
                "🏆 Won auction #{} for {}, auction #{} is open",
                receipt.auction_id,
                format_amount(receipt.price).green().bold(),
                receipt.next_auction_id
            );
            Ok(true)
        }

        Commands::SendToMine { auction_id } => {
            let amount = send(runtime, sender, |tx| {
                tx.auction.send_to_mine(&mut tx.ctx, auction_id)
            })?;
            println!("⛏️  Forwarded {} from auction #{}", format_amount(amount).green(), auction_id);
            Ok(true)
        }

        Commands::DepositFee { amount } => {
            let auction_id = send(runtime, sender, |tx| tx.auction.deposit_fee(&mut tx.ctx, amount))?;
            println!("💰 Deposited {} for auction #{}", format_amount(amount).green(), auction_id);
            Ok(true)
        }

        Commands::ClaimFee { auction_id } => {
            let amount = send(runtime, sender, |tx| tx.auction.claim_fee(&mut tx.ctx, auction_id))?;
            println!("🎁 Claimed {} from auction #{}", format_amount(amount).green(), auction_id);
            Ok(true)
        }

        Commands::RestartAuction => {
            let auction_id = send(runtime, sender, |tx| {
                tx.auction.restart_expired_auction(&mut tx.ctx)
            })?;
            println!("♻️  Auction #{} is open", auction_id);
            Ok(true)
        }

        Commands::CreateVault => {
            let index = send(runtime, sender, |tx| tx.vaults.create_vault(&mut tx.ctx))?;
            println!(
                "🔒 Vault {}#{} locked {}",
                sender.short(),
                index,
                format_amount(state.vaults.config().required_deposit).green()
            );
            Ok(true)
        }

        Commands::Vault { owner } => {
            let owner = name(&owner)?;
            print_vaults(&state, &owner, now);
            Ok(false)
        }

        Commands::SettleVault { owner, index } => {
            let owner = name(&owner)?;
            let taken = send(runtime, sender, |tx| tx.vaults.settle_vault(&mut tx.ctx, &owner, index))?;
            println!("🧹 Settled {}#{}: {} decayed", owner.short(), index, format_amount(taken));
            Ok(true)
        }

        Commands::WithdrawVault { index } => {
            let amount = send(runtime, sender, |tx| tx.vaults.withdraw_vault_tokens(&mut tx.ctx, index))?;
            println!("🔓 Withdrew {} from vault #{}", format_amount(amount).green(), index);
            Ok(true)
        }

        Commands::Crank { max } => {
            let report = send(runtime, sender, |tx| tx.vaults.collect_deductions(&mut tx.ctx, max))?;
            println!(
                "🧹 Visited {} vaults, collected {}, next cursor {}",
                report.processed,
                format_amount(report.collected).green(),
                report.next_cursor
            );
            Ok(true)
        }

        Commands::DepositFees { amount } => {
            let window = send(runtime, sender, |tx| tx.vaults.deposit_fees(&mut tx.ctx, amount))?;
            println!("💰 Pooled {} into window {}", format_amount(amount).green(), window);
            Ok(true)
        }

        Commands::FinalizeWindow { window, max } => {
            let progress = send(runtime, sender, |tx| {
                tx.vaults.finalize_window(&mut tx.ctx, window, max)
            })?;
            if progress.finalized {
                println!(
                    "🧮 Window {} finalized with {} eligible vaults",
                    window,
                    progress.eligible_count.to_string().green()
                );
            } else {
                println!(
                    "🧮 Window {}: scanned {} more vaults, {} eligible so far",
                    window, progress.scanned, progress.eligible_count
                );
            }
            Ok(true)
        }

        Commands::ClaimFees { window, vault } => {
            let share = send(runtime, sender, |tx| tx.vaults.claim_fees(&mut tx.ctx, window, vault))?;
            println!("🎁 Claimed {} from window {}", format_amount(share).green(), window);
            Ok(true)
        }

        Commands::Window { id } => {
            print_window(&state, id.unwrap_or_else(|| state.vaults.window_id_at(now)))?;
            Ok(false)
        }

        Commands::Pause { resume } => {
            send(runtime, sender, |tx| tx.auction.set_paused(&mut tx.ctx, !resume))?;
            println!("⏸️  Bidding {}", if resume { "resumed" } else { "paused" });
            Ok(true)
        }

        Commands::SetRecipient { recipient } => {
            let recipient = name(&recipient)?;
            send(runtime, sender, |tx| tx.auction.set_mining_recipient(&mut tx.ctx, recipient))?;
            println!("⛏️  Mining recipient is now {}", recipient);
            Ok(true)
        }

        Commands::TransferOwnership { new_owner } => {
            let new_owner = name(&new_owner)?;
            send(runtime, sender, |tx| tx.auction.transfer_ownership(&mut tx.ctx, new_owner))?;
            println!("👑 Ownership transferred to {}", new_owner);
            Ok(true)
        }

        Commands::EmergencyWithdraw { token } => {
            let token = name(&token)?;
            let amount = send(runtime, sender, |tx| tx.auction.emergency_withdraw(&mut tx.ctx, token))?;
            println!(
                "{} swept {} of {} to the owner",
                "🚨 Emergency:".red().bold(),
                format_amount(amount),
                token.short()
            );
            Ok(true)
        }

        Commands::Events { count } => {
            print_events(runtime, count);
            Ok(false)
        }
    }
}

fn send<T>(
    runtime: &Runtime<ManualClock>,
    sender: Address,
    op: impl FnOnce(&mut Tx<'_>) -> mine_core::Result<T>,
) -> CliResult<T> {
    Ok(runtime.execute(sender, op)?)
}

fn print_status(
    runtime: &Runtime<ManualClock>,
    state: &ChainState,
    now: u64,
    events: usize,
) -> CliResult<()> {
    let auctions = &state.auction;
    let current = auctions.current_auction()?;

    println!("\n{}", "⛏️  Mine Chain Status".cyan().bold());
    println!("{}", RULE);
    println!("Ledger step:       {}", now);
    println!(
        "Current auction:   #{} ({:?})",
        current.id,
        current.status(now)
    );
    match auctions.get_price(now) {
        Ok(price) => println!("Price:             {}", format_amount(price).green()),
        Err(_) => println!(
            "Price:             {}",
            "expired, run `mine restart-auction`".yellow()
        ),
    }
    println!("Expires at step:   {}", current.expiry_time);
    println!("Completed:         {}", auctions.completed_auctions());
    println!(
        "Bidding:           {}",
        if auctions.is_paused() {
            "paused".red().to_string()
        } else {
            "open".green().to_string()
        }
    );
    println!("Owner:             {}", auctions.owner());
    println!("Mining recipient:  {}", auctions.mining_recipient());

    let vaults = &state.vaults;
    let window_id = vaults.window_id_at(now);
    let pooled = vaults.window(window_id).map(|w| w.total_pooled).unwrap_or(0);
    println!("\n{}", "🏦 Vaults".cyan().bold());
    println!("{}", RULE);
    println!("Vaults created:    {}", vaults.registry().len());
    println!("Total locked:      {}", format_amount(vaults.total_locked()));
    println!("Settlement:        {:?}", vaults.config().settlement);
    println!("Current window:    {} ({} pooled)", window_id, format_amount(pooled));

    if events > 0 {
        print_events(runtime, events);
    }
    println!();
    Ok(())
}

fn print_balances(state: &ChainState, account: &Address) {
    let mut tokens = vec![
        state.auction.config().auction_token,
        state.auction.config().fee_token,
        state.vaults.config().deposit_token,
        state.vaults.config().fee_token,
    ];
    tokens.sort();
    tokens.dedup();

    println!("\n💰 Balances of {}", account);
    println!("{}", RULE);
    for token in tokens {
        println!(
            "{}  {}",
            token.short(),
            format_amount(state.ledger.balance_of(&token, account)).green()
        );
    }
    println!();
}

fn print_vaults(state: &ChainState, owner: &Address, now: u64) {
    let config = state.vaults.config();

    println!("\n🔒 Vaults of {}", owner);
    println!("{}", RULE);
    let mut any = false;
    for (index, vault) in state.vaults.vaults_of(owner) {
        any = true;
        if vault.closed {
            println!("#{}  {}", index, "withdrawn".dimmed());
            continue;
        }
        let eligible = if is_vault_eligible(vault, now, config) {
            "eligible".green().to_string()
        } else {
            "not eligible".yellow().to_string()
        };
        println!(
            "#{}  locked {}  effective {}  unlocks at {}  {}",
            index,
            format_amount(vault.locked_balance),
            format_amount(effective_balance(vault, now, config)),
            vault.unlocks_at(config.window_size),
            eligible
        );
    }
    if !any {
        println!("(none)");
    }
    println!();
}

fn print_window(state: &ChainState, window_id: u64) -> CliResult<()> {
    let (close, deadline) = state.vaults.window_bounds(window_id)?;

    println!("\n🪟 Fee window {}", window_id);
    println!("{}", RULE);
    println!("Closes at step:    {}", close);
    println!("Claims until step: {}", deadline);
    match state.vaults.window(window_id) {
        Some(window) => {
            println!("Pooled:            {}", format_amount(window.total_pooled).green());
            println!(
                "Tally:             {}",
                if window.finalized {
                    "final".green().to_string()
                } else {
                    format!("{} scanned", window.tally_cursor)
                }
            );
            println!("Eligible vaults:   {}", window.eligible_count);
            if let Some(share) = window.share() {
                println!("Share per vault:   {}", format_amount(share));
            }
            println!(
                "Claimed:           {} by {} accounts",
                format_amount(window.total_claimed),
                window.claimed.len()
            );
        }
        None => println!("Pooled:            0"),
    }
    println!();
    Ok(())
}

fn print_events(runtime: &Runtime<ManualClock>, count: usize) {
    println!("\n{}", "📣 Recent events".cyan().bold());
    println!("{}", RULE);
    for entry in runtime.recent_events(count) {
        println!(
            "{:>5}  step {:<8} {}",
            entry.sequence.dimmed(),
            entry.at,
            entry.event
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mine_runtime::devnet;
    use tempfile::tempdir;

    fn cli(dir: &Path, args: &[&str]) -> Cli {
        let mut argv = vec!["mine", "--data-dir", dir.to_str().unwrap()];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_command_before_init() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        assert!(run_with_store(cli(dir.path(), &["status"]), &store).is_err());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();

        run_with_store(cli(dir.path(), &["init"]), &store).unwrap();
        assert!(dir.path().join("chain.toml").exists());
        assert!(run_with_store(cli(dir.path(), &["init"]), &store).is_err());
        run_with_store(cli(dir.path(), &["init", "--force"]), &store).unwrap();
    }

    #[test]
    fn test_bid_and_forward_session() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let steps: &[&[&str]] = &[
            &["init"],
            &["approve", "mine", "auction", "2000", "--from", "alice"],
            &["advance", "10"],
            &["bid", "--name", "alice", "--from", "alice"],
            &["send-to-mine", "1", "--from", "bob"],
            &["status"],
        ];
        for args in steps {
            run_with_store(cli(dir.path(), args), &store).unwrap();
        }

        let stored = store.load().unwrap().unwrap();
        assert_eq!(stored.clock, 10);
        let auction = stored.state.auction.auction(1).unwrap();
        assert_eq!(auction.winner, Some(devnet::ACCOUNTS[0]));
        assert!(auction.funds_forwarded);
        assert_eq!(
            stored
                .state
                .ledger
                .balance_of(&devnet::MINE_TOKEN, &devnet::MINING_RECIPIENT),
            auction.winning_price
        );
    }

    #[test]
    fn test_mint_is_owner_only() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        run_with_store(cli(dir.path(), &["init"]), &store).unwrap();
        let before = store.load().unwrap().unwrap();

        assert!(
            run_with_store(cli(dir.path(), &["mint", "fee", "bob", "5", "--from", "bob"]), &store)
                .is_err()
        );
        assert_eq!(store.load().unwrap().unwrap(), before);

        run_with_store(cli(dir.path(), &["mint", "fee", "bob", "5"]), &store).unwrap();
        let after = store.load().unwrap().unwrap();
        assert_eq!(
            after
                .state
                .ledger
                .balance_of(&devnet::FEE_TOKEN, &devnet::ACCOUNTS[1]),
            devnet::GRANT + 500_000_000
        );
    }

    #[test]
    fn test_failed_command_keeps_state() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        run_with_store(cli(dir.path(), &["init"]), &store).unwrap();
        let before = store.load().unwrap().unwrap();

        // bob is not the owner
        assert!(run_with_store(cli(dir.path(), &["pause", "--from", "bob"]), &store).is_err());
        assert_eq!(store.load().unwrap().unwrap(), before);
    }

    #[test]
    fn test_vault_session_and_export() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("chain");
        let store = StateStore::open(&data).unwrap();
        let steps: &[&[&str]] = &[
            &["init"],
            &["approve", "mine", "vaults", "100", "--from", "carol"],
            &["create-vault", "--from", "carol"],
            &["advance", "1000"],
            &["crank", "--max", "10"],
            &["vault", "carol"],
        ];
        for args in steps {
            run_with_store(cli(&data, args), &store).unwrap();
        }

        let stored = store.load().unwrap().unwrap();
        let vault = stored.state.vaults.vault(&devnet::ACCOUNTS[2], 0).unwrap();
        assert_eq!(vault.last_decay_checkpoint, 1000);

        let dump = dir.path().join("dump.json");
        run_with_store(cli(&data, &["export", dump.to_str().unwrap()]), &store).unwrap();
        assert!(dump.exists());
    }
}
