//! Print a user's wallet, recent games and ledger from a RocksDB store.
//!
//! Usage: inspect_games [db_path] <username>

use crashline::storage::{CrashStore, RocksStore};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (db_path, username) = match args.as_slice() {
        [username] => ("./DB/crash_data".to_string(), username.clone()),
        [db_path, username] => (db_path.clone(), username.clone()),
        _ => {
            eprintln!("usage: inspect_games [db_path] <username>");
            std::process::exit(2);
        }
    };

    let store = RocksStore::open(&db_path)?;

    let Some(user) = store.find_user_by_name(&username)? else {
        println!("No user named {} in {}", username, db_path);
        return Ok(());
    };

    println!("👤 {} (id {}, {:?})", user.username, user.id, user.status);
    if let Some(wallet) = store.load_wallet(user.id)? {
        println!("   Balance: {:.2} {}", wallet.balance, wallet.currency);
    }

    println!("\n🎲 Recent games:");
    for game in store.list_user_games(user.id, 20)? {
        println!(
            "   #{:<6} bet {:>12.2}  {:>7.2}x / crash {:>7.2}x  {:<6} settled={}",
            game.id, game.bet_amount, game.multiplier, game.crash_point, game.status, game.is_settled
        );
    }

    println!("\n📒 Ledger:");
    for entry in store.list_ledger(user.id)? {
        println!(
            "   {:<8} {:>+12.2} -> {:>12.2}  {}",
            entry.kind, entry.amount, entry.balance_after, entry.description
        );
    }

    let unsettled = store.list_unsettled_games()?;
    println!("\n⏳ Unsettled games in store: {}", unsettled.len());

    Ok(())
}
