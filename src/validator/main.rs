//! Standalone consistency checker for the key and user files.
//!
//! Reports whether the two files still line up and which user lines are
//! malformed, without modifying either file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use keyguard_bot::store::{RecordStore, UserRecord};

/// Key/user file consistency checker.
#[derive(Parser, Debug)]
#[command(name = "check_records")]
#[command(about = "Checks that the key file and user file of the keyguard bot line up")]
#[command(version)]
struct Args {
    /// Path to the key file.
    #[arg(short, long, default_value = "KEYS.txt")]
    keys: PathBuf,

    /// Path to the user file.
    #[arg(short, long, default_value = "USERS.txt")]
    users: PathBuf,

    /// Print every key/user pair.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let store = RecordStore::new(&args.keys, &args.users);

    println!("Keys:  {}", args.keys.display());
    println!("Users: {}\n", args.users.display());

    let audit = match store.audit() {
        Ok(audit) => audit,
        Err(e) => {
            eprintln!("✗ Failed to read records: {e}");
            return ExitCode::FAILURE;
        }
    };

    if !audit.keys_present {
        println!("  ⚠ Key file does not exist");
    }
    if !audit.users_present {
        println!("  ⚠ User file does not exist");
    }

    if args.verbose {
        print_pairs(&store);
    }

    for line in &audit.malformed_lines {
        println!("  ⚠ Line {line}: missing ' -> ' delimiter");
    }

    println!();

    if audit.is_aligned() {
        println!("✓ {} record(s), files are aligned", audit.key_count);
        if !audit.malformed_lines.is_empty() {
            println!(
                "  ({} malformed user line(s) are kept in place)",
                audit.malformed_lines.len()
            );
        }
        ExitCode::SUCCESS
    } else {
        println!(
            "✗ Files are out of step: {} key line(s), {} user line(s)",
            audit.key_count, audit.user_count
        );
        println!("  Register, delete and remove are refused until the files are repaired.");
        ExitCode::FAILURE
    }
}

fn print_pairs(store: &RecordStore) {
    let keys = read_lines(store.raw_keys());
    let users = read_lines(store.raw_users());

    for i in 0..keys.len().max(users.len()) {
        let key = keys.get(i).map_or("<missing>", String::as_str);
        let user = users.get(i).map_or("<missing>", String::as_str);
        let marker = if UserRecord::parse(user).is_some() { "✓" } else { "✗" };
        println!("  {marker} [{}] {} | {}", i + 1, truncate(key, 24), user);
    }
}

fn read_lines<E>(bytes: Result<Option<Vec<u8>>, E>) -> Vec<String> {
    bytes
        .ok()
        .flatten()
        .map(|b| {
            String::from_utf8_lossy(&b)
                .split_terminator('\n')
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Truncates a string for display.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}
