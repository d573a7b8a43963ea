use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty. Returns true if the help was printed, in which case
/// the caller should exit.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 21] = [
        "RUST_LOG",
        "PBG_HOST",
        "PBG_PORT",
        "PBG_DATABASE_URL",
        "PBG_QUEUE_DATABASE_URL",
        "PBG_STRIPE_API_URL",
        "PBG_STRIPE_PUBLISHABLE_KEY",
        "PBG_WEBHOOK_TOLERANCE_SECS",
        "PBG_WEBHOOK_IP_WHITELIST",
        "PBG_USE_X_FORWARDED_FOR",
        "PBG_USE_FORWARDED",
        "PBG_SWEEP_INTERVAL_SECS",
        "PBG_PENDING_EXPIRY_MINUTES",
        "PBG_SWEEP_BATCH_SIZE",
        "PBG_SWEEP_LOCK_LEASE_SECS",
        "PBG_CALLBACK_MAX_ATTEMPTS",
        "PBG_CALLBACK_BACKOFF_SECS",
        "PBG_CALLBACK_POLL_INTERVAL_SECS",
        "PBG_CALLBACK_BATCH_SIZE",
        "PBG_CALLBACK_KEEP_COMPLETED",
        "PBG_CALLBACK_KEEP_FAILED",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    });
    let overrides = env::vars().filter(|(k, _)| k.starts_with("PBG_CURRENCY_RATE_")).collect::<Vec<_>>();
    if !overrides.is_empty() {
        println!("Exchange rate overrides:");
        overrides.iter().for_each(|(name, val)| println!("  {name:<35} {val:<15}"));
    }
}
