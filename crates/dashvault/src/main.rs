//! `dashvault` - CLI for the per-user dashboard data store
//!
//! This binary inspects and edits the records kept for each dashboard user
//! in the local `SQLite` store.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Local, Utc};
use clap::Parser;

use dashvault::cli::{
    AccountCommand, CardsCommand, Cli, Command, ConfigCommand, FlightsCommand, MedsCommand,
};
use dashvault::{
    init_logging, Accounts, Config, KeyValueStore, MedicationRecord, SqliteStore, UserDataStore,
    Theme, UserRecord, CARD_PREFABS,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    if let Command::Config(config_cmd) = cli.command {
        return handle_config(&config, config_cmd);
    }

    let db_path = config.database_path();
    let sqlite = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("opening store at {}", db_path.display()))?
            .with_quota(config.quota()),
    );
    let substrate: Arc<dyn KeyValueStore> = Arc::clone(&sqlite) as Arc<dyn KeyValueStore>;
    let store = UserDataStore::from_config(Arc::clone(&substrate), &config);
    let accounts = Accounts::new(substrate);

    let user = cli.user.as_deref();
    match cli.command {
        Command::Users => handle_users(&store),
        Command::Show(cmd) => handle_show(&store, &resolve_user(user, &accounts)?, cmd.json),
        Command::Export(cmd) => {
            handle_export(&store, &resolve_user(user, &accounts)?, cmd.output.as_deref())
        }
        Command::Import(cmd) => handle_import(&store, &resolve_user(user, &accounts)?, &cmd.file),
        Command::Clear(cmd) => handle_clear(&store, &resolve_user(user, &accounts)?, cmd.yes),
        Command::Migrate => handle_migrate(&store, &resolve_user(user, &accounts)?),
        Command::Flights(cmd) => handle_flights(&store, &resolve_user(user, &accounts)?, cmd),
        Command::Meds(cmd) => handle_meds(&store, &resolve_user(user, &accounts)?, cmd),
        Command::Cards(cmd) => handle_cards(&store, user, &accounts, cmd),
        Command::Theme(cmd) => {
            handle_theme(&store, &resolve_user(user, &accounts)?, cmd.value.as_deref())
        }
        Command::Account(cmd) => handle_account(&accounts, cmd),
        Command::Status(cmd) => handle_status(&config, &sqlite, &store, &accounts, cmd.json),
        Command::Config(_) => Ok(()),
    }
}

/// The explicit `--user`, else the signed-in account.
fn resolve_user(explicit: Option<&str>, accounts: &Accounts) -> dashvault::Result<String> {
    if let Some(user) = explicit {
        return Ok(user.to_string());
    }
    accounts
        .current_user()
        .map(|account| account.id)
        .ok_or(dashvault::Error::NotSignedIn)
}

fn handle_users(store: &UserDataStore) -> anyhow::Result<()> {
    let ids = store.all_user_ids()?;
    if ids.is_empty() {
        println!("No user records.");
    }
    for id in ids {
        println!("{id}");
    }
    Ok(())
}

fn handle_show(store: &UserDataStore, user_id: &str, json: bool) -> anyhow::Result<()> {
    let record = store.get_user_data(user_id);
    if json {
        println!("{}", record.to_json_pretty()?);
        return Ok(());
    }

    println!("User: {user_id}");
    println!("================");
    println!("  Flights tracked:    {}", record.flight_count);
    println!("  Weather locations:  {}", record.weather_locations.len());
    println!("  Saved businesses:   {}", record.saved_businesses.len());
    println!("  Blacklisted:        {}", record.blacklisted_businesses.len());
    println!(
        "  Medications:        {} ({} taken today, {} low)",
        record.medications.len(),
        record.taken_today_count(),
        record.low_stock_count()
    );
    println!(
        "  Last check:         {}",
        record.last_check_date.as_deref().unwrap_or("never")
    );
    match &record.network_speed_test {
        Some(test) => println!(
            "  Speed test:         {:.1} down / {:.1} up Mbps, {:.0} ms ({})",
            test.download_speed,
            test.upload_speed,
            test.ping,
            test.timestamp.format("%Y-%m-%d %H:%M")
        ),
        None => println!("  Speed test:         none"),
    }
    println!("  Dashboard cards:    {}", record.dashboard_cards.len());
    Ok(())
}

fn handle_export(store: &UserDataStore, user_id: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let exported = store.export_user_data(user_id)?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{exported}\n"))
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Exported {user_id} to {}", path.display());
        }
        None => println!("{exported}"),
    }
    Ok(())
}

fn handle_import(store: &UserDataStore, user_id: &str, file: &Path) -> anyhow::Result<()> {
    let payload = if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        buf
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?
    };

    store
        .import_user_data(user_id, &payload)
        .with_context(|| format!("importing into {user_id}"))?;
    println!("Imported record for {user_id}.");
    Ok(())
}

fn handle_clear(store: &UserDataStore, user_id: &str, yes: bool) -> anyhow::Result<()> {
    if !yes {
        println!("This will delete every stored value for {user_id}.");
        println!("Use --yes to confirm.");
        return Ok(());
    }
    store.clear_user_data(user_id)?;
    println!("Cleared {user_id}.");
    Ok(())
}

fn handle_migrate(store: &UserDataStore, user_id: &str) -> anyhow::Result<()> {
    let before = store.legacy_keys_present()?;
    store.migrate_to_user_data(user_id)?;
    let after = store.legacy_keys_present()?;

    let migrated: Vec<&str> = before.iter().filter(|k| !after.contains(*k)).copied().collect();
    if before.is_empty() {
        println!("No legacy data found.");
    } else {
        println!("Migrated {} legacy key(s) into {user_id}.", migrated.len());
    }
    for key in &after {
        println!("  left in place (unreadable): {key}");
    }
    Ok(())
}

fn handle_flights(store: &UserDataStore, user_id: &str, cmd: FlightsCommand) -> anyhow::Result<()> {
    match cmd {
        FlightsCommand::Track { ids } => {
            let mut added = 0;
            let record = store.update_user_data(user_id, |record| {
                added = record.track_flights(ids);
            })?;
            println!(
                "{added} new flight(s); {} tracked in total.",
                record.flight_count
            );
        }
    }
    Ok(())
}

fn handle_meds(store: &UserDataStore, user_id: &str, cmd: MedsCommand) -> anyhow::Result<()> {
    match cmd {
        MedsCommand::List => {
            let record = store.get_user_data(user_id);
            if record.medications.is_empty() {
                println!("No medications.");
            }
            for med in &record.medications {
                println!(
                    "{:<24} {:<20} {:>4}/{:<4} {:>3} day(s){}{}",
                    med.id,
                    med.name,
                    med.current_pills,
                    med.total_pills,
                    med.days_remaining(),
                    if med.taken_today { "  taken" } else { "" },
                    if med.is_low_stock() { "  LOW" } else { "" },
                );
            }
        }
        MedsCommand::Add { name, dose, total } => {
            let med = MedicationRecord::new(&name, dose, total)?;
            let id = med.id.clone();
            store.try_update_user_data(user_id, |record| record.add_medication(med))?;
            println!("Added {name} ({id}).");
        }
        MedsCommand::Take { id } => {
            let (taken, left) = store.try_update_user_data(user_id, |record| {
                let med = record.medication_mut(&id)?;
                let taken = med.toggle_taken(Utc::now());
                Ok((taken, med.current_pills))
            })?;
            let state = if taken { "taken" } else { "not taken" };
            println!("Marked {state}; {left} pill(s) left.");
        }
        MedsCommand::Edit { id, current, total } => {
            store.try_update_user_data(user_id, |record| {
                record.medication_mut(&id)?.update_pills(current, total)
            })?;
            println!("Updated {id}.");
        }
        MedsCommand::Remove { id } => {
            store.try_update_user_data(user_id, |record| {
                if record.remove_medication(&id) {
                    Ok(())
                } else {
                    Err(dashvault::Error::not_found("medication", &id))
                }
            })?;
            println!("Removed {id}.");
        }
        MedsCommand::NewDay => {
            let today = Local::now().date_naive();
            let mut reset = false;
            store.update_user_data(user_id, |record| {
                reset = record.reset_for_new_day(today);
            })?;
            if reset {
                println!("New day: doses cleared.");
            } else {
                println!("Already checked today.");
            }
        }
    }
    Ok(())
}

fn handle_cards(
    store: &UserDataStore,
    user: Option<&str>,
    accounts: &Accounts,
    cmd: CardsCommand,
) -> anyhow::Result<()> {
    if let CardsCommand::Prefabs = cmd {
        for prefab in &CARD_PREFABS {
            println!("{:<14} {:<14} {} ({})", prefab.content, prefab.title, prefab.description, prefab.size);
        }
        return Ok(());
    }

    let user_id = resolve_user(user, accounts)?;
    match cmd {
        CardsCommand::List => {
            let record = store.get_user_data(&user_id);
            if record.dashboard_cards.is_empty() {
                println!("No cards. Use `cards reset` for the default layout.");
            }
            for (index, card) in record.dashboard_cards.iter().enumerate() {
                println!(
                    "{index:>2}  {:<24} {:<24} {} {}",
                    card.id, card.title, card.size, card.content_type
                );
            }
        }
        CardsCommand::AddPrefab { prefab, at } => {
            let id = store.try_update_user_data(&user_id, |record| record.add_prefab_card(&prefab, at))?;
            println!("Added card {id}.");
        }
        CardsCommand::Duplicate { id } => {
            let copy = store.try_update_user_data(&user_id, |record| record.duplicate_card(&id))?;
            println!("Duplicated {id} as {copy}.");
        }
        CardsCommand::Move { id, to } => {
            let index = store.try_update_user_data(&user_id, |record| record.move_card(&id, to))?;
            println!("Moved {id} to position {index}.");
        }
        CardsCommand::Rename { id, title } => {
            store.try_update_user_data(&user_id, |record| record.rename_card(&id, &title))?;
            println!("Renamed {id}.");
        }
        CardsCommand::Remove { id } => {
            store.try_update_user_data(&user_id, |record| {
                if record.remove_card(&id) {
                    Ok(())
                } else {
                    Err(dashvault::Error::not_found("dashboard card", &id))
                }
            })?;
            println!("Removed {id}.");
        }
        CardsCommand::Reset => {
            store.update_user_data(&user_id, UserRecord::reset_cards)?;
            println!("Restored the default layout.");
        }
        CardsCommand::Prefabs => {}
    }
    Ok(())
}

fn handle_theme(store: &UserDataStore, user_id: &str, value: Option<&str>) -> anyhow::Result<()> {
    let updated = match value {
        None => {
            let record = store.get_user_data(user_id);
            let source = if record.theme.is_some() { "" } else { " (default)" };
            println!("{}{source}", record.effective_theme());
            return Ok(());
        }
        Some("toggle") => store.update_user_data(user_id, |record| {
            record.toggle_theme();
        })?,
        Some(name) => {
            let theme: Theme = name.parse()?;
            store.update_user_data(user_id, |record| record.theme = Some(theme))?
        }
    };
    println!("Theme set to {}.", updated.effective_theme());
    Ok(())
}

fn handle_account(accounts: &Accounts, cmd: AccountCommand) -> anyhow::Result<()> {
    match cmd {
        AccountCommand::Signup {
            name,
            email,
            password,
        } => {
            let account = accounts.sign_up(&name, &email, &password)?;
            println!("Signed up as {} (user id {}).", account.email, account.id);
        }
        AccountCommand::Login { email, password } => {
            let account = accounts.login(&email, &password)?;
            println!("Signed in as {} (user id {}).", account.email, account.id);
        }
        AccountCommand::Logout => {
            accounts.logout()?;
            println!("Signed out.");
        }
        AccountCommand::Forgot { email } => {
            let reset = accounts.request_password_reset(&email)?;
            println!("Reset token for {}: {}", reset.email, reset.token);
            println!("Valid until {}.", reset.expires_at.to_rfc3339());
        }
        AccountCommand::Reset { token, password } => {
            let account = accounts.reset_password(&token, &password)?;
            println!("Password updated for {}.", account.email);
        }
        AccountCommand::Whoami => match accounts.current_user() {
            Some(account) => {
                println!("{} <{}>", account.name, account.email);
                println!("  User id:    {}", account.id);
                println!("  Last login: {}", account.last_login_at.to_rfc3339());
            }
            None => println!("Not signed in."),
        },
        AccountCommand::List => {
            for account in accounts.list()? {
                println!("{:<16} {:<32} {}", account.id, account.email, account.name);
            }
        }
    }
    Ok(())
}

fn handle_status(
    config: &Config,
    sqlite: &SqliteStore,
    store: &UserDataStore,
    accounts: &Accounts,
    json: bool,
) -> anyhow::Result<()> {
    let stats = sqlite.stats(store.prefix())?;
    let legacy = store.legacy_keys_present()?;
    let signed_in = accounts.current_user();

    if json {
        let status = serde_json::json!({
            "database_path": sqlite.path(),
            "total_entries": stats.total_entries,
            "user_records": stats.user_records,
            "total_bytes": stats.total_bytes,
            "db_size_bytes": stats.db_size_bytes,
            "last_update": stats.last_update,
            "quota_bytes": config.quota(),
            "legacy_keys": legacy,
            "signed_in": signed_in.map(|account| account.id),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("dashvault status");
        println!("----------------");
        println!("Database:      {}", sqlite.path().display());
        println!("Entries:       {}", stats.total_entries);
        println!("User records:  {}", stats.user_records);
        println!("Data size:     {} bytes", stats.total_bytes);
        println!("File size:     {} bytes", stats.db_size_bytes);
        match config.quota() {
            Some(quota) => println!("Quota:         {quota} bytes"),
            None => println!("Quota:         unlimited"),
        }
        match stats.last_update {
            Some(ts) => println!("Last write:    {}", ts.to_rfc3339()),
            None => println!("Last write:    never"),
        }
        match signed_in {
            Some(account) => println!("Signed in:     {} ({})", account.email, account.id),
            None => println!("Signed in:     no"),
        }
        if !legacy.is_empty() {
            println!();
            println!("Legacy data waiting for `dashvault migrate`: {}", legacy.join(", "));
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:  {}", config.database_path().display());
                println!("  Key prefix:     {}", config.storage.key_prefix);
                match config.quota() {
                    Some(quota) => println!("  Quota:          {quota} bytes"),
                    None => println!("  Quota:          unlimited"),
                }
                println!();
                println!("[Persistence]");
                println!("  Debounce:       {} ms", config.persistence.debounce_ms);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
